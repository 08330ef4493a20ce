//! Socket path discovery for the daemon connection.

use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;
use tokio::process::Command;

/// Environment variable to override the socket path.
pub const SOCKET_ENV_VAR: &str = "WATCHMAN_SOCK";

/// Name of the daemon binary queried when no override is set.
pub const WATCHMAN_BIN: &str = "watchman";

/// Errors that can occur while locating the daemon socket.
#[derive(Debug, Error)]
pub enum SocketError {
    /// The daemon binary could not be started.
    #[error("failed to run `{bin}`: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },

    /// The daemon binary exited unsuccessfully.
    #[error("`{bin} get-sockname` exited with {status}: {stderr}")]
    CommandFailed {
        bin: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    /// The output was not valid JSON.
    #[error("failed to parse get-sockname output: {0}")]
    Parse(#[from] serde_json::Error),

    /// The output did not name a socket.
    #[error("get-sockname output has no sockname: {0}")]
    MissingSockname(String),
}

#[derive(Debug, Deserialize)]
struct SocknameReply {
    sockname: Option<PathBuf>,
    error: Option<String>,
}

/// Get the socket path from the environment, if set.
#[must_use]
pub fn socket_path_from_env() -> Option<PathBuf> {
    std::env::var_os(SOCKET_ENV_VAR)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Find the daemon socket.
///
/// Resolution order:
/// 1. `WATCHMAN_SOCK` environment variable
/// 2. `watchman get-sockname`
pub async fn discover_socket_path() -> Result<PathBuf, SocketError> {
    if let Some(path) = socket_path_from_env() {
        tracing::debug!(socket = %path.display(), "Using socket from environment");
        return Ok(path);
    }

    let output = Command::new(WATCHMAN_BIN)
        .args(["--output-encoding=json", "--no-pretty", "get-sockname"])
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| SocketError::Spawn {
            bin: WATCHMAN_BIN.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(SocketError::CommandFailed {
            bin: WATCHMAN_BIN.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let path = parse_sockname(&output.stdout)?;
    tracing::debug!(socket = %path.display(), "Discovered socket via get-sockname");
    Ok(path)
}

/// Extract the socket path from `get-sockname` output.
pub fn parse_sockname(stdout: &[u8]) -> Result<PathBuf, SocketError> {
    let reply: SocknameReply = serde_json::from_slice(stdout)?;
    match (reply.sockname, reply.error) {
        (Some(path), _) if !path.as_os_str().is_empty() => Ok(path),
        (_, Some(error)) => Err(SocketError::MissingSockname(error)),
        _ => Err(SocketError::MissingSockname(
            String::from_utf8_lossy(stdout).trim().to_string(),
        )),
    }
}
