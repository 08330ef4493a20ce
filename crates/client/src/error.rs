//! Error types for the client.

use std::sync::Arc;
use thiserror::Error;
use watchman_protocol::ProtocolError;

/// A push payload that could not be turned into a change notification.
///
/// Not fatal to the connection; it is delivered on the notification output
/// in place of the notification it would have been.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to decode `{field}`: {reason}")]
pub struct DecodeError {
    /// Offending field, e.g. `files[2].symlink_target`.
    pub field: String,
    /// What was wrong with it.
    pub reason: String,
}

impl DecodeError {
    pub(crate) fn missing(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: "missing".to_string(),
        }
    }

    pub(crate) fn wrong_type(field: impl Into<String>, expected: &str) -> Self {
        Self {
            field: field.into(),
            reason: format!("expected {expected}"),
        }
    }
}

/// Errors returned by client operations.
///
/// Cloneable so that the error that ended a connection can be handed to
/// every caller that tries to use it afterwards.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Connection I/O failed.
    #[error("connection error: {0}")]
    Connection(Arc<std::io::Error>),

    /// The connection was closed.
    #[error("connection closed")]
    Closed,

    /// The daemon sent something that is neither a reply nor a known push.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A payload failed to decode.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A subscription with this name is already active on the connection.
    #[error("subscription `{name}` already exists")]
    DuplicateSubscription { name: String },

    /// The daemon rejected a command.
    #[error("daemon returned error: {message}")]
    Daemon { message: String },

    /// A reply lacked a field needed to interpret it.
    #[error("unexpected reply to `{command}`: {reason}")]
    UnexpectedReply {
        command: &'static str,
        reason: String,
    },

    /// The daemon socket could not be located.
    #[error("failed to locate daemon socket: {0}")]
    Bootstrap(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Connection(Arc::new(e))
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::Io(io) => Self::from(io),
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl Error {
    /// Whether this error ends the connection.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Closed | Self::Protocol(_) | Self::Bootstrap(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_names_field() {
        let err = DecodeError::missing("files[0].symlink_target");
        assert_eq!(
            err.to_string(),
            "failed to decode `files[0].symlink_target`: missing"
        );
    }

    #[test]
    fn test_protocol_io_maps_to_connection() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err = Error::from(ProtocolError::Io(io));
        assert!(matches!(err, Error::Connection(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_local_errors_not_fatal() {
        assert!(!Error::DuplicateSubscription { name: "s".into() }.is_fatal());
        assert!(!Error::Daemon { message: "nope".into() }.is_fatal());
        assert!(!Error::from(DecodeError::missing("clock")).is_fatal());
    }
}
