//! Public client API.
//!
//! Thin layer over the [`Multiplexer`]: builds commands, checks replies for
//! daemon errors and keeps the subscription registry in step with the
//! daemon.

use crate::error::Error;
use crate::mux::{DEFAULT_NOTIFICATION_BUFFER, Multiplexer, Notifications};
use crate::registry::SubscriptionRegistry;
use parking_lot::Mutex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixStream;
use watchman_protocol::{Command, Pdu, Query, discover_socket_path};

/// Connection settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Daemon socket; discovered when unset.
    pub socket: Option<PathBuf>,
    /// Capacity of the notification channel.
    pub notification_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket: None,
            notification_buffer: DEFAULT_NOTIFICATION_BUFFER,
        }
    }
}

impl ClientConfig {
    /// Override the socket path
    pub fn with_socket(mut self, socket: Option<PathBuf>) -> Self {
        if let Some(s) = socket {
            self.socket = Some(s);
        }
        self
    }
}

struct Inner {
    mux: Multiplexer,
    version: String,
    notifications: Mutex<Option<Notifications>>,
}

/// A connection to the daemon.
///
/// Cheap to clone; all clones share the one connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Connect using the default configuration.
    pub async fn connect() -> Result<Self, Error> {
        Self::connect_with(ClientConfig::default()).await
    }

    /// Connect to the configured socket, discovering it if unset.
    pub async fn connect_with(config: ClientConfig) -> Result<Self, Error> {
        let socket = match &config.socket {
            Some(path) => path.clone(),
            None => discover_socket_path()
                .await
                .map_err(|e| Error::Bootstrap(e.to_string()))?,
        };

        tracing::info!(socket = %socket.display(), "Connecting to daemon");
        let stream = UnixStream::connect(&socket).await?;
        Self::from_stream(stream, &config).await
    }

    /// Run the client over an already-open stream.
    ///
    /// Queries the daemon version before returning.
    pub async fn from_stream<S>(stream: S, config: &ClientConfig) -> Result<Self, Error>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (mux, notifications) =
            Multiplexer::spawn(stream, registry, config.notification_buffer);

        let reply = request(&mux, &Command::Version).await?;
        let version = reply_str(&reply, "version", &Command::Version)?.to_string();
        tracing::info!(version = %version, "Connected to daemon");

        Ok(Self {
            inner: Arc::new(Inner {
                mux,
                version,
                notifications: Mutex::new(Some(notifications)),
            }),
        })
    }

    /// Daemon version reported at connect time.
    pub fn version(&self) -> &str {
        &self.inner.version
    }

    /// All roots the daemon is watching.
    pub async fn list_watches(&self) -> Result<Vec<PathBuf>, Error> {
        let reply = self.request(&Command::WatchList).await?;
        let roots = reply
            .get("roots")
            .and_then(Value::as_array)
            .ok_or_else(|| unexpected(&Command::WatchList, "missing `roots` array"))?;

        roots
            .iter()
            .map(|root| {
                root.as_str()
                    .map(PathBuf::from)
                    .ok_or_else(|| unexpected(&Command::WatchList, "non-string root"))
            })
            .collect()
    }

    /// Start watching a directory.
    ///
    /// The daemon may watch an enclosing project root instead; the
    /// directory's position under it is kept as the watch's relative path.
    pub async fn add_watch(&self, path: impl AsRef<Path>) -> Result<Watch, Error> {
        let command = Command::WatchProject {
            path: path.as_ref().to_path_buf(),
        };
        let reply = self.request(&command).await?;
        let root = PathBuf::from(reply_str(&reply, "watch", &command)?);
        let relative_path = match reply.get("relative_path") {
            None | Some(Value::Null) => None,
            Some(Value::String(rel)) => Some(rel.clone()),
            Some(_) => return Err(unexpected(&command, "non-string `relative_path`")),
        };

        tracing::info!(
            root = %root.display(),
            relative_path = ?relative_path,
            "Watch added"
        );
        Ok(Watch {
            client: self.clone(),
            root,
            relative_path,
        })
    }

    /// Take the notification output.
    ///
    /// Only one reader is supported, so this returns `Some` exactly once.
    pub fn take_notifications(&self) -> Option<Notifications> {
        self.inner.notifications.lock().take()
    }

    /// Names of the live subscriptions on this connection.
    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.mux.registry().names()
    }

    /// The error that ended the connection, if it has ended.
    pub fn terminal_error(&self) -> Option<Error> {
        self.inner.mux.terminal_error()
    }

    /// Close the connection for every clone of this client.
    pub async fn close(&self) {
        self.inner.mux.close().await;
    }

    async fn request(&self, command: &Command) -> Result<Pdu, Error> {
        request(&self.inner.mux, command).await
    }

    fn registry(&self) -> &SubscriptionRegistry {
        self.inner.mux.registry()
    }
}

/// A watched root.
#[derive(Clone)]
pub struct Watch {
    client: Client,
    root: PathBuf,
    relative_path: Option<String>,
}

impl Watch {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Requested directory relative to [`root`](Self::root), if they differ.
    pub fn relative_path(&self) -> Option<&str> {
        self.relative_path.as_deref()
    }

    /// Subscribe with the default query.
    pub async fn subscribe(&self, name: &str) -> Result<Subscription, Error> {
        self.subscribe_with(name, Query::default()).await
    }

    /// Subscribe with a custom query.
    ///
    /// The query is scoped to the watch's relative path unless it names its
    /// own relative root.
    pub async fn subscribe_with(&self, name: &str, query: Query) -> Result<Subscription, Error> {
        let query = if query.relative_root.is_some() {
            query
        } else {
            query.with_relative_root(self.relative_path.clone())
        };

        // Register first: the daemon may push right behind its reply.
        let registry = self.client.registry();
        registry.register(name, &self.root)?;

        let command = Command::Subscribe {
            root: self.root.clone(),
            name: name.to_string(),
            query,
        };
        if let Err(e) = self.client.request(&command).await {
            registry.unregister(name);
            tracing::warn!(name = %name, error = %e, "Subscribe failed");
            return Err(e);
        }

        tracing::info!(name = %name, root = %self.root.display(), "Subscribed");
        Ok(Subscription {
            client: self.client.clone(),
            name: name.to_string(),
            root: self.root.clone(),
        })
    }
}

/// An active subscription.
pub struct Subscription {
    client: Client,
    name: String,
    root: PathBuf,
}

impl Subscription {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cancel the subscription.
    ///
    /// The name stays registered until the daemon acknowledges, so pushes
    /// already in flight are still delivered.
    pub async fn unsubscribe(self) -> Result<(), Error> {
        let command = Command::Unsubscribe {
            root: self.root.clone(),
            name: self.name.clone(),
        };
        self.client.request(&command).await?;
        self.client.registry().unregister(&self.name);
        tracing::info!(name = %self.name, "Unsubscribed");
        Ok(())
    }
}

/// Send a command and turn a daemon `error` reply into [`Error::Daemon`].
async fn request(mux: &Multiplexer, command: &Command) -> Result<Pdu, Error> {
    let reply = mux.send(command).await?;
    if let Some(error) = reply.get("error") {
        let message = match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(Error::Daemon { message });
    }
    Ok(reply)
}

fn reply_str<'a>(reply: &'a Pdu, key: &str, command: &Command) -> Result<&'a str, Error> {
    reply
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| unexpected(command, &format!("missing `{key}`")))
}

fn unexpected(command: &Command, reason: &str) -> Error {
    Error::UnexpectedReply {
        command: command.name(),
        reason: reason.to_string(),
    }
}
