//! Connection multiplexer.
//!
//! One connection carries two kinds of inbound traffic: replies to the
//! command currently outstanding, and unilateral subscription pushes that
//! can arrive at any time, including between a command and its reply.
//! Neither carries a type tag or request id, so a single read task
//! classifies every frame by shape:
//!
//! - a `subscription` field naming a live subscription: push
//! - a `subscription` field naming anything else: protocol violation
//! - `"unilateral": true` without a live subscription: protocol violation
//! - anything else while a command is outstanding: that command's reply
//! - anything else: protocol violation
//!
//! Protocol violations and I/O failures are fatal. The error is remembered
//! and returned to every later command, the outstanding command (if any) is
//! failed with it, and the notification output is closed.
//!
//! ## Backpressure
//!
//! Pushes and replies are read by the same task, and pushes are delivered
//! through a bounded channel. A consumer that stops draining
//! [`Notifications`] eventually blocks the read task, and with it any
//! command waiting for a reply. Size the buffer for the expected burst.

use crate::change::ChangeNotification;
use crate::error::{DecodeError, Error};
use crate::registry::SubscriptionRegistry;
use parking_lot::Mutex;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast, mpsc, oneshot};
use watchman_protocol::{Command, Pdu, PduReader, encode};

/// Default capacity of the notification channel.
pub const DEFAULT_NOTIFICATION_BUFFER: usize = 256;

/// Item produced on the notification output.
pub type NotificationResult = Result<ChangeNotification, DecodeError>;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The command currently awaiting its reply.
struct Waiter {
    command: &'static str,
    tx: oneshot::Sender<Result<Pdu, Error>>,
    // Released only once the reply is consumed, so a caller that gives up
    // waiting cannot let the next command pick up this reply.
    _permit: OwnedSemaphorePermit,
}

#[derive(Default)]
struct Slot {
    waiter: Option<Waiter>,
    terminal: Option<Error>,
}

/// State shared between callers and the read task.
struct Shared {
    slot: Mutex<Slot>,
    registry: Arc<SubscriptionRegistry>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Shared {
    fn install(&self, waiter: Waiter) -> Result<(), Error> {
        let mut slot = self.slot.lock();
        if let Some(err) = &slot.terminal {
            return Err(err.clone());
        }
        debug_assert!(slot.waiter.is_none(), "second command outstanding");
        slot.waiter = Some(waiter);
        Ok(())
    }

    fn take_waiter(&self) -> Option<Waiter> {
        self.slot.lock().waiter.take()
    }

    fn terminal(&self) -> Option<Error> {
        self.slot.lock().terminal.clone()
    }

    /// End the connection with `err` unless it has already ended.
    ///
    /// Returns the error the connection actually ended with.
    fn fail(&self, err: Error) -> Error {
        let (terminal, waiter) = {
            let mut slot = self.slot.lock();
            let terminal = slot.terminal.get_or_insert(err).clone();
            (terminal, slot.waiter.take())
        };

        if let Some(waiter) = waiter {
            tracing::debug!(command = waiter.command, error = %terminal, "Failing outstanding command");
            let _ = waiter.tx.send(Err(terminal.clone()));
        }

        self.registry.clear();
        let _ = self.shutdown_tx.send(());
        terminal
    }
}

/// Fails the connection if dropped, i.e. if `send` is cancelled mid-write.
struct WriteGuard<'a> {
    shared: &'a Shared,
    command: &'static str,
    armed: bool,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::warn!(command = self.command, "Command cancelled while being sent");
        self.shared.fail(Error::from(std::io::Error::new(
            std::io::ErrorKind::Interrupted,
            "command cancelled while being sent",
        )));
    }
}

/// Shares one daemon connection between commands and subscription pushes.
pub struct Multiplexer {
    writer: tokio::sync::Mutex<BoxedWriter>,
    permits: Arc<Semaphore>,
    shared: Arc<Shared>,
}

impl Multiplexer {
    /// Take ownership of `stream` and start the read task.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn<S>(
        stream: S,
        registry: Arc<SubscriptionRegistry>,
        notification_buffer: usize,
    ) -> (Self, Notifications)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (notify_tx, notify_rx) = mpsc::channel(notification_buffer.max(1));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot::default()),
            registry,
            shutdown_tx,
        });

        let read_loop = ReadLoop {
            reader: PduReader::new(BufReader::new(read_half)),
            shared: Arc::clone(&shared),
            notify_tx,
            shutdown_rx,
        };
        tokio::spawn(read_loop.run());

        let mux = Self {
            writer: tokio::sync::Mutex::new(Box::new(write_half)),
            permits: Arc::new(Semaphore::new(1)),
            shared,
        };
        (mux, Notifications { rx: notify_rx })
    }

    /// Send a command and wait for its reply.
    ///
    /// Commands are serialized: a second caller waits until the first
    /// command's reply has been consumed. There is no timeout; wrap the
    /// call in `tokio::time::timeout` if one is needed. Dropping the future
    /// while the command is still being written ends the connection, since
    /// a partial frame may already be on the wire.
    pub async fn send(&self, command: &Command) -> Result<Pdu, Error> {
        if let Some(err) = self.shared.terminal() {
            return Err(err);
        }

        let bytes = encode(command)?;
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| Error::Closed)?;

        let (tx, rx) = oneshot::channel();
        self.shared.install(Waiter {
            command: command.name(),
            tx,
            _permit: permit,
        })?;

        tracing::debug!(command = command.name(), "Sending command");
        let mut guard = WriteGuard {
            shared: &self.shared,
            command: command.name(),
            armed: true,
        };
        let written = self.write_frame(&bytes).await;
        guard.armed = false;
        if let Err(e) = written {
            tracing::error!(command = command.name(), error = %e, "Failed to send command");
            return Err(self.shared.fail(Error::from(e)));
        }

        match rx.await {
            Ok(reply) => reply,
            Err(_) => Err(self.shared.terminal().unwrap_or(Error::Closed)),
        }
    }

    async fn write_frame(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.shared.registry
    }

    /// The error that ended the connection, if it has ended.
    pub fn terminal_error(&self) -> Option<Error> {
        self.shared.terminal()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.terminal().is_some()
    }

    /// Close the connection.
    ///
    /// Fails the outstanding command, stops the read task and closes the
    /// notification output.
    pub async fn close(&self) {
        self.shared.fail(Error::Closed);
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            tracing::debug!(error = %e, "Error shutting down connection");
        }
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        self.shared.fail(Error::Closed);
    }
}

struct ReadLoop<R> {
    reader: PduReader<R>,
    shared: Arc<Shared>,
    notify_tx: mpsc::Sender<NotificationResult>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl<R: AsyncBufRead + Unpin> ReadLoop<R> {
    async fn run(mut self) {
        tracing::debug!("Read loop started");

        loop {
            let frame = tokio::select! {
                frame = self.reader.next_pdu() => frame,
                _ = self.shutdown_rx.recv() => {
                    tracing::debug!("Read loop received shutdown signal");
                    break;
                }
            };

            let result = match frame {
                Ok(Some(pdu)) => self.route(pdu).await,
                Ok(None) => Err(Error::from(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "daemon closed the connection",
                ))),
                Err(e) => Err(Error::from(e)),
            };

            if let Err(e) = result {
                if !matches!(e, Error::Closed) {
                    tracing::error!(error = %e, "Connection failed");
                }
                self.shared.fail(e);
                break;
            }
        }

        tracing::debug!("Read loop stopped");
    }

    async fn route(&mut self, pdu: Pdu) -> Result<(), Error> {
        match pdu.get("subscription") {
            Some(Value::String(name)) => match self.shared.registry.root_of(name) {
                Some(root) => self.deliver_push(pdu, &root).await,
                None => Err(Error::Protocol(format!(
                    "push for unknown subscription `{name}`"
                ))),
            },
            Some(_) => Err(Error::Protocol(
                "`subscription` field is not a string".to_string(),
            )),
            None if is_unilateral(&pdu) => Err(Error::Protocol(
                "unilateral message outside any subscription".to_string(),
            )),
            None => self.deliver_reply(pdu),
        }
    }

    fn deliver_reply(&self, pdu: Pdu) -> Result<(), Error> {
        let Some(waiter) = self.shared.take_waiter() else {
            return Err(Error::Protocol(
                "received a reply with no command outstanding".to_string(),
            ));
        };

        if let Some(Value::String(warning)) = pdu.get("warning") {
            tracing::warn!(command = waiter.command, warning = %warning, "Daemon warning");
        }

        tracing::trace!(command = waiter.command, "Reply received");
        // The caller may have stopped waiting; the reply is consumed either way.
        let _ = waiter.tx.send(Ok(pdu));
        Ok(())
    }

    async fn deliver_push(&mut self, pdu: Pdu, root: &Path) -> Result<(), Error> {
        let item = ChangeNotification::decode(&pdu);
        match &item {
            Ok(cn) => tracing::debug!(
                subscription = %cn.subscription,
                root = %root.display(),
                clock = %cn.clock,
                files = cn.files.len(),
                "Push received"
            ),
            Err(e) => tracing::warn!(root = %root.display(), error = %e, "Failed to decode push"),
        }

        tokio::select! {
            sent = self.notify_tx.send(item) => {
                if sent.is_err() {
                    tracing::debug!("Notification receiver dropped, discarding push");
                }
                Ok(())
            }
            _ = self.shutdown_rx.recv() => Err(Error::Closed),
        }
    }
}

fn is_unilateral(pdu: &Pdu) -> bool {
    pdu.get("unilateral").and_then(Value::as_bool).unwrap_or(false)
}

/// Ordered stream of decoded subscription pushes.
///
/// Yields `None` once the connection has ended and every queued push has
/// been received.
#[derive(Debug)]
pub struct Notifications {
    rx: mpsc::Receiver<NotificationResult>,
}

impl Notifications {
    pub async fn recv(&mut self) -> Option<NotificationResult> {
        self.rx.recv().await
    }

    /// Blocking variant for use outside the runtime.
    pub fn blocking_recv(&mut self) -> Option<NotificationResult> {
        self.rx.blocking_recv()
    }

    /// Take a queued push without waiting.
    pub fn try_recv(&mut self) -> Option<NotificationResult> {
        self.rx.try_recv().ok()
    }
}
