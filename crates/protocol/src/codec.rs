//! Line-delimited JSON framing for the daemon connection.
//!
//! Every frame is a single JSON document terminated by `\n`. Commands go out
//! as JSON arrays, and everything the daemon sends back (replies and
//! unilateral pushes alike) is a JSON object.

use crate::command::Command;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// A decoded frame: an ordered mapping of field names to dynamic values.
pub type Pdu = Map<String, Value>;

/// Maximum accepted frame size (32 MiB), including the trailing newline.
pub const MAX_FRAME_SIZE: usize = 32 * 1024 * 1024;

/// Error type for protocol operations.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// IO error during communication.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A well-formed frame that is not a JSON object.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Frame exceeded the reader's size limit.
    ///
    /// `len` is the number of bytes read before giving up, not the size of
    /// the whole frame.
    #[error("frame of at least {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    /// The stream ended partway through a frame.
    #[error("connection closed in the middle of a frame")]
    UnexpectedEof,
}

/// Serialize a command into a newline-terminated frame.
pub fn encode(command: &Command) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = serde_json::to_vec(&command.to_value())?;
    buf.push(b'\n');
    Ok(buf)
}

/// Parse a single frame (without its trailing newline) into a [`Pdu`].
pub fn decode(frame: &[u8]) -> Result<Pdu, ProtocolError> {
    match serde_json::from_slice(frame)? {
        Value::Object(pdu) => Ok(pdu),
        other => Err(ProtocolError::InvalidMessage(format!(
            "expected a JSON object, got {}",
            kind_of(&other)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Reads frames off a buffered byte stream.
#[derive(Debug)]
pub struct PduReader<R> {
    inner: R,
    buf: Vec<u8>,
    max_frame_size: usize,
}

impl<R: AsyncBufRead + Unpin> PduReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(4096),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Use a frame size limit other than [`MAX_FRAME_SIZE`].
    #[must_use]
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between frames.
    /// Blank lines are skipped. At most one byte past the size limit is
    /// buffered before the frame is rejected.
    pub async fn next_pdu(&mut self) -> Result<Option<Pdu>, ProtocolError> {
        let limit = self.max_frame_size as u64 + 1;
        loop {
            self.buf.clear();
            let n = (&mut self.inner)
                .take(limit)
                .read_until(b'\n', &mut self.buf)
                .await?;
            if n == 0 {
                return Ok(None);
            }

            // Sanity check message size
            if self.buf.len() > self.max_frame_size {
                return Err(ProtocolError::FrameTooLarge {
                    len: self.buf.len(),
                    max: self.max_frame_size,
                });
            }

            if self.buf.last() != Some(&b'\n') {
                return Err(ProtocolError::UnexpectedEof);
            }

            let frame = self.buf.trim_ascii();
            if frame.is_empty() {
                continue;
            }

            return decode(frame).map(Some);
        }
    }
}
