//! In-memory daemon used by the unit tests.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};

pub(crate) struct FakeDaemon {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl FakeDaemon {
    /// A connected pair: the client end and the daemon driving the other end.
    pub(crate) fn pair() -> (DuplexStream, Self) {
        let (client_end, daemon_end) = tokio::io::duplex(64 * 1024);
        let (read_half, write_half) = tokio::io::split(daemon_end);
        let daemon = Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        };
        (client_end, daemon)
    }

    /// Read the next command the client sent.
    pub(crate) async fn expect_command(&mut self) -> Value {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await.unwrap();
        assert!(n > 0, "client closed the connection");
        serde_json::from_str(&line).unwrap()
    }

    /// Write one frame to the client.
    pub(crate) async fn send(&mut self, value: Value) {
        let mut bytes = serde_json::to_vec(&value).unwrap();
        bytes.push(b'\n');
        self.writer.write_all(&bytes).await.unwrap();
    }
}
