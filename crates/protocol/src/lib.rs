//! Watchman Protocol - wire types for talking to a file watching daemon.
//!
//! This crate provides:
//! - [`Command`] values and the subscription [`Query`]
//! - [`encode`] and [`PduReader`] for the line-delimited JSON framing
//! - Socket discovery via [`discover_socket_path`]
//!
//! # Wire Format
//!
//! Each frame is one JSON document followed by a newline. Commands are JSON
//! arrays; replies and unilateral pushes are JSON objects with no message
//! type tag and no request identifier.
//!
//! # Example
//!
//! ```rust
//! use watchman_protocol::{Command, encode, decode};
//! use std::path::PathBuf;
//!
//! let command = Command::WatchProject {
//!     path: PathBuf::from("/tmp/watched"),
//! };
//!
//! let bytes = encode(&command).unwrap();
//! assert!(bytes.ends_with(b"\n"));
//!
//! let reply = decode(br#"{"watch": "/tmp/watched"}"#).unwrap();
//! assert_eq!(reply["watch"], "/tmp/watched");
//! ```

mod codec;
mod command;
mod socket;

// Re-export main types at crate root
pub use codec::{MAX_FRAME_SIZE, Pdu, PduReader, ProtocolError, decode, encode};
pub use command::{Command, DEFAULT_FIELDS, Query};
pub use socket::{
    SOCKET_ENV_VAR, SocketError, WATCHMAN_BIN, discover_socket_path, parse_sockname,
    socket_path_from_env,
};
