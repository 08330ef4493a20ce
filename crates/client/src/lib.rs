//! Client for a file watching daemon.
//!
//! One connection carries both request/response commands and unilateral
//! change pushes. This crate splits them back apart:
//!
//! - [`Client`], [`Watch`] and [`Subscription`] issue commands and wait for
//!   their replies
//! - [`Notifications`] yields every push for a live subscription, decoded
//!   into a [`ChangeNotification`]
//!
//! # Example
//!
//! ```no_run
//! use watchman_client::Client;
//!
//! # async fn run() -> Result<(), watchman_client::Error> {
//! let client = Client::connect().await?;
//! let mut notifications = client.take_notifications().expect("first take");
//!
//! let watch = client.add_watch("/src/project").await?;
//! let _sub = watch.subscribe("my-sub").await?;
//!
//! while let Some(item) = notifications.recv().await {
//!     match item {
//!         Ok(cn) => {
//!             for file in &cn.files {
//!                 println!("{:>9} {}", file.change, file.name);
//!             }
//!         }
//!         Err(e) => eprintln!("bad push: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod change;
mod client;
mod error;
mod mux;
mod registry;

#[cfg(test)]
mod testing;

pub use change::{ChangeNotification, File, StateChange, TYPE_DIR, TYPE_SYMLINK};
pub use client::{Client, ClientConfig, Subscription, Watch};
pub use error::{DecodeError, Error};
pub use mux::{DEFAULT_NOTIFICATION_BUFFER, Multiplexer, NotificationResult, Notifications};
pub use registry::SubscriptionRegistry;
pub use watchman_protocol::{Command, Pdu, Query};
