//! Live subscriptions on a connection.
//!
//! The read loop consults this to decide whether an inbound frame is a push,
//! while the façade registers and unregisters names from caller tasks.

use crate::error::Error;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Subscription name to watched root.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscriptions: RwLock<HashMap<String, PathBuf>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription name.
    ///
    /// Fails if the name is already live on this connection.
    pub fn register(&self, name: &str, root: &Path) -> Result<(), Error> {
        let mut subscriptions = self.subscriptions.write();
        if subscriptions.contains_key(name) {
            return Err(Error::DuplicateSubscription {
                name: name.to_string(),
            });
        }
        subscriptions.insert(name.to_string(), root.to_path_buf());
        tracing::debug!(name = %name, root = %root.display(), "Subscription registered");
        Ok(())
    }

    /// Remove a subscription name.
    ///
    /// Returns true if the name was live. Removing an unknown name is a no-op.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.subscriptions.write().remove(name).is_some();
        if removed {
            tracing::debug!(name = %name, "Subscription unregistered");
        }
        removed
    }

    /// Watched root of a live subscription, or `None` if the name is not live.
    pub fn root_of(&self, name: &str) -> Option<PathBuf> {
        self.subscriptions.read().get(name).cloned()
    }

    /// Names of all live subscriptions, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.subscriptions.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.read().is_empty()
    }

    /// Drop every subscription, e.g. when the connection ends.
    pub fn clear(&self) {
        self.subscriptions.write().clear();
    }
}
