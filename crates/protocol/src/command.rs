//! Commands understood by the daemon.
//!
//! Each command is sent as a JSON array whose first element names the
//! command. Replies carry no request identifier, so callers must never have
//! more than one command outstanding on a connection.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::PathBuf;

/// File fields requested by default in a subscription query.
///
/// These are exactly the fields the change decoder needs.
pub const DEFAULT_FIELDS: [&str; 6] = [
    "name",
    "type",
    "size",
    "exists",
    "cclock",
    "symlink_target",
];

/// Outbound command messages.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Ask the daemon for its version string.
    Version,

    /// List all watched roots.
    WatchList,

    /// Watch a directory, letting the daemon pick an enclosing project root.
    WatchProject {
        /// Directory to watch.
        path: PathBuf,
    },

    /// Subscribe to changes under a watched root.
    Subscribe {
        /// Watched root.
        root: PathBuf,
        /// Subscription name, unique per connection.
        name: String,
        /// Query selecting which files and fields are reported.
        query: Query,
    },

    /// Cancel a subscription.
    Unsubscribe {
        /// Watched root.
        root: PathBuf,
        /// Subscription name.
        name: String,
    },
}

impl Command {
    /// The command name as it appears on the wire.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Version => "version",
            Self::WatchList => "watch-list",
            Self::WatchProject { .. } => "watch-project",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
        }
    }

    /// Build the JSON array form of this command.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Version | Self::WatchList => json!([self.name()]),
            Self::WatchProject { path } => json!([self.name(), path.to_string_lossy()]),
            Self::Subscribe { root, name, query } => {
                json!([self.name(), root.to_string_lossy(), name, query])
            }
            Self::Unsubscribe { root, name } => {
                json!([self.name(), root.to_string_lossy(), name])
            }
        }
    }
}

/// Subscription query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// File fields to report for each change.
    pub fields: Vec<String>,

    /// Optional filter expression, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<Value>,

    /// Restrict results to a subdirectory of the watched root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_root: Option<String>,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            fields: DEFAULT_FIELDS.iter().map(|f| (*f).to_string()).collect(),
            expression: None,
            relative_root: None,
        }
    }
}

impl Query {
    /// Set the filter expression.
    #[must_use]
    pub fn with_expression(mut self, expression: Value) -> Self {
        self.expression = Some(expression);
        self
    }

    /// Set the relative root.
    #[must_use]
    pub fn with_relative_root(mut self, relative_root: Option<String>) -> Self {
        self.relative_root = relative_root;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_commands() {
        assert_eq!(Command::Version.to_value(), json!(["version"]));
        assert_eq!(Command::WatchList.to_value(), json!(["watch-list"]));
    }

    #[test]
    fn test_watch_project() {
        let cmd = Command::WatchProject {
            path: PathBuf::from("/src/app"),
        };
        assert_eq!(cmd.to_value(), json!(["watch-project", "/src/app"]));
    }

    #[test]
    fn test_subscribe_default_query() {
        let cmd = Command::Subscribe {
            root: PathBuf::from("/src"),
            name: "s1".to_string(),
            query: Query::default(),
        };
        assert_eq!(
            cmd.to_value(),
            json!([
                "subscribe",
                "/src",
                "s1",
                {"fields": ["name", "type", "size", "exists", "cclock", "symlink_target"]}
            ])
        );
    }

    #[test]
    fn test_subscribe_query_optionals() {
        let query = Query::default()
            .with_expression(json!(["suffix", "rs"]))
            .with_relative_root(Some("app".to_string()));
        let value = serde_json::to_value(&query).unwrap();
        assert_eq!(value["expression"], json!(["suffix", "rs"]));
        assert_eq!(value["relative_root"], "app");
    }

    #[test]
    fn test_unsubscribe() {
        let cmd = Command::Unsubscribe {
            root: PathBuf::from("/src"),
            name: "s1".to_string(),
        };
        assert_eq!(cmd.to_value(), json!(["unsubscribe", "/src", "s1"]));
        assert_eq!(cmd.name(), "unsubscribe");
    }
}
