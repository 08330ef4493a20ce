//! Decoding of subscription pushes into typed change notifications.

use crate::error::DecodeError;
use serde_json::{Map, Value};
use std::fmt;
use watchman_protocol::Pdu;

/// Type tag for symbolic links.
pub const TYPE_SYMLINK: &str = "l";
/// Type tag for directories.
pub const TYPE_DIR: &str = "d";

/// How a file's state changed.
///
/// Exactly one of these applies to every reported file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateChange {
    Created,
    Removed,
    Updated,
}

impl StateChange {
    /// Classify a file from its own change clock and existence, relative to
    /// the clock of the notification that reported it.
    ///
    /// The daemon never reports creation directly. A file that exists and
    /// whose change clock equals the notification clock is taken to have
    /// just appeared; this can misfire when unrelated changes share a tick.
    #[must_use]
    pub fn classify(notification_clock: &str, cclock: &str, exists: bool) -> Self {
        if !exists {
            Self::Removed
        } else if cclock == notification_clock {
            Self::Created
        } else {
            Self::Updated
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Removed => "removed",
            Self::Updated => "updated",
        }
    }
}

impl fmt::Display for StateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // pad so width specifiers line up in listings
        f.pad(self.as_str())
    }
}

/// A single entry in a change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub change: StateChange,
    /// Path relative to the watched root.
    pub name: String,
    /// Single-character type tag (`f`, `d`, `l`, ...), passed through as-is.
    pub kind: String,
    /// Link target; only set for symlinks.
    pub target: Option<String>,
    /// Size in bytes.
    pub size: i64,
}

impl File {
    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.kind == TYPE_SYMLINK
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == TYPE_DIR
    }
}

/// One decoded subscription push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    /// The daemon reset its view of the root; `files` is a full listing
    /// rather than a diff.
    pub is_fresh_instance: bool,
    pub clock: String,
    pub subscription: String,
    /// Watched root, when the daemon includes it.
    pub root: Option<String>,
    pub files: Vec<File>,
}

impl ChangeNotification {
    /// Decode a raw push.
    ///
    /// Pure; does not check whether the subscription is live.
    pub fn decode(pdu: &Pdu) -> Result<Self, DecodeError> {
        let clock = required_str(pdu, "clock", "clock")?;
        let subscription = required_str(pdu, "subscription", "subscription")?;
        let root = optional_str(pdu, "root", "root")?;

        let is_fresh_instance = match pdu.get("is_fresh_instance") {
            None => false,
            Some(v) => v
                .as_bool()
                .ok_or_else(|| DecodeError::wrong_type("is_fresh_instance", "a boolean"))?,
        };

        let raw_files = pdu
            .get("files")
            .ok_or_else(|| DecodeError::missing("files"))?
            .as_array()
            .ok_or_else(|| DecodeError::wrong_type("files", "an array"))?;

        let files = raw_files
            .iter()
            .enumerate()
            .map(|(i, raw)| decode_file(&clock, i, raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            is_fresh_instance,
            clock,
            subscription,
            root,
            files,
        })
    }
}

fn decode_file(clock: &str, index: usize, raw: &Value) -> Result<File, DecodeError> {
    let path = |field: &str| format!("files[{index}].{field}");

    let entry = raw
        .as_object()
        .ok_or_else(|| DecodeError::wrong_type(format!("files[{index}]"), "an object"))?;

    let name = required_str(entry, "name", &path("name"))?;
    let kind = required_str(entry, "type", &path("type"))?;
    if kind.chars().count() != 1 {
        return Err(DecodeError::wrong_type(
            path("type"),
            "a single-character type tag",
        ));
    }

    // Symlink entries must name their target; other types never carry one.
    let target = if kind == TYPE_SYMLINK {
        Some(required_str(entry, "symlink_target", &path("symlink_target"))?)
    } else {
        None
    };

    let size = required_size(entry, &path("size"))?;
    let exists = entry
        .get("exists")
        .ok_or_else(|| DecodeError::missing(path("exists")))?
        .as_bool()
        .ok_or_else(|| DecodeError::wrong_type(path("exists"), "a boolean"))?;
    let cclock = required_str(entry, "cclock", &path("cclock"))?;

    Ok(File {
        change: StateChange::classify(clock, &cclock, exists),
        name,
        kind,
        target,
        size,
    })
}

fn required_str(map: &Map<String, Value>, key: &str, field: &str) -> Result<String, DecodeError> {
    optional_str(map, key, field)?.ok_or_else(|| DecodeError::missing(field))
}

fn optional_str(
    map: &Map<String, Value>,
    key: &str,
    field: &str,
) -> Result<Option<String>, DecodeError> {
    match map.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(DecodeError::wrong_type(field, "a string")),
    }
}

fn required_size(map: &Map<String, Value>, field: &str) -> Result<i64, DecodeError> {
    let value = map
        .get("size")
        .ok_or_else(|| DecodeError::missing(field))?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .ok_or_else(|| DecodeError::wrong_type(field, "a number"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pdu(value: Value) -> Pdu {
        match value {
            Value::Object(map) => map,
            _ => panic!("test payload must be an object"),
        }
    }

    #[test]
    fn test_classification_law() {
        assert_eq!(StateChange::classify("c:2", "c:2", false), StateChange::Removed);
        assert_eq!(StateChange::classify("c:2", "c:1", false), StateChange::Removed);
        assert_eq!(StateChange::classify("c:2", "c:2", true), StateChange::Created);
        assert_eq!(StateChange::classify("c:2", "c:1", true), StateChange::Updated);
    }

    #[test]
    fn test_state_change_display() {
        assert_eq!(StateChange::Created.to_string(), "created");
        assert_eq!(StateChange::Removed.to_string(), "removed");
        assert_eq!(StateChange::Updated.to_string(), "updated");
        assert_eq!(format!("{:>9}", StateChange::Created), "  created");
    }

    #[test]
    fn test_decode_created_file() {
        let cn = ChangeNotification::decode(&pdu(json!({
            "clock": "c:2",
            "subscription": "s1",
            "files": [
                {"name": "a.txt", "type": "f", "size": 10, "exists": true, "cclock": "c:2"}
            ]
        })))
        .unwrap();

        assert_eq!(cn.subscription, "s1");
        assert_eq!(cn.clock, "c:2");
        assert!(!cn.is_fresh_instance);
        assert_eq!(cn.files.len(), 1);
        let file = &cn.files[0];
        assert_eq!(file.name, "a.txt");
        assert_eq!(file.change, StateChange::Created);
        assert_eq!(file.size, 10);
        assert_eq!(file.target, None);
    }

    #[test]
    fn test_decode_removed_file() {
        let cn = ChangeNotification::decode(&pdu(json!({
            "clock": "c:3",
            "subscription": "s1",
            "files": [
                {"name": "a.txt", "type": "f", "size": 0, "exists": false, "cclock": "c:3"}
            ]
        })))
        .unwrap();
        assert_eq!(cn.files[0].change, StateChange::Removed);
    }

    #[test]
    fn test_decode_updated_and_fresh_instance() {
        let cn = ChangeNotification::decode(&pdu(json!({
            "clock": "c:9",
            "subscription": "s1",
            "root": "/src",
            "is_fresh_instance": true,
            "files": [
                {"name": "dir", "type": "d", "size": 4096.0, "exists": true, "cclock": "c:4"}
            ]
        })))
        .unwrap();
        assert!(cn.is_fresh_instance);
        assert_eq!(cn.root.as_deref(), Some("/src"));
        assert_eq!(cn.files[0].change, StateChange::Updated);
        assert_eq!(cn.files[0].size, 4096);
        assert!(cn.files[0].is_dir());
    }

    #[test]
    fn test_decode_empty_files() {
        let cn = ChangeNotification::decode(&pdu(json!({
            "clock": "c:1",
            "subscription": "s1",
            "files": []
        })))
        .unwrap();
        assert!(cn.files.is_empty());
    }

    #[test]
    fn test_decode_symlink_target() {
        let cn = ChangeNotification::decode(&pdu(json!({
            "clock": "c:5",
            "subscription": "s1",
            "files": [{
                "name": "link", "type": "l", "size": 6, "exists": true,
                "cclock": "c:5", "symlink_target": "a.txt"
            }]
        })))
        .unwrap();
        assert!(cn.files[0].is_symlink());
        assert_eq!(cn.files[0].target.as_deref(), Some("a.txt"));
    }

    #[test]
    fn test_symlink_missing_target_is_error() {
        let err = ChangeNotification::decode(&pdu(json!({
            "clock": "c:5",
            "subscription": "s1",
            "files": [
                {"name": "ok", "type": "f", "size": 1, "exists": true, "cclock": "c:1"},
                {"name": "link", "type": "l", "size": 6, "exists": true, "cclock": "c:5"}
            ]
        })))
        .unwrap_err();
        assert_eq!(err.field, "files[1].symlink_target");
    }

    #[test]
    fn test_missing_top_level_fields() {
        let err = ChangeNotification::decode(&pdu(json!({
            "subscription": "s1",
            "files": []
        })))
        .unwrap_err();
        assert_eq!(err, DecodeError::missing("clock"));

        let err = ChangeNotification::decode(&pdu(json!({
            "clock": "c:1",
            "subscription": "s1"
        })))
        .unwrap_err();
        assert_eq!(err, DecodeError::missing("files"));
    }

    #[test]
    fn test_wrong_field_types() {
        let err = ChangeNotification::decode(&pdu(json!({
            "clock": "c:1",
            "subscription": "s1",
            "is_fresh_instance": "yes",
            "files": []
        })))
        .unwrap_err();
        assert_eq!(err.field, "is_fresh_instance");

        let err = ChangeNotification::decode(&pdu(json!({
            "clock": "c:1",
            "subscription": "s1",
            "files": [{"name": "a", "type": "f", "size": "big", "exists": true, "cclock": "c:1"}]
        })))
        .unwrap_err();
        assert_eq!(err.field, "files[0].size");

        let err = ChangeNotification::decode(&pdu(json!({
            "clock": "c:1",
            "subscription": "s1",
            "files": ["a.txt"]
        })))
        .unwrap_err();
        assert_eq!(err.field, "files[0]");
    }

    #[test]
    fn test_multi_char_type_rejected() {
        let err = ChangeNotification::decode(&pdu(json!({
            "clock": "c:1",
            "subscription": "s1",
            "files": [{"name": "a", "type": "file", "size": 1, "exists": true, "cclock": "c:1"}]
        })))
        .unwrap_err();
        assert_eq!(err.field, "files[0].type");
    }
}
