//! Snapshot metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata persisted alongside a snapshot's payload.
///
/// The timestamp is serialized as integer epoch milliseconds so it round-trips
/// unambiguously regardless of locale or formatting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    /// Unique human-readable identifier, doubling as the directory name.
    pub name: String,

    /// When the snapshot was created.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date: DateTime<Utc>,

    /// User-supplied description.
    #[serde(default)]
    pub description: String,

    /// Total payload size in bytes. `None` means the size has never been
    /// computed; `Some(0)` is a genuinely empty snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,

    /// A locked snapshot must never be deleted or overwritten.
    #[serde(default)]
    pub locked: bool,

    /// Marks the pseudo-entry that archives the currently active tree. A
    /// live marker is always locked.
    #[serde(default)]
    pub live_marker: bool,
}

impl SnapshotInfo {
    /// Metadata for a regular snapshot, timestamped now.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            date: Utc::now(),
            description: description.into(),
            size_bytes: None,
            locked: false,
            live_marker: false,
        }
    }

    /// Metadata for the live-tree pseudo-entry. Always locked.
    pub fn live(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            locked: true,
            live_marker: true,
            ..Self::new(name, description)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_round_trips_as_epoch_millis() {
        let info = SnapshotInfo::new("base-camp", "before the expedition");
        let json = serde_json::to_string(&info).unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["date"].is_i64());
        assert_eq!(value["date"].as_i64().unwrap(), info.date.timestamp_millis());

        let back: SnapshotInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, info.name);
        assert_eq!(back.date.timestamp_millis(), info.date.timestamp_millis());
    }

    #[test]
    fn test_unknown_size_is_omitted() {
        let info = SnapshotInfo::new("empty", "");
        let json = serde_json::to_string(&info).unwrap();
        assert!(!json.contains("size_bytes"));

        let back: SnapshotInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back.size_bytes, None);
    }

    #[test]
    fn test_computed_zero_is_distinct_from_unknown() {
        let mut info = SnapshotInfo::new("empty", "");
        info.size_bytes = Some(0);
        let json = serde_json::to_string(&info).unwrap();

        let back: SnapshotInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back.size_bytes, Some(0));
    }

    #[test]
    fn test_live_info_is_locked() {
        let info = SnapshotInfo::live("current-state", "the world before the last restore");
        assert!(info.locked);
        assert!(info.live_marker);
    }

    #[test]
    fn test_missing_fields_default() {
        let json = r#"{"name":"old","date":1700000000000}"#;
        let info: SnapshotInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.description, "");
        assert_eq!(info.size_bytes, None);
        assert!(!info.locked);
        assert!(!info.live_marker);
    }
}
