use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::stream_locator::StreamLocator;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("failed to read history: {0}")]
    Read(#[source] std::io::Error),
    #[error("failed to write history: {0}")]
    Write(#[source] std::io::Error),
    #[error("history file is malformed: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A previously used stream address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub url: String,
    /// Display name; defaults to the url itself.
    pub name: String,
    /// Local time, `YYYY-MM-DD HH:MM:SS`.
    pub last_used: String,
}

/// Remembers which streams were captured.
///
/// `record` is fire-and-forget: implementations log their own failures and
/// never let them reach the capture path.
pub trait HistoryStore: Send + Sync {
    fn record(&self, locator: &StreamLocator);

    /// Entries ordered by `last_used`, most recent first.
    fn entries(&self) -> Vec<HistoryEntry>;

    /// Removes the entry for `url`. Returns whether one was removed.
    fn remove(&self, url: &str) -> Result<bool, HistoryError>;
}

/// Keeps no history at all.
pub struct NullHistoryStore;

impl HistoryStore for NullHistoryStore {
    fn record(&self, _locator: &StreamLocator) {}

    fn entries(&self) -> Vec<HistoryEntry> {
        Vec::new()
    }

    fn remove(&self, _url: &str) -> Result<bool, HistoryError> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_store_keeps_nothing() {
        let store = NullHistoryStore;
        store.record(&StreamLocator::parse("rtmp://host/live/a", true).unwrap());
        assert!(store.entries().is_empty());
        assert!(!store.remove("rtmp://host/live/a").unwrap());
    }

    #[test]
    fn test_entry_json_shape() {
        let entry = HistoryEntry {
            url: "rtmp://host/live/a".into(),
            name: "rtmp://host/live/a".into(),
            last_used: "2024-05-04 10:00:00".into(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "url": "rtmp://host/live/a",
                "name": "rtmp://host/live/a",
                "last_used": "2024-05-04 10:00:00"
            })
        );
    }
}
