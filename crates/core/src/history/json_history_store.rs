use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};

use crate::history::history_store::{HistoryEntry, HistoryError, HistoryStore};
use crate::shared::constants::HISTORY_TIMESTAMP_FORMAT;
use crate::shared::stream_locator::StreamLocator;

/// History persisted as a pretty-printed JSON array.
///
/// The whole list is held in memory and rewritten on every change. A
/// missing or unreadable file starts an empty history.
pub struct JsonHistoryStore {
    path: PathBuf,
    entries: Mutex<Vec<HistoryEntry>>,
}

impl JsonHistoryStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match load(&path) {
            Ok(entries) => entries,
            Err(e) => {
                log::error!("Could not load history from {}: {e}", path.display());
                Vec::new()
            }
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Changes reach memory only once they are on disk.
    fn record_at(&self, url: &str, now: &DateTime<Local>) -> Result<(), HistoryError> {
        let stamp = now.format(HISTORY_TIMESTAMP_FORMAT).to_string();
        let mut entries = self.lock();
        let mut updated = entries.clone();
        match updated.iter_mut().find(|e| e.url == url) {
            Some(existing) => existing.last_used = stamp,
            None => updated.push(HistoryEntry {
                url: url.to_string(),
                name: url.to_string(),
                last_used: stamp,
            }),
        }
        save(&self.path, &updated)?;
        *entries = updated;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<HistoryEntry>> {
        // A panic while holding the lock leaves a list that is still valid.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl HistoryStore for JsonHistoryStore {
    fn record(&self, locator: &StreamLocator) {
        if let Err(e) = self.record_at(locator.as_str(), &Local::now()) {
            log::error!("Could not record {locator} in history: {e}");
        }
    }

    fn entries(&self) -> Vec<HistoryEntry> {
        let mut entries = self.lock().clone();
        entries.sort_by(|a, b| b.last_used.cmp(&a.last_used));
        entries
    }

    fn remove(&self, url: &str) -> Result<bool, HistoryError> {
        let mut entries = self.lock();
        let kept: Vec<HistoryEntry> = entries
            .iter()
            .filter(|e| e.url != url)
            .cloned()
            .collect();
        if kept.len() == entries.len() {
            return Ok(false);
        }
        save(&self.path, &kept)?;
        *entries = kept;
        Ok(true)
    }
}

fn load(path: &Path) -> Result<Vec<HistoryEntry>, HistoryError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let json = fs::read_to_string(path).map_err(HistoryError::Read)?;
    Ok(serde_json::from_str(&json)?)
}

fn save(path: &Path, entries: &[HistoryEntry]) -> Result<(), HistoryError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(HistoryError::Write)?;
    }
    let json = serde_json::to_string_pretty(entries)?;
    fs::write(path, json).map_err(HistoryError::Write)
}
