//! On-disk buffer of indexed XP events

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::IndexerError;
use crate::ledger::XpSyncedEvent;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedData {
    pub events: Vec<XpSyncedEvent>,
    /// Highest slot processed; never decreases
    pub last_processed_slot: u64,
    /// Transactions already handled in `last_processed_slot`
    #[serde(default)]
    pub processed_signatures: Vec<String>,
    /// RFC 3339 time of the last save
    pub last_updated: String,
}

impl Default for IndexedData {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            last_processed_slot: 0,
            processed_signatures: Vec::new(),
            last_updated: now_rfc3339(),
        }
    }
}

impl IndexedData {
    /// Read the buffer, starting fresh if the file is missing or unreadable
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No existing index, starting fresh");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read index, starting fresh");
                return Self::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(data) => data,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt index file, starting fresh");
                Self::default()
            }
        }
    }

    /// Write as pretty JSON via a temp file and rename, creating parent dirs
    pub fn save(&mut self, path: &Path) -> Result<(), IndexerError> {
        let io_error = |path: &Path, e: std::io::Error| IndexerError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
        }

        self.last_updated = now_rfc3339();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| IndexerError::Serialize(e.to_string()))?;

        let tmp = tmp_path(path);
        std::fs::write(&tmp, json).map_err(|e| io_error(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| io_error(path, e))?;
        Ok(())
    }

    /// Append an event and advance the slot watermark
    pub fn record(&mut self, event: XpSyncedEvent, slot: u64) {
        self.events.push(event);
        self.advance(slot);
    }

    /// Whether the transaction is behind the watermark or was already
    /// handled in the watermark slot
    pub fn is_processed(&self, signature: &str, slot: u64) -> bool {
        slot < self.last_processed_slot
            || (slot == self.last_processed_slot
                && self.processed_signatures.iter().any(|s| s == signature))
    }

    /// Remember a handled transaction so a later pass over the same slot skips it
    pub fn mark_processed(&mut self, signature: &str, slot: u64) {
        self.advance(slot);
        if slot == self.last_processed_slot && !self.is_processed(signature, slot) {
            self.processed_signatures.push(signature.to_string());
        }
    }

    fn advance(&mut self, slot: u64) {
        if slot > self.last_processed_slot {
            self.last_processed_slot = slot;
            self.processed_signatures.clear();
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Pubkey;

    fn event(epoch: u64) -> XpSyncedEvent {
        XpSyncedEvent {
            wallet: Pubkey::new_from_array([1; 32]),
            github_username: "alice".into(),
            epoch,
            total_xp: 100,
            role_xp: vec![],
            domain_xp: vec![],
            skill_xp: vec![],
            sbt_earned: 0,
            timestamp: 1_700_000_000,
            is_registered: true,
        }
    }

    #[test]
    fn test_slot_watermark_is_monotonic() {
        let mut data = IndexedData::default();
        data.record(event(1), 50);
        data.record(event(1), 40);
        assert_eq!(data.last_processed_slot, 50);
        assert_eq!(data.events.len(), 2);
    }

    #[test]
    fn test_processed_signatures_track_the_watermark_slot() {
        let mut data = IndexedData::default();
        data.mark_processed("tx-a", 100);
        assert!(data.is_processed("tx-a", 100));
        assert!(!data.is_processed("tx-b", 100));
        assert!(data.is_processed("tx-z", 99));

        data.mark_processed("tx-b", 100);
        assert_eq!(data.processed_signatures, vec!["tx-a", "tx-b"]);

        data.record(event(1), 101);
        assert_eq!(data.last_processed_slot, 101);
        assert!(data.processed_signatures.is_empty());
        assert!(data.is_processed("tx-b", 100));
    }

    #[test]
    fn test_index_without_signatures_still_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indexed-events.json");
        std::fs::write(
            &path,
            r#"{"events": [], "lastProcessedSlot": 12, "lastUpdated": "2024-01-01T00:00:00.000Z"}"#,
        )
        .unwrap();

        let data = IndexedData::load(&path);
        assert_eq!(data.last_processed_slot, 12);
        assert!(data.processed_signatures.is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/indexed-events.json");

        let mut data = IndexedData::default();
        data.record(event(3), 77);
        data.save(&path).unwrap();
        assert!(!tmp_path(&path).exists());

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"lastProcessedSlot\": 77"));
        assert!(raw.contains("\"githubUsername\": \"alice\""));

        assert_eq!(IndexedData::load(&path), data);
    }

    #[test]
    fn test_corrupt_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indexed-events.json");
        std::fs::write(&path, "{ truncated").unwrap();

        let data = IndexedData::load(&path);
        assert!(data.events.is_empty());
        assert_eq!(data.last_processed_slot, 0);
    }
}
