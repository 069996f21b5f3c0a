//! Event indexer integration tests
//!
//! Backfill ordering, slot watermarking, persistence and the wallet queries,
//! against a scripted transaction source.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::Span;

use leaderboard_oracle::config::IndexerConfig;
use leaderboard_oracle::indexer::{
    EventSource, IndexedData, Indexer, SignatureInfo, CLAIM_WINDOW_SECS,
};
use leaderboard_oracle::ledger::{LedgerError, Pubkey, XpSyncedEvent};
use leaderboard_oracle::models::XpCategory;

// =============================================================================
// Scripted source
// =============================================================================

#[derive(Default)]
struct SourceState {
    /// Newest first, like the RPC
    signatures: Vec<SignatureInfo>,
    logs: HashMap<String, Vec<String>>,
    broken: Vec<String>,
    fetched: Vec<String>,
}

#[derive(Clone, Default)]
struct ScriptedSource {
    state: Arc<Mutex<SourceState>>,
}

impl ScriptedSource {
    /// Add a transaction at `slot` carrying `events`; call in ascending slot order
    fn push(&self, signature: &str, slot: u64, events: &[XpSyncedEvent]) {
        let mut state = self.state.lock().unwrap();
        state.signatures.insert(
            0,
            SignatureInfo {
                signature: signature.to_string(),
                slot,
                err: None,
            },
        );
        let mut logs = vec!["Program log: Instruction: SyncContributorXp".to_string()];
        logs.extend(events.iter().map(XpSyncedEvent::to_log_line));
        state.logs.insert(signature.to_string(), logs);
    }

    fn break_tx(&self, signature: &str) {
        self.state.lock().unwrap().broken.push(signature.to_string());
    }

    fn fetched(&self) -> Vec<String> {
        self.state.lock().unwrap().fetched.clone()
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn signatures(&self, limit: usize) -> Result<Vec<SignatureInfo>, LedgerError> {
        let state = self.state.lock().unwrap();
        Ok(state.signatures.iter().take(limit).cloned().collect())
    }

    async fn transaction_logs(&self, signature: &str) -> Result<Option<Vec<String>>, LedgerError> {
        let mut state = self.state.lock().unwrap();
        state.fetched.push(signature.to_string());
        if state.broken.iter().any(|s| s == signature) {
            return Err(LedgerError::Network("timeout".into()));
        }
        Ok(state.logs.get(signature).cloned())
    }
}

fn event(wallet: u8, epoch: u64, timestamp: i64) -> XpSyncedEvent {
    XpSyncedEvent {
        wallet: Pubkey::new_from_array([wallet; 32]),
        github_username: format!("user{}", wallet),
        epoch,
        total_xp: 1000 * epoch,
        role_xp: vec![XpCategory::new("developer", 1000 * epoch)],
        domain_xp: vec![],
        skill_xp: vec![],
        sbt_earned: 100_000,
        timestamp,
        is_registered: true,
    }
}

fn config(path: &Path, save_every: usize) -> IndexerConfig {
    IndexerConfig {
        data_file: path.to_path_buf(),
        save_every,
        ..Default::default()
    }
}

fn indexer(source: &ScriptedSource, path: &Path) -> Indexer {
    Indexer::open(Box::new(source.clone()), &config(path, 10), Span::none())
}

// =============================================================================
// Backfill
// =============================================================================

#[tokio::test]
async fn test_backfill_processes_oldest_first_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data/indexed-events.json");

    let source = ScriptedSource::default();
    source.push("tx-a", 100, &[event(1, 1, 1_000)]);
    source.push("tx-b", 200, &[event(2, 1, 2_000), event(3, 1, 2_000)]);
    source.push("tx-c", 300, &[event(1, 2, 3_000)]);

    let mut indexer = indexer(&source, &path);
    assert_eq!(indexer.backfill(None).await.unwrap(), 4);

    assert_eq!(source.fetched(), vec!["tx-a", "tx-b", "tx-c"]);
    assert_eq!(indexer.data().last_processed_slot, 300);
    let epochs: Vec<_> = indexer.data().events.iter().map(|e| e.epoch).collect();
    assert_eq!(epochs, vec![1, 1, 1, 2]);

    let saved = IndexedData::load(&path);
    assert_eq!(saved.events.len(), 4);
    assert_eq!(saved.last_processed_slot, 300);
}

#[tokio::test]
async fn test_backfill_resumes_after_last_processed_slot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("indexed-events.json");

    let source = ScriptedSource::default();
    source.push("tx-a", 100, &[event(1, 1, 1_000)]);
    indexer(&source, &path).backfill(None).await.unwrap();

    source.push("tx-b", 200, &[event(2, 1, 2_000)]);
    let mut restarted = indexer(&source, &path);
    assert_eq!(restarted.data().events.len(), 1);
    assert_eq!(restarted.backfill(None).await.unwrap(), 1);

    assert_eq!(restarted.data().events.len(), 2);
    assert_eq!(source.fetched(), vec!["tx-a", "tx-b"]);
}

#[tokio::test]
async fn test_backfill_keeps_every_transaction_in_a_shared_slot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("indexed-events.json");

    let source = ScriptedSource::default();
    source.push("tx-a", 100, &[event(1, 1, 1_000)]);
    source.push("tx-b", 100, &[event(2, 1, 1_000)]);

    let mut indexer = indexer(&source, &path);
    assert_eq!(indexer.backfill(None).await.unwrap(), 2);
    assert_eq!(source.fetched(), vec!["tx-a", "tx-b"]);

    // a third transaction lands in the same slot after the first pass
    source.push("tx-c", 100, &[event(3, 1, 1_000)]);
    let mut restarted = Indexer::open(Box::new(source.clone()), &config(&path, 10), Span::none());
    assert_eq!(restarted.backfill(None).await.unwrap(), 1);
    assert_eq!(restarted.backfill(None).await.unwrap(), 0);

    let users: Vec<_> = restarted
        .data()
        .events
        .iter()
        .map(|e| e.github_username.as_str())
        .collect();
    assert_eq!(users, vec!["user1", "user2", "user3"]);
    assert_eq!(restarted.data().last_processed_slot, 100);
    assert_eq!(source.fetched(), vec!["tx-a", "tx-b", "tx-c"]);
}

#[tokio::test]
async fn test_backfill_honours_start_slot_and_skips_broken_transactions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("indexed-events.json");

    let source = ScriptedSource::default();
    source.push("tx-a", 100, &[event(1, 1, 1_000)]);
    source.push("tx-b", 200, &[event(2, 1, 2_000)]);
    source.push("tx-c", 300, &[event(3, 1, 3_000)]);
    source.break_tx("tx-b");

    let mut indexer = indexer(&source, &path);
    assert_eq!(indexer.backfill(Some(150)).await.unwrap(), 1);

    assert_eq!(source.fetched(), vec!["tx-b", "tx-c"]);
    assert_eq!(indexer.data().events[0].github_username, "user3");
    assert_eq!(indexer.data().last_processed_slot, 300);
}

#[tokio::test]
async fn test_handle_event_saves_every_n_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("indexed-events.json");

    let source = ScriptedSource::default();
    let mut indexer = Indexer::open(Box::new(source), &config(&path, 3), Span::none());

    indexer.handle_event(event(1, 1, 0), 10).unwrap();
    indexer.handle_event(event(1, 1, 0), 11).unwrap();
    assert!(!path.exists());

    indexer.handle_event(event(1, 1, 0), 12).unwrap();
    assert_eq!(IndexedData::load(&path).events.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_run_until_saves_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("indexed-events.json");

    let source = ScriptedSource::default();
    source.push("tx-a", 100, &[event(1, 1, 1_000)]);
    let mut indexer = indexer(&source, &path);

    indexer
        .run_until(
            Duration::from_secs(15),
            tokio::time::sleep(Duration::from_secs(20)),
        )
        .await
        .unwrap();

    let saved = IndexedData::load(&path);
    assert_eq!(saved.events.len(), 1);
    assert_eq!(saved.last_processed_slot, 100);
}

// =============================================================================
// Queries
// =============================================================================

#[tokio::test]
async fn test_wallet_queries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("indexed-events.json");
    let registered_at = 100 * 24 * 60 * 60;

    let source = ScriptedSource::default();
    let mut indexer = indexer(&source, &path);
    indexer.handle_event(event(1, 3, registered_at), 1).unwrap();
    indexer.handle_event(event(1, 1, registered_at - CLAIM_WINDOW_SECS - 1), 2).unwrap();
    indexer.handle_event(event(1, 2, registered_at - CLAIM_WINDOW_SECS), 3).unwrap();
    indexer.handle_event(event(1, 3, registered_at + 10), 4).unwrap();
    indexer.handle_event(event(2, 4, registered_at), 5).unwrap();

    let wallet = Pubkey::new_from_array([1; 32]);
    assert_eq!(indexer.events_for_wallet(&wallet).len(), 4);
    assert_eq!(indexer.unclaimed_epochs(&wallet, registered_at), vec![2, 3]);
    assert!(indexer
        .unclaimed_epochs(&Pubkey::new_from_array([7; 32]), registered_at)
        .is_empty());
}
