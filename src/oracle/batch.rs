//! Chunked fan-out of contributor syncs

use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::task::JoinError;
use tracing::{debug, info, warn, Instrument, Span};

use super::sync::{SyncError, SyncOrchestrator, SyncReceipt};
use crate::models::ContributorRecord;

/// Message recorded when a sync exhausts its retry budget
pub const RETRIES_EXHAUSTED: &str = "Transaction failed after retries";

/// How one member of a batch ended
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    Synced(SyncReceipt),
    /// Every attempt failed
    Exhausted,
    /// Rejected before submission, or the task itself died
    Raised(String),
}

impl SyncOutcome {
    fn from_task(joined: Result<Result<Option<SyncReceipt>, SyncError>, JoinError>) -> Self {
        match joined {
            Ok(Ok(Some(receipt))) => SyncOutcome::Synced(receipt),
            Ok(Ok(None)) => SyncOutcome::Exhausted,
            Ok(Err(e)) => SyncOutcome::Raised(e.to_string()),
            Err(e) => SyncOutcome::Raised(format!("sync task aborted: {}", e)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub username: String,
    pub error: String,
}

/// Aggregate report for one sync cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub successful: usize,
    pub failed: usize,
    pub total_xp_synced: i64,
    pub total_credit_earned: i64,
    pub errors: Vec<SyncFailure>,
}

impl BatchResult {
    fn absorb(&mut self, username: &str, outcome: SyncOutcome) {
        let error = match outcome {
            SyncOutcome::Synced(receipt) => {
                self.successful += 1;
                self.total_xp_synced = self.total_xp_synced.saturating_add(receipt.delta.xp_delta);
                self.total_credit_earned = self
                    .total_credit_earned
                    .saturating_add(receipt.delta.credit_earned);
                return;
            }
            SyncOutcome::Exhausted => RETRIES_EXHAUSTED.to_string(),
            SyncOutcome::Raised(message) => message,
        };
        self.failed += 1;
        self.errors.push(SyncFailure {
            username: username.to_string(),
            error,
        });
    }

    pub fn total(&self) -> usize {
        self.successful + self.failed
    }
}

/// Runs [`SyncOrchestrator::sync_one`] over fixed-size chunks
pub struct BatchScheduler {
    orchestrator: SyncOrchestrator,
    batch_size: usize,
    batch_delay: Duration,
    span: Span,
}

impl BatchScheduler {
    pub fn new(
        orchestrator: SyncOrchestrator,
        batch_size: usize,
        batch_delay: Duration,
        span: Span,
    ) -> Self {
        Self {
            orchestrator,
            batch_size: batch_size.max(1),
            batch_delay,
            span,
        }
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    /// Sync every record. A chunk starts only after the previous chunk has
    /// fully settled; members of one chunk run concurrently.
    pub async fn sync_all(&self, records: &[ContributorRecord]) -> BatchResult {
        async {
            let total_batches = records.len().div_ceil(self.batch_size);
            info!(
                contributors = records.len(),
                batch_size = self.batch_size,
                "Syncing contributor XP"
            );

            let mut result = BatchResult::default();
            for (index, chunk) in records.chunks(self.batch_size).enumerate() {
                debug!(
                    batch = index + 1,
                    total = total_batches,
                    size = chunk.len(),
                    "Processing batch"
                );

                let tasks = chunk.iter().cloned().map(|record| {
                    let orchestrator = self.orchestrator.clone();
                    tokio::spawn(async move { orchestrator.sync_one(&record).await })
                });
                let outcomes = join_all(tasks).await;

                for (record, joined) in chunk.iter().zip(outcomes) {
                    result.absorb(&record.username, SyncOutcome::from_task(joined));
                }

                if index + 1 < total_batches {
                    tokio::time::sleep(self.batch_delay).await;
                }
            }

            info!(
                successful = result.successful,
                failed = result.failed,
                xp_synced = result.total_xp_synced,
                credit_earned = result.total_credit_earned,
                "XP sync complete"
            );
            for failure in &result.errors {
                warn!(username = %failure.username, error = %failure.error, "Contributor sync failed");
            }
            result
        }
        .instrument(self.span.clone())
        .await
    }
}
