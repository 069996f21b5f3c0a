//! Sync cycles: the daily XP sync and the weekly epoch rotation

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use tracing::{info, info_span, warn, Instrument, Span};

use crate::config::Config;
use crate::leaderboard::{LeaderboardError, LeaderboardFetcher};
use crate::ledger::{LedgerError, LedgerGateway};
use crate::monitoring::{AlertLevel, Monitor};
use crate::oracle::{
    BatchResult, BatchScheduler, EpochError, EpochManager, EpochRotation, SyncOrchestrator,
};

/// Failures that abort a whole cycle. Per-contributor failures never do;
/// they end up in the [`BatchResult`].
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    Leaderboard(#[from] LeaderboardError),

    #[error("Cannot read ledger state: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Program config account not found")]
    ConfigNotFound,

    #[error(transparent)]
    Epoch(#[from] EpochError),
}

pub struct Oracle {
    fetcher: LeaderboardFetcher,
    batch: BatchScheduler,
    epochs: EpochManager,
    monitor: Monitor,
    reward_amount: u64,
    span: Span,
}

impl Oracle {
    pub fn new(
        fetcher: LeaderboardFetcher,
        batch: BatchScheduler,
        epochs: EpochManager,
        monitor: Monitor,
        reward_amount: u64,
        span: Span,
    ) -> Self {
        Self {
            fetcher,
            batch,
            epochs,
            monitor,
            reward_amount,
            span,
        }
    }

    /// Wire up every component from config, each with its own logging span
    pub fn from_config(
        config: &Config,
        gateway: Arc<dyn LedgerGateway>,
        monitor: Monitor,
    ) -> Result<Self, LeaderboardError> {
        let orchestrator = SyncOrchestrator::new(
            gateway.clone(),
            config.sync.retry_policy(),
            config.sync.xp_to_credit_ratio,
            info_span!("orchestrator"),
        );
        let batch = BatchScheduler::new(
            orchestrator,
            config.sync.batch_size,
            Duration::from_millis(config.sync.batch_delay_ms),
            info_span!("batch"),
        );
        let epochs = EpochManager::new(
            gateway,
            Duration::from_secs(config.epoch.settle_delay_secs),
            Duration::from_secs(config.epoch.finalize_grace_secs),
            info_span!("epoch"),
        );

        Ok(Self::new(
            LeaderboardFetcher::from_config(&config.leaderboard)?,
            batch,
            epochs,
            monitor,
            config.epoch.reward_amount,
            info_span!("oracle"),
        ))
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn epochs(&self) -> &EpochManager {
        &self.epochs
    }

    /// Fetch the leaderboard and sync every contributor
    pub async fn daily_update(&self) -> Result<BatchResult, CycleError> {
        async {
            info!("Starting daily XP sync");
            let started = Instant::now();

            let records = self.fetcher.fetch().await?;
            if records.is_empty() {
                warn!("No contributors found, skipping update");
                return Ok(BatchResult::default());
            }

            // A ledger we cannot read at all aborts before any submission
            self.batch
                .orchestrator()
                .gateway()
                .get_config()
                .await?
                .ok_or(CycleError::ConfigNotFound)?;

            let result = self.batch.sync_all(&records).await;
            let elapsed = started.elapsed();

            info!(
                successful = result.successful,
                failed = result.failed,
                xp_synced = result.total_xp_synced,
                credit_earned = result.total_credit_earned,
                duration_ms = elapsed.as_millis() as u64,
                "Daily sync complete"
            );

            let tags = [("cycle", "daily")];
            self.monitor
                .record_metric("sync.successful", result.successful as f64, &tags)
                .await;
            self.monitor
                .record_metric("sync.failed", result.failed as f64, &tags)
                .await;
            self.monitor
                .record_metric("sync.xp_synced", result.total_xp_synced as f64, &tags)
                .await;
            self.monitor
                .record_metric("sync.credit_earned", result.total_credit_earned as f64, &tags)
                .await;
            self.monitor
                .record_metric("sync.duration_ms", elapsed.as_millis() as f64, &tags)
                .await;

            if result.failed > 0 {
                let level = if result.successful == 0 {
                    AlertLevel::Error
                } else {
                    AlertLevel::Warning
                };
                self.monitor
                    .alert(
                        level,
                        &format!("{} contributors failed to sync", result.failed),
                        json!({ "errors": result.errors }),
                    )
                    .await;
            }

            Ok::<_, CycleError>(result)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Finalize the expired epoch if due, then open the next one
    pub async fn weekly_update(&self) -> Result<EpochRotation, CycleError> {
        async {
            info!("Starting weekly epoch management");
            let rotation = self.epochs.rotate(self.reward_amount).await?;

            self.monitor
                .record_metric("epoch.created", rotation.created as f64, &[("cycle", "weekly")])
                .await;
            info!(
                finalized = ?rotation.finalized,
                created = rotation.created,
                signature = %rotation.signature,
                "Weekly update complete"
            );
            Ok::<_, CycleError>(rotation)
        }
        .instrument(self.span.clone())
        .await
    }
}
