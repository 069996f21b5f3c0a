//! Per-contributor XP reconciliation

use std::sync::Arc;

use tracing::{debug, error, info_span, warn, Instrument, Span};

use super::retry::RetryPolicy;
use crate::ledger::{LedgerError, LedgerGateway, TxSignature};
use crate::models::{ContributorRecord, XpBreakdown};

/// Longest username the ledger stores
pub const MAX_USERNAME_LEN: usize = 39;
pub const MAX_ROLE_CATEGORIES: usize = 10;
pub const MAX_DOMAIN_CATEGORIES: usize = 15;
pub const MAX_SKILL_CATEGORIES: usize = 20;

/// Sync errors.
///
/// Only [`SyncError::Rejected`] ever leaves [`SyncOrchestrator::sync_one`];
/// the others are per-attempt failures that feed the retry loop.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    #[error("Record for {username} rejected: {reason}")]
    Rejected { username: String, reason: String },

    #[error("Program config account not found")]
    ConfigNotFound,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// XP and credit movement for one contributor in one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncDelta {
    pub previous_xp: u64,
    pub new_total_xp: u64,
    /// Signed; negative when the leaderboard regressed
    pub xp_delta: i64,
    pub credit_earned: i64,
}

impl SyncDelta {
    /// `previous_xp` is 0 for contributors the ledger does not know yet
    pub fn compute(previous_xp: u64, new_total_xp: u64, ratio: u64) -> Self {
        let xp_delta = (i128::from(new_total_xp) - i128::from(previous_xp))
            .clamp(i128::from(i64::MIN), i128::from(i64::MAX));
        let credit_earned = (xp_delta * i128::from(ratio))
            .clamp(i128::from(i64::MIN), i128::from(i64::MAX));
        Self {
            previous_xp,
            new_total_xp,
            xp_delta: xp_delta as i64,
            credit_earned: credit_earned as i64,
        }
    }

    pub fn is_regression(&self) -> bool {
        self.xp_delta < 0
    }
}

/// Outcome of a confirmed sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReceipt {
    pub signature: TxSignature,
    pub epoch: u64,
    pub delta: SyncDelta,
}

/// Reconciles one contributor record against ledger state
#[derive(Clone)]
pub struct SyncOrchestrator {
    gateway: Arc<dyn LedgerGateway>,
    retry: RetryPolicy,
    fallback_ratio: u64,
    span: Span,
}

impl SyncOrchestrator {
    pub fn new(
        gateway: Arc<dyn LedgerGateway>,
        retry: RetryPolicy,
        fallback_ratio: u64,
        span: Span,
    ) -> Self {
        Self {
            gateway,
            retry,
            fallback_ratio,
            span,
        }
    }

    pub fn gateway(&self) -> &Arc<dyn LedgerGateway> {
        &self.gateway
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Sync one record with bounded retry.
    ///
    /// `Ok(None)` means every attempt failed. `Err` means the record was
    /// rejected before anything was sent.
    pub async fn sync_one(
        &self,
        record: &ContributorRecord,
    ) -> Result<Option<SyncReceipt>, SyncError> {
        let span = info_span!(parent: &self.span, "sync", username = %record.username);
        async {
            check_ledger_limits(record)?;

            let max_attempts = self.retry.max_attempts.max(1);
            for attempt in 1..=max_attempts {
                match self.attempt(record).await {
                    Ok(receipt) => return Ok(Some(receipt)),
                    Err(e) if attempt < max_attempts => {
                        let delay = self.retry.delay_for(attempt);
                        warn!(
                            attempt,
                            retry_in_ms = delay.as_millis() as u64,
                            error = %e,
                            "Sync attempt failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => {
                        error!(attempts = max_attempts, error = %e, "Sync failed after retries");
                    }
                }
            }
            Ok::<_, SyncError>(None)
        }
        .instrument(span)
        .await
    }

    /// One full read-compute-submit pass; nothing is carried between attempts
    async fn attempt(&self, record: &ContributorRecord) -> Result<SyncReceipt, SyncError> {
        let config = self
            .gateway
            .get_config()
            .await?
            .ok_or(SyncError::ConfigNotFound)?;

        let previous_xp = self
            .gateway
            .get_contributor(&record.wallet)
            .await?
            .map(|c| c.total_xp)
            .unwrap_or(0);

        let ratio = if config.xp_to_sbt_ratio > 0 {
            config.xp_to_sbt_ratio
        } else {
            self.fallback_ratio
        };
        let delta = SyncDelta::compute(previous_xp, record.total_xp, ratio);
        if delta.is_regression() {
            warn!(
                previous_xp,
                total_xp = record.total_xp,
                xp_delta = delta.xp_delta,
                "Leaderboard score regressed"
            );
        }

        let signature = self.gateway.submit_sync(record).await?;

        debug!(
            total_xp = record.total_xp,
            xp_delta = delta.xp_delta,
            credit_earned = delta.credit_earned,
            epoch = config.current_epoch,
            %signature,
            "Synced contributor"
        );
        if !record.categories.role.is_empty() {
            debug!(roles = %XpBreakdown::describe(&record.categories.role), "Role breakdown");
        }

        Ok(SyncReceipt {
            signature,
            epoch: config.current_epoch,
            delta,
        })
    }
}

/// Records the ledger would reject deterministically
fn check_ledger_limits(record: &ContributorRecord) -> Result<(), SyncError> {
    let reject = |reason: String| SyncError::Rejected {
        username: record.username.clone(),
        reason,
    };

    if record.username.is_empty() || record.username.len() > MAX_USERNAME_LEN {
        return Err(reject(format!(
            "username must be 1-{} bytes, got {}",
            MAX_USERNAME_LEN,
            record.username.len()
        )));
    }

    let groups = [
        ("role", record.categories.role.len(), MAX_ROLE_CATEGORIES),
        ("domain", record.categories.domain.len(), MAX_DOMAIN_CATEGORIES),
        ("skill", record.categories.skill.len(), MAX_SKILL_CATEGORIES),
    ];
    for (group, count, max) in groups {
        if count > max {
            return Err(reject(format!(
                "{} {} categories exceeds the limit of {}",
                count, group, max
            )));
        }
    }
    Ok(())
}
