//! Epoch lifecycle: finalize the expired epoch, open the next one

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn, Instrument, Span};

use crate::ledger::{LedgerError, LedgerGateway, TxSignature};

/// Epoch lifecycle errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum EpochError {
    #[error("Program config account not found")]
    ConfigNotFound,

    #[error("Epoch {0} not found on the ledger")]
    EpochNotFound(u64),

    #[error("Epoch {epoch} is still open (ends at {end_time})")]
    EpochStillOpen { epoch: u64, end_time: i64 },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Result of the weekly finalize-then-create routine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochRotation {
    /// Epoch finalized by this rotation, if any
    pub finalized: Option<u64>,
    pub created: u64,
    pub signature: TxSignature,
}

pub struct EpochManager {
    gateway: Arc<dyn LedgerGateway>,
    settle_delay: Duration,
    finalize_grace: Duration,
    span: Span,
}

impl EpochManager {
    pub fn new(
        gateway: Arc<dyn LedgerGateway>,
        settle_delay: Duration,
        finalize_grace: Duration,
        span: Span,
    ) -> Self {
        Self {
            gateway,
            settle_delay,
            finalize_grace,
            span,
        }
    }

    pub async fn check_and_finalize(&self) -> Result<bool, EpochError> {
        self.check_and_finalize_at(chrono::Utc::now().timestamp())
            .await
    }

    /// Finalize the current epoch if it is open and `now` (unix seconds) has
    /// reached its end time. Returns whether a finalize was submitted.
    pub async fn check_and_finalize_at(&self, now: i64) -> Result<bool, EpochError> {
        async {
            let config = self
                .gateway
                .get_config()
                .await?
                .ok_or(EpochError::ConfigNotFound)?;
            let current = config.current_epoch;

            if current == 0 {
                info!("No epochs to finalize");
                return Ok(false);
            }

            let epoch = self
                .gateway
                .get_epoch(current)
                .await?
                .ok_or(EpochError::EpochNotFound(current))?;

            if epoch.finalized {
                info!(epoch = current, "Epoch already finalized");
                return Ok(false);
            }

            if now < epoch.end_time {
                info!(
                    epoch = current,
                    hours_remaining = (epoch.end_time - now) / 3600,
                    "Epoch not yet ended"
                );
                return Ok(false);
            }

            self.finalize_epoch(current).await?;
            Ok::<_, EpochError>(true)
        }
        .instrument(self.span.clone())
        .await
    }

    pub async fn finalize_epoch(&self, epoch_number: u64) -> Result<TxSignature, EpochError> {
        info!(epoch = epoch_number, "Finalizing epoch");
        let signature = self
            .gateway
            .submit_finalize_epoch(epoch_number)
            .await
            .inspect_err(|e| warn!(epoch = epoch_number, error = %e, "Failed to finalize epoch"))?;
        info!(epoch = epoch_number, %signature, "Epoch finalized");
        Ok(signature)
    }

    /// Open epoch `current + 1`. Refused while the current epoch is still
    /// unfinalized on the ledger. Not retried.
    pub async fn create_epoch(&self, reward_amount: u64) -> Result<TxSignature, EpochError> {
        self.create_next_epoch(reward_amount)
            .instrument(self.span.clone())
            .await
            .map(|(_, signature)| signature)
    }

    async fn create_next_epoch(&self, reward_amount: u64) -> Result<(u64, TxSignature), EpochError> {
        let config = self
            .gateway
            .get_config()
            .await?
            .ok_or(EpochError::ConfigNotFound)?;
        let current = config.current_epoch;

        if current > 0 {
            if let Some(epoch) = self.gateway.get_epoch(current).await? {
                if !epoch.finalized {
                    return Err(EpochError::EpochStillOpen {
                        epoch: current,
                        end_time: epoch.end_time,
                    });
                }
            }
        }

        let next = current + 1;
        info!(epoch = next, reward_amount, "Creating epoch");
        let signature = self
            .gateway
            .submit_create_epoch(reward_amount)
            .await
            .inspect_err(|e| warn!(epoch = next, error = %e, "Failed to create epoch"))?;
        info!(epoch = next, %signature, "Epoch created");
        Ok((next, signature))
    }

    /// Weekly routine: finalize if due, let the ledger settle, then always
    /// attempt to open the next epoch.
    pub async fn rotate(&self, reward_amount: u64) -> Result<EpochRotation, EpochError> {
        async {
            self.wait_for_imminent_end().await;

            let finalized = match self.check_and_finalize().await {
                Ok(true) => {
                    let config = self.gateway.get_config().await?;
                    info!(
                        settle_secs = self.settle_delay.as_secs(),
                        "Waiting for finalize to settle"
                    );
                    tokio::time::sleep(self.settle_delay).await;
                    config.map(|c| c.current_epoch)
                }
                Ok(false) => None,
                Err(e) => {
                    warn!(error = %e, "Epoch finalize check failed");
                    None
                }
            };

            let (created, signature) = self.create_next_epoch(reward_amount).await?;
            Ok::<_, EpochError>(EpochRotation {
                finalized,
                created,
                signature,
            })
        }
        .instrument(self.span.clone())
        .await
    }

    /// A weekly tick that fires shortly before the epoch ends waits for it
    /// instead of skipping a whole week.
    async fn wait_for_imminent_end(&self) {
        let Ok(Some(config)) = self.gateway.get_config().await else {
            return;
        };
        if config.current_epoch == 0 {
            return;
        }
        let Ok(Some(epoch)) = self.gateway.get_epoch(config.current_epoch).await else {
            return;
        };
        if epoch.finalized {
            return;
        }

        let remaining = epoch.end_time - chrono::Utc::now().timestamp();
        if remaining > 0 && remaining as u64 <= self.finalize_grace.as_secs() {
            info!(
                epoch = config.current_epoch,
                remaining_secs = remaining,
                "Epoch ends shortly, waiting"
            );
            tokio::time::sleep(Duration::from_secs(remaining as u64 + 1)).await;
        }
    }
}
