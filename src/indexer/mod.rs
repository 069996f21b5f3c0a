//! Event indexer
//!
//! Follows `XpSyncedEvent`s emitted by the rewards program and keeps them in
//! a local JSON buffer. The buffer records the highest slot processed, and
//! the signatures already handled in that slot, so a restarted indexer
//! resumes where it left off. It is saved periodically, at the end of every
//! backfill and on shutdown.

pub mod store;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use solana_rpc_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_rpc_client_api::config::RpcTransactionConfig;
use solana_sdk::signature::Signature;
use solana_transaction_status_client_types::UiTransactionEncoding;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn, Instrument, Span};

use crate::config::{IndexerConfig, LedgerConfig};
use crate::ledger::{rpc_client, LedgerError, Pubkey, XpSyncedEvent};

pub use store::IndexedData;

/// Claims reach back this far before registration
pub const CLAIM_WINDOW_SECS: i64 = 90 * 24 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("I/O error on {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Failed to serialize index: {0}")]
    Serialize(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// A program transaction as listed by the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    /// Set when the transaction failed on-chain
    pub err: Option<String>,
}

/// Where program transactions come from
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Most recent program signatures, newest first
    async fn signatures(&self, limit: usize) -> Result<Vec<SignatureInfo>, LedgerError>;

    /// Log lines of one transaction, `None` if the node does not have it
    async fn transaction_logs(&self, signature: &str) -> Result<Option<Vec<String>>, LedgerError>;
}

/// [`EventSource`] over Solana JSON-RPC
pub struct RpcEventSource {
    rpc: RpcClient,
    program_id: Pubkey,
}

impl RpcEventSource {
    pub fn new(config: &LedgerConfig, program_id: Pubkey) -> Result<Self, LedgerError> {
        Ok(Self {
            rpc: rpc_client(config)?,
            program_id,
        })
    }
}

#[async_trait]
impl EventSource for RpcEventSource {
    async fn signatures(&self, limit: usize) -> Result<Vec<SignatureInfo>, LedgerError> {
        let config = GetConfirmedSignaturesForAddress2Config {
            limit: Some(limit),
            commitment: Some(self.rpc.commitment()),
            ..Default::default()
        };
        let statuses = self
            .rpc
            .get_signatures_for_address_with_config(&self.program_id, config)
            .await?;

        Ok(statuses
            .into_iter()
            .map(|status| SignatureInfo {
                signature: status.signature,
                slot: status.slot,
                err: status.err.map(|e| format!("{:?}", e)),
            })
            .collect())
    }

    async fn transaction_logs(&self, signature: &str) -> Result<Option<Vec<String>>, LedgerError> {
        let signature = Signature::from_str(signature)
            .map_err(|e| LedgerError::InvalidResponse(format!("signature {}: {}", signature, e)))?;
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Json),
            commitment: Some(self.rpc.commitment()),
            max_supported_transaction_version: Some(0),
        };
        let transaction = self
            .rpc
            .get_transaction_with_config(&signature, config)
            .await?;

        Ok(transaction
            .transaction
            .meta
            .and_then(|meta| Option::<Vec<String>>::from(meta.log_messages)))
    }
}

pub struct Indexer {
    source: Box<dyn EventSource>,
    path: PathBuf,
    data: IndexedData,
    save_every: usize,
    page_limit: usize,
    span: Span,
}

impl Indexer {
    /// Open the buffer at `config.data_file`, resuming any saved state
    pub fn open(source: Box<dyn EventSource>, config: &IndexerConfig, span: Span) -> Self {
        let data = IndexedData::load(&config.data_file);
        info!(
            parent: &span,
            path = %config.data_file.display(),
            events = data.events.len(),
            last_slot = data.last_processed_slot,
            "Indexer initialized"
        );
        Self {
            source,
            path: config.data_file.clone(),
            data,
            save_every: config.save_every.max(1),
            page_limit: config.signature_page_limit.max(1),
            span,
        }
    }

    pub fn data(&self) -> &IndexedData {
        &self.data
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&mut self) -> Result<(), IndexerError> {
        self.data.save(&self.path)
    }

    /// Record one event; every `save_every` events the buffer is flushed
    pub fn handle_event(&mut self, event: XpSyncedEvent, slot: u64) -> Result<(), IndexerError> {
        info!(
            parent: &self.span,
            username = %event.github_username,
            registered = event.is_registered,
            total_xp = event.total_xp,
            credit_earned = event.sbt_earned,
            epoch = event.epoch,
            slot,
            "XP synced"
        );
        self.data.record(event, slot);

        if self.data.events.len() % self.save_every == 0 {
            self.save()?;
            debug!(parent: &self.span, events = self.data.events.len(), "Saved index to disk");
        }
        Ok(())
    }

    /// Replay recent program transactions, oldest first. Transactions below
    /// the recorded slot (or below `start_slot`) are skipped, as are those in
    /// the recorded slot that were already handled. Failing transactions are
    /// logged and skipped. Returns the number of new events.
    pub async fn backfill(&mut self, start_slot: Option<u64>) -> Result<usize, IndexerError> {
        let span = self.span.clone();
        async {
            let signatures = self.source.signatures(self.page_limit).await?;
            debug!(count = signatures.len(), "Fetched program signatures");

            let mut indexed = 0;
            for info in signatures.into_iter().rev() {
                if start_slot.is_some_and(|start| info.slot < start)
                    || info.err.is_some()
                    || self.data.is_processed(&info.signature, info.slot)
                {
                    continue;
                }

                let logs = match self.source.transaction_logs(&info.signature).await {
                    Ok(Some(logs)) => logs,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(signature = %info.signature, error = %e, "Failed to process transaction");
                        continue;
                    }
                };

                for event in XpSyncedEvent::from_logs(&logs) {
                    self.handle_event(event, info.slot)?;
                    indexed += 1;
                }
                self.data.mark_processed(&info.signature, info.slot);
            }

            self.save()?;
            info!(
                new_events = indexed,
                total_events = self.data.events.len(),
                last_slot = self.data.last_processed_slot,
                "Backfill complete"
            );
            Ok::<_, IndexerError>(indexed)
        }
        .instrument(span)
        .await
    }

    /// Poll until Ctrl+C
    pub async fn run(&mut self, poll_interval: Duration) -> Result<(), IndexerError> {
        self.run_until(poll_interval, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Backfill on every tick until `shutdown` resolves, then save. A failed
    /// poll is logged and retried on the next tick.
    pub async fn run_until<F: Future<Output = ()>>(
        &mut self,
        poll_interval: Duration,
        shutdown: F,
    ) -> Result<(), IndexerError> {
        let mut ticker = tokio::time::interval(poll_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(parent: &self.span, poll_secs = poll_interval.as_secs(), "Listening for XP syncs");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(parent: &self.span, "Shutting down indexer");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.backfill(None).await {
                        error!(parent: &self.span, error = %e, "Index poll failed");
                    }
                }
            }
        }

        self.save()
    }

    pub fn events_for_wallet(&self, wallet: &Pubkey) -> Vec<&XpSyncedEvent> {
        self.data
            .events
            .iter()
            .filter(|e| e.wallet == *wallet)
            .collect()
    }

    /// Distinct epochs, ascending, with events no older than the claim
    /// window before `registration_time`
    pub fn unclaimed_epochs(&self, wallet: &Pubkey, registration_time: i64) -> Vec<u64> {
        let cutoff = registration_time - CLAIM_WINDOW_SECS;
        let mut epochs: Vec<u64> = self
            .data
            .events
            .iter()
            .filter(|e| e.wallet == *wallet && e.timestamp >= cutoff)
            .map(|e| e.epoch)
            .collect();
        epochs.sort_unstable();
        epochs.dedup();
        epochs
    }
}
