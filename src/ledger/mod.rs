//! Ledger gateway
//!
//! The rewards ledger is a remote program; the oracle only reads its accounts
//! and submits instructions through the [`LedgerGateway`] capability.
//! [`SolanaGateway`] implements it over JSON-RPC; tests supply in-memory fakes.

pub mod accounts;
pub mod address;
pub mod solana;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_rpc_client_api::client_error::{Error as ClientError, ErrorKind as ClientErrorKind};
use solana_rpc_client_api::request::RpcError;

use crate::models::ContributorRecord;

pub use accounts::{
    ConfigAccount, ContributorAccount, EpochAccount, LedgerAccount, SnapshotAccount,
    XpSyncedEvent,
};
pub use address::{ParsePubkeyError, ProgramAddresses, Pubkey};
pub use solana::{rpc_client, SolanaGateway};

/// Identifier of a submitted ledger transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxSignature(pub String);

impl fmt::Display for TxSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ledger access errors. "Account not found" is not an error; reads return `None`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to decode {account} account: {reason}")]
    Decode { account: &'static str, reason: String },

    #[error("Failed to encode instruction: {0}")]
    Encode(String),

    #[error("Program config account not found")]
    ConfigNotFound,

    #[error("No valid program address for {0}")]
    AddressDerivation(&'static str),

    #[error("Oracle signing key not configured")]
    MissingSigner,

    #[error("Transaction {signature} failed: {reason}")]
    TransactionFailed { signature: String, reason: String },

    #[error("Transaction {0} was not confirmed in time")]
    ConfirmationTimeout(String),

    #[error("Invalid commitment level: {0}")]
    Commitment(String),
}

impl From<ClientError> for LedgerError {
    fn from(e: ClientError) -> Self {
        match e.kind() {
            ClientErrorKind::RpcError(RpcError::RpcResponseError { code, message, .. }) => {
                LedgerError::Rpc {
                    code: *code,
                    message: message.clone(),
                }
            }
            ClientErrorKind::RpcError(RpcError::ParseError(reason))
            | ClientErrorKind::RpcError(RpcError::ForUser(reason)) => {
                LedgerError::InvalidResponse(reason.clone())
            }
            ClientErrorKind::SerdeJson(err) => LedgerError::InvalidResponse(err.to_string()),
            _ => LedgerError::Network(e.to_string()),
        }
    }
}

/// Read/submit surface of the rewards ledger.
///
/// Every call goes to the ledger; implementations must not cache reads.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn get_config(&self) -> Result<Option<ConfigAccount>, LedgerError>;

    async fn get_epoch(&self, epoch_number: u64) -> Result<Option<EpochAccount>, LedgerError>;

    async fn get_contributor(
        &self,
        wallet: &Pubkey,
    ) -> Result<Option<ContributorAccount>, LedgerError>;

    async fn get_snapshot(
        &self,
        epoch_number: u64,
        wallet: &Pubkey,
    ) -> Result<Option<SnapshotAccount>, LedgerError>;

    /// Write the record's total XP and category breakdown into the current epoch
    async fn submit_sync(&self, record: &ContributorRecord) -> Result<TxSignature, LedgerError>;

    /// Open epoch `current_epoch + 1` with the given reward pool
    async fn submit_create_epoch(&self, reward_amount: u64) -> Result<TxSignature, LedgerError>;

    async fn submit_finalize_epoch(&self, epoch_number: u64)
        -> Result<TxSignature, LedgerError>;
}
