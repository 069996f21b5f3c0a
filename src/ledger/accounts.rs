//! On-ledger account and event layouts
//!
//! Every account starts with an 8-byte discriminator derived from
//! `sha256("account:<Name>")`; events use the `event:` namespace and
//! instructions the `global:` namespace. Bodies are borsh-encoded.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use super::{address, LedgerError, Pubkey};
use crate::models::XpCategory;

/// First 8 bytes of `sha256("<namespace>:<name>")`
pub fn discriminator(namespace: &str, name: &str) -> [u8; 8] {
    let hash = solana_program::hash::hash(format!("{}:{}", namespace, name).as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash.to_bytes()[..8]);
    out
}

/// A discriminated account type stored by the rewards program
pub trait LedgerAccount: BorshDeserialize + BorshSerialize + Sized {
    const NAME: &'static str;

    /// Decode raw account data, checking the discriminator.
    /// Trailing bytes are allowed; accounts are allocated at their max size.
    fn decode(data: &[u8]) -> Result<Self, LedgerError> {
        if data.len() < 8 {
            return Err(LedgerError::Decode {
                account: Self::NAME,
                reason: format!("{} bytes is shorter than the discriminator", data.len()),
            });
        }
        if data[..8] != discriminator("account", Self::NAME) {
            return Err(LedgerError::Decode {
                account: Self::NAME,
                reason: "discriminator mismatch".to_string(),
            });
        }
        let mut body = &data[8..];
        Self::deserialize(&mut body).map_err(|e| LedgerError::Decode {
            account: Self::NAME,
            reason: e.to_string(),
        })
    }

    /// Encode with discriminator (used by tests and fixtures)
    fn encode(&self) -> Vec<u8> {
        let mut out = discriminator("account", Self::NAME).to_vec();
        // Writing into a Vec cannot fail
        let _ = self.serialize(&mut out);
        out
    }
}

/// Program-wide configuration
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ConfigAccount {
    pub admin: Pubkey,
    pub oracle: Pubkey,
    pub usdc_mint: Pubkey,
    pub sbt_mint: Pubkey,
    pub usdc_vault: Pubkey,
    pub current_epoch: u64,
    pub total_epochs: u64,
    pub xp_to_sbt_ratio: u64,
    pub sbt_total_supply: u64,
    pub sbt_minted: u64,
    pub bump: u8,
}

impl LedgerAccount for ConfigAccount {
    const NAME: &'static str = "Config";
}

/// A reward epoch
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct EpochAccount {
    pub epoch_number: u64,
    pub start_time: i64,
    pub end_time: i64,
    pub total_xp: u64,
    pub usdc_reward_amount: u64,
    pub contributor_count: u16,
    pub finalized: bool,
    pub bump: u8,
}

impl LedgerAccount for EpochAccount {
    const NAME: &'static str = "RewardEpoch";
}

/// Per-wallet contributor state
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ContributorAccount {
    pub wallet: Pubkey,
    pub github_username: String,
    pub total_xp: u64,
    pub total_sbt_claimable: u64,
    pub total_sbt_claimed: u64,
    pub lifetime_usdc_earned: u64,
    pub last_claim_epoch: u64,
    pub registered_at: i64,
    pub bump: u8,
}

impl LedgerAccount for ContributorAccount {
    const NAME: &'static str = "Contributor";
}

/// Per-epoch, per-contributor XP snapshot
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SnapshotAccount {
    pub contributor: Pubkey,
    pub epoch: u64,
    pub xp: u64,
    pub usdc_claimed: bool,
    pub sbt_earned: u64,
    pub bump: u8,
}

impl LedgerAccount for SnapshotAccount {
    const NAME: &'static str = "EpochSnapshot";
}

/// Emitted by the program on every contributor sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[serde(rename_all = "camelCase")]
pub struct XpSyncedEvent {
    #[serde(with = "address::base58")]
    pub wallet: Pubkey,
    pub github_username: String,
    pub epoch: u64,
    pub total_xp: u64,
    pub role_xp: Vec<XpCategory>,
    pub domain_xp: Vec<XpCategory>,
    pub skill_xp: Vec<XpCategory>,
    pub sbt_earned: u64,
    pub timestamp: i64,
    pub is_registered: bool,
}

impl XpSyncedEvent {
    pub const NAME: &'static str = "XpSyncedEvent";

    const LOG_PREFIX: &'static str = "Program data: ";

    /// Decode an event from a base64 `Program data:` payload.
    /// Returns `None` for payloads belonging to other event types.
    pub fn decode(payload: &[u8]) -> Option<Self> {
        if payload.len() < 8 || payload[..8] != discriminator("event", Self::NAME) {
            return None;
        }
        let mut body = &payload[8..];
        <Self as BorshDeserialize>::deserialize(&mut body).ok()
    }

    /// Extract every sync event from a transaction's log lines
    pub fn from_logs(logs: &[String]) -> Vec<Self> {
        use base64::Engine;

        logs.iter()
            .filter_map(|line| line.strip_prefix(Self::LOG_PREFIX))
            .filter_map(|data| base64::engine::general_purpose::STANDARD.decode(data.trim()).ok())
            .filter_map(|payload| Self::decode(&payload))
            .collect()
    }

    /// Encode as a `Program data:` log line (used by tests)
    pub fn to_log_line(&self) -> String {
        use base64::Engine;

        let mut payload = discriminator("event", Self::NAME).to_vec();
        let _ = BorshSerialize::serialize(self, &mut payload);
        format!(
            "{}{}",
            Self::LOG_PREFIX,
            base64::engine::general_purpose::STANDARD.encode(payload)
        )
    }
}
