//! Oracle configuration
//!
//! Loaded from a TOML file (every field has a default, so partial files are
//! fine), then overridden by CLI flags / environment variables in `main`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use solana_sdk::signature::Keypair;

use crate::ledger::{ParsePubkeyError, Pubkey};
use crate::oracle::RetryPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub leaderboard: LeaderboardConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub epoch: EpochConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub indexer: IndexerConfig,
}

/// Connection to the rewards ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint
    #[serde(default)]
    pub rpc_url: String,

    /// Rewards program address (base58)
    #[serde(default)]
    pub program_id: String,

    /// Oracle keypair, base58 or base64 encoded 64-byte secret
    #[serde(default)]
    pub oracle_private_key: Option<String>,

    /// Cluster label, informational only
    #[serde(default = "default_cluster")]
    pub cluster: String,

    /// processed | confirmed | finalized
    #[serde(default = "default_commitment")]
    pub commitment: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_secs: u64,

    #[serde(default = "default_confirm_poll")]
    pub confirm_poll_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            program_id: String::new(),
            oracle_private_key: None,
            cluster: default_cluster(),
            commitment: default_commitment(),
            request_timeout_secs: default_request_timeout(),
            confirm_timeout_secs: default_confirm_timeout(),
            confirm_poll_ms: default_confirm_poll(),
        }
    }
}

/// Where the leaderboard comes from. The API wins when both are set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardConfig {
    #[serde(default)]
    pub api_url: Option<String>,

    #[serde(default)]
    pub data_file: Option<PathBuf>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            data_file: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Contributors synced concurrently per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between batches in milliseconds
    #[serde(default = "default_batch_delay")]
    pub batch_delay_ms: u64,

    /// Total submission attempts per contributor
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_retry_delay")]
    pub initial_retry_delay_ms: u64,

    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,

    #[serde(default = "default_retry_jitter")]
    pub retry_jitter_ms: u64,

    /// Credit per XP when the ledger config does not carry a ratio
    #[serde(default = "default_xp_ratio")]
    pub xp_to_credit_ratio: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay(),
            max_attempts: default_max_attempts(),
            initial_retry_delay_ms: default_initial_retry_delay(),
            max_retry_delay_ms: default_max_retry_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            retry_jitter_ms: default_retry_jitter(),
            xp_to_credit_ratio: default_xp_ratio(),
        }
    }
}

impl SyncConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.initial_retry_delay_ms),
            max_delay: Duration::from_millis(self.max_retry_delay_ms),
            multiplier: self.backoff_multiplier.max(1),
            jitter: Duration::from_millis(self.retry_jitter_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochConfig {
    /// Reward pool for each new epoch, in base units
    #[serde(default = "default_reward_amount")]
    pub reward_amount: u64,

    /// Wait after a finalize before creating the next epoch
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,

    /// If the open epoch ends within this window, wait for it and finalize
    #[serde(default = "default_finalize_grace")]
    pub finalize_grace_secs: u64,
}

impl Default for EpochConfig {
    fn default() -> Self {
        Self {
            reward_amount: default_reward_amount(),
            settle_delay_secs: default_settle_delay(),
            finalize_grace_secs: default_finalize_grace(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Fetch + sync cadence
    #[serde(default = "default_daily_interval")]
    pub daily_interval_secs: u64,

    /// Epoch finalize + create cadence
    #[serde(default = "default_weekly_interval")]
    pub weekly_interval_secs: u64,

    /// Run both cycles once immediately instead of waiting a full period
    #[serde(default)]
    pub run_on_startup: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_interval_secs: default_daily_interval(),
            weekly_interval_secs: default_weekly_interval(),
            run_on_startup: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also append logs to this file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Error/critical alerts are POSTed here when set
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_max_metrics")]
    pub max_metrics: usize,

    #[serde(default = "default_max_alerts")]
    pub max_alerts: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            max_metrics: default_max_metrics(),
            max_alerts: default_max_alerts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    #[serde(default = "default_indexer_file")]
    pub data_file: PathBuf,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Persist the buffer after this many new events
    #[serde(default = "default_save_every")]
    pub save_every: usize,

    #[serde(default = "default_signature_limit")]
    pub signature_page_limit: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            data_file: default_indexer_file(),
            poll_interval_secs: default_poll_interval(),
            save_every: default_save_every(),
            signature_page_limit: default_signature_limit(),
        }
    }
}

// Defaults
fn default_cluster() -> String { "devnet".to_string() }
fn default_commitment() -> String { "confirmed".to_string() }
fn default_request_timeout() -> u64 { 30 }
fn default_confirm_timeout() -> u64 { 60 }
fn default_confirm_poll() -> u64 { 500 }
fn default_batch_size() -> usize { 20 }
fn default_batch_delay() -> u64 { 100 }
fn default_max_attempts() -> u32 { 3 }
fn default_initial_retry_delay() -> u64 { 1000 }
fn default_max_retry_delay() -> u64 { 10_000 }
fn default_backoff_multiplier() -> u32 { 2 }
fn default_retry_jitter() -> u64 { 200 }
fn default_xp_ratio() -> u64 { 100 }
fn default_reward_amount() -> u64 { 100_000_000_000_000 }
fn default_settle_delay() -> u64 { 5 }
fn default_finalize_grace() -> u64 { 600 }
fn default_daily_interval() -> u64 { 24 * 60 * 60 }
fn default_weekly_interval() -> u64 { 7 * 24 * 60 * 60 }
fn default_log_level() -> String { "info".to_string() }
fn default_max_metrics() -> usize { 1000 }
fn default_max_alerts() -> usize { 100 }
fn default_indexer_file() -> PathBuf { PathBuf::from("data/indexed-events.json") }
fn default_poll_interval() -> u64 { 15 }
fn default_save_every() -> usize { 10 }
fn default_signature_limit() -> usize { 1000 }

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Invalid config file: {0}")]
    Parse(String),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid program id: {0}")]
    ProgramId(String),

    #[error("Invalid oracle private key: {0}")]
    OracleKey(String),
}

impl Config {
    /// Load from `path`, or fall back to defaults if the file does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Settings every ledger-facing command needs
    pub fn program_id(&self) -> Result<Pubkey, ConfigError> {
        if self.ledger.program_id.is_empty() {
            return Err(ConfigError::Missing("ledger.program_id (PROGRAM_ID)"));
        }
        self.ledger
            .program_id
            .parse()
            .map_err(|e: ParsePubkeyError| ConfigError::ProgramId(e.to_string()))
    }

    pub fn validate_ledger(&self) -> Result<(), ConfigError> {
        if self.ledger.rpc_url.is_empty() {
            return Err(ConfigError::Missing("ledger.rpc_url (RPC_URL)"));
        }
        self.program_id().map(|_| ())
    }

    /// The oracle signer; required by commands that write to the ledger
    pub fn oracle_key(&self) -> Result<Keypair, ConfigError> {
        let encoded = self
            .ledger
            .oracle_private_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::Missing("ledger.oracle_private_key (ORACLE_PRIVATE_KEY)"))?;
        parse_oracle_key(encoded)
    }
}

/// Decode a 64-byte ed25519 keypair (secret || public).
/// 88 characters means base64, anything else is treated as base58.
pub fn parse_oracle_key(encoded: &str) -> Result<Keypair, ConfigError> {
    let encoded = encoded.trim();
    let bytes = if encoded.len() == 88 {
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ConfigError::OracleKey(format!("base64: {}", e)))?
    } else {
        bs58::decode(encoded)
            .into_vec()
            .map_err(|e| ConfigError::OracleKey(format!("base58: {}", e)))?
    };

    if bytes.len() != 64 {
        return Err(ConfigError::OracleKey(format!(
            "expected 64 bytes, got {}",
            bytes.len()
        )));
    }

    Keypair::try_from(bytes.as_slice())
        .map_err(|e| ConfigError::OracleKey(format!("public half does not match: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    use solana_sdk::signature::Signer;

    fn keypair_bytes() -> [u8; 64] {
        Keypair::new().to_bytes()
    }

    #[test]
    fn test_parse_oracle_key_base58_and_base64() {
        let bytes = keypair_bytes();

        let b58 = bs58::encode(bytes).into_string();
        let from_b58 = parse_oracle_key(&b58).unwrap();

        let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
        assert_eq!(b64.len(), 88);
        let from_b64 = parse_oracle_key(&b64).unwrap();

        assert_eq!(from_b58.pubkey(), from_b64.pubkey());
        assert_eq!(from_b58.to_bytes(), bytes);
    }

    #[test]
    fn test_parse_oracle_key_rejects_mismatched_public_half() {
        let mut bytes = keypair_bytes();
        bytes[63] ^= 0xff;
        assert!(parse_oracle_key(&bs58::encode(bytes).into_string()).is_err());
    }

    #[test]
    fn test_parse_oracle_key_rejects_short_input() {
        let err = parse_oracle_key(&bs58::encode([1u8; 32]).into_string()).unwrap_err();
        assert!(matches!(err, ConfigError::OracleKey(_)));
    }

    #[test]
    fn test_retry_policy_from_sync_config() {
        let policy = SyncConfig::default().retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
    }
}
