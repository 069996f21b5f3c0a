//! Read-only views over ledger epoch and contributor state

use chrono::{DateTime, SecondsFormat};
use serde::Serialize;

use crate::ledger::{LedgerError, LedgerGateway, Pubkey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochStats {
    pub epoch_number: u64,
    pub start_time: String,
    pub end_time: String,
    pub total_xp: u64,
    pub reward_amount: u64,
    pub contributor_count: u16,
    pub finalized: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributorStats {
    #[serde(with = "crate::ledger::address::base58")]
    pub wallet: Pubkey,
    pub username: String,
    pub total_xp: u64,
    pub lifetime_reward_earned: u64,
    pub credit_claimable: u64,
    pub credit_claimed: u64,
    pub credit_unclaimed: u64,
}

/// Unix seconds as ISO-8601 UTC with millisecond precision
pub fn iso_timestamp(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| secs.to_string())
}

pub async fn epoch_stats(
    gateway: &dyn LedgerGateway,
    epoch_number: u64,
) -> Result<Option<EpochStats>, LedgerError> {
    Ok(gateway.get_epoch(epoch_number).await?.map(|epoch| EpochStats {
        epoch_number,
        start_time: iso_timestamp(epoch.start_time),
        end_time: iso_timestamp(epoch.end_time),
        total_xp: epoch.total_xp,
        reward_amount: epoch.usdc_reward_amount,
        contributor_count: epoch.contributor_count,
        finalized: epoch.finalized,
    }))
}

/// `None` for wallets that never registered
pub async fn contributor_stats(
    gateway: &dyn LedgerGateway,
    wallet: &Pubkey,
) -> Result<Option<ContributorStats>, LedgerError> {
    Ok(gateway
        .get_contributor(wallet)
        .await?
        .map(|contributor| ContributorStats {
            wallet: *wallet,
            username: contributor.github_username,
            total_xp: contributor.total_xp,
            lifetime_reward_earned: contributor.lifetime_usdc_earned,
            credit_claimable: contributor.total_sbt_claimable,
            credit_claimed: contributor.total_sbt_claimed,
            credit_unclaimed: contributor
                .total_sbt_claimable
                .saturating_sub(contributor.total_sbt_claimed),
        }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_timestamp() {
        assert_eq!(iso_timestamp(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(iso_timestamp(1_700_000_000), "2023-11-14T22:13:20.000Z");
    }
}
