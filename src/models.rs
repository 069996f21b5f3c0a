//! Shared contributor types
//!
//! The canonical contributor record produced by the leaderboard normalizer and
//! consumed by the sync engine, plus the XP category types that travel to the
//! ledger unchanged.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::ledger::Pubkey;

/// A named XP amount (e.g. `developer: 8000`)
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct XpCategory {
    pub name: String,
    pub amount: u64,
}

impl XpCategory {
    pub fn new(name: impl Into<String>, amount: u64) -> Self {
        Self {
            name: name.into(),
            amount,
        }
    }
}

/// The three category groupings carried by every record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpBreakdown {
    pub role: Vec<XpCategory>,
    pub domain: Vec<XpCategory>,
    pub skill: Vec<XpCategory>,
}

impl XpBreakdown {
    pub fn is_empty(&self) -> bool {
        self.role.is_empty() && self.domain.is_empty() && self.skill.is_empty()
    }

    /// Render one grouping as `name:amount, name:amount` for logs
    pub fn describe(categories: &[XpCategory]) -> String {
        categories
            .iter()
            .map(|c| format!("{}:{}", c.name, c.amount))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Canonical, alias-resolved contributor record for one sync cycle.
///
/// Only the normalizer builds these; a record always has a non-empty
/// username, a valid ledger address, positive XP, and at least one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorRecord {
    pub username: String,
    #[serde(with = "crate::ledger::address::base58")]
    pub wallet: Pubkey,
    pub total_xp: u64,
    pub categories: XpBreakdown,
}
