//! leaderboard-oracle: keeps an on-chain rewards ledger in step with a
//! published contributor leaderboard.
//!
//! - [`leaderboard`] fetches and normalizes leaderboard snapshots
//! - [`ledger`] reads and writes the rewards program over JSON-RPC
//! - [`oracle`] reconciles contributors and drives the epoch lifecycle
//! - [`runner`] and [`schedule`] run the daily and weekly cycles
//! - [`indexer`] keeps a local buffer of emitted XP events

pub mod config;
pub mod indexer;
pub mod leaderboard;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod monitoring;
pub mod oracle;
pub mod runner;
pub mod schedule;

pub use config::Config;
pub use models::{ContributorRecord, XpBreakdown, XpCategory};
