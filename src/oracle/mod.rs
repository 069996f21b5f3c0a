//! Oracle sync engine
//!
//! - [`SyncOrchestrator`] reconciles one contributor with bounded retry
//! - [`BatchScheduler`] fans syncs out over fixed-size chunks
//! - [`EpochManager`] finalizes expired epochs and opens the next one

pub mod batch;
pub mod epoch;
pub mod retry;
pub mod stats;
pub mod sync;

pub use batch::{BatchResult, BatchScheduler, SyncFailure, SyncOutcome, RETRIES_EXHAUSTED};
pub use epoch::{EpochError, EpochManager, EpochRotation};
pub use retry::RetryPolicy;
pub use stats::{contributor_stats, epoch_stats, ContributorStats, EpochStats};
pub use sync::{SyncDelta, SyncError, SyncOrchestrator, SyncReceipt};
