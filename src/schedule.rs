//! Timer-driven scheduler for the daily and weekly cycles

use std::future::Future;
use std::time::Duration;

use serde_json::json;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::config::ScheduleConfig;
use crate::monitoring::AlertLevel;
use crate::runner::Oracle;

pub struct Scheduler {
    oracle: Oracle,
    daily_every: Duration,
    weekly_every: Duration,
    run_on_startup: bool,
}

impl Scheduler {
    pub fn new(oracle: Oracle, config: &ScheduleConfig) -> Self {
        Self {
            oracle,
            daily_every: Duration::from_secs(config.daily_interval_secs.max(1)),
            weekly_every: Duration::from_secs(config.weekly_interval_secs.max(1)),
            run_on_startup: config.run_on_startup,
        }
    }

    pub fn oracle(&self) -> &Oracle {
        &self.oracle
    }

    /// Run until Ctrl+C
    pub async fn run(&self) {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run both cycles on their intervals until `shutdown` resolves. A failed
    /// cycle is logged and alerted; the loop keeps going.
    pub async fn run_until<F: Future<Output = ()>>(&self, shutdown: F) {
        let now = Instant::now();
        let first = |period: Duration| if self.run_on_startup { now } else { now + period };

        let mut daily = interval_at(first(self.daily_every), self.daily_every);
        daily.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut weekly = interval_at(first(self.weekly_every), self.weekly_every);
        weekly.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            daily_secs = self.daily_every.as_secs(),
            weekly_secs = self.weekly_every.as_secs(),
            run_on_startup = self.run_on_startup,
            "Scheduler started, press Ctrl+C to stop"
        );

        tokio::pin!(shutdown);
        loop {
            // Weekly first: a due rotation opens the epoch the daily sync writes into
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Received shutdown signal");
                    break;
                }
                _ = weekly.tick() => {
                    if let Err(e) = self.oracle.weekly_update().await {
                        self.oracle
                            .monitor()
                            .alert(AlertLevel::Error, "Weekly update failed", json!({ "error": e.to_string() }))
                            .await;
                    }
                }
                _ = daily.tick() => {
                    if let Err(e) = self.oracle.daily_update().await {
                        self.oracle
                            .monitor()
                            .alert(AlertLevel::Error, "Daily sync failed", json!({ "error": e.to_string() }))
                            .await;
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }
}
