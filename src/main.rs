//! leaderboard-oracle: syncs leaderboard XP into the rewards program
//!
//! Runs as a daemon (daily XP sync + weekly epoch rotation) or as one-shot
//! commands. Settings come from `oracle.toml`, `.env` and the environment.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, info_span, warn};

use leaderboard_oracle::config::Config;
use leaderboard_oracle::indexer::{Indexer, RpcEventSource};
use leaderboard_oracle::ledger::{LedgerGateway, Pubkey, SolanaGateway};
use leaderboard_oracle::logging;
use leaderboard_oracle::monitoring::Monitor;
use leaderboard_oracle::oracle::{contributor_stats, epoch_stats};
use leaderboard_oracle::runner::Oracle;
use leaderboard_oracle::schedule::Scheduler;

#[derive(Parser)]
#[command(name = "leaderboard-oracle")]
#[command(about = "Syncs contributor leaderboard XP into the on-chain rewards program")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "ORACLE_CONFIG", default_value = "oracle.toml")]
    config: PathBuf,

    /// Solana RPC endpoint
    #[arg(long, env = "RPC_URL")]
    rpc_url: Option<String>,

    /// Rewards program id
    #[arg(long, env = "PROGRAM_ID")]
    program_id: Option<String>,

    /// Oracle keypair, base58 or base64
    #[arg(long, env = "ORACLE_PRIVATE_KEY", hide_env_values = true)]
    oracle_private_key: Option<String>,

    #[arg(long, env = "CLUSTER")]
    cluster: Option<String>,

    #[arg(long, env = "LEADERBOARD_API_URL")]
    leaderboard_api_url: Option<String>,

    #[arg(long, env = "LEADERBOARD_DATA_FILE")]
    leaderboard_data_file: Option<PathBuf>,

    /// Reward pool for newly created epochs, in base units
    #[arg(long, env = "EPOCH_REWARD_AMOUNT")]
    epoch_reward_amount: Option<u64>,

    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    #[arg(long, env = "LOG_FILE")]
    log_file: Option<PathBuf>,

    #[arg(long, env = "ALERT_WEBHOOK_URL")]
    alert_webhook_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daily and weekly schedules (default)
    Run,
    /// Run the daily XP sync once
    Daily,
    /// Run the weekly epoch rotation once
    Weekly,
    /// Follow program events into the local index
    Index,
    /// Index historical program events once
    Backfill {
        /// Ignore transactions below this slot
        #[arg(long)]
        start_slot: Option<u64>,
    },
    /// Show an epoch
    EpochStats { epoch: u64 },
    /// Show a contributor
    Contributor { wallet: String },
}

impl Command {
    fn writes_ledger(&self) -> bool {
        matches!(self, Command::Run | Command::Daily | Command::Weekly)
    }
}

impl Cli {
    /// Flags and environment win over the config file
    fn apply(&self, config: &mut Config) {
        if let Some(v) = &self.rpc_url {
            config.ledger.rpc_url = v.clone();
        }
        if let Some(v) = &self.program_id {
            config.ledger.program_id = v.clone();
        }
        if let Some(v) = &self.oracle_private_key {
            config.ledger.oracle_private_key = Some(v.clone());
        }
        if let Some(v) = &self.cluster {
            config.ledger.cluster = v.clone();
        }
        if let Some(v) = &self.leaderboard_api_url {
            config.leaderboard.api_url = Some(v.clone());
        }
        if let Some(v) = &self.leaderboard_data_file {
            config.leaderboard.data_file = Some(v.clone());
        }
        if let Some(v) = self.epoch_reward_amount {
            config.epoch.reward_amount = v;
        }
        if let Some(v) = &self.log_level {
            config.logging.level = v.clone();
        }
        if let Some(v) = &self.log_file {
            config.logging.file = Some(v.clone());
        }
        if let Some(v) = &self.alert_webhook_url {
            config.monitoring.webhook_url = Some(v.clone());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    cli.apply(&mut config);

    let _log_guard = logging::init(&config.logging.level, config.logging.file.as_deref())?;

    let command = cli.command.unwrap_or(Command::Run);
    config.validate_ledger()?;
    let program_id = config.program_id()?;
    let signer = if command.writes_ledger() {
        Some(config.oracle_key()?)
    } else {
        None
    };

    info!(
        cluster = %config.ledger.cluster,
        rpc = %config.ledger.rpc_url,
        program = %program_id,
        "Leaderboard oracle starting"
    );

    let gateway = SolanaGateway::new(&config.ledger, program_id, signer)?;
    if let Some(oracle) = gateway.oracle() {
        info!(oracle = %oracle, "Oracle signer loaded");
    }
    let gateway: Arc<dyn LedgerGateway> = Arc::new(gateway);

    match command {
        Command::Run => {
            let oracle = build_oracle(&config, gateway)?;
            Scheduler::new(oracle, &config.schedule).run().await;
        }
        Command::Daily => {
            let oracle = build_oracle(&config, gateway)?;
            let result = oracle.daily_update().await?;
            if result.failed > 0 {
                warn!(failed = result.failed, "Some contributors failed to sync");
            }
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Weekly => {
            let oracle = build_oracle(&config, gateway)?;
            let rotation = oracle.weekly_update().await?;
            println!("{}", rotation.signature);
        }
        Command::Index => {
            let mut indexer = open_indexer(&config, program_id)?;
            indexer
                .run(Duration::from_secs(config.indexer.poll_interval_secs))
                .await?;
        }
        Command::Backfill { start_slot } => {
            let mut indexer = open_indexer(&config, program_id)?;
            let indexed = indexer.backfill(start_slot).await?;
            println!("{} new events", indexed);
        }
        Command::EpochStats { epoch } => {
            let stats = epoch_stats(gateway.as_ref(), epoch)
                .await?
                .with_context(|| format!("epoch {} not found", epoch))?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Contributor { wallet } => {
            let wallet: Pubkey = wallet.parse().context("invalid wallet address")?;
            match contributor_stats(gateway.as_ref(), &wallet).await? {
                Some(stats) => println!("{}", serde_json::to_string_pretty(&stats)?),
                None => println!("Contributor {} is not registered", wallet),
            }
        }
    }

    Ok(())
}

fn build_oracle(config: &Config, gateway: Arc<dyn LedgerGateway>) -> anyhow::Result<Oracle> {
    let monitor = Monitor::new(&config.monitoring, info_span!("monitor"));
    Ok(Oracle::from_config(config, gateway, monitor)?)
}

fn open_indexer(config: &Config, program_id: Pubkey) -> anyhow::Result<Indexer> {
    let source = RpcEventSource::new(&config.ledger, program_id)?;
    Ok(Indexer::open(
        Box::new(source),
        &config.indexer,
        info_span!("indexer"),
    ))
}
