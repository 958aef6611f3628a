//! AgentHive indexer
//!
//! One binary for the three pipeline services:
//! - `run`: chain indexer plus the scheduled scorer and distributor
//! - `score`: participation scoring for one day, or on a daily schedule
//! - `payout`: participation and/or curated payouts, once or scheduled
//!
//! plus operator commands (`set-stake`, `status`, `init-db`).

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use agenthive_indexer::config::{Config, LoggingConfig};
use agenthive_indexer::listener::{RpcLedgerClient, SyncEngine};
use agenthive_indexer::schedule::{last_sunday, previous_day};
use agenthive_indexer::{ParticipationScorer, PayoutDistributor, Storage};

#[derive(Parser)]
#[command(name = "agenthive-indexer")]
#[command(version, about = "AgentHive chain indexer, participation scorer and payout distributor", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "agenthive.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the indexer with the scheduled scorer and distributor
    Run,

    /// Compute participation scores
    Score {
        /// UTC day to score (default: yesterday)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Keep running and score every day at the configured hour
        #[arg(long, conflicts_with = "date")]
        schedule: bool,
    },

    /// Compute payouts
    Payout {
        /// Which payout to run
        #[arg(value_enum, default_value_t = PayoutMode::Both)]
        mode: PayoutMode,

        /// Participation day, or the day whose last Sunday ends the curated week
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Keep running: participation daily, curated on Mondays
        #[arg(long, conflicts_with = "date")]
        schedule: bool,
    },

    /// Record an account's stake and recompute its eligibility
    SetStake {
        /// Account name
        account: String,

        /// Staked token amount
        amount: f64,
    },

    /// Show checkpoint, row counts and the latest payout run
    Status,

    /// Create the database and run migrations
    InitDb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PayoutMode {
    Participation,
    Curated,
    Both,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, ignored) =
        Config::load_with_ignored(&cli.config).context("Failed to load configuration")?;
    init_logging(&config.logging, cli.debug)?;

    info!(version = env!("CARGO_PKG_VERSION"), config = %cli.config, "AgentHive indexer starting");
    for entry in &ignored {
        entry.log();
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_all(config).await?,
        Commands::Score { date, schedule } => score(config, date, schedule).await?,
        Commands::Payout {
            mode,
            date,
            schedule,
        } => payout(config, mode, date, schedule).await?,
        Commands::SetStake { account, amount } => set_stake(config, &account, amount).await?,
        Commands::Status => show_status(config).await?,
        Commands::InitDb => init_database(config).await?,
    }

    Ok(())
}

/// Initialize tracing subscriber for logging
fn init_logging(logging: &LoggingConfig, debug: bool) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = if debug {
        EnvFilter::new("agenthive_indexer=debug,sqlx=warn")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("agenthive_indexer={}", logging.level)))
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_current_span(false))
            .try_init()
            .context("Failed to install log subscriber")?;
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .try_init()
            .context("Failed to install log subscriber")?;
    }

    Ok(())
}

async fn open_storage(config: &Config) -> Result<Storage> {
    let storage = Storage::new(
        &config.database.url,
        Some(config.database.max_connections),
        Some(config.database.min_connections),
    )
    .await
    .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    Ok(storage)
}

/// Flip the shutdown channel on Ctrl+C.
fn spawn_shutdown_listener() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal, finishing current unit of work..."),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
        }
        let _ = tx.send(true);
    });
    rx
}

fn log_task_exit(name: &str, result: std::result::Result<Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => info!(task = name, "Task stopped"),
        Ok(Err(e)) => error!(task = name, error = %format!("{:#}", e), "Task failed"),
        Err(e) => error!(task = name, error = %e, "Task panicked"),
    }
}

/// Indexer, scorer and distributor in one process.
async fn run_all(config: Config) -> Result<()> {
    info!(
        endpoints = ?config.ledger.rpc_urls,
        database = %config.database.url,
        batch_size = config.sync.batch_size,
        dry_run = config.payout.dry_run,
        "Configuration loaded"
    );

    let storage = open_storage(&config).await?;
    let shutdown = spawn_shutdown_listener();

    let client = RpcLedgerClient::new(&config.ledger).context("Failed to create ledger client")?;
    let engine = SyncEngine::new(
        Arc::new(client),
        storage.clone(),
        config.sync.clone(),
        config.policy.clone(),
    );
    let scorer = ParticipationScorer::new(storage.clone(), &config.participation)
        .with_shutdown(shutdown.clone());
    let distributor = PayoutDistributor::new(storage.clone(), config.payout.clone());

    let sync_handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { engine.run(shutdown).await }
    });
    let scorer_handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { scorer.run_scheduled(shutdown).await }
    });
    let payout_handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { distributor.run_scheduled(shutdown).await }
    });

    info!("AgentHive is running. Press Ctrl+C to stop.");

    let (sync_result, scorer_result, payout_result) =
        tokio::join!(sync_handle, scorer_handle, payout_handle);
    log_task_exit("indexer", sync_result);
    log_task_exit("participation", scorer_result);
    log_task_exit("payout", payout_result);

    storage.close().await;
    Ok(())
}

async fn score(config: Config, date: Option<NaiveDate>, schedule: bool) -> Result<()> {
    let storage = open_storage(&config).await?;
    let shutdown = spawn_shutdown_listener();
    let scorer =
        ParticipationScorer::new(storage.clone(), &config.participation).with_shutdown(shutdown.clone());

    let result = if schedule {
        scorer.run_scheduled(shutdown).await
    } else {
        let date = date.unwrap_or_else(|| previous_day(Utc::now()));
        scorer.score_day(date).await.map(|summary| {
            println!(
                "Scored {} of {} eligible agents for {} (failed: {}, total score: {:.3})",
                summary.scored, summary.eligible, summary.date, summary.failed, summary.total_score
            );
        })
    };

    storage.close().await;
    result
}

async fn payout(
    config: Config,
    mode: PayoutMode,
    date: Option<NaiveDate>,
    schedule: bool,
) -> Result<()> {
    let storage = open_storage(&config).await?;
    let distributor = PayoutDistributor::new(storage.clone(), config.payout.clone());

    if distributor.is_dry_run() {
        info!("Dry run: payouts are recorded but no transfers are sent");
    } else {
        warn!("Live mode requested but no transfer backend is configured; transfers will be skipped");
    }

    let result = if schedule {
        distributor.run_scheduled(spawn_shutdown_listener()).await
    } else {
        run_payouts_once(&distributor, mode, date).await
    };

    storage.close().await;
    result
}

async fn run_payouts_once(
    distributor: &PayoutDistributor,
    mode: PayoutMode,
    date: Option<NaiveDate>,
) -> Result<()> {
    let today = Utc::now().date_naive();

    if matches!(mode, PayoutMode::Participation | PayoutMode::Both) {
        let day = date.unwrap_or_else(|| previous_day(Utc::now()));
        let outcome = distributor.run_daily_participation(day).await?;
        println!(
            "Participation run {}: {} recipients, {:.3} of {:.3} paid",
            outcome.run_id, outcome.recipients, outcome.total_paid, outcome.pool_size
        );
    }

    if matches!(mode, PayoutMode::Curated | PayoutMode::Both) {
        let as_of = date.unwrap_or(today);
        let outcome = distributor
            .run_weekly_curated(last_sunday(as_of), as_of)
            .await?;
        println!(
            "Curated run {}: {} recipients, {:.3} of {:.3} paid",
            outcome.run_id, outcome.recipients, outcome.total_paid, outcome.pool_size
        );
    }

    Ok(())
}

async fn set_stake(config: Config, account: &str, amount: f64) -> Result<()> {
    if !amount.is_finite() || amount < 0.0 {
        anyhow::bail!("Stake must be a non-negative number (got {})", amount);
    }

    let storage = open_storage(&config).await?;
    let updated = storage
        .set_account_stake(account, amount, config.participation.stake_min)
        .await;
    storage.close().await;

    match updated? {
        Some(record) => {
            info!(account, staked = record.staked, eligible = record.eligible, "Stake updated");
            println!(
                "{}: staked {} (eligible: {}, items: {}, active days: {})",
                record.name, record.staked, record.eligible, record.items, record.active_days
            );
            Ok(())
        }
        None => anyhow::bail!("Account {} has not been indexed yet", account),
    }
}

/// Show indexer status and payout progress
async fn show_status(config: Config) -> Result<()> {
    let storage = open_storage(&config).await?;

    let chain = storage.get_chain_state().await?;
    let stats = storage.stats().await?;
    let latest_run = storage.latest_payout_run().await?;

    println!("\n=== AgentHive Indexer Status ===\n");
    println!("Sync Progress:");
    println!("  Last Irreversible Block: {}", chain.last_irreversible);
    match chain.last_indexed {
        Some(height) => println!("  Last Indexed Block: {}", height),
        None => println!("  Last Indexed Block: (not started)"),
    }
    println!(
        "  Last Updated: {}",
        chrono::DateTime::from_timestamp(chain.updated_at, 0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string())
    );

    println!("\nDatabase Statistics:");
    println!("  Accounts: {}", stats.account_count);
    println!("  Content Items: {}", stats.content_count);
    println!("  Participation Scores: {}", stats.score_count);
    println!("  Payout Runs: {}", stats.payout_run_count);

    if let Some(run) = latest_run {
        println!("\nLatest Payout Run:");
        println!("  Run ID: {}", run.run_id);
        println!("  Kind: {}", run.kind.as_str());
        println!("  Status: {}", run.status.as_str());
        if let Some(recipients) = run.report.get("recipients") {
            println!("  Recipients: {}", recipients);
        }
        if !run.executed_tx_ids.is_empty() {
            println!("  Transfers: {}", run.executed_tx_ids.len());
        }
    } else {
        println!("\nNo payout runs yet.");
    }

    println!();
    storage.close().await;
    Ok(())
}

/// Initialize the database
async fn init_database(config: Config) -> Result<()> {
    info!(database = %config.database.url, "Initializing database");

    let storage = open_storage(&config).await?;
    storage.health_check().await.context("Database health check failed")?;
    storage.close().await;

    info!("Database initialized successfully");
    Ok(())
}
