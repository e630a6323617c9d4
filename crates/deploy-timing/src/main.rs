//! Deploy timing CLI - replay recorded deployments and watch lock countdowns.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use deploy_timing::error::parse_timestamp;
use deploy_timing::{
    CacheInvalidator, EnvironmentLock, LockDeadline, QueryKey, Scenario, TimingConfig,
    TimingError, Tracker,
};

/// Deploy timing CLI - deployment progress estimates and lock countdowns.
#[derive(Parser)]
#[command(name = "deploy-timing")]
#[command(about = "Deployment progress estimates and environment lock countdowns")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// TOML config file (environment variables still override it)
    #[arg(long, global = true, env = "DEPLOY_TIMING_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay a recorded scenario and print the progress view over time
    Replay {
        /// Scenario JSON file
        scenario: PathBuf,

        /// Sample interval in seconds
        #[arg(long, default_value = "10")]
        every: i64,

        /// Last offset to sample (defaults to the last snapshot)
        #[arg(long)]
        until: Option<i64>,

        /// Emit frames as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Run a live lock countdown against the system clock
    Countdown {
        /// Lock deadline (RFC 3339); omit for a lock that never expires
        #[arg(long)]
        expires_at: Option<String>,

        /// Number of ticks to print before exiting
        #[arg(long, default_value = "5")]
        ticks: usize,
    },

    /// Print the effective configuration
    ShowConfig,
}

/// Invalidator that only reports what would be refetched.
struct LoggingInvalidator;

#[async_trait]
impl CacheInvalidator for LoggingInvalidator {
    async fn invalidate(&self, keys: &[QueryKey]) -> std::result::Result<(), TimingError> {
        for key in keys {
            tracing::info!(key = %key, "Invalidated query");
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("deploy_timing=debug,info")
    } else {
        EnvFilter::new("deploy_timing=info,warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Replay {
            scenario,
            every,
            until,
            json,
        } => run_replay(&config, &scenario, every, until, json),
        Commands::Countdown { expires_at, ticks } => {
            let expires_at = expires_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()
                .context("Invalid --expires-at")?;
            run_countdown(config, expires_at, ticks).await
        }
        Commands::ShowConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<TimingConfig> {
    let config = match path {
        Some(path) => {
            let mut config = TimingConfig::from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            config.apply_env()?;
            config
        }
        None => TimingConfig::from_env()?,
    };
    tracing::debug!(?config, "Effective configuration");
    Ok(config)
}

fn run_replay(
    config: &TimingConfig,
    path: &Path,
    every: i64,
    until: Option<i64>,
    json: bool,
) -> Result<()> {
    let scenario = Scenario::from_file(path)
        .with_context(|| format!("Failed to load scenario {}", path.display()))?;
    let Some(id) = scenario.deployment_id() else {
        anyhow::bail!("Scenario {} has no snapshot with a deployment id", path.display());
    };

    let steps = scenario.step_definitions(&config.step_definitions());
    let until = until.unwrap_or_else(|| scenario.last_offset());
    tracing::info!(deployment_id = %id, until, every, "Replaying scenario");

    for frame in scenario.replay(&steps, until, every)? {
        if json {
            println!("{}", serde_json::to_string(&frame)?);
            continue;
        }

        let steps: Vec<String> = frame
            .progress
            .steps
            .iter()
            .map(|s| {
                format!(
                    "{} {:?} {:>3.0}% {}",
                    s.name,
                    s.status,
                    s.progress_fraction * 100.0,
                    s.remaining_time_label
                )
            })
            .collect();
        println!(
            "t+{:>5}s  [{}]  total {}  elapsed {}  {:?}",
            frame.at_secs,
            steps.join(" | "),
            frame.progress.total_remaining_label,
            frame.progress.duration_label,
            frame.progress.classification,
        );
    }

    Ok(())
}

async fn run_countdown(
    config: TimingConfig,
    expires_at: Option<DateTime<Utc>>,
    ticks: usize,
) -> Result<()> {
    let tracker = Tracker::with_system_clock(config);
    let clock = tracker.start_clock();
    let lock = EnvironmentLock {
        lock_will_expire_at: expires_at,
        ..EnvironmentLock::default()
    };

    let view = tracker.mount_lock(&clock, &lock, LockDeadline::Lock, Arc::new(LoggingInvalidator));
    let mut countdowns = view.subscribe();

    for _ in 0..ticks {
        let countdown = countdowns.borrow_and_update().clone();
        match countdown.tier {
            Some(tier) => println!("{}  (expires in {tier})", countdown.label),
            None if countdown.expired => println!("{}  (expired)", countdown.label),
            None => println!("{}", countdown.label),
        }
        if countdowns.changed().await.is_err() {
            break;
        }
    }

    view.unmount();
    clock.stop();
    Ok(())
}
