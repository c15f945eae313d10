//! FleetPulse CLI
//!
//! Command-line front end for the refresh engine:
//! - Record today's active device count and print the delta
//! - Inspect the rolling activity history
//! - Establish the deployment cutoff for a new session
//! - Watch the dashboards refresh against a simulated fleet

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use fleetpulse::config::{generate_default_config, Config};
use fleetpulse::dashboard::{
    DeploymentReport, DeploymentsDashboard, DevicesDashboard, RefreshOptions,
};
use fleetpulse::{
    ActivityTracker, CutoffEstablisher, FileStore, FleetActions, FleetStore, KeyValueStore,
    LogNotifier, MemoryStore, Notifier, SimulatedFleet,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "fleetpulse")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Dashboard refresh engine for a device-fleet update console")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.config/fleetpulse/config.toml or ./config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record today's active device count and print the change
    Activity {
        /// Number of currently active devices
        #[arg(long)]
        count: u64,
    },

    /// Show the stored activity history
    History,

    /// Start a session and print the "new since" cutoff
    Cutoff,

    /// Mount the dashboards against a simulated fleet and log what they see
    Watch {
        /// How long to keep polling
        #[arg(long, default_value = "60")]
        duration_secs: u64,
        /// Fail every Nth backend request
        #[arg(long)]
        fail_every: Option<u64>,
        /// Deployment to follow in the report view
        #[arg(long, default_value = "dep-rollout")]
        report: String,
    },

    /// Generate default config file
    InitConfig {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load_default(),
    };
    fleetpulse::logging::init(&config.logging);

    match cli.command {
        Commands::Activity { count } => {
            let tracker = activity_tracker(&config)?;
            let delta = tracker.record_and_diff(count, Utc::now());
            println!("{:+}", delta);
        }

        Commands::History => {
            let tracker = activity_tracker(&config)?;
            let history = tracker.history();
            if history.is_empty() {
                println!("No activity recorded yet");
            }
            for entry in history.entries() {
                println!("{}  {}", entry.date, entry.count);
            }
        }

        Commands::Cutoff => {
            // Each invocation is its own session
            let cutoff = cutoff_establisher(&config, Arc::new(MemoryStore::new()))?
                .establish_cutoff(Utc::now());
            println!("{}", cutoff.to_rfc3339());
        }

        Commands::Watch {
            duration_secs,
            fail_every,
            report,
        } => {
            watch(&config, Duration::from_secs(duration_secs), fail_every, report).await?;
        }

        Commands::InitConfig { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Config written to {}", path.display());
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

fn durable_store(config: &Config) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    let path = config.storage.store_path();
    let store = FileStore::open(&path)
        .with_context(|| format!("opening store at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn activity_tracker(config: &Config) -> anyhow::Result<ActivityTracker> {
    Ok(ActivityTracker::with_options(
        durable_store(config)?,
        config.activity.history_key.clone(),
        config.activity.window_size,
    ))
}

fn cutoff_establisher(
    config: &Config,
    session: Arc<dyn KeyValueStore>,
) -> anyhow::Result<CutoffEstablisher> {
    Ok(CutoffEstablisher::new(durable_store(config)?, session)
        .keys(config.cutoff.key.clone(), config.cutoff.session_key.clone())
        .max_session_age(config.cutoff.session_max_age()))
}

async fn watch(
    config: &Config,
    duration: Duration,
    fail_every: Option<u64>,
    report_id: String,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let fleet = Arc::new(SimulatedFleet::seeded(now).await);
    fleet.set_fail_every(fail_every).await;

    let store = Arc::new(FleetStore::with_device_limit(
        config.devices.deployment_device_limit,
    ));
    let actions = FleetActions::new(fleet.clone(), store);
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let retry_delay = config.polling.retry_delay();

    let cutoff = cutoff_establisher(config, Arc::new(MemoryStore::new()))?;
    let mut deployments = DeploymentsDashboard::new(
        actions.clone(),
        &cutoff,
        notifier.clone(),
        RefreshOptions::new(config.polling.deployments_interval()).retry_delay(retry_delay),
        now,
    );
    let mut devices = DevicesDashboard::new(
        actions.clone(),
        Arc::new(activity_tracker(config)?),
        notifier.clone(),
        RefreshOptions::new(config.polling.devices_interval()).retry_delay(retry_delay),
    );
    let mut report = DeploymentReport::new(
        actions,
        report_id,
        notifier,
        RefreshOptions::new(config.polling.report_interval()).retry_delay(retry_delay),
    );

    deployments.mount()?;
    devices.mount()?;
    report.mount().await?;
    tracing::info!(
        duration_secs = duration.as_secs(),
        cutoff = %deployments.cutoff(),
        "Watching simulated fleet"
    );

    let deadline = tokio::time::Instant::now() + duration;
    let mut ticker = tokio::time::interval(config.polling.report_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => break,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
            _ = ticker.tick() => {
                fleet.advance(Utc::now()).await;
                tracing::info!(summary = ?deployments.summary().await, "Deployments");
                tracing::info!(summary = ?devices.summary().await, "Devices");
                tracing::info!(snapshot = ?report.snapshot().await, "Report");
            }
        }
    }

    report.unmount();
    devices.unmount();
    deployments.unmount();
    tracing::info!(requests = fleet.requests().await, "Stopped");

    Ok(())
}
