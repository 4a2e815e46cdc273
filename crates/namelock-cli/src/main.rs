//! Namelock CLI - run lock scenarios and manage configuration

use clap::{Parser, Subcommand, ValueEnum};
use namelock_core::config::{Config, KEYS};
use namelock_core::domain::locking::{LockEvent, LockManager, LockRequest, TimeoutCallback};
use namelock_core::{Error, LockError};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "namelock")]
#[command(author, version, about = "Cooperative named locks for async tasks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a lock scenario against a fresh manager and print its events
    Demo {
        scenario: Scenario,
        /// How long the first holder keeps the lock
        #[arg(long, default_value_t = 200)]
        hold_ms: u64,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Scenario {
    /// A second task waits until the first releases
    Contention,
    /// A waiter gives up before the holder releases
    Timeout,
    /// A lock taken for a fixed duration is released by the reaper
    Expiry,
    /// Waiters are served in submission order
    Fifo,
}

impl Scenario {
    fn as_str(self) -> &'static str {
        match self {
            Self::Contention => "contention",
            Self::Timeout => "timeout",
            Self::Expiry => "expiry",
            Self::Fifo => "fifo",
        }
    }
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Show config file path
    Path,
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    init_tracing(&config)?;

    match cli.command {
        Commands::Demo { scenario, hold_ms } => {
            cmd_demo(&config, scenario, hold_ms, cli.format, cli.quiet).await
        }
        Commands::Config { action } => cmd_config(config, action, cli.quiet),
    }
}

fn init_tracing(config: &Config) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.logging.filter)?,
    };

    // stdout carries command output, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn report_error(err: &anyhow::Error) {
    match err.downcast_ref::<Error>() {
        Some(error) => {
            eprintln!("Error [{}]: {}", error.code(), error);
            if let Some(suggestion) = error.suggestion() {
                eprintln!("  Try: {}", suggestion);
            }
        }
        None => match err.downcast_ref::<LockError>() {
            Some(error) => eprintln!("Error [{}]: {}", error.code(), error),
            None => eprintln!("Error: {:#}", err),
        },
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_demo(
    config: &Config,
    scenario: Scenario,
    hold_ms: u64,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    if hold_ms == 0 {
        return Err(Error::InvalidInput("--hold-ms must be greater than zero".to_string()).into());
    }
    let hold = Duration::from_millis(hold_ms);

    let manager = LockManager::new(config.lock_config())?;
    let mut events = manager.subscribe();
    let started = chrono::Utc::now();

    info!(scenario = scenario.as_str(), hold_ms, "Running lock scenario");
    let outcome = match scenario {
        Scenario::Contention => demo_contention(&manager, hold).await?,
        Scenario::Timeout => demo_timeout(&manager, hold).await?,
        Scenario::Expiry => demo_expiry(&manager, hold).await?,
        Scenario::Fifo => demo_fifo(&manager).await?,
    };
    let collected = drain_events(&mut events);
    debug!(events = collected.len(), "Scenario finished");

    match format {
        OutputFormat::Json => {
            let document = serde_json::json!({
                "scenario": scenario.as_str(),
                "outcome": outcome,
                "events": collected,
            });
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        OutputFormat::Text => {
            if !quiet {
                println!("Scenario: {}", scenario.as_str());
                println!();
                for event in &collected {
                    let offset = (event.created_at - started).num_milliseconds();
                    let data = event
                        .data
                        .as_ref()
                        .map(|d| d.to_string())
                        .unwrap_or_default();
                    println!(
                        "  +{:>5}ms  {:<18} {:<10} {}",
                        offset, event.event_type, event.lock_name, data
                    );
                }
                println!();
            }
            println!("Outcome: {}", outcome);
        }
    }
    Ok(())
}

fn drain_events(events: &mut broadcast::Receiver<LockEvent>) -> Vec<LockEvent> {
    let mut collected = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => collected.push(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                debug!(skipped, "Event stream lagged");
            }
            Err(_) => break,
        }
    }
    collected
}

async fn demo_contention(manager: &LockManager, hold: Duration) -> anyhow::Result<String> {
    let first = manager.acquire("resource", None).await?;
    tokio::spawn(async move {
        sleep(hold).await;
        first.release();
    });

    let started = tokio::time::Instant::now();
    let second = manager.acquire("resource", None).await?;
    let waited = started.elapsed();
    second.release();

    Ok(format!(
        "second task acquired after {}ms",
        waited.as_millis()
    ))
}

async fn demo_timeout(manager: &LockManager, hold: Duration) -> anyhow::Result<String> {
    let holder = manager
        .try_lock("resource", None)
        .ok_or_else(|| anyhow::anyhow!("resource is unexpectedly held"))?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let on_timeout: TimeoutCallback = Box::new(move |message| {
        let _ = tx.send(message);
    });
    let pending = manager.lock(
        "resource",
        |_| {},
        Some(hold / 2),
        Some(on_timeout),
    );

    let result = pending.await;
    manager.release(holder);

    match result {
        Err(err) if err.is_timeout() => {
            let message = rx.recv().await.unwrap_or_else(|| err.to_string());
            Ok(format!("waiter timed out: {}", message))
        }
        Err(err) => Err(err.into()),
        Ok(lock_id) => {
            manager.release(lock_id);
            Err(anyhow::anyhow!("waiter acquired a lock that was never released"))
        }
    }
}

async fn demo_expiry(manager: &LockManager, hold: Duration) -> anyhow::Result<String> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let first = manager
        .submit(LockRequest::new("resource").hold(hold).on_expired(move |info| {
            let _ = tx.send(info);
        }))
        .await?;

    let waiter = manager.acquire("resource", None).await?;
    let expired = rx
        .recv()
        .await
        .ok_or_else(|| anyhow::anyhow!("expiration callback never ran"))?;
    waiter.release();

    if expired.id != first {
        return Err(anyhow::anyhow!("a different lock expired than the one taken"));
    }
    Ok(format!(
        "lock {} expired after {}ms and the waiter took over",
        expired.id,
        hold.as_millis()
    ))
}

async fn demo_fifo(manager: &LockManager) -> anyhow::Result<String> {
    let holder = manager
        .try_lock("resource", None)
        .ok_or_else(|| anyhow::anyhow!("resource is unexpectedly held"))?;
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut pending = Vec::new();
    for n in 1..=3 {
        let order = order.clone();
        let releaser = manager.clone();
        pending.push(manager.lock(
            "resource",
            move |lock_id| {
                if let Ok(mut order) = order.lock() {
                    order.push(n);
                }
                releaser.release(lock_id);
            },
            None,
            None,
        ));
    }

    manager.release(holder);
    for request in pending {
        request.await?;
    }

    let order = order
        .lock()
        .map_err(|_| anyhow::anyhow!("order log poisoned"))?
        .iter()
        .map(|n| format!("waiter-{}", n))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!("served in order: {}", order))
}

fn cmd_config(config: Config, action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
        ConfigAction::Get { key } => {
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            // persist file values only, not environment overrides
            let path = Config::config_path()?;
            let mut config = if path.exists() {
                Config::load_from(&path)?
            } else {
                Config::default()
            };
            config.set(&key, &value)?;
            config.validate()?;
            config.save_to(&path)?;
            if !quiet {
                println!("Set {} = {} ({})", key, value, path.display());
            }
        }
        ConfigAction::List => {
            for key in KEYS {
                println!("{} = {}", key, config.get(key)?);
            }
        }
    }
    Ok(())
}
