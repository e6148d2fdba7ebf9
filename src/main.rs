//! Glucotray CLI
//!
//! - `run` (default): poll in the background and log tray updates and alerts
//! - `login`: enter and verify account credentials, then save them
//! - `history`: print the cached 24h history as a 5-minute series
//! - `config`: print or write a default config file

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use glucotray::config::{generate_default_config, Config, LoggingConfig, MAX_WINDOW_HOURS};
use glucotray::presenter::{self, run_console_presenter};
use glucotray::{
    compute_trend, ChartSeries, Credentials, GlucoseSource, HttpSource, PollingScheduler,
    ReadingStore, WakeHandle,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "glucotray")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Background glucose poller for the system tray")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file (default: <config dir>/glucotray/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll until interrupted (default)
    Run,

    /// Enter account credentials, verify them, and save the config
    Login {
        /// Account email (prompted if omitted)
        #[arg(short, long)]
        username: Option<String>,
        /// Save without contacting the server
        #[arg(long)]
        no_verify: bool,
    },

    /// Show cached readings
    History {
        /// Hours of history to show
        #[arg(short = 'H', long, default_value = "24")]
        hours: i64,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    let config = if config_path.exists() {
        Config::load_with_env(&config_path)?
    } else {
        Config::from_env()
    };

    init_logging(&config.logging)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Login {
            username,
            no_verify,
        } => login(config, &config_path, username, no_verify).await,
        Commands::History { hours } => history(&config, hours),
        Commands::Config { output } => {
            let content = generate_default_config();
            if let Some(path) = output {
                std::fs::write(&path, content)?;
                println!("Config written to {:?}", path);
            } else {
                print!("{}", content);
            }
            Ok(())
        }
    }
}

fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("glucotray={}", config.level)));

    let file_layer = match &config.file {
        Some(path) => {
            let path = Path::new(path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {:?}", path))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    if config.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    Ok(())
}

async fn run(config: Config) -> anyhow::Result<()> {
    config
        .validate()
        .context("configuration incomplete, run `glucotray login` first")?;

    tracing::info!("Glucotray v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Reading cache: {}", config.storage.db_path);

    let store = ReadingStore::open(config.storage.db_path())?;
    let source = HttpSource::new(config.source.to_http_config(), config.account.clone())?;

    let (tx, rx) = presenter::channel();
    let scheduler = PollingScheduler::new(
        Arc::new(source),
        store,
        config.thresholds,
        config.polling.to_settings()?,
        tx,
    );

    let wake = scheduler.wake_handle();
    let presenter_handle = tokio::spawn(run_console_presenter(rx));
    let poll_handle = scheduler.spawn();
    listen_for_wake(wake)?;

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down...");
    poll_handle.abort();
    presenter_handle.abort();

    Ok(())
}

/// SIGUSR1 forces an immediate poll (hook it up to resume/unlock events)
#[cfg(unix)]
fn listen_for_wake(wake: WakeHandle) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut signals = signal(SignalKind::user_defined1())?;
    tokio::spawn(async move {
        while signals.recv().await.is_some() {
            tracing::info!("SIGUSR1 received");
            wake.wake();
        }
    });

    tracing::info!(pid = std::process::id(), "Send SIGUSR1 to poll immediately");
    Ok(())
}

#[cfg(not(unix))]
fn listen_for_wake(_wake: WakeHandle) -> anyhow::Result<()> {
    Ok(())
}

async fn login(
    mut config: Config,
    config_path: &Path,
    username: Option<String>,
    no_verify: bool,
) -> anyhow::Result<()> {
    let username = match username {
        Some(username) => username,
        None => prompt("Email: ")?,
    };
    let password = prompt("Password: ")?;

    let credentials = Credentials::new(username.trim(), password);
    credentials.validate()?;

    if !no_verify {
        let source = HttpSource::new(config.source.to_http_config(), credentials.clone())?;
        source.login().await.context("login rejected")?;

        let account_id = source
            .resolve_account_id()
            .await?
            .context("login succeeded but no account is visible")?;
        println!("Logged in, following account {}", account_id);
    }

    config.account = credentials;
    config.save(config_path)?;
    println!("Credentials saved to {:?}", config_path);

    Ok(())
}

fn prompt(label: &str) -> anyhow::Result<String> {
    print!("{}", label);
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn history_window(hours: i64) -> anyhow::Result<chrono::Duration> {
    if !(1..=MAX_WINDOW_HOURS).contains(&hours) {
        anyhow::bail!("--hours must be between 1 and {}", MAX_WINDOW_HOURS);
    }
    chrono::Duration::try_hours(hours).context("--hours is out of range")
}

fn history(config: &Config, hours: i64) -> anyhow::Result<()> {
    let window = history_window(hours)?;
    let store = ReadingStore::open(config.storage.db_path())?;
    let readings = store.query_range(window)?;

    let Some(series) = ChartSeries::five_minute(&readings) else {
        println!("No data available");
        return Ok(());
    };

    println!("{:<6} {:>6}", "Time", "mmol/L");
    println!("{}", "-".repeat(13));

    for point in &series.points {
        let marker = if point.interpolated { " ~" } else { "" };
        println!(
            "{:<6} {:>6.1}{}",
            point.timestamp.with_timezone(&Local).format("%H:%M"),
            point.value,
            marker
        );
    }

    if let Some(latest) = readings.last() {
        let band = glucotray::classify_band(&config.thresholds, latest.value());
        println!();
        println!(
            "Latest: {} {:.1} mmol/L ({})",
            compute_trend(&readings),
            latest.value(),
            band.color_name()
        );
    }
    println!(
        "{} readings, y axis 2-{} mmol/L",
        readings.len(),
        series.y_max
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_window_bounds() {
        assert_eq!(history_window(24).unwrap(), chrono::Duration::hours(24));
        assert!(history_window(0).is_err());
        assert!(history_window(MAX_WINDOW_HOURS + 1).is_err());
        assert!(history_window(i64::MAX).is_err());
    }
}
