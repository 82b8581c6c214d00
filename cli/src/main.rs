// dnsvisor: desktop supervisor for a long-running DNS resolver
//
// Cross-platform (Linux, macOS) command-line front end for dnsvisor-core.
// `run` keeps the resolver process alive and reconnecting across network
// changes; the other commands manage its settings and configuration.

mod config;
mod netwatch;
mod platform;
mod process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dnsvisor_core::{
    BootOutcome, ConfigStore, FileConfigStore, Health, ServiceConfig,
    ServiceController, ServiceDeps, ServiceState, ServiceStatus, SettingsManager,
    BOOT_SETTLE_DELAY,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dnsvisor")]
#[command(about = "Supervise a DNS resolver across sleep and network changes", long_about = None)]
#[command(version)]
struct Cli {
    /// Also write logs to a daily-rotated file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the resolver and keep it running until Ctrl-C
    Run {
        /// Resolver executable (overrides the configured one)
        #[arg(short, long)]
        resolver: Option<PathBuf>,
        /// Directory for resolver config, data and log
        #[arg(short, long)]
        files_dir: Option<PathBuf>,
    },
    /// Apply the auto-start policy (for login/boot hooks)
    Boot,
    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Manage the resolver configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    Set { key: String, value: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default resolver configuration if none exists
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },
    Show,
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_deref())?;

    match cli.command {
        Commands::Run { resolver, files_dir } => cmd_run(resolver, files_dir).await,
        Commands::Boot => cmd_boot(cli.log_dir).await,
        Commands::Settings { action } => cmd_settings(action),
        Commands::Config { action } => cmd_config(action),
    }
}

fn init_tracing(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).context("Failed to create log directory")?;
            let appender = tracing_appender::rolling::daily(dir, "dnsvisor.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

async fn cmd_run(resolver: Option<PathBuf>, files_dir: Option<PathBuf>) -> Result<()> {
    let config_dir = config::Config::config_dir()?;
    let cli_config = config::Config::load_from(&config_dir)?;
    let settings = SettingsManager::new(&config_dir).load();

    let resolver_bin = resolver
        .or_else(|| cli_config.resolver_bin.as_ref().map(PathBuf::from))
        .context("No resolver executable; pass --resolver or `settings set resolver_bin <path>`")?;
    let files_dir = match files_dir {
        Some(dir) => dir,
        None => cli_config.files_dir()?,
    };

    let service_config = ServiceConfig::for_files_dir(&files_dir, settings.dns_listen.clone());
    let deps = ServiceDeps {
        resolver: Arc::new(process::ProcessResolver::new(&resolver_bin)),
        wake_lock: Arc::new(platform::LoggingWakeLock),
        connectivity: Arc::new(netwatch::SysfsConnectivity::new(Duration::from_secs(
            cli_config.netwatch_interval_secs,
        ))),
        config_store: Arc::new(FileConfigStore::new(settings.dns_listen.clone())),
    };

    let (controller, task) =
        ServiceController::spawn(service_config, deps).context("Invalid service configuration")?;

    println!(
        "{} Starting {} (DNS on {})",
        "→".bright_blue(),
        resolver_bin.display(),
        settings.dns_listen.bright_cyan()
    );
    controller.request_start().await?;

    let mut status_rx = controller.subscribe();
    let started = status_rx
        .wait_for(|status| {
            status.state == ServiceState::Running || matches!(status.health, Health::Failed(_))
        })
        .await
        .context("Supervisor exited during start")?
        .clone();

    if let Health::Failed(reason) = &started.health {
        controller.teardown().await;
        let _ = task.await;
        anyhow::bail!("Resolver failed to start: {}", reason);
    }
    println!("{} Resolver running. Press Ctrl-C to stop.", "✓".green());

    let mut ticker = tokio::time::interval(Duration::from_secs(cli_config.status_interval_secs.max(1)));
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("{} Stopping...", "→".bright_blue());
                break;
            }
            _ = ticker.tick() => {
                let status = controller.query_status().await;
                print_status(&status);
                // The controller stops the service when the resolver process exits
                if status.state == ServiceState::Stopped {
                    println!("{} Resolver exited", "✗".red());
                    break;
                }
            }
        }
    }

    controller.teardown().await;
    task.await.context("Supervisor task failed")?;

    let last = controller.latest_status();
    match last.health {
        Health::Failed(reason) => anyhow::bail!("Resolver failed: {}", reason),
        _ => {
            println!("{} Stopped", "✓".green());
            Ok(())
        }
    }
}

fn print_status(status: &ServiceStatus) {
    let uptime = status
        .uptime_secs
        .map(|secs| format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60))
        .unwrap_or_else(|| "-".to_string());

    match &status.stats {
        Some(stats) => println!(
            "{} {}  net={}  up={}  blocks={}  peers={}  queries={}  responses={}",
            "●".green(),
            status.state,
            status.network,
            uptime,
            stats.blocks,
            stats.peers,
            stats.queries,
            stats.responses
        ),
        None => println!("{} {}  net={}", "○".dimmed(), status.state, status.network),
    }
}

async fn cmd_boot(log_dir: Option<PathBuf>) -> Result<()> {
    let config_dir = config::Config::config_dir()?;
    let settings = SettingsManager::new(&config_dir).load();

    let mut extra_args = Vec::new();
    if let Some(dir) = log_dir {
        extra_args.push("--log-dir".to_string());
        extra_args.push(dir.display().to_string());
    }
    let launcher = platform::SelfLauncher::current(extra_args)?;

    match dnsvisor_core::on_boot_completed(&settings, &launcher, BOOT_SETTLE_DELAY).await {
        BootOutcome::Disabled => println!("Auto-start is disabled"),
        BootOutcome::Launched => println!("{} Supervisor launched", "✓".green()),
        BootOutcome::Blocked(reason) => println!("{} Launch blocked: {}", "✗".red(), reason),
        BootOutcome::Failed(reason) => println!("{} Launch failed: {}", "✗".red(), reason),
    }
    Ok(())
}

fn cmd_settings(action: SettingsAction) -> Result<()> {
    let config_dir = config::Config::config_dir()?;

    match action {
        SettingsAction::Show => {
            let settings = SettingsManager::new(&config_dir).load();
            let cli_config = config::Config::load_from(&config_dir)?;

            println!("{}", "Settings".bold());
            println!();
            println!("  {:<24} {}", "auto_start".bright_cyan(), settings.auto_start);
            println!("  {:<24} {}", "dns_listen".bright_cyan(), settings.dns_listen);
            for (key, value) in cli_config.list() {
                println!("  {:<24} {}", key.bright_cyan(), value);
            }
        }

        SettingsAction::Set { key, value } => {
            if config::is_service_setting(&key) {
                config::set_service_setting(&config_dir, &key, &value)?;
            } else {
                let mut cli_config = config::Config::load_from(&config_dir)?;
                cli_config.set(&key, &value)?;
                cli_config.save_to(&config_dir)?;
            }
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction) -> Result<()> {
    let config_dir = config::Config::config_dir()?;
    let settings = SettingsManager::new(&config_dir).load();
    let files_dir = config::Config::load_from(&config_dir)?.files_dir()?;
    let path = ServiceConfig::for_files_dir(&files_dir, settings.dns_listen.clone()).config_path;
    let store = FileConfigStore::new(settings.dns_listen);

    match action {
        ConfigAction::Init { force } => {
            if force {
                store.save_config(&path, &store.default_config())?;
            } else {
                store.ensure_default_config(&path)?;
            }
            println!("{} Resolver config at {}", "✓".green(), path.display());
        }

        ConfigAction::Show => match store.load_config(&path)? {
            Some(text) => print!("{}", text),
            None => println!(
                "{} No resolver config yet; run `dnsvisor config init`",
                "!".yellow()
            ),
        },

        ConfigAction::Path => println!("{}", path.display()),
    }
    Ok(())
}
