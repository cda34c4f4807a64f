//! devicetwin - Runs a device twin session against an IoT hub.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use giztoy_devicetwin::{DeviceConfig, Session};
use tracing_subscriber::EnvFilter;

/// Device twin session runner.
///
/// Connects as a device, syncs the `targetTemperature` desired property,
/// answers the `ping` and `getMaxMinReport` methods, and prints a pass/fail
/// report when the session ends.
#[derive(Parser)]
#[command(name = "devicetwin")]
#[command(about = "Device twin and direct-method session runner")]
#[command(version)]
struct Cli {
    /// Device config file (YAML or JSON)
    #[arg(long, short = 'c', global = true, default_value = "device.yaml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and run one session
    Run {
        /// Session length in seconds (overrides the config)
        #[arg(long)]
        duration: Option<u64>,

        /// Telemetry period in seconds, 0 to disable (overrides the config)
        #[arg(long)]
        telemetry: Option<u64>,
    },
    /// Print the topics the session would use, without connecting
    Topics,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let mut config = DeviceConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    match cli.command {
        Commands::Run {
            duration,
            telemetry,
        } => {
            if let Some(secs) = duration {
                config.session.duration_secs = secs;
            }
            if let Some(secs) = telemetry {
                config.session.telemetry_interval_secs = secs;
            }
            run(&config).await
        }
        Commands::Topics => {
            print_topics(&config)?;
            Ok(())
        }
    }
}

async fn run(config: &DeviceConfig) -> Result<()> {
    let session = Session::connect(config)
        .await
        .with_context(|| format!("failed to connect to {}", config.hub_host))?;

    let cancel = session.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, stopping session");
            cancel.cancel();
        }
    });

    let report = session.run().await;
    println!("{}", report);
    if !report.is_success() {
        anyhow::bail!("{} session step(s) failed", report.failed);
    }
    Ok(())
}

fn print_topics(config: &DeviceConfig) -> Result<()> {
    let topics = config.topics()?;
    println!("device:    {}", topics.device_id());
    println!("username:  {}", config.username());
    println!("subscribe:");
    for filter in topics.subscriptions() {
        println!("  {}", filter);
    }
    println!("publish:");
    println!("  {}", topics.twin_get("<rid>"));
    println!("  {}", topics.twin_reported("<rid>"));
    println!("  {}", topics.command_response(giztoy_devicetwin::Status::Ok, "<rid>"));
    println!("  {}", topics.telemetry());
    Ok(())
}
