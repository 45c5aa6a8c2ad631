mod config;
mod logging;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use platform_info::{PlatformInfo, PlatformInfoError, ProbeStrategy};
use serde::Serialize;

use crate::config::{AppConfig, CliOverrides, OutputFormat};

/// Platform Info - host identity and hardware security feature probe
#[derive(Parser)]
#[command(name = "platform-info")]
#[command(about = "Platform Info - host identity and hardware security feature probe")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format (overrides config)
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Probe the host and print every fact
    Snapshot,
    /// Probe the host and print the hardware feature map
    Features,
    /// Validate configuration, print the selected strategy and exit
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1) defaults -> 2) YAML (if provided) -> 3) env (PLATFORM_INFO__*) -> 4) CLI overrides
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_cli_overrides(&CliOverrides {
        format: cli.format,
        verbose: cli.verbose,
    });

    logging::init_logging(&config.logging);

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Snapshot) {
        Commands::Snapshot => {
            let info = open(&config)?;
            let snapshot = info.snapshot().map_err(probe_failure)?;
            println!("{}", render(&snapshot, config.output.format)?);
            Ok(())
        }
        Commands::Features => {
            let info = open(&config)?;
            let features = info.hardware_features().map_err(probe_failure)?;
            println!("{}", render(&features, config.output.format)?);
            Ok(())
        }
        Commands::Check => check_config(&config),
    }
}

fn check_config(config: &AppConfig) -> Result<()> {
    tracing::info!("Checking configuration...");
    let strategy = ProbeStrategy::select(&config.probe).map_err(probe_failure)?;
    println!("Configuration is valid");
    println!("strategy: {strategy}");
    Ok(())
}

fn open(config: &AppConfig) -> Result<PlatformInfo> {
    let info = PlatformInfo::from_config(&config.probe).map_err(probe_failure)?;
    tracing::info!(os = %config.probe.os, "Probing host");
    Ok(info)
}

/// Attach the stable error code; the fact, if any, is already in the message
fn probe_failure(e: PlatformInfoError) -> anyhow::Error {
    let code = e.code();
    anyhow::Error::new(e).context(format!("host probe failed [{code}]"))
}

fn render<T: Serialize>(value: &T, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(value).context("failed to render JSON"),
        OutputFormat::Yaml => serde_saphyr::to_string(value).context("failed to render YAML"),
    }
}
