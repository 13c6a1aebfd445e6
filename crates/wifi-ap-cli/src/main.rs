#![deny(unsafe_code)]

//! wifi-ap CLI: control client and daemon entry point.

mod output;
mod wizard;

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use wifi_ap_config::AppConfig;
use wifi_ap_core::ipc::IpcClient;

use wizard::{Interfaces, SYS_CLASS_NET, Wizard};

/// wifi-ap: configure and control a Wi-Fi access point.
#[derive(Parser)]
#[command(name = "wifi-ap", version, about, long_about = None)]
struct Cli {
    /// Path to a settings file. Defaults come from the SNAP environment.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the control daemon in the foreground.
    Daemon,

    /// Read or change the access point configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Show access point status.
    Status {
        #[command(subcommand)]
        command: Option<StatusCommand>,
    },

    /// Configure the access point interactively.
    Wizard {
        /// Answer every question from detected interfaces and defaults.
        #[arg(long)]
        auto: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print all configuration items, or the value of one.
    Get {
        key: Option<String>,
    },

    /// Set one or more items given as key=value.
    Set {
        #[arg(required = true, value_name = "KEY=VALUE")]
        items: Vec<String>,
    },
}

#[derive(Subcommand)]
enum StatusCommand {
    /// Restart the access point.
    RestartAp,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).await?;

    // Set up tracing subscriber with verbosity level
    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let client = IpcClient::new(config.socket_path());
    match cli.command {
        Commands::Daemon => cmd_daemon(config).await?,
        Commands::Config { command } => match command {
            ConfigCommand::Get { key } => cmd_config_get(&client, key.as_deref()).await?,
            ConfigCommand::Set { items } => cmd_config_set(&client, &items).await?,
        },
        Commands::Status { command } => match command {
            None => cmd_status(&client).await?,
            Some(StatusCommand::RestartAp) => cmd_restart_ap(&client).await?,
        },
        Commands::Wizard { auto } => cmd_wizard(&client, auto).await?,
    }

    Ok(())
}

async fn cmd_daemon(config: AppConfig) -> Result<()> {
    info!("Starting wifi-ap daemon");
    let daemon = wifi_ap_core::Daemon::new(config);
    daemon.run().await?;
    Ok(())
}

async fn cmd_config_get(client: &IpcClient, key: Option<&str>) -> Result<()> {
    let config = client.configuration().await?;
    match key {
        Some(key) => println!("{}", output::lookup(&config, key)?),
        None => print!("{}", output::format_config(&config)),
    }
    Ok(())
}

async fn cmd_config_set(client: &IpcClient, items: &[String]) -> Result<()> {
    let update = output::parse_pairs(items)?;
    client.set_configuration(&update).await?;
    Ok(())
}

async fn cmd_status(client: &IpcClient) -> Result<()> {
    let status = client.status().await?;
    print!("{}", output::format_status(&status));
    Ok(())
}

async fn cmd_restart_ap(client: &IpcClient) -> Result<()> {
    client.restart_ap().await?;
    Ok(())
}

async fn cmd_wizard(client: &IpcClient, auto: bool) -> Result<()> {
    let interfaces = Interfaces::discover(Path::new(SYS_CLASS_NET));
    let update = if auto {
        wizard::auto_configuration(&interfaces)?
    } else {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        let update = Wizard::new(stdin.lock(), &mut stdout, interfaces).run()?;
        stdout.flush()?;
        update
    };

    client
        .set_configuration(&update)
        .await
        .context("Failed to set configuration")?;
    println!("Configuration applied successfully");
    Ok(())
}

async fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path)
            .await
            .with_context(|| format!("failed to load settings from '{}'", path.display())),
        None => Ok(AppConfig::from_env()?),
    }
}
