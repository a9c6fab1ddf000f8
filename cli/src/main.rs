// onionbot: command-line front end for the bot core
//
// Launches and supervises the bot's Tor daemon and manages its settings.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use onionbot_core::tor::hashed_password;
use onionbot_core::{NoopHandler, OnionBot};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "onionbot")]
#[command(about = "Chat bot runtime over Tor onion services", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the Tor daemon
    Tor {
        #[command(subcommand)]
        action: TorAction,
    },
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum TorAction {
    /// Start Tor and keep it running until interrupted
    Start {
        /// Tor state directory
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },
    /// Print the HashedControlPassword value for a password
    HashPassword { password: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    Set { key: String, value: String },
    Get { key: String },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Tor { action } => match action {
            TorAction::Start { data_dir } => cmd_tor_start(data_dir).await,
            TorAction::HashPassword { password } => cmd_hash_password(&password),
        },
        Commands::Config { action } => cmd_config(action),
    }
}

async fn cmd_tor_start(data_dir: Option<PathBuf>) -> Result<()> {
    let config = config::Config::load()?;
    let mut tor_config = config.tor_config(&config::Config::data_dir()?);
    if let Some(dir) = data_dir {
        tor_config.data_dir = dir;
    }

    if tor_config.manages_daemon() {
        println!("{}", "Starting Tor...".bold());
        println!("  Data directory: {}", tor_config.data_dir.display());
    } else {
        println!("{}", "Connecting to external Tor...".bold());
    }

    let bot = OnionBot::new(tor_config, Arc::new(NoopHandler))?;
    let daemon = bot.prepare_tor().await.context("Failed to start Tor")?;

    let state = daemon.state();
    println!();
    println!("  {} Tor ready", "✓".green());
    println!(
        "  Control: {} ({})",
        state.control_address.bright_cyan(),
        state.control_kind
    );
    println!("  SOCKS:   {}", state.proxy_address.bright_cyan());
    println!();
    println!("Press {} to stop", "Ctrl-C".bright_yellow());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    println!();
    println!("{}", "Shutting down...".bold());
    daemon.shutdown().await.context("Failed to stop Tor")?;
    println!("  {} Stopped", "✓".green());

    Ok(())
}

fn cmd_hash_password(password: &str) -> Result<()> {
    println!("{}", hashed_password(password));
    Ok(())
}

fn cmd_config(action: ConfigAction) -> Result<()> {
    let mut config = config::Config::load()?;

    match action {
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            config.save()?;
            let shown = config.get(&key).unwrap_or_default();
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), shown);
        }

        ConfigAction::Get { key } => {
            if let Some(value) = config.get(&key) {
                println!("{} = {}", key.bright_cyan(), value);
            } else {
                anyhow::bail!("Unknown or unset config key: {}", key);
            }
        }

        ConfigAction::List => {
            println!("{}", "Configuration".bold());
            println!();

            for (key, value) in config.list() {
                println!("  {:<20} {}", key.bright_cyan(), value);
            }
        }
    }

    Ok(())
}
