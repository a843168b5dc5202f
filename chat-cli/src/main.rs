//! # veil-chat
//!
//! CLI tool for exercising the Veil chat sync engine.
//!
//! ## Commands
//!
//! - `replay`: Feed a recorded event log through the engine and print the mirror
//! - `watch`: Connect to a live backend and log what arrives
//! - `check-config`: Validate a client configuration file
//!
//! ## Example
//!
//! ```bash
//! # Replay a captured socket log against a chat list
//! veil-chat replay --user me --chats chats.json --events events.jsonl --active c1
//!
//! # Watch the live backend
//! RUST_LOG=veil_chat_client=debug veil-chat watch --user me
//!
//! # Check a config file
//! veil-chat check-config ~/.config/veil-chat/client.toml
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{check_config, replay, watch};

/// CLI tool for exercising the Veil chat sync engine.
#[derive(Parser, Debug)]
#[command(name = "veil-chat")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Client configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay an inbound event log and print the resulting mirror
    Replay {
        /// Signed-in user id
        #[arg(long, short)]
        user: String,

        /// JSON array of chats, as returned by the chat list endpoint
        #[arg(long)]
        chats: PathBuf,

        /// Event log, one `{"event", "data"}` frame per line
        #[arg(long)]
        events: PathBuf,

        /// Chat to mark active before replaying
        #[arg(long)]
        active: Option<String>,
    },

    /// Connect to the backend and log inbound events
    Watch {
        /// User id to connect as
        #[arg(long, short)]
        user: String,

        /// Override the backend URL from the config
        #[arg(long)]
        url: Option<String>,
    },

    /// Validate a client configuration file
    CheckConfig {
        /// Path to the TOML file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            user,
            chats,
            events,
            active,
        } => {
            let config = config::resolve(cli.config.as_deref())?;
            replay::run(config, &user, &chats, &events, active.as_deref()).await?;
        }
        Commands::Watch { user, url } => {
            let mut config = config::resolve(cli.config.as_deref())?;
            if let Some(url) = url {
                config = config.with_server_url(&url);
                config.validate()?;
            }
            watch::run(config, &user).await?;
        }
        Commands::CheckConfig { path } => {
            check_config::run(&path)?;
        }
    }

    Ok(())
}
