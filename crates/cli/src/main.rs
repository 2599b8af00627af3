//! Spendwise CLI, the main entry point.
//!
//! Commands:
//! - `init`   Write a default config file
//! - `serve`  Start the HTTP API
//! - `ask`    Send one message to the assistant as a configured user
//! - `doctor` Check config, database and provider reachability

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "spendwise",
    about = "Spendwise: expense tracking with an LLM assistant",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.spendwise/config.toml)
    #[arg(short, long, global = true, env = "SPENDWISE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Start the HTTP API server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ask the assistant a single question
    Ask {
        /// User id to act as
        #[arg(short, long)]
        user: i64,

        /// Named thread, scoped under the user
        #[arg(short, long)]
        thread: Option<String>,

        /// The message to send
        message: String,
    },

    /// Diagnose configuration, database and provider
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Init { force } => commands::init::run(config_path, force)?,
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Ask {
            user,
            thread,
            message,
        } => commands::ask::run(config_path, user, thread.as_deref(), &message).await?,
        Commands::Doctor => commands::doctor::run(config_path).await?,
    }

    Ok(())
}
