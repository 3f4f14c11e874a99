//! DocSync CLI
//!
//! Command-line client for DocSync servers.
//!
//! # Commands
//!
//! - `status` - Compare local and remote versions
//! - `pull` - Overwrite a file with the remote document
//! - `push` - Upload a file
//! - `resolve` - Push and settle a version conflict
//! - `run` - Keep a file in sync until interrupted

mod commands;
mod file_adapter;

use clap::{Parser, Subcommand};
use commands::run::RunOptions;
use commands::Connection;
use docsync_engine::{ConflictChoice, SyncApp};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// DocSync command-line client.
#[derive(Parser)]
#[command(name = "docsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server base URL
    #[arg(global = true, long, env = "DOCSYNC_SERVER", default_value = "http://127.0.0.1:8080")]
    server: String,

    /// App (dataset) name
    #[arg(global = true, short, long, env = "DOCSYNC_APP", default_value = "default")]
    app: String,

    /// Directory for device id, sync metadata and lock file
    #[arg(global = true, long, env = "DOCSYNC_STATE_DIR", default_value = ".docsync")]
    state_dir: PathBuf,

    /// Bearer token
    #[arg(global = true, long, env = "DOCSYNC_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare local and remote versions
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Overwrite a file with the remote document
    Pull {
        /// JSON document file
        file: PathBuf,
    },

    /// Upload a file
    Push {
        /// JSON document file
        file: PathBuf,
    },

    /// Push a file and settle a version conflict
    Resolve {
        /// JSON document file
        file: PathBuf,

        /// Which copy wins (local, remote)
        #[arg(short, long)]
        keep: ConflictChoice,
    },

    /// Keep a file in sync until interrupted
    Run {
        /// JSON document file
        file: PathBuf,

        /// Seconds of quiet before pushing local edits
        #[arg(long, default_value = "30")]
        debounce: u64,

        /// Seconds between remote checks
        #[arg(long, default_value = "60")]
        poll: u64,

        /// Seconds between file change checks
        #[arg(long, default_value = "1")]
        watch: u64,
    },
}

impl Cli {
    fn connection(&self) -> Result<Connection, Box<dyn std::error::Error>> {
        Ok(Connection {
            server: self.server.clone(),
            app: SyncApp::new(self.app.as_str())?,
            state_dir: self.state_dir.clone(),
            token: self.token.clone().filter(|t| !t.is_empty()),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let connection = cli.connection()?;
    match cli.command {
        Commands::Status { format } => commands::status::run(&connection, &format).await?,
        Commands::Pull { file } => commands::sync::pull(&connection, &file).await?,
        Commands::Push { file } => commands::sync::push(&connection, &file).await?,
        Commands::Resolve { file, keep } => commands::sync::resolve(&connection, &file, keep).await?,
        Commands::Run {
            file,
            debounce,
            poll,
            watch,
        } => {
            let options = RunOptions {
                debounce: Duration::from_secs(debounce),
                poll_interval: Duration::from_secs(poll.max(1)),
                watch_interval: Duration::from_secs(watch.max(1)),
            };
            commands::run::run(&connection, &file, options).await?;
        }
    }

    Ok(())
}
