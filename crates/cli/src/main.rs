//! Logon broker CLI
//!
//! Speaks the broker's IPC protocol for diagnostics: it submits the same
//! messages the credential-entry component would and prints the replies.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod client;
mod commands;
mod output;

use commands::{ChangePasswordArgs, LogArgs, LoginArgs};

/// Logon broker diagnostic client
#[derive(Parser)]
#[command(name = "logonbroker")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Broker endpoint name
    #[arg(long, default_value = logonbroker_common::DEFAULT_PIPE_NAME, global = true)]
    pipe: String,

    /// Unix socket path, overrides the path derived from --pipe
    #[arg(long, global = true, conflicts_with = "pipe")]
    socket: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "json", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the broker answers
    Hello,

    /// Submit a login request
    Login(LoginArgs),

    /// Show the primary identity of a session
    UserInfo {
        /// Session id
        session: u32,
    },

    /// Fetch a dynamic label
    Label {
        /// Label name, e.g. MOTD
        name: String,
    },

    /// Change the password of a session's primary identity
    ChangePassword(ChangePasswordArgs),

    /// Send a log line to the broker
    Log(LogArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let mut client = match client::connect(&cli.pipe, cli.socket.as_deref()).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{} {:#}", "Cannot connect to broker:".red(), e);
            std::process::exit(1);
        }
    };

    let format = cli.format;
    let result = match cli.command {
        Commands::Hello => commands::hello(&mut client).await,
        Commands::Login(args) => commands::login(&mut client, args, format).await,
        Commands::UserInfo { session } => commands::user_info(&mut client, session, format).await,
        Commands::Label { name } => commands::label(&mut client, name, format).await,
        Commands::ChangePassword(args) => {
            commands::change_password(&mut client, args, format).await
        }
        Commands::Log(args) => commands::log(&mut client, args).await,
    };

    // the broker expects every conversation to end with a disconnect
    if let Err(e) = client.disconnect().await {
        tracing::debug!("Disconnect failed: {}", e);
    }

    result
}
