// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! symsrv CLI - download debug symbols from an authenticated bucket.
//!
//! # Examples
//!
//! ```bash
//! # Print the URL to visit for an authorization code
//! symsrv auth-url
//!
//! # Exchange the code for credentials
//! symsrv auth 4/0AbCdEf...
//!
//! # Check whether debug info exists for a build
//! symsrv check deadbeef01
//!
//! # Download debug info, retrying transient failures
//! symsrv fetch deadbeef01 --retries 3
//!
//! # Server status as JSON
//! symsrv status --format json --pretty
//! ```

mod commands;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use symsrv_store::{LogLevel, SettingsStore};
use tokio::task::LocalSet;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use commands::{auth, config, fetch, ping, status};

// ============================================================================
// CLI Definition
// ============================================================================

/// symsrv CLI - debug symbol downloads.
#[derive(Parser)]
#[command(name = "symsrv")]
#[command(about = "Authenticated, cache-backed debug symbol downloads")]
#[command(long_about = r#"
symsrv fetches debug info and binaries by build ID from an OAuth-protected
cloud storage bucket and keeps them in a local content-addressed cache.

Getting started:
  symsrv config path             # Where settings and credentials live
  symsrv auth-url                # Visit this URL to get a code
  symsrv auth <code>             # Store credentials
  symsrv fetch <build-id>        # Download into the cache
"#)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (text or json).
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Settings file to use instead of the default location.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Quiet mode (minimal output).
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Print the authorization URL.
    AuthUrl,

    /// Exchange an authorization code for credentials.
    Auth(auth::AuthArgs),

    /// Check whether files are available without downloading them.
    #[command(visible_alias = "c")]
    Check(fetch::CheckArgs),

    /// Download files into the cache.
    #[command(visible_alias = "f")]
    Fetch(fetch::FetchArgs),

    /// Show server state, counters, and the error log.
    #[command(visible_alias = "s")]
    Status,

    /// Probe the storage host with a blocking request.
    Ping,

    /// Manage configuration.
    Config(config::ConfigArgs),
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text with colors.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// CLI exit codes.
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// General error.
    Error = 1,
    /// Credentials missing or rejected.
    AuthRequired = 2,
    /// At least one requested file could not be obtained.
    Incomplete = 3,
}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(verbose: bool, quiet: bool, level: LogLevel) {
    if quiet {
        return;
    }

    let filter = if verbose {
        EnvFilter::new("symsrv=debug,info")
    } else {
        EnvFilter::new(format!("symsrv={level}"))
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let store = match &cli.config {
        Some(path) => SettingsStore::load(path.clone()).await?,
        None => SettingsStore::load_default().await?,
    };
    setup_logging(cli.verbose, cli.quiet, store.get().log_level);

    // Symbol server work is single-threaded and runs on this LocalSet.
    let result = LocalSet::new().run_until(run(&cli, &store)).await;

    match result {
        Ok(code) => {
            if !matches!(code, ExitCode::Success) {
                std::process::exit(code as i32);
            }
            Ok(())
        }
        Err(e) => {
            if !cli.quiet {
                eprintln!("Error: {e:#}");
            }
            let code = if e.downcast_ref::<commands::NotAuthenticated>().is_some() {
                ExitCode::AuthRequired
            } else {
                ExitCode::Error
            };
            std::process::exit(code as i32);
        }
    }
}

async fn run(cli: &Cli, store: &SettingsStore) -> Result<ExitCode> {
    match &cli.command {
        Commands::AuthUrl => auth::run_url(store.get(), cli),
        Commands::Auth(args) => auth::run(args, store.get(), cli).await,
        Commands::Check(args) => fetch::run_check(args, store.get(), cli).await,
        Commands::Fetch(args) => fetch::run(args, store.get(), cli).await,
        Commands::Status => status::run(store.get(), cli).await,
        Commands::Ping => ping::run(store.get(), cli).await,
        Commands::Config(args) => config::run(args, store, cli),
    }
}
