//! # doarama-cache CLI entry point
//!
//! Parses command-line arguments, resolves the index location and
//! dispatches to subcommand handlers.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use doarama_cache::{ActivityIndex, CacheConfig, SqliteIndex};
use doarama_cli::fingerprint::{run_fingerprint, FingerprintArgs};
use doarama_cli::index::{run_forget, run_list, run_lookup, run_stats, ForgetArgs, LookupArgs};

/// Inspect and maintain the Doarama activity cache.
///
/// The cache maps (track digest, metadata digest) pairs to the activity
/// created for them, so repeated uploads of the same track return the
/// existing activity.
#[derive(Parser, Debug)]
#[command(name = "doarama-cache", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Index database path. Overrides DOARAMA_CACHE_DB.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Emit JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Write logs to stderr as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the fingerprint of a track file and its metadata.
    Fingerprint(FingerprintArgs),

    /// Show the activity cached for a track file, if any.
    Lookup(LookupArgs),

    /// List every index entry.
    List,

    /// Drop index entries for an activity that no longer exists.
    Forget(ForgetArgs),

    /// Show index location, fingerprint scheme and size.
    Stats,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flag when set.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let mut stdout = std::io::stdout().lock();
    let json = cli.json;

    match &cli.command {
        // Fingerprinting needs no index.
        Commands::Fingerprint(args) => run_fingerprint(args, json, &mut stdout).await,
        Commands::Lookup(args) => {
            let index = open_index(cli.db.as_deref()).await?;
            let result = run_lookup(&index, args, json, &mut stdout).await;
            index.close().await;
            result
        }
        Commands::List => {
            let index = open_index(cli.db.as_deref()).await?;
            let result = run_list(&index, json, &mut stdout).await;
            index.close().await;
            result
        }
        Commands::Forget(args) => {
            let index = open_index(cli.db.as_deref()).await?;
            let result = run_forget(&index, args, json, &mut stdout).await;
            index.close().await;
            result
        }
        Commands::Stats => {
            let index = open_index(cli.db.as_deref()).await?;
            let result = run_stats(&index, json, &mut stdout).await;
            index.close().await;
            result
        }
    }
}

/// Open the index named by `--db`, falling back to the environment.
async fn open_index(db: Option<&Path>) -> anyhow::Result<SqliteIndex> {
    let mut config = CacheConfig::from_env()?;
    if let Some(db) = db {
        config.database_path = db.to_path_buf();
    }
    tracing::debug!(path = %config.database_path.display(), "opening activity index");

    SqliteIndex::open_with(&config)
        .await
        .with_context(|| format!("failed to open index: {}", config.database_path.display()))
}
