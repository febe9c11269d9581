//! tidecache - inspect and maintain the persistent cache tier from a shell.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tidecache_core::cache::policy;
use tidecache_core::config::Config;
use tidecache_core::{CacheStore, FileStore};

/// Set to a directory to also write daily-rolled log files there
const LOG_DIR_ENV: &str = "TIDECACHE_LOG_DIR";

#[derive(Parser, Debug)]
#[command(name = "tidecache")]
#[command(about = "Inspect and maintain the tidecache persistent tier")]
#[command(version)]
struct Args {
    /// Path to config file (default: $XDG_CONFIG_HOME/tidecache/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Cache profile to operate on
    #[arg(short, long)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show entry counts, byte usage and keys
    Stats,
    /// Delete expired entries
    Purge,
    /// Delete every cache entry of the profile
    Clear,
    /// Print a cached payload and its age
    Get { key: String },
    /// Invalidate an exact key or a `category:*` wildcard
    Invalidate { pattern: String },
    /// Print the cache key for a request
    Key {
        category: String,
        action: String,
        /// Request parameters as a JSON object
        params: Option<String>,
    },
    /// Print the TTL, category and sync interval policy for an action
    Policy { action: String },
}

fn init_tracing() -> Result<Option<WorkerGuard>> {
    // RUST_LOG controls the level (e.g., RUST_LOG=tidecache_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var_os(LOG_DIR_ENV) {
        Some(dir) => {
            let dir = PathBuf::from(dir);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "tidecache.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    Ok(guard)
}

fn open_store(config: &Config) -> Result<CacheStore> {
    let dir = config.cache_dir()?.join("entries");
    debug!(dir = %dir.display(), "Opening persistent tier");
    let persistent = FileStore::new(dir)?;
    Ok(CacheStore::new(Arc::new(persistent), config.cache.clone()))
}

fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let _guard = init_tracing()?;

    let mut config = match args.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if args.profile.is_some() {
        config.profile = args.profile;
    }

    match args.command {
        Command::Stats => {
            let stats = open_store(&config)?.stats();
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Purge => {
            let removed = open_store(&config)?.purge_expired();
            info!(removed, "Purged expired entries");
            println!("Removed {} expired entries", removed);
        }
        Command::Clear => {
            open_store(&config)?.clear();
            println!("Cache cleared");
        }
        Command::Get { key } => {
            let store = open_store(&config)?;
            match store.entry(&key) {
                Some(entry) => {
                    println!(
                        "{} (v{}, {})",
                        entry.key,
                        entry.version,
                        entry.age_display(store.now())
                    );
                    println!("{}", serde_json::to_string_pretty(&entry.payload)?);
                }
                None => println!("No live entry for {}", key),
            }
        }
        Command::Invalidate { pattern } => {
            open_store(&config)?.invalidate(&pattern);
            println!("Invalidated {}", pattern);
        }
        Command::Key {
            category,
            action,
            params,
        } => {
            let params: Value = match params {
                Some(raw) => serde_json::from_str(&raw).context("Params must be valid JSON")?,
                None => Value::Null,
            };
            println!("{}", policy::derive_key(&category, &action, &params));
        }
        Command::Policy { action } => {
            let category = policy::category_for(&action);
            println!("action:        {}", action);
            println!("category:      {}", category);
            println!("ttl:           {}m", policy::ttl_for(&action).num_minutes());
            println!(
                "sync interval: {}s",
                policy::sync_interval_for(category).num_seconds()
            );
        }
    }

    Ok(())
}
