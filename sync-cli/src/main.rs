//! # stride-sync
//!
//! Command-line front end for the stride offline-first run sync engine.
//!
//! ## Commands
//!
//! - `login`: Store a session and start syncing
//! - `logout`: Cancel sync, wipe local runs and forget the session
//! - `record`: Save a run (succeeds offline)
//! - `delete`: Delete a run
//! - `list`: Show local runs
//! - `refresh`: Fetch all remote runs
//! - `sync`: Push pending work, then fetch
//! - `status`: Show session, storage and queue state
//! - `worker`: Run the background job executor
//!
//! ## Example
//!
//! ```bash
//! stride-sync login --user u1 --access-token "$TOKEN"
//!
//! # Recorded locally and queued, since the network is down
//! stride-sync --offline record --distance 5000 --duration 1500
//!
//! # Push it once back online
//! stride-sync sync
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use stride_sync_types::Location;

mod commands;
mod config;

use commands::runs::RunInput;
use commands::{runs, session, status, sync};

/// Offline-first run sync.
#[derive(Parser, Debug)]
#[command(name = "stride-sync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for the database, session and config
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (default: <data-dir>/config.toml)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Act as if there were no network: writes are queued, jobs wait
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a session and start syncing
    Login {
        /// Owner id of the signed-in user
        #[arg(long, short)]
        user: String,

        /// Bearer token for the run service
        #[arg(long)]
        access_token: String,

        /// Refresh token
        #[arg(long, default_value = "")]
        refresh_token: String,
    },

    /// Cancel sync, wipe local runs and forget the session
    Logout,

    /// Record a run
    Record {
        /// Distance in meters
        #[arg(long)]
        distance: u32,

        /// Duration in seconds
        #[arg(long)]
        duration: u64,

        /// Start latitude
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        lat: f64,

        /// Start longitude
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        long: f64,

        /// Top speed in km/h
        #[arg(long, default_value = "0")]
        max_speed: f64,

        /// Elevation gain in meters
        #[arg(long, default_value = "0")]
        elevation: u32,

        /// Map snapshot image to upload with the run
        #[arg(long)]
        map_picture: Option<PathBuf>,
    },

    /// Delete a run
    Delete {
        /// Run id
        id: String,
    },

    /// List local runs
    List,

    /// Fetch all remote runs
    Refresh,

    /// Push pending creations and deletions, then fetch
    Sync,

    /// Show sync status
    Status,

    /// Run the background job executor
    Worker {
        /// Run due jobs once and exit
        #[arg(long)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    let settings = config::load_settings(&data_dir, cli.config.as_deref())?;
    let engine = config::open_engine(&data_dir, &settings, cli.offline).await?;

    match cli.command {
        Commands::Login {
            user,
            access_token,
            refresh_token,
        } => {
            session::login(&engine, &user, &access_token, &refresh_token).await?;
        }
        Commands::Logout => {
            session::logout(&engine).await?;
        }
        Commands::Record {
            distance,
            duration,
            lat,
            long,
            max_speed,
            elevation,
            map_picture,
        } => {
            let input = RunInput {
                distance_meters: distance,
                duration: Duration::from_secs(duration),
                location: Location::new(lat, long),
                max_speed_kmh: max_speed,
                total_elevation_meters: elevation,
            };
            runs::record(&engine, input, map_picture.as_deref()).await?;
        }
        Commands::Delete { id } => {
            runs::delete(&engine, &id).await?;
        }
        Commands::List => {
            runs::list(&engine).await?;
        }
        Commands::Refresh => {
            sync::refresh(&engine).await?;
        }
        Commands::Sync => {
            sync::sync(&engine).await?;
        }
        Commands::Status => {
            status::run(&engine, &settings, &data_dir).await?;
        }
        Commands::Worker { once } => {
            sync::worker(&engine, once).await?;
        }
    }

    Ok(())
}

/// Log to stderr, `info` unless overridden by `RUST_LOG`.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Get the default data directory for stride-sync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("app", "stride", "stride-sync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
