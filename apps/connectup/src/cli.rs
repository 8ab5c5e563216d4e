//! # Command line
//!
//! `connectup serve | init | create-admin | status`. Every command except
//! `serve` is synchronous and works directly on the database file.

use crate::api::{self, AppState};
use crate::config::Config;
use crate::providers::{MemoryBlobStore, MemoryMailer};
use clap::{Parser, Subcommand};
use connectup_core::users::{self, NewUser};
use connectup_core::{CoreError, Role, Store, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("database already exists at {0} (use --force to overwrite)")]
    AlreadyExists(PathBuf),

    #[error("database not found at {0} (run `connectup init` first)")]
    Missing(PathBuf),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Parser)]
#[command(name = "connectup", version, about = "ConnectUp API server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP server.
    Serve {
        /// Listen port; overrides CONNECTUP_PORT.
        #[arg(long)]
        port: Option<u16>,
        /// Database file; overrides CONNECTUP_DB.
        #[arg(long)]
        db: Option<PathBuf>,
        /// Keep everything in memory.
        #[arg(long, conflicts_with = "db")]
        memory: bool,
    },
    /// Create an empty database.
    Init {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        force: bool,
    },
    /// Add an admin account.
    CreateAdmin {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "Admin")]
        name: String,
    },
    /// Print record counts per table.
    Status {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

/// Dispatch a parsed command line.
pub async fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Serve { port, db, memory } => {
            let mut config = Config::load();
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(db) = db {
                config.db_path = db;
            }
            cmd_serve(config, memory).await
        }
        Commands::Init { db, force } => cmd_init(&db, force),
        Commands::CreateAdmin {
            db,
            email,
            password,
            name,
        } => cmd_create_admin(&db, &name, &email, &password).map(|_| ()),
        Commands::Status { db, json } => {
            println!("{}", cmd_status(&db, json)?);
            Ok(())
        }
    }
}

pub async fn cmd_serve(config: Config, memory: bool) -> CliResult<()> {
    let state = if memory {
        info!("Using in-memory database, mailer and blob store");
        let store = Store::in_memory()?;
        store.initialize()?;
        let blobs = MemoryBlobStore::new(config.public_url.clone());
        AppState::new(store, config)
            .with_mailer(Arc::new(MemoryMailer::new()))
            .with_blobs(Arc::new(blobs))
    } else {
        info!(path = %config.db_path.display(), "Opening database");
        let store = Store::open(&config.db_path)?;
        store.initialize()?;
        AppState::new(store, config)
    };
    api::serve(state).await?;
    Ok(())
}

/// Create a fresh database file. Refuses to clobber one unless `force`.
pub fn cmd_init(db_path: &Path, force: bool) -> CliResult<()> {
    if db_path.exists() {
        if !force {
            return Err(CliError::AlreadyExists(db_path.to_path_buf()));
        }
        std::fs::remove_file(db_path)?;
    }
    let store = Store::open(db_path)?;
    store.initialize()?;
    info!(path = %db_path.display(), "Database initialized");
    Ok(())
}

/// Returns the new admin's id.
pub fn cmd_create_admin(
    db_path: &Path,
    name: &str,
    email: &str,
    password: &str,
) -> CliResult<u64> {
    let store = open_existing(db_path)?;
    let input = NewUser {
        name: name.to_string(),
        email: email.to_string(),
        password: password.to_string(),
        phone: None,
    };
    let admin = store.write(|tx| users::create_account(tx, input, Role::Admin, Utc::now()))?;
    info!(id = %admin.id, email, "Admin created");
    Ok(admin.id.get())
}

/// Record counts per table, as text or JSON.
pub fn cmd_status(db_path: &Path, json: bool) -> CliResult<String> {
    let store = open_existing(db_path)?;
    let counts = store.table_counts()?;
    if json {
        return Ok(serde_json::to_string_pretty(&counts)?);
    }
    let total: u64 = counts.values().sum();
    let mut out = format!("Database: {}\n", db_path.display());
    for (table, count) in &counts {
        out.push_str(&format!("  {table:<24} {count}\n"));
    }
    out.push_str(&format!("  {:<24} {total}", "total"));
    Ok(out)
}

fn open_existing(db_path: &Path) -> CliResult<Store> {
    if !db_path.exists() {
        return Err(CliError::Missing(db_path.to_path_buf()));
    }
    Ok(Store::open(db_path)?)
}
