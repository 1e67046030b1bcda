// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Coffer - a per-user encrypted secret store.
//!
//! This is the command-line entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use coffer_vault::{load_master_key, register_metrics, SecretStore};
use tracing::error;

/// Coffer - a per-user encrypted secret store.
#[derive(Parser, Debug)]
#[command(name = "coffer", version, about, long_about = None)]
struct Cli {
    /// User whose secrets are addressed.
    #[arg(long, short, global = true)]
    user: Option<String>,

    /// Explicit config file (skips the standard lookup).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Store a new secret. The value is read from stdin unless --value is given.
    Set {
        name: String,
        #[arg(long)]
        value: Option<String>,
        /// Expire the secret after this many seconds.
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Print a secret's value.
    Get { name: String },
    /// Replace a secret's value.
    Update {
        name: String,
        #[arg(long)]
        value: Option<String>,
    },
    /// Soft-delete a secret.
    Delete { name: String },
    /// Undo a soft delete within the grace window.
    Restore { name: String },
    /// List secret metadata.
    List {
        /// Include soft-deleted secrets.
        #[arg(long)]
        all: bool,
    },
    /// Rotate the user's data key and re-encrypt every secret.
    Rotate,
    /// List the user's key versions.
    Versions,
    /// Retire an unreferenced key version.
    Retire { version: String },
    /// Show recent reads of a secret.
    History {
        name: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Permanently remove expired secrets and deletions past the grace window.
    Purge,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match cli.config {
        Some(ref path) => coffer_config::load_and_validate_path(path),
        None => coffer_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            coffer_config::render_errors(&errors);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.general.log_level);
    register_metrics();

    let master = match load_master_key(&config.keys) {
        Ok(master) => master,
        Err(e) => {
            eprintln!("coffer: {e}");
            return ExitCode::FAILURE;
        }
    };

    let store = match SecretStore::open(&config, master).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "failed to open secret store");
            eprintln!("coffer: failed to open {}: {e}", config.storage.database_path);
            return ExitCode::FAILURE;
        }
    };

    let mut stdout = std::io::stdout().lock();
    match commands::execute(&store, cli.user.as_deref(), cli.command, &mut stdout).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("coffer: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the tracing subscriber with the given log level.
///
/// Logs go to stderr so secret values printed on stdout stay pipeable.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("coffer={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
