// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subcommand dispatch for the `coffer` binary.
//!
//! Every command maps onto one [`SecretStore`] operation. Results go to the
//! given writer, diagnostics to stderr. The returned flag is `false` when the
//! store reported a miss (absent secret, unknown version, internal failure).

use std::io::{IsTerminal, Read, Write};

use coffer_core::KeyStatus;
use coffer_vault::{SecretStore, StoreError};
use colored::Colorize;
use secrecy::ExposeSecret;
use zeroize::Zeroizing;

use crate::Commands;

/// Errors surfaced by the CLI layer.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("--user is required for `{0}`")]
    MissingUser(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to read secret value: {0}")]
    Input(#[source] std::io::Error),

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl Commands {
    fn label(&self) -> &'static str {
        match self {
            Commands::Set { .. } => "set",
            Commands::Get { .. } => "get",
            Commands::Update { .. } => "update",
            Commands::Delete { .. } => "delete",
            Commands::Restore { .. } => "restore",
            Commands::List { .. } => "list",
            Commands::Rotate => "rotate",
            Commands::Versions => "versions",
            Commands::Retire { .. } => "retire",
            Commands::History { .. } => "history",
            Commands::Purge => "purge",
        }
    }
}

/// Run one command against the store.
pub async fn execute<W: Write>(
    store: &SecretStore,
    user: Option<&str>,
    command: Commands,
    out: &mut W,
) -> Result<bool, CliError> {
    let label = command.label();
    let user = || user.ok_or(CliError::MissingUser(label));

    match command {
        Commands::Set { name, value, ttl } => {
            let user = user()?;
            let value = resolve_value(value)?;
            match store.create_secret(user, &name, &value, ttl).await? {
                Some(id) => {
                    writeln!(out, "{id}")?;
                    Ok(true)
                }
                None => miss(format!("could not store {name}")),
            }
        }
        Commands::Get { name } => match store.get_secret(user()?, &name).await? {
            Some(value) => {
                writeln!(out, "{}", value.expose_secret())?;
                Ok(true)
            }
            None => miss(format!("no secret named {name}")),
        },
        Commands::Update { name, value } => {
            let user = user()?;
            let value = resolve_value(value)?;
            if store.update_secret(user, &name, &value).await? {
                Ok(true)
            } else {
                miss(format!("no secret named {name}"))
            }
        }
        Commands::Delete { name } => {
            let user = user()?;
            if store.delete_secret(user, &name).await? {
                Ok(true)
            } else {
                miss(format!("no secret named {name}"))
            }
        }
        Commands::Restore { name } => {
            let user = user()?;
            if store.restore_secret(user, &name).await? {
                Ok(true)
            } else {
                miss(format!("nothing to restore for {name}"))
            }
        }
        Commands::List { all } => {
            let user = user()?;
            let entries = if all {
                store.list_secrets_with_deleted(user).await?
            } else {
                store.list_secrets(user).await?
            };
            for entry in &entries {
                let mut line = format!(
                    "{:<32} updated {}  reads {}",
                    entry.name, entry.updated_at, entry.access_count
                );
                if let Some(expires) = &entry.expires_at {
                    line.push_str(&format!("  expires {expires}"));
                }
                if entry.deleted_at.is_some() {
                    writeln!(out, "{} {}", line.dimmed(), "(deleted)".yellow())?;
                } else {
                    writeln!(out, "{line}")?;
                }
            }
            Ok(true)
        }
        Commands::Rotate => {
            let user = user()?;
            if !store.rotate_key(user).await? {
                return miss("rotation failed; no changes were made".to_string());
            }
            let versions = store.list_key_versions(user).await?;
            if let Some(active) = versions.iter().find(|v| v.status == KeyStatus::Active) {
                writeln!(out, "{}", active.id)?;
            }
            Ok(true)
        }
        Commands::Versions => {
            let user = user()?;
            for version in store.list_key_versions(user).await? {
                let status = match version.status {
                    KeyStatus::Active => version.status.to_string().green(),
                    KeyStatus::Retired => version.status.to_string().dimmed(),
                };
                writeln!(
                    out,
                    "{}  {:<7}  created {}",
                    version.id, status, version.created_at
                )?;
            }
            Ok(true)
        }
        Commands::Retire { version } => {
            let user = user()?;
            if store.retire_key_version(user, &version).await? {
                Ok(true)
            } else {
                miss(format!("no key version {version}"))
            }
        }
        Commands::History { name, limit } => {
            let user = user()?;
            for event in store.access_history(user, &name, limit).await? {
                writeln!(out, "{}  {}", event.timestamp, event.outcome)?;
            }
            Ok(true)
        }
        Commands::Purge => {
            let removed = store.purge_expired().await;
            writeln!(out, "purged {removed}")?;
            Ok(true)
        }
    }
}

fn miss(message: String) -> Result<bool, CliError> {
    eprintln!("coffer: {message}");
    Ok(false)
}

/// Use `--value` when given, else prompt on a terminal, else read stdin.
fn resolve_value(value: Option<String>) -> Result<Zeroizing<String>, CliError> {
    if let Some(value) = value {
        return Ok(Zeroizing::new(value));
    }
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return rpassword::prompt_password("Value: ")
            .map(Zeroizing::new)
            .map_err(CliError::Input);
    }
    let mut buf = Zeroizing::new(String::new());
    stdin.lock().read_to_string(&mut buf).map_err(CliError::Input)?;
    Ok(Zeroizing::new(strip_line_ending(&buf).to_string()))
}

/// Drop a single trailing newline so `echo value | coffer set` stores `value`.
fn strip_line_ending(input: &str) -> &str {
    input
        .strip_suffix("\r\n")
        .or_else(|| input.strip_suffix('\n'))
        .unwrap_or(input)
}
