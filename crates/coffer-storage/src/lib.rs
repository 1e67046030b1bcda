// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Coffer secret store.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and typed operations for key
//! versions, encrypted secret records, and the read audit log. Multi-step
//! writes run inside one transaction on the connection thread.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod retry;

pub use database::Database;
pub use models::*;
pub use retry::{with_retry, RetryPolicy};
