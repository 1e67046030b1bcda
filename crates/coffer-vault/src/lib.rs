// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user encrypted secret store.
//!
//! A process-wide master key derives one master key per user (PBKDF2), which
//! in turn derives a data encryption key per key version. Secrets are sealed
//! with AES-256-GCM bound to their user and record, persisted through
//! `coffer-storage`, and served by [`SecretStore`], which serializes each
//! user's operations and never lets internal failures escape.

pub mod access;
pub mod crypto;
pub mod facade;
pub mod kdf;
pub mod keys;
pub mod master;
pub mod metrics;
pub mod rotation;
pub mod store;
pub mod validation;

pub use facade::{SecretStore, StoreError};
pub use master::{load_master_key, MasterKey};
pub use metrics::register_metrics;
