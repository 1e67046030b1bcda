// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Coffer secret store.
//!
//! This crate provides the error type and the domain types used throughout
//! the Coffer workspace: key versions, encrypted secret records, listing
//! metadata and access events.

pub mod error;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::CofferError;
pub use types::{
    AccessEvent, AccessOutcome, KeyStatus, KeyVersion, SecretMetadata, SecretRecord,
};
