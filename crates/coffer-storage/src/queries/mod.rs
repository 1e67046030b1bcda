// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for the secret store tables.

pub mod access;
pub mod key_versions;
pub mod secrets;
