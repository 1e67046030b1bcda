// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Caller input checks for store operations.

use coffer_config::model::StoreConfig;
use coffer_core::CofferError;

/// Maximum user identifier length in bytes.
pub const MAX_USER_ID_BYTES: usize = 256;

pub fn validate_user_id(user_id: &str) -> Result<(), CofferError> {
    if user_id.is_empty() {
        return Err(CofferError::Validation("user id must not be empty".to_string()));
    }
    if user_id.len() > MAX_USER_ID_BYTES {
        return Err(CofferError::Validation(format!(
            "user id must be at most {MAX_USER_ID_BYTES} bytes"
        )));
    }
    Ok(())
}

/// Names are non-empty, bounded, and drawn from ASCII alphanumerics and `_ - . /`.
pub fn validate_name(name: &str, policy: &StoreConfig) -> Result<(), CofferError> {
    if name.is_empty() {
        return Err(CofferError::Validation("secret name must not be empty".to_string()));
    }
    if name.chars().count() > policy.max_name_len {
        return Err(CofferError::Validation(format!(
            "secret name must be at most {} characters",
            policy.max_name_len
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/')))
    {
        return Err(CofferError::Validation(format!(
            "secret name contains invalid character {bad:?}"
        )));
    }
    Ok(())
}

/// Only the size is checked; the value itself is never echoed.
pub fn validate_value(value: &str, policy: &StoreConfig) -> Result<(), CofferError> {
    if value.len() > policy.max_value_bytes {
        return Err(CofferError::Validation(format!(
            "secret value is {} bytes, limit is {}",
            value.len(),
            policy.max_value_bytes
        )));
    }
    Ok(())
}

pub fn validate_ttl(ttl_secs: Option<u64>) -> Result<(), CofferError> {
    if ttl_secs == Some(0) {
        return Err(CofferError::Validation("ttl must be positive".to_string()));
    }
    Ok(())
}
