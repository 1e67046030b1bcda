// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key derivation primitives.
//!
//! PBKDF2-HMAC-SHA256 derives user master keys and data encryption keys;
//! Argon2id derives the master key from an operator passphrase.

use std::num::NonZeroU32;

use coffer_core::CofferError;
use ring::pbkdf2;
use zeroize::Zeroizing;

const UMK_SALT_PREFIX: &[u8] = b"coffer/umk/v1:";
const DEK_SALT_PREFIX: &[u8] = b"coffer/dek/v1:";

/// Salt for a user's master key.
pub fn umk_salt(user_id: &str) -> Vec<u8> {
    [UMK_SALT_PREFIX, user_id.as_bytes()].concat()
}

/// Salt for the data encryption key of a key version.
pub fn dek_salt(version_id: &str) -> Vec<u8> {
    [DEK_SALT_PREFIX, version_id.as_bytes()].concat()
}

/// Derive 32 bytes with PBKDF2-HMAC-SHA256.
pub fn pbkdf2_sha256(
    secret: &[u8],
    salt: &[u8],
    iterations: u32,
) -> Result<Zeroizing<[u8; 32]>, CofferError> {
    let iterations = NonZeroU32::new(iterations).ok_or_else(|| {
        CofferError::KeyDerivation("PBKDF2 iteration count must be positive".to_string())
    })?;
    let mut output = Zeroizing::new([0u8; 32]);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        secret,
        output.as_mut(),
    );
    Ok(output)
}

/// Derive a 32-byte key from passphrase using Argon2id.
pub fn derive_passphrase_key(
    passphrase: &[u8],
    salt: &[u8; 16],
    memory_cost: u32,
    iterations: u32,
    parallelism: u32,
) -> Result<Zeroizing<[u8; 32]>, CofferError> {
    let params = argon2::Params::new(memory_cost, iterations, parallelism, Some(32))
        .map_err(|e| CofferError::KeyDerivation(format!("invalid Argon2id parameters: {e}")))?;

    let argon2 = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut output = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(passphrase, salt, output.as_mut())
        .map_err(|e| CofferError::KeyDerivation(format!("Argon2id key derivation failed: {e}")))?;

    Ok(output)
}
