// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Master encryption key acquisition.
//!
//! Sources, in priority order:
//! 1. The environment variable named by `keys.master_key_env` (hex, 32 bytes)
//! 2. The file at `keys.master_key_file` (hex, 32 bytes)
//! 3. A passphrase stretched with Argon2id using `keys.passphrase_salt`; the
//!    passphrase comes from `COFFER_MASTER_PASSPHRASE` or an interactive prompt

use coffer_config::model::KeysConfig;
use coffer_core::CofferError;
use secrecy::{ExposeSecret, SecretBox, SecretString};
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use crate::kdf;

/// The environment variable consulted for the master key passphrase.
pub const PASSPHRASE_ENV_VAR: &str = "COFFER_MASTER_PASSPHRASE";

/// The process-wide root key. Read-only after load; Debug output is redacted.
pub struct MasterKey(SecretBox<[u8; 32]>);

impl MasterKey {
    /// Wrap raw key bytes. The argument is wiped after it is copied in.
    pub fn from_bytes(mut bytes: [u8; 32]) -> Self {
        let key = Self::from_zeroizing(&Zeroizing::new(bytes));
        bytes.zeroize();
        key
    }

    /// Copy key material straight into the heap box; no unwiped stack copy
    /// is left behind.
    pub fn from_zeroizing(bytes: &Zeroizing<[u8; 32]>) -> Self {
        Self(SecretBox::init_with_mut(|slot: &mut [u8; 32]| {
            slot.copy_from_slice(bytes.as_ref())
        }))
    }

    /// Parse a hex-encoded 32-byte key. Surrounding whitespace is ignored.
    pub fn from_hex(encoded: &str) -> Result<Self, CofferError> {
        let mut bytes = Zeroizing::new([0u8; 32]);
        hex::decode_to_slice(encoded.trim(), bytes.as_mut()).map_err(|e| {
            CofferError::Config(format!("master key must be 64 hex characters: {e}"))
        })?;
        Ok(Self::from_zeroizing(&bytes))
    }

    pub(crate) fn expose(&self) -> &[u8; 32] {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

/// Load the master key from the configured sources.
pub fn load_master_key(config: &KeysConfig) -> Result<MasterKey, CofferError> {
    if let Ok(encoded) = std::env::var(&config.master_key_env) {
        let encoded = Zeroizing::new(encoded);
        if !encoded.trim().is_empty() {
            debug!(source = "env", var = %config.master_key_env, "master key loaded");
            return MasterKey::from_hex(&encoded);
        }
    }

    if let Some(ref path) = config.master_key_file {
        let contents = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
            CofferError::Config(format!("failed to read master key file {path}: {e}"))
        })?);
        debug!(source = "file", path = %path, "master key loaded");
        return MasterKey::from_hex(&contents);
    }

    if let Some(ref salt_hex) = config.passphrase_salt {
        let mut salt = [0u8; 16];
        hex::decode_to_slice(salt_hex.trim(), &mut salt)
            .map_err(|e| CofferError::Config(format!("invalid keys.passphrase_salt: {e}")))?;
        let passphrase = get_master_passphrase()?;
        let key = kdf::derive_passphrase_key(
            passphrase.expose_secret().as_bytes(),
            &salt,
            config.argon2_memory_cost,
            config.argon2_iterations,
            config.argon2_parallelism,
        )?;
        debug!(source = "passphrase", "master key derived");
        return Ok(MasterKey::from_zeroizing(&key));
    }

    Err(CofferError::Config(format!(
        "no master key provided. Set {} (64 hex characters), keys.master_key_file, \
         or keys.passphrase_salt with {PASSPHRASE_ENV_VAR}",
        config.master_key_env
    )))
}

/// Get the master key passphrase from the environment or an interactive TTY prompt.
pub fn get_master_passphrase() -> Result<SecretString, CofferError> {
    if let Ok(passphrase) = std::env::var(PASSPHRASE_ENV_VAR)
        && !passphrase.is_empty()
    {
        return Ok(SecretString::from(passphrase));
    }

    if std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        eprint!("Master key passphrase: ");
        let passphrase = rpassword::read_password()
            .map_err(|e| CofferError::Config(format!("failed to read passphrase: {e}")))?;
        if passphrase.is_empty() {
            return Err(CofferError::Config("empty passphrase not allowed".to_string()));
        }
        return Ok(SecretString::from(passphrase));
    }

    Err(CofferError::Config(format!(
        "no passphrase provided. Set {PASSPHRASE_ENV_VAR} or run interactively."
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn config(env: &str) -> KeysConfig {
        KeysConfig {
            master_key_env: env.to_string(),
            argon2_memory_cost: 32768,
            argon2_iterations: 2,
            argon2_parallelism: 1,
            ..KeysConfig::default()
        }
    }

    #[test]
    fn from_hex_accepts_whitespace_and_rejects_bad_length() {
        let key = MasterKey::from_hex(&format!("  {KEY_HEX}\n")).unwrap();
        assert_eq!(key.expose()[31], 0x1f);
        assert!(MasterKey::from_hex("abcd").is_err());
        assert!(MasterKey::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn key_is_copied_into_place_unchanged() {
        let source = Zeroizing::new([9u8; 32]);
        let key = MasterKey::from_zeroizing(&source);
        assert_eq!(key.expose(), &[9u8; 32]);
        assert_eq!(MasterKey::from_bytes([9u8; 32]).expose(), key.expose());
        assert_eq!(
            MasterKey::from_hex(KEY_HEX).unwrap().expose()[..4],
            [0x00, 0x01, 0x02, 0x03]
        );
    }

    #[test]
    fn debug_is_redacted() {
        let key = MasterKey::from_hex(KEY_HEX).unwrap();
        let rendered = format!("{key:?}");
        assert_eq!(rendered, "MasterKey([REDACTED])");
        assert!(!rendered.contains("1f"));
    }

    #[test]
    #[serial]
    fn env_var_takes_priority_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("master.key");
        std::fs::write(&file, "ff".repeat(32)).unwrap();

        let mut cfg = config("COFFER_TEST_MASTER_KEY_PRIORITY");
        cfg.master_key_file = Some(file.to_string_lossy().into_owned());

        // SAFETY: test-only env mutation, serialized by #[serial].
        unsafe { std::env::set_var("COFFER_TEST_MASTER_KEY_PRIORITY", KEY_HEX) };
        let key = load_master_key(&cfg).unwrap();
        unsafe { std::env::remove_var("COFFER_TEST_MASTER_KEY_PRIORITY") };
        assert_eq!(key.expose()[0], 0x00);

        let key = load_master_key(&cfg).unwrap();
        assert_eq!(key.expose()[0], 0xff);
    }

    #[test]
    #[serial]
    fn passphrase_source_uses_argon2() {
        let mut cfg = config("COFFER_TEST_MASTER_KEY_UNSET");
        cfg.passphrase_salt = Some("00112233445566778899aabbccddeeff".to_string());

        unsafe { std::env::set_var(PASSPHRASE_ENV_VAR, "correct horse battery staple") };
        let first = load_master_key(&cfg).unwrap();
        let second = load_master_key(&cfg).unwrap();
        unsafe { std::env::remove_var(PASSPHRASE_ENV_VAR) };

        assert_eq!(first.expose(), second.expose());
    }

    #[test]
    #[serial]
    fn missing_sources_is_a_config_error() {
        unsafe { std::env::remove_var(PASSPHRASE_ENV_VAR) };
        let result = load_master_key(&config("COFFER_TEST_MASTER_KEY_UNSET"));
        assert!(matches!(result, Err(CofferError::Config(_))));
    }

    #[test]
    fn unreadable_key_file_is_a_config_error() {
        let mut cfg = config("COFFER_TEST_MASTER_KEY_UNSET_TOO");
        cfg.master_key_file = Some("/nonexistent/coffer/master.key".to_string());
        assert!(matches!(load_master_key(&cfg), Err(CofferError::Config(_))));
    }
}
