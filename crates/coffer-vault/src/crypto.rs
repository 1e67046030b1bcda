// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AES-256-GCM encryption bound to the owning record.
//!
//! Every call to [`encrypt`] generates a fresh random 96-bit nonce via the
//! system CSPRNG. Nonce reuse would be catastrophic for GCM security.

use coffer_core::CofferError;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

const AAD_DOMAIN: &[u8] = b"coffer/secret/v1";

/// Associated data binding a ciphertext to its user and record.
///
/// Layout: `"coffer/secret/v1" 0x00 user_id 0x00 record_id`.
pub fn record_aad(user_id: &str, record_id: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(AAD_DOMAIN.len() + user_id.len() + record_id.len() + 2);
    aad.extend_from_slice(AAD_DOMAIN);
    aad.push(0);
    aad.extend_from_slice(user_id.as_bytes());
    aad.push(0);
    aad.extend_from_slice(record_id.as_bytes());
    aad
}

fn aead_key(key: &[u8; 32]) -> Result<LessSafeKey, CofferError> {
    let unbound = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| CofferError::KeyDerivation("failed to create AES-256-GCM key".to_string()))?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypt `plaintext` under `key` with a random nonce.
///
/// Returns `(ciphertext_with_tag, nonce_bytes)`.
pub fn encrypt(
    key: &[u8; 32],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<(Vec<u8>, [u8; NONCE_LEN]), CofferError> {
    let key = aead_key(key)?;

    let rng = SystemRandom::new();
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill(&mut nonce_bytes)
        .map_err(|_| CofferError::Internal("failed to generate random nonce".to_string()))?;

    // Wiped on drop if sealing fails; on success it holds only ciphertext.
    let mut in_out = Zeroizing::new(plaintext.to_vec());
    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce_bytes),
        Aad::from(aad),
        &mut *in_out,
    )
    .map_err(|_| CofferError::Internal("AES-256-GCM encryption failed".to_string()))?;

    Ok((std::mem::take(&mut *in_out), nonce_bytes))
}

/// Decrypt and authenticate `ciphertext`.
///
/// Any failure (wrong key, tampered bytes, wrong AAD, malformed nonce) is
/// reported as [`CofferError::DecryptionFailed`]; no partial plaintext is
/// ever returned.
pub fn decrypt(
    key: &[u8; 32],
    ciphertext: &[u8],
    nonce: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CofferError> {
    let nonce: [u8; NONCE_LEN] = nonce.try_into().map_err(|_| CofferError::DecryptionFailed)?;
    let key = aead_key(key)?;

    let mut in_out = Zeroizing::new(ciphertext.to_vec());
    let len = key
        .open_in_place(Nonce::assume_unique_for_key(nonce), Aad::from(aad), &mut in_out)
        .map_err(|_| CofferError::DecryptionFailed)?
        .len();
    in_out.truncate(len);
    Ok(in_out)
}

/// Generate a random 32-byte key suitable for AES-256-GCM.
pub fn generate_random_key() -> Result<Zeroizing<[u8; 32]>, CofferError> {
    let rng = SystemRandom::new();
    let mut key = Zeroizing::new([0u8; 32]);
    rng.fill(key.as_mut())
        .map_err(|_| CofferError::Internal("failed to generate random key".to_string()))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = generate_random_key().unwrap();
        let aad = record_aad("alice", "rec-1");

        let (ciphertext, nonce) = encrypt(&key, b"secret api key value", &aad).unwrap();
        let plaintext = decrypt(&key, &ciphertext, &nonce, &aad).unwrap();

        assert_eq!(plaintext.as_slice(), b"secret api key value");
    }

    #[test]
    fn sealed_output_is_ciphertext_plus_tag() {
        let key = generate_random_key().unwrap();
        let plaintext = b"sk-live-0123456789";
        let (ciphertext, _) = encrypt(&key, plaintext, b"aad").unwrap();
        assert_eq!(ciphertext.len(), plaintext.len() + AES_256_GCM.tag_len());
        assert_ne!(&ciphertext[..plaintext.len()], plaintext);
    }

    #[test]
    fn same_plaintext_encrypts_differently() {
        let key = generate_random_key().unwrap();
        let aad = record_aad("alice", "rec-1");

        let (ct1, nonce1) = encrypt(&key, b"same input twice", &aad).unwrap();
        let (ct2, nonce2) = encrypt(&key, b"same input twice", &aad).unwrap();

        assert_ne!(nonce1, nonce2);
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn wrong_key_fails() {
        let aad = record_aad("alice", "rec-1");
        let (ciphertext, nonce) =
            encrypt(&generate_random_key().unwrap(), b"secret", &aad).unwrap();
        let result = decrypt(&generate_random_key().unwrap(), &ciphertext, &nonce, &aad);
        assert!(matches!(result, Err(CofferError::DecryptionFailed)));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = generate_random_key().unwrap();
        let aad = record_aad("alice", "rec-1");
        let (mut ciphertext, nonce) = encrypt(&key, b"do not tamper", &aad).unwrap();
        ciphertext[0] ^= 0x01;
        assert!(matches!(
            decrypt(&key, &ciphertext, &nonce, &aad),
            Err(CofferError::DecryptionFailed)
        ));
    }

    #[test]
    fn short_nonce_fails_cleanly() {
        let key = generate_random_key().unwrap();
        let aad = record_aad("alice", "rec-1");
        let (ciphertext, nonce) = encrypt(&key, b"value", &aad).unwrap();
        assert!(matches!(
            decrypt(&key, &ciphertext, &nonce[..8], &aad),
            Err(CofferError::DecryptionFailed)
        ));
    }

    #[test]
    fn ciphertext_carries_tag() {
        let key = generate_random_key().unwrap();
        let (ciphertext, _) = encrypt(&key, b"hello", b"").unwrap();
        assert_eq!(ciphertext.len(), 5 + 16);
    }

    #[test]
    fn aad_separates_user_and_record() {
        // The separator keeps ("ab", "c") and ("a", "bc") apart.
        assert_ne!(record_aad("ab", "c"), record_aad("a", "bc"));
        assert!(record_aad("u", "r").starts_with(b"coffer/secret/v1\0u\0"));
    }

    proptest! {
        #[test]
        fn ciphertext_only_opens_under_its_own_binding(
            value in proptest::collection::vec(any::<u8>(), 0..256),
            user in "[a-z]{1,12}",
            record in "[a-z0-9-]{1,16}",
            other_record in "[a-z0-9-]{1,16}",
        ) {
            let key = generate_random_key().unwrap();
            let aad = record_aad(&user, &record);
            let (ciphertext, nonce) = encrypt(&key, &value, &aad).unwrap();

            let opened = decrypt(&key, &ciphertext, &nonce, &aad).unwrap();
            prop_assert_eq!(opened.as_slice(), value.as_slice());

            if other_record != record {
                let moved = decrypt(&key, &ciphertext, &nonce, &record_aad(&user, &other_record));
                prop_assert!(moved.is_err());
            }
            let other_user = format!("{user}x");
            let stolen = decrypt(&key, &ciphertext, &nonce, &record_aad(&other_user, &record));
            prop_assert!(stolen.is_err());
        }
    }
}
