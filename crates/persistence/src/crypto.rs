//! Optional at-rest encryption for the snapshot file.
//!
//! AES-256-GCM with a fresh 32-byte salt and 16-byte IV per file; the key
//! is derived from the configured passphrase via scrypt. On disk the file
//! is `hex(salt ‖ iv ‖ tag ‖ ciphertext)` as a single UTF-8 stream. The
//! WAL is deliberately not run through this filter.

use aes_gcm::aead::generic_array::typenum::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::AesGcm;
use rand::RngCore;
use scrypt::Params;

use crate::error::{PersistenceError, Result};

const SALT_LEN: usize = 32;
const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;

// scrypt cost parameters: N=2^14, r=8, p=1.
const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

type Cipher = AesGcm<Aes256, U16>;

#[derive(Clone)]
pub struct SnapshotCipher {
    passphrase: String,
}

impl std::fmt::Debug for SnapshotCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SnapshotCipher")
    }
}

impl SnapshotCipher {
    pub fn new(passphrase: impl Into<String>) -> Self {
        SnapshotCipher {
            passphrase: passphrase.into(),
        }
    }

    fn derive_key(&self, salt: &[u8]) -> Result<[u8; 32]> {
        let params = Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, 32)
            .map_err(|e| PersistenceError::Crypto(format!("scrypt params: {e}")))?;
        let mut key = [0u8; 32];
        scrypt::scrypt(self.passphrase.as_bytes(), salt, &params, &mut key)
            .map_err(|e| PersistenceError::Crypto(format!("scrypt: {e}")))?;
        Ok(key)
    }

    /// Encrypt `plaintext` into the hex envelope.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String> {
        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        rand::thread_rng().fill_bytes(&mut iv);

        let key = self.derive_key(&salt)?;
        let cipher = Cipher::new_from_slice(&key)
            .map_err(|e| PersistenceError::Crypto(format!("key setup: {e}")))?;

        let mut buffer = plaintext.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(GenericArray::from_slice(&iv), b"", &mut buffer)
            .map_err(|_| PersistenceError::Crypto("encryption failed".to_string()))?;

        let mut raw = Vec::with_capacity(SALT_LEN + IV_LEN + TAG_LEN + buffer.len());
        raw.extend_from_slice(&salt);
        raw.extend_from_slice(&iv);
        raw.extend_from_slice(&tag);
        raw.extend_from_slice(&buffer);
        Ok(hex::encode(raw))
    }

    /// Decrypt a hex envelope back to plaintext. Tampering or a wrong
    /// passphrase fails the GCM tag and surfaces as corruption.
    pub fn open(&self, stream: &[u8]) -> Result<Vec<u8>> {
        let text = std::str::from_utf8(stream)
            .map_err(|_| PersistenceError::Corrupted("encrypted envelope is not UTF-8".into()))?;
        let raw = hex::decode(text.trim())
            .map_err(|e| PersistenceError::Corrupted(format!("invalid hex envelope: {e}")))?;
        if raw.len() < SALT_LEN + IV_LEN + TAG_LEN {
            return Err(PersistenceError::Corrupted(
                "encrypted envelope too short".into(),
            ));
        }

        let (salt, rest) = raw.split_at(SALT_LEN);
        let (iv, rest) = rest.split_at(IV_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let key = self.derive_key(salt)?;
        let cipher = Cipher::new_from_slice(&key)
            .map_err(|e| PersistenceError::Crypto(format!("key setup: {e}")))?;

        let mut buffer = ciphertext.to_vec();
        cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice(iv),
                b"",
                &mut buffer,
                GenericArray::from_slice(tag),
            )
            .map_err(|_| {
                PersistenceError::Corrupted("authentication tag mismatch (wrong key or tampered file)".into())
            })?;
        Ok(buffer)
    }
}
