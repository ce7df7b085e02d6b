//! Password-based encryption for facilitator wallet keys.
//!
//! A single format is used for both the user-password recovery copy and the
//! master-key operational copy:
//!
//! ```text
//! base64( salt[16] || iv[12] || tag[16] || ciphertext )
//! ```
//!
//! The AES-256-GCM key is derived with PBKDF2-HMAC-SHA256. Salt and IV are
//! drawn from the OS RNG on every call.

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

pub const SALT_LEN: usize = 16;
pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;
const HEADER_LEN: usize = SALT_LEN + IV_LEN + TAG_LEN;

/// Default PBKDF2 iteration count.
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Private key must be 64 hex characters (optionally 0x-prefixed)")]
    InvalidSecret,

    #[error("Malformed encrypted key: {0}")]
    Malformed(String),

    #[error("Decryption failed: wrong password or corrupted data")]
    Decryption,

    #[error("Encryption failed")]
    Encryption,
}

#[derive(Debug, Clone)]
pub struct KeyCipher {
    iterations: u32,
}

impl Default for KeyCipher {
    fn default() -> Self {
        Self::new(DEFAULT_KDF_ITERATIONS)
    }
}

impl KeyCipher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    /// Encrypts a 32-byte private key given as hex.
    pub fn encrypt(&self, secret: &str, passphrase: &str) -> Result<String, CryptoError> {
        if !is_private_key_hex(secret) {
            return Err(CryptoError::InvalidSecret);
        }

        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut iv);

        let key = self.derive_key(passphrase, &salt);
        let cipher = Aes256Gcm::new_from_slice(key.as_slice()).map_err(|_| CryptoError::Encryption)?;

        let mut buffer = secret.as_bytes().to_vec();
        let tag = cipher
            .encrypt_in_place_detached(Nonce::from_slice(&iv), b"", &mut buffer)
            .map_err(|_| CryptoError::Encryption)?;

        let mut blob = Vec::with_capacity(HEADER_LEN + buffer.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(tag.as_slice());
        blob.extend_from_slice(&buffer);

        Ok(BASE64.encode(blob))
    }

    /// Reverses [`KeyCipher::encrypt`]. Never returns partially decrypted data.
    pub fn decrypt(&self, blob: &str, passphrase: &str) -> Result<String, CryptoError> {
        let raw = BASE64
            .decode(blob.trim())
            .map_err(|e| CryptoError::Malformed(e.to_string()))?;

        if raw.len() <= HEADER_LEN {
            return Err(CryptoError::Malformed(format!(
                "expected more than {} bytes, got {}",
                HEADER_LEN,
                raw.len()
            )));
        }

        let (salt, rest) = raw.split_at(SALT_LEN);
        let (iv, rest) = rest.split_at(IV_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let key = self.derive_key(passphrase, salt);
        let cipher = Aes256Gcm::new_from_slice(key.as_slice()).map_err(|_| CryptoError::Decryption)?;

        let mut buffer = Zeroizing::new(ciphertext.to_vec());
        cipher
            .decrypt_in_place_detached(Nonce::from_slice(iv), b"", &mut buffer, Tag::from_slice(tag))
            .map_err(|_| CryptoError::Decryption)?;

        let secret = String::from_utf8(buffer.to_vec())
            .map_err(|_| CryptoError::Malformed("plaintext is not UTF-8".to_string()))?;

        if !is_private_key_hex(&secret) {
            return Err(CryptoError::Malformed("plaintext is not a private key".to_string()));
        }

        Ok(secret)
    }

    fn derive_key(&self, passphrase: &str, salt: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, self.iterations, &mut *key);
        key
    }
}

/// 64 hex characters with an optional `0x` prefix.
pub fn is_private_key_hex(secret: &str) -> bool {
    let body = secret.strip_prefix("0x").unwrap_or(secret);
    body.len() == 64 && body.chars().all(|c| c.is_ascii_hexdigit())
}
