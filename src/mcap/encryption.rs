//! Chunk encryption.
//!
//! A chunk's `compression` field doubles as the encryption marker: an
//! encrypted chunk advertises `alg` or `alg+compression` (for example
//! `aes-256-gcm+zstd`). The chunk body is `nonce(12) || ciphertext ||
//! tag(16)`; the tag authenticates the ciphertext, so a flipped byte or a
//! wrong key fails decryption.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use crate::core::{CodecError, Result};

/// Nonce length for AES-GCM.
const NONCE_LEN: usize = 12;
/// Authentication tag length for AES-GCM.
const TAG_LEN: usize = 16;

/// A chunk encryption algorithm.
pub trait EncryptionProvider: Send + Sync {
    /// Algorithm identifier written into the chunk `compression` field.
    fn algorithm(&self) -> &'static str;

    /// Encrypt a chunk payload (already compressed, if compression is on).
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt a chunk payload.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// AES-256-GCM provider with a fresh random nonce per chunk.
pub struct AesGcmProvider {
    cipher: Aes256Gcm,
}

impl AesGcmProvider {
    /// Algorithm identifier for this provider.
    pub const ALGORITHM: &'static str = "aes-256-gcm";

    /// Create a provider from a 32-byte key.
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != 32 {
            return Err(CodecError::encode(
                "encryption",
                format!("AES-256-GCM requires a 32-byte key, got {} bytes", key.len()),
            ));
        }
        Ok(Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        })
    }

    /// Generate a fresh random 32-byte key.
    pub fn generate_key() -> [u8; 32] {
        let key = Aes256Gcm::generate_key(OsRng);
        key.into()
    }
}

impl EncryptionProvider for AesGcmProvider {
    fn algorithm(&self) -> &'static str {
        Self::ALGORITHM
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CodecError::encode("encryption", "AES-GCM encryption failed"))?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(CodecError::decryption_failed(format!(
                "ciphertext of {} bytes is too short for nonce and tag",
                data.len()
            )));
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| {
                CodecError::decryption_failed("authentication tag rejected the ciphertext or key")
            })
    }
}

/// Split a chunk `compression` field into `(encryption, compression)` parts.
///
/// `"zstd"` yields `(None, "zstd")`; `"aes-256-gcm+zstd"` yields
/// `(Some("aes-256-gcm"), "zstd")`; a bare algorithm yields
/// `(Some(alg), "")`.
pub fn split_compression(field: &str) -> (Option<&str>, &str) {
    if let Some((alg, compression)) = field.split_once('+') {
        (Some(alg), compression)
    } else if field == AesGcmProvider::ALGORITHM {
        (Some(field), "")
    } else {
        (None, field)
    }
}

/// Build the chunk `compression` field for an encrypted chunk.
pub fn join_compression(algorithm: &str, compression: &str) -> String {
    if compression.is_empty() {
        algorithm.to_string()
    } else {
        format!("{algorithm}+{compression}")
    }
}
