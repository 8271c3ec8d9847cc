//! At-rest protection for sensitive policy values
//!
//! Values are sealed with AES-256-GCM under a key derived (SHA-256) from the
//! configured encryption secret. The stored form is `base64(nonce || ciphertext)`
//! with a fresh 96-bit nonce per encryption.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Failure to seal or open a secret
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid encryption key")]
    InvalidKey,

    #[error("ciphertext is not valid base64")]
    Encoding,

    #[error("ciphertext is truncated")]
    Truncated,

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed")]
    Decrypt,

    #[error("decrypted value is not UTF-8")]
    Utf8,
}

/// Symmetric codec for sensitive setting values
pub struct SecretCodec {
    cipher: Aes256Gcm,
}

impl SecretCodec {
    /// Derive the codec key from a process-wide secret
    pub fn new(secret: &str) -> Result<Self, CodecError> {
        let key = Sha256::digest(secret.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CodecError::InvalidKey)?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CodecError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CodecError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(sealed))
    }

    pub fn decrypt(&self, sealed: &str) -> Result<String, CodecError> {
        let raw = BASE64
            .decode(sealed.as_bytes())
            .map_err(|_| CodecError::Encoding)?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(CodecError::Truncated);
        }

        let (nonce_raw, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_raw), ciphertext)
            .map_err(|_| CodecError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| CodecError::Utf8)
    }
}

impl fmt::Debug for SecretCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretCodec").finish_non_exhaustive()
    }
}
