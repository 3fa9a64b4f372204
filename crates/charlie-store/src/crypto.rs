//! At-rest encryption for MCP server credentials.
//!
//! AES-256-GCM with a random 96-bit nonce per encryption. The stored payload
//! is `base64(nonce || ciphertext)`; the key comes from configuration as a
//! base64-encoded 32-byte secret and never leaves this module.

use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::{Result, StoreError};

const NONCE_LEN: usize = 12;

/// Symmetric cipher for credential columns.
#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose key material through Debug output.
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}

impl CredentialCipher {
    /// Build a cipher from a base64-encoded 32-byte key.
    pub fn from_base64_key(key: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(key.trim())
            .map_err(|e| StoreError::Config(format!("encryption key is not valid base64: {}", e)))?;
        if bytes.len() != 32 {
            return Err(StoreError::Config(format!(
                "encryption key must decode to 32 bytes, got {}",
                bytes.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(&bytes)
            .map_err(|e| StoreError::Config(format!("invalid encryption key: {}", e)))?;
        Ok(Self { cipher })
    }

    /// Generate a fresh random key, base64-encoded for config files.
    pub fn generate_key_base64() -> String {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        BASE64.encode(key)
    }

    /// Encrypt a plaintext credential blob.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| StoreError::Config("credential encryption failed".to_string()))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(payload))
    }

    /// Decrypt a payload produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, payload: &str) -> Result<String> {
        let bytes = BASE64
            .decode(payload)
            .map_err(|_| StoreError::validation("credential payload is not valid base64"))?;
        if bytes.len() <= NONCE_LEN {
            return Err(StoreError::validation("credential payload too short"));
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| StoreError::validation("credential payload failed authentication"))?;
        String::from_utf8(plaintext)
            .map_err(|_| StoreError::validation("decrypted credential is not valid UTF-8"))
    }
}
