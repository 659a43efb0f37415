//! Account credential resolution.
//!
//! Stored passwords go through a [`SecretResolver`] before every
//! authentication, so the configuration never needs to hold them in clear text.

use std::sync::Arc;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::config::{CredentialsConfig, SecretScheme};
use crate::{Error, Result};

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Turns a stored credential into the password sent to the provider.
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, stored: &str) -> Result<String>;
}

/// Credentials stored verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainSecrets;

impl SecretResolver for PlainSecrets {
    fn resolve(&self, stored: &str) -> Result<String> {
        Ok(stored.to_string())
    }
}

/// AES-256-GCM encrypted credentials, stored as `base64(nonce || ciphertext)`.
pub struct AesGcmSecrets {
    cipher: Aes256Gcm,
}

impl AesGcmSecrets {
    /// Build from a base64 encoded 32-byte key.
    pub fn from_base64_key(encoded: &str) -> Result<Self> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::config(format!("secret key is not valid base64: {}", e)))?;
        if key.len() != KEY_LEN {
            return Err(Error::config(format!(
                "secret key must be {} bytes, got {}",
                KEY_LEN,
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| Error::config(format!("invalid secret key: {}", e)))?;
        Ok(Self { cipher })
    }

    /// Build from the key held in environment variable `var`.
    pub fn from_env(var: &str) -> Result<Self> {
        let encoded = std::env::var(var)
            .map_err(|_| Error::config(format!("secret key variable {} is not set", var)))?;
        Self::from_base64_key(&encoded)
    }

    /// Encrypt `plain` with a fresh random nonce.
    pub fn encrypt(&self, plain: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plain.as_bytes())
            .map_err(|_| Error::Other("AES-GCM encryption failed".to_string()))?;

        let mut stored = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        stored.extend_from_slice(&nonce);
        stored.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(stored))
    }
}

impl SecretResolver for AesGcmSecrets {
    fn resolve(&self, stored: &str) -> Result<String> {
        let raw = STANDARD
            .decode(stored.trim())
            .map_err(|e| Error::Other(format!("stored credential is not valid base64: {}", e)))?;
        if raw.len() <= NONCE_LEN {
            return Err(Error::Other("stored credential is too short".to_string()));
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::Other("stored credential failed to decrypt".to_string()))?;

        String::from_utf8(plain)
            .map_err(|_| Error::Other("decrypted credential is not UTF-8".to_string()))
    }
}

/// Build the resolver selected by `[credentials]`.
pub fn resolver_from_config(config: &CredentialsConfig) -> Result<Arc<dyn SecretResolver>> {
    match config.scheme {
        SecretScheme::Plain => Ok(Arc::new(PlainSecrets)),
        SecretScheme::AesGcm => Ok(Arc::new(AesGcmSecrets::from_env(&config.key_env)?)),
    }
}
