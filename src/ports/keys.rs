//! Key decryption port

use super::models::{KeyError, SigningKey};

/// Turns a backend-held encrypted private key into a usable signing key.
pub trait KeyDecryptor: Send + Sync {
    fn decrypt(&self, encrypted: &str) -> Result<SigningKey, KeyError>;
}
