//! Shared types crossing the port boundary

use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

/// On-chain transaction reference (EVM tx hash or Tron txID)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxRef(pub String);

impl TxRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hex-encoded secp256k1 private key, wiped from memory on drop.
///
/// Debug output never includes the key material.
pub struct SigningKey(Zeroizing<String>);

impl SigningKey {
    pub fn new(hex_key: impl Into<String>) -> Self {
        Self(Zeroizing::new(hex_key.into()))
    }

    /// Key without the optional `0x` prefix
    pub fn expose_hex(&self) -> &str {
        self.0.trim().trim_start_matches("0x")
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(***)")
    }
}

/// Network adapter failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AdapterError {
    #[error("Network endpoint unavailable: {0}")]
    AdapterUnavailable(String),
    #[error("Settlement token could not be resolved: {0}")]
    TokenUnresolved(String),
    #[error("Transfer rejected: {0}")]
    TransferRejected(String),
    #[error("Transaction {tx_ref} not confirmed within {timeout_secs}s")]
    ConfirmationTimeout { tx_ref: TxRef, timeout_secs: u64 },
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Invalid signing key: {0}")]
    InvalidKey(String),
}

impl AdapterError {
    /// Transient failures are retried on a later cycle
    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::AdapterUnavailable(_))
    }

    /// Reference of a submitted but unconfirmed transaction
    pub fn pending_tx(&self) -> Option<&TxRef> {
        match self {
            AdapterError::ConfirmationTimeout { tx_ref, .. } => Some(tx_ref),
            _ => None,
        }
    }
}

/// Backend (system of record) failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Backend rejected credentials")]
    Unauthorized,
    #[error("Backend resource not found: {0}")]
    NotFound(String),
    #[error("Backend rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),
}

/// Key decryption failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KeyError {
    #[error("Malformed encrypted key: {0}")]
    Malformed(String),
    #[error("Key decryption failed")]
    DecryptionFailed,
    #[error("Invalid encryption key: {0}")]
    InvalidEncryptionKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_key_debug_is_redacted() {
        let key = SigningKey::new("0xdeadbeef");
        assert_eq!(format!("{:?}", key), "SigningKey(***)");
        assert_eq!(key.expose_hex(), "deadbeef");
    }

    #[test]
    fn test_timeout_keeps_tx_ref() {
        let err = AdapterError::ConfirmationTimeout {
            tx_ref: TxRef::new("0xabc"),
            timeout_secs: 120,
        };
        assert_eq!(err.pending_tx(), Some(&TxRef::new("0xabc")));
        assert!(!err.is_transient());
        assert!(AdapterError::AdapterUnavailable("x".into()).is_transient());
    }
}
