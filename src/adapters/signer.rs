//! secp256k1 signer construction shared by the EVM and Tron adapters

use alloy::signers::local::PrivateKeySigner;

use crate::ports::{AdapterError, SigningKey};

/// Parse a hex private key into a local signer
pub fn local_signer(key: &SigningKey) -> Result<PrivateKeySigner, AdapterError> {
    key.expose_hex()
        .parse::<PrivateKeySigner>()
        .map_err(|e| AdapterError::InvalidKey(e.to_string()))
}
