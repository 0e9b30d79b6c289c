//! Tron address encoding
//!
//! A Tron address is the 20-byte account id prefixed with `0x41`, shown either
//! as base58check (`T...`) or as 42 hex characters (`41...`).

use alloy::primitives::Address;

use crate::ports::AdapterError;

pub const ADDRESS_PREFIX: u8 = 0x41;

/// Decode a base58check address into its 20-byte account id
pub fn decode_base58(address: &str) -> Result<[u8; 20], AdapterError> {
    let bytes = bs58::decode(address.trim())
        .with_check(Some(ADDRESS_PREFIX))
        .into_vec()
        .map_err(|e| AdapterError::InvalidAddress(format!("{}: {}", address, e)))?;

    if bytes.len() != 21 || bytes[0] != ADDRESS_PREFIX {
        return Err(AdapterError::InvalidAddress(format!(
            "{}: not a Tron account address",
            address
        )));
    }

    let mut id = [0u8; 20];
    id.copy_from_slice(&bytes[1..]);
    Ok(id)
}

/// Encode a 20-byte account id as base58check
pub fn encode_base58(id: &[u8; 20]) -> String {
    let mut bytes = Vec::with_capacity(21);
    bytes.push(ADDRESS_PREFIX);
    bytes.extend_from_slice(id);
    bs58::encode(bytes).with_check().into_string()
}

/// `41`-prefixed hex form
pub fn to_hex(address: &str) -> Result<String, AdapterError> {
    let id = decode_base58(address)?;
    Ok(format!("{:02x}{}", ADDRESS_PREFIX, hex::encode(id)))
}

/// Tron address controlled by the same secp256k1 key as an EVM address
pub fn from_evm(address: Address) -> String {
    encode_base58(&address.0 .0)
}

/// ABI-encoded `address` parameter (left-padded to 32 bytes)
pub fn abi_address_param(address: &str) -> Result<String, AdapterError> {
    let id = decode_base58(address)?;
    Ok(format!("{:0>64}", hex::encode(id)))
}

/// ABI-encoded `uint256` parameter
pub fn abi_uint_param(value: u128) -> String {
    format!("{:064x}", value)
}
