//! Network adapter port
//!
//! One implementation per ledger family. Amounts cross this boundary as
//! human-readable decimals; adapters own the conversion to base units.
//! Implementations never retry internally and every transfer returns only once
//! the network has confirmed it.

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::models::{AdapterError, SigningKey, TxRef};
use crate::domain::Network;

#[async_trait]
pub trait NetworkAdapter: Send + Sync {
    /// Network served by this adapter
    fn network(&self) -> Network;

    /// Native fee currency balance (ETH, BNB, TRX)
    async fn get_native_balance(&self, address: &str) -> Result<Decimal, AdapterError>;

    /// Settlement token balance, scaled by the decimals the token contract reports
    async fn get_token_balance(&self, address: &str) -> Result<Decimal, AdapterError>;

    /// Send native currency and wait for confirmation
    async fn transfer_native(
        &self,
        key: &SigningKey,
        to: &str,
        amount: Decimal,
    ) -> Result<TxRef, AdapterError>;

    /// Send the settlement token and wait for confirmation
    async fn transfer_token(
        &self,
        key: &SigningKey,
        to: &str,
        amount: Decimal,
    ) -> Result<TxRef, AdapterError>;
}
