//! Tron network adapter over the TronGrid HTTP API
//!
//! Transactions are built by the node, verified locally (txID must equal the
//! SHA-256 of `raw_data_hex`), signed with the local key and broadcast. Each
//! transfer then polls `gettransactioninfobyid` until it is mined or the
//! confirmation window closes.

use std::time::Duration;

use alloy::primitives::B256;
use alloy::signers::SignerSync;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;

use super::address;
use super::types::*;
use crate::adapters::signer::local_signer;
use crate::domain::{from_base_units, to_base_units, Network};
use crate::ports::{AdapterError, NetworkAdapter, SigningKey, TxRef};

const TRX_DECIMALS: u32 = 6;

/// Tron adapter configuration
#[derive(Debug, Clone)]
pub struct TronConfig {
    /// Full node HTTP endpoint (e.g. https://api.trongrid.io)
    pub api_url: String,
    /// Optional TronGrid API key
    pub api_key: Option<String>,
    /// TRC-20 settlement token contract (base58)
    pub token_contract: String,
    /// Max TRX burned for energy per TRC-20 call, in sun
    pub fee_limit_sun: u64,
    pub request_timeout: Duration,
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for TronConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.trongrid.io".to_string(),
            api_key: None,
            token_contract: Network::Tron.default_token_contract().to_string(),
            fee_limit_sun: 100_000_000,
            request_timeout: Duration::from_secs(30),
            confirmation_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(3),
        }
    }
}

pub struct TronAdapter {
    config: TronConfig,
    http: Client,
    token_decimals: OnceCell<u32>,
}

impl TronAdapter {
    pub fn new(config: TronConfig) -> Result<Self, AdapterError> {
        address::decode_base58(&config.token_contract)?;

        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                AdapterError::AdapterUnavailable(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            config,
            http,
            token_decimals: OnceCell::new(),
        })
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AdapterError> {
        let url = format!("{}{}", self.config.api_url.trim_end_matches('/'), path);
        let mut req = self.http.post(&url).json(body);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("TRON-PRO-API-KEY", api_key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| AdapterError::AdapterUnavailable(format!("{}: {}", path, e)))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AdapterError::AdapterUnavailable("TronGrid rate limit exceeded".into()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::AdapterUnavailable(format!(
                "{} returned {}: {}",
                path, status, body
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AdapterError::AdapterUnavailable(format!("{}: invalid response: {}", path, e)))
    }

    /// Read-only contract call returning the first 32-byte word
    async fn call_constant(
        &self,
        owner: &str,
        selector: &str,
        parameter: String,
    ) -> Result<u128, AdapterError> {
        let request = ContractCallRequest {
            owner_address: owner,
            contract_address: &self.config.token_contract,
            function_selector: selector,
            parameter,
            fee_limit: None,
            call_value: None,
            visible: true,
        };
        let response: ContractCallResponse =
            self.post("/wallet/triggerconstantcontract", &request).await?;

        let ok = response.result.as_ref().map(|r| r.result).unwrap_or(false);
        let word = response.constant_result.first().filter(|_| ok).ok_or_else(|| {
            let message = response
                .result
                .and_then(|r| r.message)
                .map(|m| decode_message(&m))
                .unwrap_or_else(|| "empty result".to_string());
            AdapterError::TokenUnresolved(format!("{} failed: {}", selector, message))
        })?;

        parse_word(word)
            .ok_or_else(|| AdapterError::TokenUnresolved(format!("{} returned {}", selector, word)))
    }

    async fn token_decimals(&self, owner: &str) -> Result<u32, AdapterError> {
        self.token_decimals
            .get_or_try_init(|| async {
                let decimals = self.call_constant(owner, "decimals()", String::new()).await?;
                u32::try_from(decimals)
                    .ok()
                    .filter(|d| *d <= 28)
                    .ok_or_else(|| AdapterError::TokenUnresolved(format!("decimals() = {}", decimals)))
            })
            .await
            .copied()
    }

    /// Verify, sign and broadcast a node-built transaction, then wait for it
    async fn sign_and_submit(
        &self,
        key: &SigningKey,
        mut transaction: Value,
    ) -> Result<TxRef, AdapterError> {
        let tx_id = transaction
            .get("txID")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::TransferRejected("node returned no txID".into()))?
            .to_string();
        let raw_data_hex = transaction
            .get("raw_data_hex")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::TransferRejected("node returned no raw_data_hex".into()))?;

        let digest = verify_tx_id(raw_data_hex, &tx_id)?;

        let signer = local_signer(key)?;
        let signature = signer
            .sign_hash_sync(&B256::from(digest))
            .map_err(|e| AdapterError::InvalidKey(e.to_string()))?;

        if let Some(obj) = transaction.as_object_mut() {
            obj.insert(
                "signature".to_string(),
                Value::Array(vec![Value::String(hex::encode(signature.as_bytes()))]),
            );
        }

        let broadcast: BroadcastResponse =
            self.post("/wallet/broadcasttransaction", &transaction).await?;
        if !broadcast.result {
            let message = broadcast
                .message
                .as_deref()
                .map(decode_message)
                .unwrap_or_default();
            return Err(AdapterError::TransferRejected(format!(
                "broadcast failed ({}): {}",
                broadcast.code.unwrap_or_default(),
                message
            )));
        }

        let tx_ref = TxRef::new(broadcast.txid.unwrap_or(tx_id));
        tracing::info!("[Tron] Broadcast {}, waiting for confirmation", tx_ref);
        self.wait_for_confirmation(&tx_ref).await?;
        Ok(tx_ref)
    }

    async fn wait_for_confirmation(&self, tx_ref: &TxRef) -> Result<(), AdapterError> {
        let deadline = tokio::time::Instant::now() + self.config.confirmation_timeout;

        loop {
            tokio::time::sleep(self.config.poll_interval).await;

            let info: Result<TransactionInfo, AdapterError> = self
                .post(
                    "/wallet/gettransactioninfobyid",
                    &TransactionInfoRequest { value: tx_ref.as_str() },
                )
                .await;

            match info.map(|i| i.outcome()) {
                Ok(TxOutcome::Confirmed) => {
                    tracing::info!("[Tron] {} confirmed", tx_ref);
                    return Ok(());
                }
                Ok(TxOutcome::Failed(reason)) => {
                    return Err(AdapterError::TransferRejected(format!(
                        "{} failed on-chain: {}",
                        tx_ref, reason
                    )));
                }
                Ok(TxOutcome::Pending) => {}
                Err(e) => tracing::debug!("[Tron] Confirmation poll for {} failed: {}", tx_ref, e),
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(AdapterError::ConfirmationTimeout {
                    tx_ref: tx_ref.clone(),
                    timeout_secs: self.config.confirmation_timeout.as_secs(),
                });
            }
        }
    }

    fn sender_address(key: &SigningKey) -> Result<String, AdapterError> {
        Ok(address::from_evm(local_signer(key)?.address()))
    }
}

/// Parse a 32-byte hex word; values above u128 are rejected
fn parse_word(word: &str) -> Option<u128> {
    let trimmed = word.trim_start_matches('0');
    if trimmed.is_empty() {
        return Some(0);
    }
    u128::from_str_radix(trimmed, 16).ok()
}

#[async_trait]
impl NetworkAdapter for TronAdapter {
    fn network(&self) -> Network {
        Network::Tron
    }

    async fn get_native_balance(&self, address: &str) -> Result<Decimal, AdapterError> {
        address::decode_base58(address)?;
        let account: AccountResponse = self
            .post("/wallet/getaccount", &AccountRequest { address, visible: true })
            .await?;
        from_base_units(account.balance.unwrap_or(0) as u128, TRX_DECIMALS)
            .map_err(|e| AdapterError::AdapterUnavailable(e.to_string()))
    }

    async fn get_token_balance(&self, address: &str) -> Result<Decimal, AdapterError> {
        let parameter = address::abi_address_param(address)?;
        let decimals = self.token_decimals(address).await?;
        let raw = self.call_constant(address, "balanceOf(address)", parameter).await?;
        from_base_units(raw, decimals).map_err(|e| AdapterError::TokenUnresolved(e.to_string()))
    }

    async fn transfer_native(
        &self,
        key: &SigningKey,
        to: &str,
        amount: Decimal,
    ) -> Result<TxRef, AdapterError> {
        address::decode_base58(to)?;
        let from = Self::sender_address(key)?;
        let sun = to_base_units(amount, TRX_DECIMALS)
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .ok_or_else(|| AdapterError::TransferRejected(format!("invalid TRX amount {}", amount)))?;

        tracing::info!("[Tron] Sending {} TRX {} -> {}", amount, from, to);

        let transaction: Value = self
            .post(
                "/wallet/createtransaction",
                &CreateTransactionRequest {
                    owner_address: &from,
                    to_address: to,
                    amount: sun,
                    visible: true,
                },
            )
            .await?;
        if let Some(error) = transaction.get("Error").and_then(Value::as_str) {
            return Err(AdapterError::TransferRejected(error.to_string()));
        }

        self.sign_and_submit(key, transaction).await
    }

    async fn transfer_token(
        &self,
        key: &SigningKey,
        to: &str,
        amount: Decimal,
    ) -> Result<TxRef, AdapterError> {
        let from = Self::sender_address(key)?;
        let decimals = self.token_decimals(&from).await?;
        let raw = to_base_units(amount, decimals)
            .map_err(|e| AdapterError::TransferRejected(e.to_string()))?;
        let parameter = format!(
            "{}{}",
            address::abi_address_param(to)?,
            address::abi_uint_param(raw)
        );

        tracing::info!("[Tron] Sending {} USDT {} -> {}", amount, from, to);

        let request = ContractCallRequest {
            owner_address: &from,
            contract_address: &self.config.token_contract,
            function_selector: "transfer(address,uint256)",
            parameter,
            fee_limit: Some(self.config.fee_limit_sun),
            call_value: Some(0),
            visible: true,
        };
        let response: ContractCallResponse =
            self.post("/wallet/triggersmartcontract", &request).await?;

        let accepted = response.result.as_ref().map(|r| r.result).unwrap_or(false);
        match response.transaction {
            Some(transaction) if accepted => self.sign_and_submit(key, transaction).await,
            _ => {
                let message = response
                    .result
                    .and_then(|r| r.message)
                    .map(|m| decode_message(&m))
                    .unwrap_or_else(|| "node refused to build transfer".to_string());
                Err(AdapterError::TransferRejected(message))
            }
        }
    }
}

/// The digest to sign, provided `tx_id` really is SHA-256 of `raw_data_hex`
fn verify_tx_id(raw_data_hex: &str, tx_id: &str) -> Result<[u8; 32], AdapterError> {
    let raw = hex::decode(raw_data_hex)
        .map_err(|e| AdapterError::TransferRejected(format!("raw_data_hex: {}", e)))?;
    let digest: [u8; 32] = Sha256::digest(&raw).into();
    if !hex::encode(digest).eq_ignore_ascii_case(tx_id.trim()) {
        return Err(AdapterError::TransferRejected(
            "txID does not match raw transaction data".into(),
        ));
    }
    Ok(digest)
}
