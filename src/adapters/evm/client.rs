//! EVM network adapter (Arbitrum One, BNB Smart Chain)
//!
//! Reads go through a plain HTTP provider; transfers build a wallet provider
//! for the signing key at hand, since the same adapter signs with both the
//! vault key and transient temp-wallet keys.

use std::time::Duration;

use alloy::network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, U256};
use alloy::providers::{PendingTransactionBuilder, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::sol;
use async_trait::async_trait;
use reqwest::Url;
use rust_decimal::Decimal;
use tokio::sync::OnceCell;

use crate::adapters::signer::local_signer;
use crate::domain::{from_base_units, to_base_units, Network, NetworkFamily};
use crate::ports::{AdapterError, NetworkAdapter, SigningKey, TxRef};

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

/// EVM adapter configuration
#[derive(Debug, Clone)]
pub struct EvmConfig {
    pub network: Network,
    pub rpc_url: String,
    /// ERC-20 settlement token contract
    pub token_contract: String,
    /// Blocks to wait on top of the inclusion block
    pub confirmations: u64,
    pub confirmation_timeout: Duration,
}

pub struct EvmAdapter {
    network: Network,
    rpc_url: Url,
    token: Address,
    confirmations: u64,
    confirmation_timeout: Duration,
    token_decimals: OnceCell<u32>,
}

impl EvmAdapter {
    pub fn new(config: EvmConfig) -> Result<Self, AdapterError> {
        if config.network.family() != NetworkFamily::Evm {
            return Err(AdapterError::AdapterUnavailable(format!(
                "{} is not an EVM network",
                config.network
            )));
        }
        let rpc_url: Url = config
            .rpc_url
            .parse()
            .map_err(|e| AdapterError::AdapterUnavailable(format!("Invalid RPC URL: {}", e)))?;
        let token = parse_address(&config.token_contract)?;

        Ok(Self {
            network: config.network,
            rpc_url,
            token,
            confirmations: config.confirmations.max(1),
            confirmation_timeout: config.confirmation_timeout,
            token_decimals: OnceCell::new(),
        })
    }

    async fn token_decimals(&self) -> Result<u32, AdapterError> {
        self.token_decimals
            .get_or_try_init(|| async {
                let provider = ProviderBuilder::new().connect_http(self.rpc_url.clone());
                let token = IERC20::new(self.token, provider);
                let decimals = token
                    .decimals()
                    .call()
                    .await
                    .map_err(|e| classify_call_error(format!("decimals() on {}", self.token), e))?;
                Ok(u32::from(decimals))
            })
            .await
            .copied()
    }

    /// Wait for the configured confirmations and check the receipt status.
    ///
    /// Any failure after submission leaves the outcome unknown, so it surfaces
    /// as `ConfirmationTimeout` carrying the transaction hash.
    async fn confirm(
        &self,
        pending: PendingTransactionBuilder<alloy::network::Ethereum>,
    ) -> Result<TxRef, AdapterError> {
        let tx_ref = TxRef::new(format!("{:?}", pending.tx_hash()));
        tracing::info!("[{}] Submitted {}, waiting for confirmation", self.network, tx_ref);

        let receipt = pending
            .with_required_confirmations(self.confirmations)
            .with_timeout(Some(self.confirmation_timeout))
            .get_receipt()
            .await
            .map_err(|e| {
                tracing::warn!("[{}] Confirmation of {} not observed: {}", self.network, tx_ref, e);
                AdapterError::ConfirmationTimeout {
                    tx_ref: tx_ref.clone(),
                    timeout_secs: self.confirmation_timeout.as_secs(),
                }
            })?;

        if !receipt.status() {
            return Err(AdapterError::TransferRejected(format!("{} reverted", tx_ref)));
        }

        tracing::info!(
            "[{}] {} confirmed in block {:?}",
            self.network,
            tx_ref,
            receipt.block_number
        );
        Ok(tx_ref)
    }
}

fn parse_address(address: &str) -> Result<Address, AdapterError> {
    address
        .trim()
        .parse::<Address>()
        .map_err(|e| AdapterError::InvalidAddress(format!("{}: {}", address, e)))
}

fn u256_to_u128(value: U256) -> Result<u128, AdapterError> {
    u128::try_from(value)
        .map_err(|_| AdapterError::AdapterUnavailable(format!("value {} exceeds u128", value)))
}

/// Transport failures are transient; a contract that cannot answer is not
fn classify_call_error(call: String, error: alloy::contract::Error) -> AdapterError {
    match error {
        alloy::contract::Error::TransportError(e) => {
            AdapterError::AdapterUnavailable(format!("{}: {}", call, e))
        }
        other => AdapterError::TokenUnresolved(format!("{}: {}", call, other)),
    }
}

/// Node rejections are final; anything else is treated as an endpoint problem
fn classify_send_error(message: String) -> AdapterError {
    let lower = message.to_lowercase();
    let rejected = [
        "insufficient funds",
        "execution reverted",
        "gas required exceeds",
        "exceeds balance",
        "intrinsic gas too low",
        "nonce too low",
    ];
    if rejected.iter().any(|needle| lower.contains(needle)) {
        AdapterError::TransferRejected(message)
    } else {
        AdapterError::AdapterUnavailable(message)
    }
}

#[async_trait]
impl NetworkAdapter for EvmAdapter {
    fn network(&self) -> Network {
        self.network
    }

    async fn get_native_balance(&self, address: &str) -> Result<Decimal, AdapterError> {
        let owner = parse_address(address)?;
        let provider = ProviderBuilder::new().connect_http(self.rpc_url.clone());
        let wei = provider
            .get_balance(owner)
            .await
            .map_err(|e| AdapterError::AdapterUnavailable(e.to_string()))?;
        from_base_units(u256_to_u128(wei)?, self.network.native_decimals())
            .map_err(|e| AdapterError::AdapterUnavailable(e.to_string()))
    }

    async fn get_token_balance(&self, address: &str) -> Result<Decimal, AdapterError> {
        let owner = parse_address(address)?;
        let decimals = self.token_decimals().await?;

        let provider = ProviderBuilder::new().connect_http(self.rpc_url.clone());
        let token = IERC20::new(self.token, provider);
        let raw = token
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| classify_call_error(format!("balanceOf({})", owner), e))?;

        from_base_units(u256_to_u128(raw)?, decimals)
            .map_err(|e| AdapterError::TokenUnresolved(e.to_string()))
    }

    async fn transfer_native(
        &self,
        key: &SigningKey,
        to: &str,
        amount: Decimal,
    ) -> Result<TxRef, AdapterError> {
        let recipient = parse_address(to)?;
        let wei = to_base_units(amount, self.network.native_decimals())
            .map_err(|e| AdapterError::TransferRejected(e.to_string()))?;
        let signer = local_signer(key)?;
        let from = signer.address();

        tracing::info!(
            "[{}] Sending {} {} {} -> {}",
            self.network,
            amount,
            self.network.native_symbol(),
            from,
            recipient
        );

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(self.rpc_url.clone());
        let tx = TransactionRequest::default()
            .with_from(from)
            .with_to(recipient)
            .with_value(U256::from(wei));

        let pending = provider
            .send_transaction(tx)
            .await
            .map_err(|e| classify_send_error(e.to_string()))?;
        self.confirm(pending).await
    }

    async fn transfer_token(
        &self,
        key: &SigningKey,
        to: &str,
        amount: Decimal,
    ) -> Result<TxRef, AdapterError> {
        let recipient = parse_address(to)?;
        let decimals = self.token_decimals().await?;
        let raw = to_base_units(amount, decimals)
            .map_err(|e| AdapterError::TransferRejected(e.to_string()))?;
        let signer = local_signer(key)?;
        let from = signer.address();

        tracing::info!(
            "[{}] Sending {} USDT {} -> {}",
            self.network,
            amount,
            from,
            recipient
        );

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(self.rpc_url.clone());
        let token = IERC20::new(self.token, provider);

        let pending = token
            .transfer(recipient, U256::from(raw))
            .from(from)
            .send()
            .await
            .map_err(|e| classify_send_error(e.to_string()))?;
        self.confirm(pending).await
    }
}
