//! Network Registry
//!
//! One `NetworkProfile` per configured network: its adapter, vault identity,
//! reserve policy and the lock that serializes vault-signed transactions.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

use crate::adapters::evm::{EvmAdapter, EvmConfig};
use crate::adapters::tron::{TronAdapter, TronConfig};
use crate::config::{Config, ConfigError};
use crate::domain::{
    GuardDecision, Network, NetworkFamily, ReservePolicy, VaultGuard, VaultSnapshot,
};
use crate::ports::{AdapterError, NetworkAdapter, SigningKey, TxRef};

#[derive(Debug, Error)]
pub enum VaultGuardError {
    #[error("Network {0} is not configured")]
    UnknownNetwork(Network),
    #[error("Vault balance unavailable: {0}")]
    BalanceUnavailable(#[from] AdapterError),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to initialise {network} adapter: {source}")]
    Adapter {
        network: Network,
        source: AdapterError,
    },
}

/// Exclusive right to sign with a network's vault key
pub struct VaultLease<'a> {
    _guard: MutexGuard<'a, ()>,
}

/// Everything the engine needs to act on one network
pub struct NetworkProfile {
    network: Network,
    adapter: Arc<dyn NetworkAdapter>,
    vault_address: String,
    sweep_destination: String,
    vault_key: SigningKey,
    guard: VaultGuard,
    vault_lock: Mutex<()>,
}

impl NetworkProfile {
    pub fn new(
        adapter: Arc<dyn NetworkAdapter>,
        vault_address: impl Into<String>,
        vault_key: SigningKey,
        policy: ReservePolicy,
    ) -> Self {
        let network = adapter.network();
        let vault_address = vault_address.into();
        Self {
            network,
            adapter,
            sweep_destination: vault_address.clone(),
            vault_address,
            vault_key,
            guard: VaultGuard::new(network, policy),
            vault_lock: Mutex::new(()),
        }
    }

    /// Builder method to send sweeps somewhere other than the vault
    pub fn with_sweep_destination(mut self, destination: impl Into<String>) -> Self {
        self.sweep_destination = destination.into();
        self
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn adapter(&self) -> &dyn NetworkAdapter {
        self.adapter.as_ref()
    }

    pub fn vault_address(&self) -> &str {
        &self.vault_address
    }

    pub fn sweep_destination(&self) -> &str {
        &self.sweep_destination
    }

    pub fn policy(&self) -> &ReservePolicy {
        self.guard.policy()
    }

    /// Wait for exclusive use of the vault key
    pub async fn lease(&self) -> VaultLease<'_> {
        VaultLease {
            _guard: self.vault_lock.lock().await,
        }
    }

    /// Live vault balances
    pub async fn vault_snapshot(&self) -> Result<VaultSnapshot, AdapterError> {
        let settlement_balance = self.adapter.get_token_balance(&self.vault_address).await?;
        let native_balance = self.adapter.get_native_balance(&self.vault_address).await?;
        Ok(VaultSnapshot {
            settlement_balance,
            native_balance,
        })
    }

    /// Run the vault guard against balances read now
    pub async fn authorize_payout(&self, amount: Decimal) -> Result<GuardDecision, VaultGuardError> {
        if amount <= Decimal::ZERO {
            return Ok(self.guard.check_settlement(Decimal::ZERO, amount));
        }
        let snapshot = self.vault_snapshot().await?;
        Ok(self.guard.evaluate(&snapshot, amount))
    }

    pub async fn send_native_from_vault(
        &self,
        _lease: &VaultLease<'_>,
        to: &str,
        amount: Decimal,
    ) -> Result<TxRef, AdapterError> {
        self.adapter.transfer_native(&self.vault_key, to, amount).await
    }

    pub async fn send_token_from_vault(
        &self,
        _lease: &VaultLease<'_>,
        to: &str,
        amount: Decimal,
    ) -> Result<TxRef, AdapterError> {
        self.adapter.transfer_token(&self.vault_key, to, amount).await
    }
}

#[derive(Default)]
pub struct NetworkRegistry {
    profiles: BTreeMap<Network, NetworkProfile>,
}

impl NetworkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to add a network profile
    pub fn with_profile(mut self, profile: NetworkProfile) -> Self {
        self.profiles.insert(profile.network(), profile);
        self
    }

    pub fn get(&self, network: Network) -> Option<&NetworkProfile> {
        self.profiles.get(&network)
    }

    pub fn networks(&self) -> Vec<Network> {
        self.profiles.keys().copied().collect()
    }

    pub fn profiles(&self) -> impl Iterator<Item = &NetworkProfile> {
        self.profiles.values()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Build adapters and vault profiles for every configured network
    pub fn from_config(config: &Config) -> Result<Self, RegistryError> {
        let mut registry = Self::new();

        for (network, section) in config.networks.enabled() {
            let adapter_error = |source| RegistryError::Adapter { network, source };

            let adapter: Arc<dyn NetworkAdapter> = match network.family() {
                NetworkFamily::Evm => Arc::new(
                    EvmAdapter::new(EvmConfig {
                        network,
                        rpc_url: section.rpc_url.clone(),
                        token_contract: section.token_contract(network),
                        confirmations: section.confirmations,
                        confirmation_timeout: section.confirmation_timeout(),
                    })
                    .map_err(adapter_error)?,
                ),
                NetworkFamily::Tron => Arc::new(
                    TronAdapter::new(TronConfig {
                        api_url: section.rpc_url.clone(),
                        api_key: section.api_key.clone(),
                        token_contract: section.token_contract(network),
                        fee_limit_sun: section.fee_limit_sun,
                        confirmation_timeout: section.confirmation_timeout(),
                        ..TronConfig::default()
                    })
                    .map_err(adapter_error)?,
                ),
            };

            let profile = NetworkProfile::new(
                adapter,
                section.vault_address.clone(),
                section.vault_key()?,
                section.reserve_policy(network),
            )
            .with_sweep_destination(section.sweep_destination());

            tracing::info!(
                "[{}] Vault {} (settlement reserve {}, gas reserve {} {})",
                network,
                profile.vault_address(),
                profile.policy().min_settlement_reserve,
                profile.policy().min_gas_reserve,
                network.native_symbol()
            );
            registry = registry.with_profile(profile);
        }

        Ok(registry)
    }
}
