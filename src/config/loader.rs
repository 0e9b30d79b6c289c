//! Configuration Loader
//!
//! Layers an optional TOML file under `SWEEPER_*` environment variables and
//! validates the result. Secrets (vault keys) never live in the file: each
//! network names the environment variable that holds its vault key.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::domain::{Network, NetworkFamily, ReservePolicy};
use crate::ports::SigningKey;

/// Environment variable prefix, e.g. `SWEEPER_BACKEND__API_TOKEN`
pub const ENV_PREFIX: &str = "SWEEPER";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub backend: BackendSection,
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub keystore: KeystoreSection,
    #[serde(default)]
    pub networks: NetworksSection,
}

/// Backend REST API section
#[derive(Clone, Deserialize)]
pub struct BackendSection {
    /// Root URL of the backend, e.g. `http://localhost:8000`
    pub base_url: String,
    /// Bearer token for worker endpoints
    pub api_token: String,
    #[serde(default = "default_auth_prefix")]
    pub auth_prefix: String,
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl fmt::Debug for BackendSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSection")
            .field("base_url", &self.base_url)
            .field("api_token", &"***")
            .field("auth_prefix", &self.auth_prefix)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// Deposit monitor section
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSection {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_inter_wallet_delay")]
    pub inter_wallet_delay_ms: u64,
    /// Smallest token balance treated as a deposit
    #[serde(default = "default_min_deposit")]
    pub min_deposit: Decimal,
    /// Extra time granted to an in-flight cycle on shutdown
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            inter_wallet_delay_ms: default_inter_wallet_delay(),
            min_deposit: default_min_deposit(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl MonitorSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn inter_wallet_delay(&self) -> Duration {
        Duration::from_millis(self.inter_wallet_delay_ms)
    }
}

/// Payout trigger broker section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrokerSection {
    #[serde(default)]
    pub redis_url: Option<String>,
}

/// Temp wallet key decryption section
#[derive(Clone, Default, Deserialize)]
pub struct KeystoreSection {
    /// 32-byte AES key as 64 hex characters
    #[serde(default)]
    pub encryption_key: Option<String>,
}

impl fmt::Debug for KeystoreSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeystoreSection")
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Per-network tables; a missing table disables the network
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworksSection {
    #[serde(default)]
    pub arbitrum: Option<NetworkSection>,
    #[serde(default)]
    pub bsc: Option<NetworkSection>,
    #[serde(default)]
    pub tron: Option<NetworkSection>,
}

impl NetworksSection {
    /// Configured networks in declaration order
    pub fn enabled(&self) -> Vec<(Network, &NetworkSection)> {
        Network::ALL
            .iter()
            .filter_map(|&network| self.get(network).map(|section| (network, section)))
            .collect()
    }

    pub fn get(&self, network: Network) -> Option<&NetworkSection> {
        match network {
            Network::Arbitrum => self.arbitrum.as_ref(),
            Network::Bsc => self.bsc.as_ref(),
            Network::Tron => self.tron.as_ref(),
        }
    }
}

/// One network's endpoint, vault and reserve settings
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSection {
    /// JSON-RPC endpoint (EVM) or full node HTTP API (Tron)
    pub rpc_url: String,
    /// TronGrid API key
    #[serde(default)]
    pub api_key: Option<String>,
    /// Settlement token contract; defaults to mainnet USDT
    #[serde(default)]
    pub token_contract: Option<String>,
    pub vault_address: String,
    /// Name of the environment variable holding the vault private key
    pub vault_key_env: String,
    /// Where sweeps are sent; defaults to the vault
    #[serde(default)]
    pub sweep_destination: Option<String>,
    #[serde(default)]
    pub min_settlement_reserve: Option<Decimal>,
    #[serde(default)]
    pub min_gas_reserve: Option<Decimal>,
    #[serde(default)]
    pub sweep_fee_reserve: Option<Decimal>,
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
    /// Blocks to wait for on EVM networks
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    /// Max TRX burned per TRC-20 call, in sun
    #[serde(default = "default_fee_limit_sun")]
    pub fee_limit_sun: u64,
}

impl NetworkSection {
    pub fn token_contract(&self, network: Network) -> String {
        self.token_contract
            .clone()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| network.default_token_contract().to_string())
    }

    pub fn sweep_destination(&self) -> &str {
        self.sweep_destination
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(&self.vault_address)
    }

    /// Network defaults overridden by whatever the table sets
    pub fn reserve_policy(&self, network: Network) -> ReservePolicy {
        let defaults = ReservePolicy::default_for(network);
        ReservePolicy {
            min_settlement_reserve: self
                .min_settlement_reserve
                .unwrap_or(defaults.min_settlement_reserve),
            min_gas_reserve: self.min_gas_reserve.unwrap_or(defaults.min_gas_reserve),
            sweep_fee_reserve: self.sweep_fee_reserve.unwrap_or(defaults.sweep_fee_reserve),
        }
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    /// Read the vault key from the environment variable this table names
    pub fn vault_key(&self) -> Result<SigningKey, ConfigError> {
        match std::env::var(&self.vault_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(SigningKey::new(key.trim())),
            _ => Err(ConfigError::MissingSecret(self.vault_key_env.clone())),
        }
    }
}

fn default_auth_prefix() -> String {
    "/api/auth/".to_string()
}

fn default_backend_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_poll_interval() -> u64 {
    30
}

fn default_inter_wallet_delay() -> u64 {
    500
}

fn default_min_deposit() -> Decimal {
    Decimal::new(1, 2)
}

fn default_shutdown_grace() -> u64 {
    5
}

fn default_confirmation_timeout() -> u64 {
    120
}

fn default_confirmations() -> u64 {
    1
}

fn default_fee_limit_sun() -> u64 {
    100_000_000
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Environment variable {0} is not set")]
    MissingSecret(String),
}

/// Load configuration from an optional TOML file plus `SWEEPER_*` variables
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = shellexpand::tilde(&path.as_ref().to_string_lossy()).to_string();

    let config: Config = config::Config::builder()
        .add_source(
            config::File::with_name(&path)
                .format(config::FileFormat::Toml)
                .required(false),
        )
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    config.validate()?;
    Ok(config)
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Backend
        reqwest::Url::parse(&self.backend.base_url).map_err(|e| {
            ConfigError::ValidationError(format!(
                "backend.base_url '{}' is not a valid URL: {}",
                self.backend.base_url, e
            ))
        })?;

        if self.backend.api_token.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "backend.api_token cannot be empty".to_string(),
            ));
        }

        if self.backend.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "backend.timeout_secs must be > 0".to_string(),
            ));
        }

        // Monitor
        if self.monitor.poll_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "monitor.poll_interval_secs must be > 0".to_string(),
            ));
        }

        if self.monitor.min_deposit <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(format!(
                "monitor.min_deposit must be > 0, got {}",
                self.monitor.min_deposit
            )));
        }

        // Keystore
        if let Some(key) = self.keystore.encryption_key.as_deref() {
            let key = key.trim();
            if key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ConfigError::ValidationError(
                    "keystore.encryption_key must be 64 hex characters".to_string(),
                ));
            }
        }

        // Networks
        let enabled = self.networks.enabled();
        if enabled.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one [networks.<arbitrum|bsc|tron>] table is required".to_string(),
            ));
        }

        for (network, section) in enabled {
            section.validate(network)?;
        }

        Ok(())
    }

    /// Redis URL, required by the dispatcher
    pub fn require_broker(&self) -> Result<&str, ConfigError> {
        self.broker
            .redis_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                ConfigError::ValidationError("broker.redis_url is required for dispatch".to_string())
            })
    }

    /// Encryption key, required by the monitor
    pub fn require_keystore(&self) -> Result<&str, ConfigError> {
        self.keystore
            .encryption_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                ConfigError::ValidationError(
                    "keystore.encryption_key is required for monitor".to_string(),
                )
            })
    }
}

impl NetworkSection {
    fn validate(&self, network: Network) -> Result<(), ConfigError> {
        let context = |field: &str| format!("networks.{}.{}", network.config_key(), field);

        reqwest::Url::parse(&self.rpc_url).map_err(|e| {
            ConfigError::ValidationError(format!(
                "{} '{}' is not a valid URL: {}",
                context("rpc_url"),
                self.rpc_url,
                e
            ))
        })?;

        validate_address(network, &self.vault_address)
            .map_err(|e| ConfigError::ValidationError(format!("{}: {}", context("vault_address"), e)))?;
        validate_address(network, &self.token_contract(network))
            .map_err(|e| ConfigError::ValidationError(format!("{}: {}", context("token_contract"), e)))?;
        if let Some(destination) = self.sweep_destination.as_deref() {
            validate_address(network, destination).map_err(|e| {
                ConfigError::ValidationError(format!("{}: {}", context("sweep_destination"), e))
            })?;
        }

        if self.vault_key_env.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be empty",
                context("vault_key_env")
            )));
        }

        let policy = self.reserve_policy(network);
        for (field, value) in [
            ("min_settlement_reserve", policy.min_settlement_reserve),
            ("min_gas_reserve", policy.min_gas_reserve),
            ("sweep_fee_reserve", policy.sweep_fee_reserve),
        ] {
            if value < Decimal::ZERO {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be >= 0, got {}",
                    context(field),
                    value
                )));
            }
        }

        if self.confirmation_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(format!(
                "{} must be > 0",
                context("confirmation_timeout_secs")
            )));
        }

        Ok(())
    }
}

fn validate_address(network: Network, address: &str) -> Result<(), String> {
    match network.family() {
        NetworkFamily::Evm => address
            .trim()
            .parse::<alloy::primitives::Address>()
            .map(|_| ())
            .map_err(|e| format!("'{}' is not an EVM address: {}", address, e)),
        NetworkFamily::Tron => crate::adapters::tron::address::decode_base58(address)
            .map(|_| ())
            .map_err(|e| e.to_string()),
    }
}
