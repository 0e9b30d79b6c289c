//! Supported ledger networks
//!
//! The set is closed: every network the engine touches is a variant here, and
//! each maps to exactly one adapter family.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unsupported network: {0}")]
pub struct UnsupportedNetwork(pub String);

/// Adapter family a network belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkFamily {
    /// Account-based EVM chain (JSON-RPC, ERC-20)
    Evm,
    /// Tron (bandwidth/energy resources, TRC-20)
    Tron,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Arbitrum,
    Bsc,
    Tron,
}

impl Network {
    pub const ALL: [Network; 3] = [Network::Arbitrum, Network::Bsc, Network::Tron];

    pub fn family(&self) -> NetworkFamily {
        match self {
            Network::Arbitrum | Network::Bsc => NetworkFamily::Evm,
            Network::Tron => NetworkFamily::Tron,
        }
    }

    /// Identifier used in backend payloads
    pub fn as_backend_str(&self) -> &'static str {
        match self {
            Network::Arbitrum => "ARBITRUM",
            Network::Bsc => "BEP20",
            Network::Tron => "TRC20",
        }
    }

    /// Key used for the `networks.<key>` configuration table
    pub fn config_key(&self) -> &'static str {
        match self {
            Network::Arbitrum => "arbitrum",
            Network::Bsc => "bsc",
            Network::Tron => "tron",
        }
    }

    /// Ticker of the native fee currency
    pub fn native_symbol(&self) -> &'static str {
        match self {
            Network::Arbitrum => "ETH",
            Network::Bsc => "BNB",
            Network::Tron => "TRX",
        }
    }

    /// USDT contract on this network's mainnet
    pub fn default_token_contract(&self) -> &'static str {
        match self {
            Network::Arbitrum => "0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9",
            Network::Bsc => "0x55d398326f99059fF775485246999027B3197955",
            Network::Tron => "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t",
        }
    }

    /// Decimals of the native currency (wei or sun)
    pub fn native_decimals(&self) -> u32 {
        match self {
            Network::Arbitrum | Network::Bsc => 18,
            Network::Tron => 6,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

impl FromStr for Network {
    type Err = UnsupportedNetwork;

    /// Accepts both the backend identifiers (`TRC20`, `BEP20`, `ARBITRUM`) and
    /// the chain names, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arbitrum" | "arb" => Ok(Network::Arbitrum),
            "bep20" | "bsc" | "bnb" => Ok(Network::Bsc),
            "trc20" | "tron" | "trx" => Ok(Network::Tron),
            _ => Err(UnsupportedNetwork(s.to_string())),
        }
    }
}
