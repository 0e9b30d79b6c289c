//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - EVM: Arbitrum and BSC over JSON-RPC
//! - Tron: TronGrid HTTP API
//! - Backend: REST client for the system of record
//! - Broker: Redis pub/sub payout triggers
//! - Keystore: AES-256-CBC temp wallet key decryption
//! - CLI: Command-line interface definitions

pub mod backend;
pub mod broker;
pub mod cli;
pub mod evm;
pub mod keystore;
pub mod signer;
pub mod tron;

pub use backend::{BackendClient, BackendConfig};
pub use broker::RedisTriggerSource;
pub use cli::CliApp;
pub use evm::{EvmAdapter, EvmConfig};
pub use keystore::AesCbcKeystore;
pub use tron::{TronAdapter, TronConfig};
