//! Custody Sweeper - deposit sweep and payout settlement engine
//!
//! Watches temp wallets on Arbitrum, BSC and Tron for USDT deposits, sweeps
//! them into the custodial vault and pays out from the vault without breaching
//! its reserves.
//!
//! # Modules
//!
//! - `domain`: Core rules (networks, wallet lifecycle, payouts, VaultGuard)
//! - `ports`: Trait abstractions (NetworkAdapter, BackendPort, TriggerSource, KeyDecryptor)
//! - `adapters`: External implementations (EVM, Tron, backend REST, Redis, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: Sweep orchestrator, deposit monitor and payout dispatcher

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
