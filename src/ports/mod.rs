//! Ports Layer - Trait definitions for external dependencies
//!
//! This module defines the interfaces (ports) that adapters must implement.
//! Following hexagonal architecture, these traits abstract:
//! - Ledger networks (balances, confirmed transfers)
//! - The backend system of record (wallet and payout status)
//! - The payout trigger channel
//! - Encrypted key handling

pub mod backend;
pub mod keys;
pub mod mocks;
pub mod models;
pub mod network;
pub mod trigger;

pub use backend::{BackendPort, DepositNotice, PayoutOutcome, RequestState, SweepReport};
pub use keys::KeyDecryptor;
pub use models::{AdapterError, BackendError, KeyError, SigningKey, TxRef};
pub use network::NetworkAdapter;
pub use trigger::{BrokerError, TriggerMessage, TriggerSource};
