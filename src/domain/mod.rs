//! Domain Layer - Core settlement rules
//!
//! Pure types and logic with no I/O. All external interactions happen through
//! the ports layer.
//!
//! - `network`: closed set of supported ledgers
//! - `wallet`: temp wallet lifecycle
//! - `payout`: payout triggers and validated requests
//! - `vault_guard`: reserve checks before a payout
//! - `strategy`: strategy key -> channel / API prefix registry
//! - `units`: decimal <-> base unit conversion

pub mod network;
pub mod payout;
pub mod strategy;
pub mod units;
pub mod vault_guard;
pub mod wallet;

pub use network::{Network, NetworkFamily, UnsupportedNetwork};
pub use payout::{InvalidPayout, PayoutKind, PayoutRequest, PayoutTrigger, TriggerParseError};
pub use strategy::{StrategyConfig, StrategyRegistry};
pub use units::{from_base_units, to_base_units, UnitsError};
pub use vault_guard::{DenyReason, GuardDecision, ReservePolicy, VaultGuard, VaultSnapshot};
pub use wallet::{SweepReportStatus, TempWallet, WalletStatus};
