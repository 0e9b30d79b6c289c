//! Temp wallet lifecycle
//!
//! A temp wallet is an ephemeral receiving address owned by the backend. The
//! engine only observes it and drives transitions through backend calls; it
//! never creates or deletes one.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::network::Network;

/// Lifecycle status as stored by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletStatus {
    PendingDeposit,
    #[serde(alias = "deposit_received")]
    DepositDetected,
    SweepInitiated,
    Swept,
    SweepFailed,
    SweepPrepFailed,
    Error,
}

impl WalletStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletStatus::PendingDeposit => "pending_deposit",
            WalletStatus::DepositDetected => "deposit_detected",
            WalletStatus::SweepInitiated => "sweep_initiated",
            WalletStatus::Swept => "swept",
            WalletStatus::SweepFailed => "sweep_failed",
            WalletStatus::SweepPrepFailed => "sweep_prep_failed",
            WalletStatus::Error => "error",
        }
    }

    /// Terminal states belong to the backend and are never revisited
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WalletStatus::Swept
                | WalletStatus::SweepFailed
                | WalletStatus::SweepPrepFailed
                | WalletStatus::Error
        )
    }

    /// Only a detected deposit may be committed to `sweep_initiated`.
    pub fn can_initiate_sweep(&self) -> bool {
        matches!(self, WalletStatus::DepositDetected)
    }
}

impl fmt::Display for WalletStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_deposit" => Ok(WalletStatus::PendingDeposit),
            "deposit_detected" | "deposit_received" => Ok(WalletStatus::DepositDetected),
            "sweep_initiated" => Ok(WalletStatus::SweepInitiated),
            "swept" => Ok(WalletStatus::Swept),
            "sweep_failed" => Ok(WalletStatus::SweepFailed),
            "sweep_prep_failed" => Ok(WalletStatus::SweepPrepFailed),
            "error" => Ok(WalletStatus::Error),
            other => Err(format!("unknown wallet status: {}", other)),
        }
    }
}

/// Outcome status sent with notify-sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepReportStatus {
    SweepSuccess,
    SweepPrepFailed,
    SweepFailed,
}

impl SweepReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepReportStatus::SweepSuccess => "sweep_success",
            SweepReportStatus::SweepPrepFailed => "sweep_prep_failed",
            SweepReportStatus::SweepFailed => "sweep_failed",
        }
    }
}

/// Temp wallet as seen by the engine.
///
/// `network` is kept raw so a wallet on an unsupported network can still be
/// logged and skipped instead of failing the whole batch.
#[derive(Debug, Clone, PartialEq)]
pub struct TempWallet {
    pub id: String,
    pub address: String,
    pub network: String,
    pub status: WalletStatus,
    pub detected_amount: Option<Decimal>,
    pub strategy_key: String,
    pub api_prefix: String,
}

impl TempWallet {
    pub fn network(&self) -> Result<Network, super::network::UnsupportedNetwork> {
        self.network.parse()
    }
}
