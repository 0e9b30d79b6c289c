//! Backend (system of record) port
//!
//! The backend owns wallet, payout and withdrawal status. Every state change the
//! engine makes goes through one of these calls.

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::models::{BackendError, TxRef};
use crate::domain::{Network, PayoutKind, StrategyConfig, SweepReportStatus, TempWallet, WalletStatus};

/// Deposit observed on a temp wallet
#[derive(Debug, Clone, PartialEq)]
pub struct DepositNotice {
    pub address: String,
    pub network: Network,
    pub amount: Decimal,
    pub tx_hash: Option<String>,
    pub transaction_id: Option<String>,
}

/// Outcome of a sweep attempt
#[derive(Debug, Clone, PartialEq)]
pub struct SweepReport {
    pub address: String,
    pub network: Network,
    pub status: SweepReportStatus,
    pub sweep_tx: Option<TxRef>,
    pub preparation_tx: Option<TxRef>,
    pub error_message: Option<String>,
    pub amount_swept: Option<Decimal>,
    pub detected_amount: Option<Decimal>,
}

/// Idempotency state of a payout or withdrawal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestState {
    /// Still waiting to be executed
    Pending,
    /// Completed or otherwise closed; carries the backend status for logging
    Processed(String),
}

/// Result of a payout execution reported back to the backend
#[derive(Debug, Clone, PartialEq)]
pub struct PayoutOutcome {
    pub success: bool,
    pub tx_ref: Option<TxRef>,
    pub error_message: Option<String>,
}

impl PayoutOutcome {
    pub fn succeeded(tx_ref: TxRef) -> Self {
        Self {
            success: true,
            tx_ref: Some(tx_ref),
            error_message: None,
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            tx_ref: None,
            error_message: Some(error_message.into()),
        }
    }

    /// Broadcast but never confirmed. Closes the request so a redelivered
    /// trigger cannot pay again; the note flags it for reconciliation.
    pub fn unconfirmed(tx_ref: TxRef, note: impl Into<String>) -> Self {
        Self {
            success: true,
            tx_ref: Some(tx_ref),
            error_message: Some(note.into()),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackendPort: Send + Sync {
    /// All configured strategies with their channels and API prefixes
    async fn list_strategies(&self) -> Result<Vec<StrategyConfig>, BackendError>;

    /// Temp wallets the monitor should look at for one strategy
    async fn pending_wallets(
        &self,
        strategy: &StrategyConfig,
    ) -> Result<Vec<TempWallet>, BackendError>;

    /// Report a deposit; the backend moves the wallet to `deposit_detected`
    async fn notify_deposit(
        &self,
        api_prefix: &str,
        notice: &DepositNotice,
    ) -> Result<(), BackendError>;

    /// Encrypted private key of a temp wallet
    async fn fetch_encrypted_key(
        &self,
        api_prefix: &str,
        wallet_id: &str,
    ) -> Result<String, BackendError>;

    /// Report a sweep outcome
    async fn notify_sweep(&self, api_prefix: &str, report: &SweepReport)
        -> Result<(), BackendError>;

    /// Direct status transition (used for `sweep_initiated` and `error`)
    async fn update_wallet_status(
        &self,
        strategy_key: &str,
        wallet_id: &str,
        status: WalletStatus,
    ) -> Result<(), BackendError>;

    /// Idempotency check before executing a payout or withdrawal
    async fn request_state(
        &self,
        api_prefix: &str,
        kind: PayoutKind,
        request_id: &str,
    ) -> Result<RequestState, BackendError>;

    /// Report the execution result of a payout or withdrawal
    async fn report_payout(
        &self,
        api_prefix: &str,
        kind: PayoutKind,
        request_id: &str,
        outcome: &PayoutOutcome,
    ) -> Result<(), BackendError>;
}
