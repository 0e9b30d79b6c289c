//! Sweep Orchestrator
//!
//! Two steps per temp wallet: make sure it can pay for one token transfer,
//! then move its whole token balance to the network's sweep destination.

use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;

use super::registry::{NetworkProfile, NetworkRegistry};
use crate::domain::{Network, SweepReportStatus};
use crate::ports::{AdapterError, SigningKey, TxRef};

#[derive(Debug, Clone, PartialEq)]
pub enum PrepareOutcome {
    /// The temp wallet already holds the fee reserve
    AlreadyFunded { native_balance: Decimal },
    /// The vault sent the fee reserve
    Funded { tx: TxRef },
}

impl PrepareOutcome {
    pub fn tx(&self) -> Option<&TxRef> {
        match self {
            PrepareOutcome::Funded { tx } => Some(tx),
            PrepareOutcome::AlreadyFunded { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SweepOutcome {
    Swept { tx: TxRef, amount: Decimal },
    NothingToSweep,
}

/// Outcome of a full prepare + sweep run
#[derive(Debug, Clone, PartialEq)]
pub struct SweepResult {
    pub preparation: PrepareOutcome,
    pub sweep: SweepOutcome,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SweepError {
    #[error("Sweep preparation failed: {0}")]
    PrepareFailed(AdapterError),
    #[error("Sweep failed: {source}")]
    SweepFailed {
        preparation_tx: Option<TxRef>,
        source: AdapterError,
    },
}

impl SweepError {
    /// Status reported to the backend for this failure
    pub fn report_status(&self) -> SweepReportStatus {
        match self {
            SweepError::PrepareFailed(_) => SweepReportStatus::SweepPrepFailed,
            SweepError::SweepFailed { .. } => SweepReportStatus::SweepFailed,
        }
    }

    pub fn preparation_tx(&self) -> Option<&TxRef> {
        match self {
            SweepError::PrepareFailed(e) => e.pending_tx(),
            SweepError::SweepFailed { preparation_tx, .. } => preparation_tx.as_ref(),
        }
    }

    /// Submitted sweep transaction whose outcome is unknown
    pub fn pending_sweep_tx(&self) -> Option<&TxRef> {
        match self {
            SweepError::SweepFailed { source, .. } => source.pending_tx(),
            _ => None,
        }
    }

    /// A transaction was accepted but never observed as confirmed
    pub fn is_ambiguous(&self) -> bool {
        match self {
            SweepError::PrepareFailed(e) | SweepError::SweepFailed { source: e, .. } => {
                e.pending_tx().is_some()
            }
        }
    }
}

pub struct SweepOrchestrator {
    networks: Arc<NetworkRegistry>,
}

impl SweepOrchestrator {
    pub fn new(networks: Arc<NetworkRegistry>) -> Self {
        Self { networks }
    }

    fn profile(&self, network: Network) -> Result<&NetworkProfile, AdapterError> {
        self.networks.get(network).ok_or_else(|| {
            AdapterError::AdapterUnavailable(format!("network {} is not configured", network))
        })
    }

    /// Fund the temp wallet's fee reserve from the vault if it is short
    pub async fn prepare(
        &self,
        network: Network,
        temp_address: &str,
    ) -> Result<PrepareOutcome, SweepError> {
        let profile = self.profile(network).map_err(SweepError::PrepareFailed)?;
        let reserve = profile.policy().sweep_fee_reserve;

        let native_balance = profile
            .adapter()
            .get_native_balance(temp_address)
            .await
            .map_err(SweepError::PrepareFailed)?;

        if native_balance >= reserve {
            tracing::info!(
                "[Sweep] {} already funded ({} {} >= {})",
                temp_address,
                native_balance,
                network.native_symbol(),
                reserve
            );
            return Ok(PrepareOutcome::AlreadyFunded { native_balance });
        }

        tracing::info!(
            "[Sweep] Funding {} with {} {} (has {})",
            temp_address,
            reserve,
            network.native_symbol(),
            native_balance
        );
        let lease = profile.lease().await;
        let tx = profile
            .send_native_from_vault(&lease, temp_address, reserve)
            .await
            .map_err(SweepError::PrepareFailed)?;
        drop(lease);

        Ok(PrepareOutcome::Funded { tx })
    }

    /// Move the temp wallet's whole token balance to the sweep destination
    pub async fn sweep(
        &self,
        network: Network,
        temp_key: &SigningKey,
        temp_address: &str,
    ) -> Result<SweepOutcome, AdapterError> {
        let profile = self.profile(network)?;

        let balance = profile.adapter().get_token_balance(temp_address).await?;
        if balance <= Decimal::ZERO {
            tracing::info!("[Sweep] Nothing to sweep from {}", temp_address);
            return Ok(SweepOutcome::NothingToSweep);
        }

        let destination = profile.sweep_destination();
        tracing::info!("[Sweep] Sweeping {} USDT {} -> {}", balance, temp_address, destination);
        let tx = profile
            .adapter()
            .transfer_token(temp_key, destination, balance)
            .await?;

        Ok(SweepOutcome::Swept {
            tx,
            amount: balance,
        })
    }

    /// Prepare then sweep; the sweep is never attempted if preparation fails
    pub async fn execute(
        &self,
        network: Network,
        temp_key: &SigningKey,
        temp_address: &str,
    ) -> Result<SweepResult, SweepError> {
        let preparation = self.prepare(network, temp_address).await?;

        let sweep = self
            .sweep(network, temp_key, temp_address)
            .await
            .map_err(|source| SweepError::SweepFailed {
                preparation_tx: preparation.tx().cloned(),
                source,
            })?;

        Ok(SweepResult { preparation, sweep })
    }
}
