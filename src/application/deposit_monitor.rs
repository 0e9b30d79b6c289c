//! Deposit Monitor
//!
//! Polls the backend for temp wallets and drives each one through
//! `pending_deposit -> deposit_detected -> sweep_initiated -> outcome`.
//! Wallets are handled one at a time, in backend order. Writing
//! `sweep_initiated` before touching funds is the crash-recovery marker: a
//! wallet found in that state is left for an operator.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::{Notify, RwLock};

use super::registry::NetworkRegistry;
use super::sweep::{SweepOrchestrator, SweepOutcome};
use crate::config::MonitorSection;
use crate::domain::{StrategyRegistry, SweepReportStatus, TempWallet, WalletStatus};
use crate::ports::{BackendError, BackendPort, DepositNotice, KeyDecryptor, SweepReport};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Could not fetch strategies: {0}")]
    StrategiesUnavailable(BackendError),
}

/// Monitor timing and threshold settings
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub inter_wallet_delay: Duration,
    /// Smallest token balance treated as a deposit
    pub min_deposit: Decimal,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            inter_wallet_delay: Duration::from_millis(500),
            min_deposit: Decimal::new(1, 2),
        }
    }
}

impl From<&MonitorSection> for MonitorConfig {
    fn from(section: &MonitorSection) -> Self {
        Self {
            poll_interval: section.poll_interval(),
            inter_wallet_delay: section.inter_wallet_delay(),
            min_deposit: section.min_deposit,
        }
    }
}

/// What happened to one wallet during a cycle
#[derive(Debug, Clone, PartialEq)]
pub enum WalletOutcome {
    /// Balance below the deposit threshold
    NoDeposit,
    DepositReported(Decimal),
    Swept(Decimal),
    NothingToSweep,
    SweepFailed(SweepReportStatus),
    /// Key could not be obtained or decrypted; wallet marked `error`
    MarkedError,
    /// Found in `sweep_initiated`; needs an operator
    AwaitingIntervention,
    /// Not processed this cycle; retried on the next one
    Skipped(String),
}

/// Per-cycle counts, logged at the end of every cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub strategies: usize,
    pub wallets: usize,
    pub no_deposit: usize,
    pub deposits_reported: usize,
    pub swept: usize,
    pub nothing_to_sweep: usize,
    pub sweep_failed: usize,
    pub prep_failed: usize,
    pub marked_error: usize,
    pub awaiting_intervention: usize,
    pub skipped: usize,
}

impl CycleSummary {
    pub fn record(&mut self, outcome: &WalletOutcome) {
        self.wallets += 1;
        match outcome {
            WalletOutcome::NoDeposit => self.no_deposit += 1,
            WalletOutcome::DepositReported(_) => self.deposits_reported += 1,
            WalletOutcome::Swept(_) => self.swept += 1,
            WalletOutcome::NothingToSweep => self.nothing_to_sweep += 1,
            WalletOutcome::SweepFailed(SweepReportStatus::SweepPrepFailed) => self.prep_failed += 1,
            WalletOutcome::SweepFailed(_) => self.sweep_failed += 1,
            WalletOutcome::MarkedError => self.marked_error += 1,
            WalletOutcome::AwaitingIntervention => self.awaiting_intervention += 1,
            WalletOutcome::Skipped(_) => self.skipped += 1,
        }
    }
}

impl fmt::Display for CycleSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} strategies, {} wallets: {} deposits reported, {} swept, {} nothing to sweep, \
             {} sweep failed, {} prep failed, {} error, {} awaiting intervention, {} skipped, {} idle",
            self.strategies,
            self.wallets,
            self.deposits_reported,
            self.swept,
            self.nothing_to_sweep,
            self.sweep_failed,
            self.prep_failed,
            self.marked_error,
            self.awaiting_intervention,
            self.skipped,
            self.no_deposit
        )
    }
}

pub struct DepositMonitor {
    backend: Arc<dyn BackendPort>,
    networks: Arc<NetworkRegistry>,
    sweeper: SweepOrchestrator,
    keys: Arc<dyn KeyDecryptor>,
    config: MonitorConfig,
    is_running: Arc<RwLock<bool>>,
    shutting_down: Arc<RwLock<bool>>,
    shutdown: Arc<Notify>,
}

impl DepositMonitor {
    pub fn new(
        backend: Arc<dyn BackendPort>,
        networks: Arc<NetworkRegistry>,
        keys: Arc<dyn KeyDecryptor>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            backend,
            sweeper: SweepOrchestrator::new(Arc::clone(&networks)),
            networks,
            keys,
            config,
            is_running: Arc::new(RwLock::new(false)),
            shutting_down: Arc::new(RwLock::new(false)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Run cycles until stopped
    pub async fn run(&self) -> Result<(), MonitorError> {
        if *self.shutting_down.read().await {
            return Ok(());
        }
        *self.is_running.write().await = true;

        tracing::info!(
            "[Monitor] Starting - poll interval {:?}, min deposit {}, networks {:?}",
            self.config.poll_interval,
            self.config.min_deposit,
            self.networks.networks()
        );

        while *self.is_running.read().await {
            match self.run_cycle().await {
                Ok(summary) => tracing::info!("[Monitor] Cycle complete: {}", summary),
                Err(e) => tracing::error!("[Monitor] Cycle aborted: {}", e),
            }

            if !*self.is_running.read().await {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = self.shutdown.notified() => {}
            }
        }

        tracing::info!("[Monitor] Stopped");
        Ok(())
    }

    /// Stop scheduling new wallets; the wallet in progress finishes
    pub async fn stop(&self) {
        *self.is_running.write().await = false;
        *self.shutting_down.write().await = true;
        self.shutdown.notify_one();
        tracing::info!("[Monitor] Stop signal received");
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// One pass over every strategy's pending wallets
    pub async fn run_cycle(&self) -> Result<CycleSummary, MonitorError> {
        tracing::info!("[Monitor] Starting deposit cycle at {}", chrono::Utc::now().to_rfc3339());

        let strategies = StrategyRegistry::new(
            self.backend
                .list_strategies()
                .await
                .map_err(MonitorError::StrategiesUnavailable)?,
        );

        let mut summary = CycleSummary::default();
        if strategies.is_empty() {
            tracing::info!("[Monitor] No active strategies, skipping cycle");
            return Ok(summary);
        }

        for strategy in strategies.with_api_prefix() {
            summary.strategies += 1;

            let wallets = match self.backend.pending_wallets(strategy).await {
                Ok(wallets) => wallets,
                Err(e) => {
                    tracing::error!(
                        "[Monitor] Could not fetch pending wallets for {}: {}",
                        strategy.strategy_key,
                        e
                    );
                    continue;
                }
            };
            if wallets.is_empty() {
                continue;
            }
            tracing::info!(
                "[Monitor] {} pending wallets for {}",
                wallets.len(),
                strategy.strategy_key
            );

            for wallet in &wallets {
                if *self.shutting_down.read().await {
                    tracing::info!("[Monitor] Shutdown requested, not scheduling further wallets");
                    return Ok(summary);
                }
                let outcome = self.process_wallet(wallet).await;
                tracing::debug!("[Monitor] Wallet {} -> {:?}", wallet.id, outcome);
                summary.record(&outcome);
                tokio::time::sleep(self.config.inter_wallet_delay).await;
            }
        }

        Ok(summary)
    }

    /// Advance one wallet by at most one lifecycle step
    pub async fn process_wallet(&self, wallet: &TempWallet) -> WalletOutcome {
        tracing::debug!(
            "[Monitor] Processing wallet {} ({}) status {}",
            wallet.id,
            wallet.strategy_key,
            wallet.status
        );

        match wallet.status {
            WalletStatus::PendingDeposit => self.check_deposit(wallet).await,
            status if status.can_initiate_sweep() => self.sweep_wallet(wallet).await,
            WalletStatus::SweepInitiated => {
                tracing::warn!(
                    "[Monitor] Wallet {} ({}) is still sweep_initiated; leaving it for manual review",
                    wallet.id,
                    wallet.address
                );
                WalletOutcome::AwaitingIntervention
            }
            status => WalletOutcome::Skipped(format!("terminal status {}", status)),
        }
    }

    async fn check_deposit(&self, wallet: &TempWallet) -> WalletOutcome {
        let network = match wallet.network() {
            Ok(network) => network,
            Err(e) => {
                tracing::warn!("[Monitor] Wallet {}: {}", wallet.id, e);
                return WalletOutcome::Skipped(e.to_string());
            }
        };
        let Some(profile) = self.networks.get(network) else {
            tracing::warn!("[Monitor] Wallet {}: network {} is not configured", wallet.id, network);
            return WalletOutcome::Skipped(format!("network {} not configured", network));
        };

        let balance = match profile.adapter().get_token_balance(&wallet.address).await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!(
                    transient = e.is_transient(),
                    "[Monitor] Balance check failed for {} ({}): {}",
                    wallet.address,
                    network,
                    e
                );
                return WalletOutcome::Skipped(e.to_string());
            }
        };

        if balance < self.config.min_deposit {
            return WalletOutcome::NoDeposit;
        }

        tracing::info!(
            "[Monitor] Deposit of {} USDT found on {} ({}), notifying backend",
            balance,
            wallet.address,
            network
        );
        let notice = DepositNotice {
            address: wallet.address.clone(),
            network,
            amount: balance,
            tx_hash: None,
            transaction_id: None,
        };
        match self.backend.notify_deposit(&wallet.api_prefix, &notice).await {
            Ok(()) => WalletOutcome::DepositReported(balance),
            Err(e) => {
                tracing::error!("[Monitor] Deposit notification for {} failed: {}", wallet.address, e);
                WalletOutcome::Skipped(e.to_string())
            }
        }
    }

    async fn sweep_wallet(&self, wallet: &TempWallet) -> WalletOutcome {
        let network = match wallet.network() {
            Ok(network) => network,
            Err(e) => {
                tracing::warn!("[Monitor] Wallet {}: {}", wallet.id, e);
                return WalletOutcome::Skipped(e.to_string());
            }
        };
        // Unconfigured networks never reach the commit; the wallet waits in deposit_detected
        if self.networks.get(network).is_none() {
            tracing::warn!("[Monitor] Wallet {}: network {} is not configured", wallet.id, network);
            return WalletOutcome::Skipped(format!("network {} not configured", network));
        }

        // Commit point: nothing touches funds until this write succeeds
        if let Err(e) = self
            .backend
            .update_wallet_status(&wallet.strategy_key, &wallet.id, WalletStatus::SweepInitiated)
            .await
        {
            tracing::error!(
                "[Monitor] Could not mark wallet {} sweep_initiated, retrying next cycle: {}",
                wallet.id,
                e
            );
            return WalletOutcome::Skipped(e.to_string());
        }
        tracing::info!("[Monitor] Wallet {} marked sweep_initiated", wallet.id);

        let encrypted = match self
            .backend
            .fetch_encrypted_key(&wallet.api_prefix, &wallet.id)
            .await
        {
            Ok(encrypted) => encrypted,
            Err(e) => {
                tracing::error!("[Monitor] Could not fetch key for wallet {}: {}", wallet.id, e);
                return self.mark_error(wallet).await;
            }
        };
        let key = match self.keys.decrypt(&encrypted) {
            Ok(key) => key,
            Err(e) => {
                tracing::error!("[Monitor] Could not decrypt key for wallet {}: {}", wallet.id, e);
                return self.mark_error(wallet).await;
            }
        };

        let result = self.sweeper.execute(network, &key, &wallet.address).await;
        drop(key);

        let detected = wallet.detected_amount;
        let (report, outcome) = match result {
            Ok(result) => {
                let preparation_tx = result.preparation.tx().cloned();
                match result.sweep {
                    SweepOutcome::Swept { tx, amount } => {
                        tracing::info!(
                            "[Monitor] Swept {} USDT from {} in {}",
                            amount,
                            wallet.address,
                            tx
                        );
                        (
                            SweepReport {
                                address: wallet.address.clone(),
                                network,
                                status: SweepReportStatus::SweepSuccess,
                                sweep_tx: Some(tx),
                                preparation_tx,
                                error_message: None,
                                amount_swept: Some(amount),
                                detected_amount: Some(detected.unwrap_or(amount)),
                            },
                            WalletOutcome::Swept(amount),
                        )
                    }
                    SweepOutcome::NothingToSweep => {
                        tracing::warn!(
                            "[Monitor] Wallet {} had a detected deposit but holds no tokens",
                            wallet.id
                        );
                        (
                            SweepReport {
                                address: wallet.address.clone(),
                                network,
                                status: SweepReportStatus::SweepSuccess,
                                sweep_tx: None,
                                preparation_tx,
                                error_message: None,
                                amount_swept: None,
                                detected_amount: detected,
                            },
                            WalletOutcome::NothingToSweep,
                        )
                    }
                }
            }
            Err(e) => {
                let status = e.report_status();
                if e.is_ambiguous() {
                    tracing::error!(
                        critical = true,
                        "[Monitor] Wallet {}: transaction submitted but not confirmed, reconcile manually: {}",
                        wallet.id,
                        e
                    );
                } else {
                    tracing::error!("[Monitor] Wallet {} {}: {}", wallet.id, status.as_str(), e);
                }
                (
                    SweepReport {
                        address: wallet.address.clone(),
                        network,
                        status,
                        sweep_tx: e.pending_sweep_tx().cloned(),
                        preparation_tx: e.preparation_tx().cloned(),
                        error_message: Some(e.to_string()),
                        amount_swept: None,
                        detected_amount: None,
                    },
                    WalletOutcome::SweepFailed(status),
                )
            }
        };

        if let Err(e) = self.backend.notify_sweep(&wallet.api_prefix, &report).await {
            if report.sweep_tx.is_some() || report.preparation_tx.is_some() {
                tracing::error!(
                    critical = true,
                    "[Monitor] Funds moved for wallet {} but the sweep report failed ({}): {:?}",
                    wallet.id,
                    e,
                    report
                );
            } else {
                tracing::error!("[Monitor] Sweep report for wallet {} failed: {}", wallet.id, e);
            }
        }

        outcome
    }

    async fn mark_error(&self, wallet: &TempWallet) -> WalletOutcome {
        if let Err(e) = self
            .backend
            .update_wallet_status(&wallet.strategy_key, &wallet.id, WalletStatus::Error)
            .await
        {
            tracing::error!("[Monitor] Could not mark wallet {} as error: {}", wallet.id, e);
        }
        WalletOutcome::MarkedError
    }
}
