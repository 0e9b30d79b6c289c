//! In-memory port implementations that record calls and allow controlled
//! responses. Used by unit tests and the integration suite.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use super::backend::{BackendPort, DepositNotice, PayoutOutcome, RequestState, SweepReport};
use super::keys::KeyDecryptor;
use super::models::{AdapterError, BackendError, KeyError, SigningKey, TxRef};
use super::network::NetworkAdapter;
use super::trigger::{BrokerError, TriggerMessage, TriggerSource};
use crate::domain::{
    Network, PayoutKind, StrategyConfig, SweepReportStatus, TempWallet, WalletStatus,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Adapter call as recorded by [`MockNetworkAdapter`]
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterCall {
    NativeBalance(String),
    TokenBalance(String),
    TransferNative { from: String, to: String, amount: Decimal },
    TransferToken { from: String, to: String, amount: Decimal },
}

impl AdapterCall {
    pub fn is_transfer(&self) -> bool {
        matches!(
            self,
            AdapterCall::TransferNative { .. } | AdapterCall::TransferToken { .. }
        )
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    native: HashMap<String, Decimal>,
    token: HashMap<String, Decimal>,
    accounts: HashMap<String, String>,
    calls: Vec<AdapterCall>,
    transfer_failures: VecDeque<AdapterError>,
    read_failure: Option<AdapterError>,
    tx_counter: u64,
}

/// Ledger simulation for one network. Transfers move balances between
/// addresses and charge `fee_per_transfer` in native currency to the sender.
#[derive(Debug, Clone)]
pub struct MockNetworkAdapter {
    network: Network,
    fee_per_transfer: Decimal,
    state: Arc<Mutex<LedgerState>>,
}

impl MockNetworkAdapter {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            fee_per_transfer: Decimal::ZERO,
            state: Arc::new(Mutex::new(LedgerState::default())),
        }
    }

    /// Builder method to charge a native fee on every transfer
    pub fn with_fee(mut self, fee: Decimal) -> Self {
        self.fee_per_transfer = fee;
        self
    }

    /// Builder method to register a signing key and its address
    pub fn with_account(self, key_hex: &str, address: &str) -> Self {
        lock(&self.state)
            .accounts
            .insert(key_hex.trim_start_matches("0x").to_string(), address.to_string());
        self
    }

    pub fn with_native_balance(self, address: &str, amount: Decimal) -> Self {
        self.set_native_balance(address, amount);
        self
    }

    pub fn with_token_balance(self, address: &str, amount: Decimal) -> Self {
        self.set_token_balance(address, amount);
        self
    }

    pub fn set_native_balance(&self, address: &str, amount: Decimal) {
        lock(&self.state).native.insert(address.to_string(), amount);
    }

    pub fn set_token_balance(&self, address: &str, amount: Decimal) {
        lock(&self.state).token.insert(address.to_string(), amount);
    }

    pub fn native_balance(&self, address: &str) -> Decimal {
        lock(&self.state).native.get(address).copied().unwrap_or_default()
    }

    pub fn token_balance(&self, address: &str) -> Decimal {
        lock(&self.state).token.get(address).copied().unwrap_or_default()
    }

    /// Queue an error for the next transfer
    pub fn fail_next_transfer(&self, error: AdapterError) {
        lock(&self.state).transfer_failures.push_back(error);
    }

    /// Make every balance read fail until cleared
    pub fn fail_reads(&self, error: Option<AdapterError>) {
        lock(&self.state).read_failure = error;
    }

    /// Get all recorded calls
    pub fn get_calls(&self) -> Vec<AdapterCall> {
        lock(&self.state).calls.clone()
    }

    pub fn transfers(&self) -> Vec<AdapterCall> {
        self.get_calls().into_iter().filter(|c| c.is_transfer()).collect()
    }

    fn transfer(
        &self,
        key: &SigningKey,
        to: &str,
        amount: Decimal,
        token: bool,
    ) -> Result<TxRef, AdapterError> {
        let mut state = lock(&self.state);
        let from = state
            .accounts
            .get(key.expose_hex())
            .cloned()
            .ok_or_else(|| AdapterError::InvalidKey("unknown signing key".to_string()))?;

        state.calls.push(if token {
            AdapterCall::TransferToken { from: from.clone(), to: to.to_string(), amount }
        } else {
            AdapterCall::TransferNative { from: from.clone(), to: to.to_string(), amount }
        });

        if let Some(err) = state.transfer_failures.pop_front() {
            return Err(err);
        }

        let native_from = state.native.get(&from).copied().unwrap_or_default();
        let native_needed = if token { self.fee_per_transfer } else { amount + self.fee_per_transfer };
        if native_from < native_needed {
            return Err(AdapterError::TransferRejected(format!(
                "insufficient funds for gas: {} has {}, needs {}",
                from, native_from, native_needed
            )));
        }

        if token {
            let token_from = state.token.get(&from).copied().unwrap_or_default();
            if token_from < amount {
                return Err(AdapterError::TransferRejected(format!(
                    "transfer amount exceeds balance: {} < {}",
                    token_from, amount
                )));
            }
            state.token.insert(from.clone(), token_from - amount);
            *state.token.entry(to.to_string()).or_default() += amount;
        } else {
            *state.native.entry(to.to_string()).or_default() += amount;
        }
        state.native.insert(from, native_from - native_needed);

        state.tx_counter += 1;
        Ok(TxRef::new(format!("0xmock{:04}", state.tx_counter)))
    }
}

#[async_trait]
impl NetworkAdapter for MockNetworkAdapter {
    fn network(&self) -> Network {
        self.network
    }

    async fn get_native_balance(&self, address: &str) -> Result<Decimal, AdapterError> {
        let mut state = lock(&self.state);
        state.calls.push(AdapterCall::NativeBalance(address.to_string()));
        if let Some(err) = state.read_failure.clone() {
            return Err(err);
        }
        Ok(state.native.get(address).copied().unwrap_or_default())
    }

    async fn get_token_balance(&self, address: &str) -> Result<Decimal, AdapterError> {
        let mut state = lock(&self.state);
        state.calls.push(AdapterCall::TokenBalance(address.to_string()));
        if let Some(err) = state.read_failure.clone() {
            return Err(err);
        }
        Ok(state.token.get(address).copied().unwrap_or_default())
    }

    async fn transfer_native(
        &self,
        key: &SigningKey,
        to: &str,
        amount: Decimal,
    ) -> Result<TxRef, AdapterError> {
        self.transfer(key, to, amount, false)
    }

    async fn transfer_token(
        &self,
        key: &SigningKey,
        to: &str,
        amount: Decimal,
    ) -> Result<TxRef, AdapterError> {
        self.transfer(key, to, amount, true)
    }
}

#[derive(Debug, Default)]
struct BackendState {
    strategies: Vec<StrategyConfig>,
    wallets: Vec<TempWallet>,
    encrypted_keys: HashMap<String, String>,
    requests: HashMap<(PayoutKind, String), RequestState>,
    deposits: Vec<DepositNotice>,
    sweeps: Vec<SweepReport>,
    status_updates: Vec<(String, WalletStatus)>,
    payout_reports: Vec<(PayoutKind, String, PayoutOutcome)>,
    strategy_fetches: usize,
    fail_status_updates: bool,
    fail_reports: bool,
    fail_request_state: bool,
}

/// Stateful backend: notifications move wallets and requests through their
/// lifecycle the way the real system of record does.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<BackendState>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(self, strategy: StrategyConfig) -> Self {
        lock(&self.state).strategies.push(strategy);
        self
    }

    pub fn with_wallet(self, wallet: TempWallet, encrypted_key: Option<&str>) -> Self {
        {
            let mut state = lock(&self.state);
            if let Some(key) = encrypted_key {
                state.encrypted_keys.insert(wallet.id.clone(), key.to_string());
            }
            state.wallets.push(wallet);
        }
        self
    }

    pub fn with_request(self, kind: PayoutKind, id: &str, request_state: RequestState) -> Self {
        lock(&self.state)
            .requests
            .insert((kind, id.to_string()), request_state);
        self
    }

    pub fn add_strategy(&self, strategy: StrategyConfig) {
        lock(&self.state).strategies.push(strategy);
    }

    pub fn fail_status_updates(&self, fail: bool) {
        lock(&self.state).fail_status_updates = fail;
    }

    pub fn fail_reports(&self, fail: bool) {
        lock(&self.state).fail_reports = fail;
    }

    pub fn fail_request_state(&self, fail: bool) {
        lock(&self.state).fail_request_state = fail;
    }

    pub fn wallet(&self, id: &str) -> Option<TempWallet> {
        lock(&self.state).wallets.iter().find(|w| w.id == id).cloned()
    }

    pub fn deposits(&self) -> Vec<DepositNotice> {
        lock(&self.state).deposits.clone()
    }

    pub fn sweeps(&self) -> Vec<SweepReport> {
        lock(&self.state).sweeps.clone()
    }

    pub fn status_updates(&self) -> Vec<(String, WalletStatus)> {
        lock(&self.state).status_updates.clone()
    }

    pub fn payout_reports(&self) -> Vec<(PayoutKind, String, PayoutOutcome)> {
        lock(&self.state).payout_reports.clone()
    }

    pub fn strategy_fetches(&self) -> usize {
        lock(&self.state).strategy_fetches
    }

    fn unavailable() -> BackendError {
        BackendError::Unavailable("connection refused".to_string())
    }
}

#[async_trait]
impl BackendPort for InMemoryBackend {
    async fn list_strategies(&self) -> Result<Vec<StrategyConfig>, BackendError> {
        let mut state = lock(&self.state);
        state.strategy_fetches += 1;
        Ok(state.strategies.clone())
    }

    async fn pending_wallets(
        &self,
        strategy: &StrategyConfig,
    ) -> Result<Vec<TempWallet>, BackendError> {
        Ok(lock(&self.state)
            .wallets
            .iter()
            .filter(|w| w.strategy_key == strategy.strategy_key && !w.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn notify_deposit(
        &self,
        _api_prefix: &str,
        notice: &DepositNotice,
    ) -> Result<(), BackendError> {
        let mut state = lock(&self.state);
        let wallet = state
            .wallets
            .iter_mut()
            .find(|w| w.address == notice.address)
            .ok_or_else(|| BackendError::NotFound(notice.address.clone()))?;
        wallet.status = WalletStatus::DepositDetected;
        wallet.detected_amount = Some(notice.amount);
        state.deposits.push(notice.clone());
        Ok(())
    }

    async fn fetch_encrypted_key(
        &self,
        _api_prefix: &str,
        wallet_id: &str,
    ) -> Result<String, BackendError> {
        lock(&self.state)
            .encrypted_keys
            .get(wallet_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("encrypted key for {}", wallet_id)))
    }

    async fn notify_sweep(
        &self,
        _api_prefix: &str,
        report: &SweepReport,
    ) -> Result<(), BackendError> {
        let mut state = lock(&self.state);
        if state.fail_reports {
            return Err(Self::unavailable());
        }
        if let Some(wallet) = state.wallets.iter_mut().find(|w| w.address == report.address) {
            wallet.status = match report.status {
                SweepReportStatus::SweepSuccess => WalletStatus::Swept,
                SweepReportStatus::SweepPrepFailed => WalletStatus::SweepPrepFailed,
                SweepReportStatus::SweepFailed => WalletStatus::SweepFailed,
            };
        }
        state.sweeps.push(report.clone());
        Ok(())
    }

    async fn update_wallet_status(
        &self,
        _strategy_key: &str,
        wallet_id: &str,
        status: WalletStatus,
    ) -> Result<(), BackendError> {
        let mut state = lock(&self.state);
        if state.fail_status_updates {
            return Err(Self::unavailable());
        }
        let wallet = state
            .wallets
            .iter_mut()
            .find(|w| w.id == wallet_id)
            .ok_or_else(|| BackendError::NotFound(wallet_id.to_string()))?;
        wallet.status = status;
        state.status_updates.push((wallet_id.to_string(), status));
        Ok(())
    }

    async fn request_state(
        &self,
        _api_prefix: &str,
        kind: PayoutKind,
        request_id: &str,
    ) -> Result<RequestState, BackendError> {
        let state = lock(&self.state);
        if state.fail_request_state {
            return Err(Self::unavailable());
        }
        Ok(state
            .requests
            .get(&(kind, request_id.to_string()))
            .cloned()
            .unwrap_or(RequestState::Pending))
    }

    async fn report_payout(
        &self,
        _api_prefix: &str,
        kind: PayoutKind,
        request_id: &str,
        outcome: &PayoutOutcome,
    ) -> Result<(), BackendError> {
        let mut state = lock(&self.state);
        if state.fail_reports {
            return Err(Self::unavailable());
        }
        // Same closing rules as the backend's status endpoints: a payout stays
        // open until reported successful, a withdrawal closes on any report
        let key = (kind, request_id.to_string());
        match kind {
            PayoutKind::Recurring if outcome.success => {
                state.requests.insert(key, RequestState::Processed("success".to_string()));
            }
            PayoutKind::Recurring => {}
            PayoutKind::Withdrawal => {
                let status = if outcome.success { "success" } else { "failed" };
                state.requests.insert(key, RequestState::Processed(status.to_string()));
            }
        }
        state
            .payout_reports
            .push((kind, request_id.to_string(), outcome.clone()));
        Ok(())
    }
}

/// Trigger source fed through an in-process channel
#[derive(Debug)]
pub struct ChannelTriggerSource {
    rx: mpsc::UnboundedReceiver<TriggerMessage>,
    subscribed: Arc<Mutex<Vec<String>>>,
}

impl ChannelTriggerSource {
    pub fn new() -> (mpsc::UnboundedSender<TriggerMessage>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                rx,
                subscribed: Arc::new(Mutex::new(Vec::new())),
            },
        )
    }

    /// Handle to inspect subscriptions after the source has been moved
    pub fn subscriptions(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.subscribed)
    }
}

#[async_trait]
impl TriggerSource for ChannelTriggerSource {
    async fn subscribe(&mut self, channels: &[String]) -> Result<(), BrokerError> {
        lock(&self.subscribed).extend(channels.iter().cloned());
        Ok(())
    }

    async fn next(&mut self) -> Option<TriggerMessage> {
        self.rx.recv().await
    }
}

/// Decryptor backed by a fixed ciphertext -> key table
#[derive(Debug, Clone, Default)]
pub struct StaticKeyDecryptor {
    keys: HashMap<String, String>,
}

impl StaticKeyDecryptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, encrypted: &str, key_hex: &str) -> Self {
        self.keys.insert(encrypted.to_string(), key_hex.to_string());
        self
    }
}

impl KeyDecryptor for StaticKeyDecryptor {
    fn decrypt(&self, encrypted: &str) -> Result<SigningKey, KeyError> {
        self.keys
            .get(encrypted)
            .map(|k| SigningKey::new(k.clone()))
            .ok_or(KeyError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_mock_adapter_moves_balances() {
        let adapter = MockNetworkAdapter::new(Network::Tron)
            .with_fee(dec!(1))
            .with_account("aa", "TFrom")
            .with_native_balance("TFrom", dec!(10))
            .with_token_balance("TFrom", dec!(25));

        let tx = adapter
            .transfer_token(&SigningKey::new("aa"), "TTo", dec!(25))
            .await
            .unwrap();
        assert_eq!(tx, TxRef::new("0xmock0001"));
        assert_eq!(adapter.token_balance("TFrom"), Decimal::ZERO);
        assert_eq!(adapter.token_balance("TTo"), dec!(25));
        assert_eq!(adapter.native_balance("TFrom"), dec!(9));
        assert_eq!(adapter.transfers().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_adapter_rejects_without_gas() {
        let adapter = MockNetworkAdapter::new(Network::Bsc)
            .with_fee(dec!(0.001))
            .with_account("bb", "0xtemp")
            .with_token_balance("0xtemp", dec!(5));

        let err = adapter
            .transfer_token(&SigningKey::new("bb"), "0xvault", dec!(5))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::TransferRejected(_)));
        assert_eq!(adapter.token_balance("0xtemp"), dec!(5));
    }

    #[tokio::test]
    async fn test_backend_deposit_flips_status() {
        let backend = InMemoryBackend::new().with_wallet(
            TempWallet {
                id: "1".into(),
                address: "TAddr".into(),
                network: "TRC20".into(),
                status: WalletStatus::PendingDeposit,
                detected_amount: None,
                strategy_key: "alpha".into(),
                api_prefix: "/api/alpha/".into(),
            },
            None,
        );

        backend
            .notify_deposit(
                "/api/alpha/",
                &DepositNotice {
                    address: "TAddr".into(),
                    network: Network::Tron,
                    amount: dec!(3),
                    tx_hash: None,
                    transaction_id: None,
                },
            )
            .await
            .unwrap();

        let wallet = backend.wallet("1").unwrap();
        assert_eq!(wallet.status, WalletStatus::DepositDetected);
        assert_eq!(wallet.detected_amount, Some(dec!(3)));
    }

    #[tokio::test]
    async fn test_backend_request_closing_rules() {
        let backend = InMemoryBackend::new();
        let prefix = "/api/alpha/";

        backend
            .report_payout(prefix, PayoutKind::Recurring, "1", &PayoutOutcome::failed("boom"))
            .await
            .unwrap();
        assert_eq!(
            backend.request_state(prefix, PayoutKind::Recurring, "1").await.unwrap(),
            RequestState::Pending
        );

        backend
            .report_payout(
                prefix,
                PayoutKind::Recurring,
                "1",
                &PayoutOutcome::unconfirmed(TxRef::new("0xabc"), "not confirmed"),
            )
            .await
            .unwrap();
        assert_eq!(
            backend.request_state(prefix, PayoutKind::Recurring, "1").await.unwrap(),
            RequestState::Processed("success".into())
        );

        backend
            .report_payout(prefix, PayoutKind::Withdrawal, "w-1", &PayoutOutcome::failed("boom"))
            .await
            .unwrap();
        assert_eq!(
            backend.request_state(prefix, PayoutKind::Withdrawal, "w-1").await.unwrap(),
            RequestState::Processed("failed".into())
        );
    }

    #[tokio::test]
    async fn test_channel_trigger_source() {
        let (tx, mut source) = ChannelTriggerSource::new();
        source.subscribe(&["payouts".to_string()]).await.unwrap();
        tx.send(TriggerMessage {
            channel: "payouts".into(),
            payload: "{}".into(),
        })
        .unwrap();
        drop(tx);

        assert_eq!(source.next().await.unwrap().channel, "payouts");
        assert!(source.next().await.is_none());
        assert_eq!(*source.subscriptions().lock().unwrap(), vec!["payouts".to_string()]);
    }
}
