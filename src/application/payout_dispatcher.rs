//! Payout Dispatcher
//!
//! Consumes payout triggers from the message channel and executes them from
//! the vault. Delivery is at-least-once, so every trigger is checked against
//! the backend before any funds move.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Notify, RwLock};

use super::registry::{NetworkRegistry, VaultGuardError};
use crate::domain::{
    GuardDecision, PayoutKind, PayoutRequest, PayoutTrigger, StrategyConfig, StrategyRegistry,
};
use crate::ports::{
    BackendError, BackendPort, BrokerError, PayoutOutcome, RequestState, TriggerMessage,
    TriggerSource, TxRef,
};

#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
    #[error("No strategy has a payout channel")]
    NoChannels,
}

/// What the dispatcher did with one message
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Not a payout trigger
    Ignored,
    Malformed(String),
    UnknownStrategy,
    /// Backend already closed the request
    AlreadyProcessed(String),
    /// Idempotency check could not be made; event dropped
    StatusUnavailable,
    /// Payload failed validation; reported as failed
    Rejected(String),
    /// Vault guard refused; reported as failed
    Denied(String),
    Paid(TxRef),
    /// Broadcast without confirmation; reported closed with the tx for reconciliation
    Unconfirmed(TxRef),
    /// Transfer failed; reported as failed
    Failed(String),
}

pub struct PayoutDispatcher {
    backend: Arc<dyn BackendPort>,
    networks: Arc<NetworkRegistry>,
    strategies: RwLock<StrategyRegistry>,
    /// Requests this process has put on chain, by (api prefix, kind, id)
    sent: RwLock<HashSet<(String, PayoutKind, String)>>,
    is_running: Arc<RwLock<bool>>,
    shutdown: Arc<Notify>,
}

impl PayoutDispatcher {
    pub fn new(backend: Arc<dyn BackendPort>, networks: Arc<NetworkRegistry>) -> Self {
        Self {
            backend,
            networks,
            strategies: RwLock::new(StrategyRegistry::default()),
            sent: RwLock::new(HashSet::new()),
            is_running: Arc::new(RwLock::new(false)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Replace the strategy registry with the backend's current list
    pub async fn reload_strategies(&self) -> Result<usize, DispatcherError> {
        let strategies = self.backend.list_strategies().await?;
        let mut registry = self.strategies.write().await;
        registry.replace(strategies);
        tracing::info!("[Dispatcher] Loaded {} strategies", registry.len());
        Ok(registry.len())
    }

    /// Subscribe to every strategy channel and handle triggers until stopped
    pub async fn run<S>(&self, source: &mut S) -> Result<(), DispatcherError>
    where
        S: TriggerSource + ?Sized,
    {
        self.reload_strategies().await?;
        let channels = self.strategies.read().await.channels();
        if channels.is_empty() {
            return Err(DispatcherError::NoChannels);
        }

        source.subscribe(&channels).await?;
        *self.is_running.write().await = true;
        tracing::info!("[Dispatcher] Listening on {:?}", channels);

        while *self.is_running.read().await {
            let message = tokio::select! {
                message = source.next() => message,
                _ = self.shutdown.notified() => break,
            };

            let Some(message) = message else {
                tracing::warn!("[Dispatcher] Trigger source closed");
                break;
            };

            let outcome = self.handle_message(&message).await;
            tracing::debug!("[Dispatcher] {} -> {:?}", message.channel, outcome);
        }

        *self.is_running.write().await = false;
        tracing::info!("[Dispatcher] Stopped");
        Ok(())
    }

    pub async fn stop(&self) {
        *self.is_running.write().await = false;
        self.shutdown.notify_one();
        tracing::info!("[Dispatcher] Stop signal received");
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Process one delivery end to end
    pub async fn handle_message(&self, message: &TriggerMessage) -> DispatchOutcome {
        let trigger = match PayoutTrigger::parse(&message.payload) {
            Ok(Some(trigger)) => trigger,
            Ok(None) => return DispatchOutcome::Ignored,
            Err(e) => {
                tracing::warn!("[Dispatcher] Dropping message on {}: {}", message.channel, e);
                return DispatchOutcome::Malformed(e.to_string());
            }
        };

        tracing::info!(
            "[Dispatcher] Received {} {} for user {} on {}",
            trigger.kind,
            trigger.id,
            trigger.user_id.as_deref().unwrap_or("-"),
            message.channel
        );

        let Some(strategy) = self.resolve_strategy(&trigger, &message.channel).await else {
            tracing::error!(
                "[Dispatcher] No strategy with an API prefix for {} {} (payout_app {:?}, channel {})",
                trigger.kind,
                trigger.id,
                trigger.strategy_key,
                message.channel
            );
            return DispatchOutcome::UnknownStrategy;
        };
        let Some(prefix) = strategy.normalized_prefix() else {
            return DispatchOutcome::UnknownStrategy;
        };

        // Covers sends whose report never reached the backend
        let key = (prefix.clone(), trigger.kind, trigger.id.clone());
        if self.sent.read().await.contains(&key) {
            tracing::warn!(
                "[Dispatcher] {} {} was already sent by this process, skipping",
                trigger.kind,
                trigger.id
            );
            return DispatchOutcome::AlreadyProcessed("sent".to_string());
        }

        match self.backend.request_state(&prefix, trigger.kind, &trigger.id).await {
            Ok(RequestState::Pending) => {}
            Ok(RequestState::Processed(status)) => {
                tracing::info!(
                    "[Dispatcher] {} {} already processed ({}), skipping",
                    trigger.kind,
                    trigger.id,
                    status
                );
                return DispatchOutcome::AlreadyProcessed(status);
            }
            Err(e) => {
                tracing::error!(
                    "[Dispatcher] Could not check status of {} {}, dropping event: {}",
                    trigger.kind,
                    trigger.id,
                    e
                );
                return DispatchOutcome::StatusUnavailable;
            }
        }

        let request = match trigger.validate(&strategy.strategy_key) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("[Dispatcher] {} {} rejected: {}", trigger.kind, trigger.id, e);
                self.report(&prefix, trigger.kind, &trigger.id, PayoutOutcome::failed(e.to_string()))
                    .await;
                return DispatchOutcome::Rejected(e.to_string());
            }
        };

        self.execute(&prefix, &request).await
    }

    async fn execute(&self, prefix: &str, request: &PayoutRequest) -> DispatchOutcome {
        let Some(profile) = self.networks.get(request.network) else {
            let error = VaultGuardError::UnknownNetwork(request.network).to_string();
            tracing::error!("[Dispatcher] {} {}: {}", request.kind, request.id, error);
            self.report(prefix, request.kind, &request.id, PayoutOutcome::failed(error.clone()))
                .await;
            return DispatchOutcome::Failed(error);
        };

        // Held across the guard check and the transfer
        let lease = profile.lease().await;

        let decision = match profile.authorize_payout(request.amount).await {
            Ok(decision) => decision,
            Err(e) => {
                drop(lease);
                tracing::error!("[Dispatcher] {} {}: {}", request.kind, request.id, e);
                self.report(prefix, request.kind, &request.id, PayoutOutcome::failed(e.to_string()))
                    .await;
                return DispatchOutcome::Failed(e.to_string());
            }
        };

        if let GuardDecision::Deny(reason) = decision {
            drop(lease);
            let reason = reason.to_string();
            tracing::warn!(
                "[Dispatcher] {} {} of {} USDT on {} denied: {}",
                request.kind,
                request.id,
                request.amount,
                request.network,
                reason
            );
            self.report(prefix, request.kind, &request.id, PayoutOutcome::failed(reason.clone()))
                .await;
            return DispatchOutcome::Denied(reason);
        }

        tracing::info!(
            "[Dispatcher] Sending {} USDT on {} to {} for {} {}",
            request.amount,
            request.network,
            request.recipient,
            request.kind,
            request.id
        );
        let transfer = profile
            .send_token_from_vault(&lease, &request.recipient, request.amount)
            .await;
        drop(lease);

        let on_chain = match &transfer {
            Ok(_) => true,
            Err(e) => e.pending_tx().is_some(),
        };
        if on_chain {
            self.sent
                .write()
                .await
                .insert((prefix.to_string(), request.kind, request.id.clone()));
        }

        match transfer {
            Ok(tx) => {
                tracing::info!("[Dispatcher] {} {} paid in {}", request.kind, request.id, tx);
                let reported = self
                    .report(prefix, request.kind, &request.id, PayoutOutcome::succeeded(tx.clone()))
                    .await;
                if !reported {
                    tracing::error!(
                        critical = true,
                        "[Dispatcher] {} {} was paid in {} but the backend was not updated",
                        request.kind,
                        request.id,
                        tx
                    );
                }
                DispatchOutcome::Paid(tx)
            }
            Err(e) => match e.pending_tx() {
                Some(tx) => {
                    tracing::error!(
                        critical = true,
                        "[Dispatcher] {} {}: transaction {} submitted but not confirmed, reconcile manually",
                        request.kind,
                        request.id,
                        tx
                    );
                    let outcome = PayoutOutcome::unconfirmed(tx.clone(), e.to_string());
                    self.report(prefix, request.kind, &request.id, outcome).await;
                    DispatchOutcome::Unconfirmed(tx.clone())
                }
                None => {
                    tracing::error!(
                        transient = e.is_transient(),
                        "[Dispatcher] {} {} failed: {}",
                        request.kind,
                        request.id,
                        e
                    );
                    self.report(prefix, request.kind, &request.id, PayoutOutcome::failed(e.to_string()))
                        .await;
                    DispatchOutcome::Failed(e.to_string())
                }
            },
        }
    }

    /// Strategy named by the trigger, reloading once for unknown keys,
    /// else the strategy owning the channel
    async fn resolve_strategy(
        &self,
        trigger: &PayoutTrigger,
        channel: &str,
    ) -> Option<StrategyConfig> {
        match trigger.strategy_key.as_deref() {
            Some(key) => {
                if let Some(strategy) = self.strategies.read().await.get(key) {
                    return Some(strategy.clone());
                }
                tracing::info!("[Dispatcher] Unknown strategy '{}', reloading", key);
                if let Err(e) = self.reload_strategies().await {
                    tracing::error!("[Dispatcher] Strategy reload failed: {}", e);
                    return None;
                }
                self.strategies.read().await.get(key).cloned()
            }
            None => self.strategies.read().await.by_channel(channel).cloned(),
        }
    }

    /// PATCH the outcome; returns false if the backend did not accept it
    async fn report(
        &self,
        prefix: &str,
        kind: PayoutKind,
        id: &str,
        outcome: PayoutOutcome,
    ) -> bool {
        match self.backend.report_payout(prefix, kind, id, &outcome).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("[Dispatcher] Could not report {} {}: {}", kind, id, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::registry::NetworkProfile;
    use crate::domain::{Network, ReservePolicy};
    use crate::ports::backend::MockBackendPort;
    use crate::ports::mocks::{AdapterCall, ChannelTriggerSource, InMemoryBackend, MockNetworkAdapter};
    use crate::ports::{AdapterError, SigningKey};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    const VAULT: &str = "0xvault";
    const VAULT_KEY: &str = "aa";
    const USER: &str = "0xuser";

    fn strategy() -> StrategyConfig {
        StrategyConfig {
            strategy_key: "alpha".to_string(),
            redis_channel: Some("payouts:alpha".to_string()),
            api_prefix: Some("/api/alpha/".to_string()),
        }
    }

    fn vault(settlement: rust_decimal::Decimal) -> MockNetworkAdapter {
        MockNetworkAdapter::new(Network::Arbitrum)
            .with_account(VAULT_KEY, VAULT)
            .with_native_balance(VAULT, dec!(1))
            .with_token_balance(VAULT, settlement)
    }

    fn registry(adapter: &MockNetworkAdapter) -> Arc<NetworkRegistry> {
        Arc::new(NetworkRegistry::new().with_profile(NetworkProfile::new(
            Arc::new(adapter.clone()),
            VAULT,
            SigningKey::new(VAULT_KEY),
            ReservePolicy::default_for(Network::Arbitrum),
        )))
    }

    fn payout(id: u32, amount: &str) -> TriggerMessage {
        TriggerMessage {
            channel: "payouts:alpha".to_string(),
            payload: format!(
                r#"{{"type":"daily_payout","payout_id":{},"target_wallet":"{}","amount":"{}","network":"ARBITRUM","payout_app":"alpha"}}"#,
                id, USER, amount
            ),
        }
    }

    async fn dispatcher(backend: &InMemoryBackend, adapter: &MockNetworkAdapter) -> PayoutDispatcher {
        let dispatcher = PayoutDispatcher::new(Arc::new(backend.clone()), registry(adapter));
        dispatcher.reload_strategies().await.unwrap();
        dispatcher
    }

    #[tokio::test]
    async fn test_payout_is_paid_and_reported() {
        let adapter = vault(dec!(500));
        let backend = InMemoryBackend::new().with_strategy(strategy());
        let dispatcher = dispatcher(&backend, &adapter).await;

        let outcome = dispatcher.handle_message(&payout(42, "100")).await;
        assert!(matches!(outcome, DispatchOutcome::Paid(_)));
        assert_eq!(adapter.token_balance(USER), dec!(100));

        let reports = backend.payout_reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, PayoutKind::Recurring);
        assert_eq!(reports[0].1, "42");
        assert!(reports[0].2.success);
        assert!(reports[0].2.tx_ref.is_some());
    }

    #[tokio::test]
    async fn test_processed_request_makes_no_adapter_calls() {
        let adapter = vault(dec!(500));
        let backend = InMemoryBackend::new()
            .with_strategy(strategy())
            .with_request(PayoutKind::Recurring, "42", RequestState::Processed("success".into()));
        let dispatcher = dispatcher(&backend, &adapter).await;

        let outcome = dispatcher.handle_message(&payout(42, "100")).await;
        assert_eq!(outcome, DispatchOutcome::AlreadyProcessed("success".into()));
        assert!(adapter.get_calls().is_empty());
        assert!(backend.payout_reports().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_delivery_pays_once() {
        let adapter = vault(dec!(500));
        let backend = InMemoryBackend::new().with_strategy(strategy());
        let dispatcher = dispatcher(&backend, &adapter).await;

        assert!(matches!(
            dispatcher.handle_message(&payout(7, "25")).await,
            DispatchOutcome::Paid(_)
        ));
        assert!(matches!(
            dispatcher.handle_message(&payout(7, "25")).await,
            DispatchOutcome::AlreadyProcessed(_)
        ));
        assert_eq!(adapter.transfers().len(), 1);
        assert_eq!(adapter.token_balance(USER), dec!(25));
    }

    #[tokio::test]
    async fn test_reserve_breach_is_denied_without_transfer() {
        // 120 in vault, 50 reserve: a 100 payout would leave 20
        let adapter = vault(dec!(120));
        let backend = InMemoryBackend::new().with_strategy(strategy());
        let dispatcher = dispatcher(&backend, &adapter).await;

        let outcome = dispatcher.handle_message(&payout(1, "100")).await;
        assert!(matches!(outcome, DispatchOutcome::Denied(_)));
        assert!(!adapter
            .get_calls()
            .iter()
            .any(|c| matches!(c, AdapterCall::TransferToken { .. })));

        let reports = backend.payout_reports();
        assert!(!reports[0].2.success);
        assert!(reports[0]
            .2
            .error_message
            .as_deref()
            .unwrap()
            .contains("Insufficient settlement funds"));
    }

    #[tokio::test]
    async fn test_invalid_payload_is_reported_failed() {
        let adapter = vault(dec!(500));
        let backend = InMemoryBackend::new().with_strategy(strategy());
        let dispatcher = dispatcher(&backend, &adapter).await;

        let message = TriggerMessage {
            channel: "payouts:alpha".to_string(),
            payload: r#"{"type":"withdraw_request","request_id":"r-1","amount":"10","network":"ARBITRUM","payout_app":"alpha"}"#
                .to_string(),
        };
        let outcome = dispatcher.handle_message(&message).await;
        assert!(matches!(outcome, DispatchOutcome::Rejected(_)));
        assert!(adapter.get_calls().is_empty());

        let reports = backend.payout_reports();
        assert_eq!(reports[0].0, PayoutKind::Withdrawal);
        assert_eq!(reports[0].1, "r-1");
        assert!(!reports[0].2.success);
    }

    #[tokio::test]
    async fn test_unrelated_and_malformed_messages() {
        let adapter = vault(dec!(500));
        let backend = InMemoryBackend::new().with_strategy(strategy());
        let dispatcher = dispatcher(&backend, &adapter).await;

        let unrelated = TriggerMessage {
            channel: "payouts:alpha".to_string(),
            payload: r#"{"type":"heartbeat"}"#.to_string(),
        };
        assert_eq!(dispatcher.handle_message(&unrelated).await, DispatchOutcome::Ignored);

        let garbage = TriggerMessage {
            channel: "payouts:alpha".to_string(),
            payload: "not json".to_string(),
        };
        assert!(matches!(
            dispatcher.handle_message(&garbage).await,
            DispatchOutcome::Malformed(_)
        ));
        assert!(backend.payout_reports().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_strategy_triggers_reload() {
        let adapter = vault(dec!(500));
        let backend = InMemoryBackend::new();
        let dispatcher = dispatcher(&backend, &adapter).await;
        assert_eq!(backend.strategy_fetches(), 1);

        backend.add_strategy(strategy());
        let outcome = dispatcher.handle_message(&payout(3, "10")).await;
        assert!(matches!(outcome, DispatchOutcome::Paid(_)));
        assert_eq!(backend.strategy_fetches(), 2);
    }

    #[tokio::test]
    async fn test_strategy_resolved_by_channel() {
        let adapter = vault(dec!(500));
        let backend = InMemoryBackend::new().with_strategy(strategy());
        let dispatcher = dispatcher(&backend, &adapter).await;

        let message = TriggerMessage {
            channel: "payouts:alpha".to_string(),
            payload: format!(
                r#"{{"type":"daily_payout","payout_id":5,"target_wallet":"{}","amount":"10","network":"ARBITRUM"}}"#,
                USER
            ),
        };
        assert!(matches!(
            dispatcher.handle_message(&message).await,
            DispatchOutcome::Paid(_)
        ));
    }

    #[tokio::test]
    async fn test_status_failure_drops_event() {
        let adapter = vault(dec!(500));
        let backend = InMemoryBackend::new().with_strategy(strategy());
        backend.fail_request_state(true);
        let dispatcher = dispatcher(&backend, &adapter).await;

        assert_eq!(
            dispatcher.handle_message(&payout(9, "10")).await,
            DispatchOutcome::StatusUnavailable
        );
        assert!(adapter.get_calls().is_empty());
        assert!(backend.payout_reports().is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_network_is_reported_failed() {
        let adapter = vault(dec!(500));
        let backend = InMemoryBackend::new().with_strategy(strategy());
        let dispatcher = dispatcher(&backend, &adapter).await;

        let message = TriggerMessage {
            channel: "payouts:alpha".to_string(),
            payload: r#"{"type":"daily_payout","payout_id":11,"target_wallet":"TXyz","amount":"10","network":"TRC20","payout_app":"alpha"}"#
                .to_string(),
        };
        assert!(matches!(
            dispatcher.handle_message(&message).await,
            DispatchOutcome::Failed(_)
        ));
        assert!(!backend.payout_reports()[0].2.success);
    }

    #[tokio::test]
    async fn test_unconfirmed_transfer_reports_tx_without_retry() {
        let adapter = vault(dec!(500));
        adapter.fail_next_transfer(AdapterError::ConfirmationTimeout {
            tx_ref: TxRef::new("0xpending"),
            timeout_secs: 120,
        });
        let backend = InMemoryBackend::new().with_strategy(strategy());
        let dispatcher = dispatcher(&backend, &adapter).await;

        let outcome = dispatcher.handle_message(&payout(12, "10")).await;
        assert_eq!(outcome, DispatchOutcome::Unconfirmed(TxRef::new("0xpending")));
        assert_eq!(adapter.transfers().len(), 1);

        let report = &backend.payout_reports()[0].2;
        assert!(report.success);
        assert_eq!(report.tx_ref, Some(TxRef::new("0xpending")));
        assert!(report.error_message.as_deref().unwrap().contains("not confirmed"));
    }

    #[tokio::test]
    async fn test_unconfirmed_payout_redelivered_after_restart_pays_once() {
        let adapter = vault(dec!(500));
        adapter.fail_next_transfer(AdapterError::ConfirmationTimeout {
            tx_ref: TxRef::new("0xpending"),
            timeout_secs: 120,
        });
        let backend = InMemoryBackend::new().with_strategy(strategy());

        let first = dispatcher(&backend, &adapter).await;
        assert!(matches!(
            first.handle_message(&payout(14, "10")).await,
            DispatchOutcome::Unconfirmed(_)
        ));
        assert!(matches!(
            first.handle_message(&payout(14, "10")).await,
            DispatchOutcome::AlreadyProcessed(_)
        ));

        // A fresh process only has the backend to go on
        let restarted = dispatcher(&backend, &adapter).await;
        assert_eq!(
            restarted.handle_message(&payout(14, "10")).await,
            DispatchOutcome::AlreadyProcessed("success".into())
        );
        assert_eq!(adapter.transfers().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_transfer_leaves_payout_open() {
        let adapter = vault(dec!(500));
        adapter.fail_next_transfer(AdapterError::TransferRejected("nonce too low".into()));
        let backend = InMemoryBackend::new().with_strategy(strategy());
        let dispatcher = dispatcher(&backend, &adapter).await;

        assert!(matches!(
            dispatcher.handle_message(&payout(15, "10")).await,
            DispatchOutcome::Failed(_)
        ));
        assert!(!backend.payout_reports()[0].2.success);
        assert!(matches!(
            dispatcher.handle_message(&payout(15, "10")).await,
            DispatchOutcome::Paid(_)
        ));
    }

    #[tokio::test]
    async fn test_report_failure_does_not_retry_transfer() {
        let adapter = vault(dec!(500));
        let backend = InMemoryBackend::new().with_strategy(strategy());
        backend.fail_reports(true);
        let dispatcher = dispatcher(&backend, &adapter).await;

        let outcome = dispatcher.handle_message(&payout(13, "10")).await;
        assert!(matches!(outcome, DispatchOutcome::Paid(_)));
        assert_eq!(
            dispatcher.handle_message(&payout(13, "10")).await,
            DispatchOutcome::AlreadyProcessed("sent".into())
        );
        assert_eq!(adapter.transfers().len(), 1);
    }

    #[tokio::test]
    async fn test_withdrawal_status_checked_with_expected_kind() {
        let adapter = vault(dec!(500));
        let mut backend = MockBackendPort::new();
        backend
            .expect_list_strategies()
            .returning(|| Ok(vec![strategy()]));
        backend
            .expect_request_state()
            .withf(|prefix, kind, id| {
                prefix == "/api/alpha/" && *kind == PayoutKind::Withdrawal && id == "w-77"
            })
            .times(1)
            .returning(|_, _, _| Ok(RequestState::Processed("completed".into())));
        backend.expect_report_payout().never();

        let dispatcher = PayoutDispatcher::new(Arc::new(backend), registry(&adapter));
        dispatcher.reload_strategies().await.unwrap();

        let message = TriggerMessage {
            channel: "payouts:alpha".to_string(),
            payload: r#"{"type":"withdraw","request_id":"w-77","target_wallet":"0xuser","amount":"5","network":"ARBITRUM","payout_app":"alpha"}"#
                .to_string(),
        };
        assert_eq!(
            dispatcher.handle_message(&message).await,
            DispatchOutcome::AlreadyProcessed("completed".into())
        );
        assert!(adapter.get_calls().is_empty());
    }

    #[tokio::test]
    async fn test_run_subscribes_and_stops() {
        let adapter = vault(dec!(500));
        let backend = InMemoryBackend::new().with_strategy(strategy());
        let dispatcher = Arc::new(PayoutDispatcher::new(Arc::new(backend.clone()), registry(&adapter)));
        let (tx, mut source) = ChannelTriggerSource::new();
        let subscriptions = source.subscriptions();

        let runner = Arc::clone(&dispatcher);
        let handle = tokio::spawn(async move { runner.run(&mut source).await });

        tx.send(payout(21, "10")).unwrap();
        for _ in 0..50 {
            if !backend.payout_reports().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        dispatcher.stop().await;

        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
        assert_eq!(
            *subscriptions.lock().unwrap(),
            vec!["payouts:alpha".to_string()]
        );
        assert_eq!(backend.payout_reports().len(), 1);
    }

    #[tokio::test]
    async fn test_run_without_channels_fails() {
        let adapter = vault(dec!(500));
        let backend = InMemoryBackend::new().with_strategy(StrategyConfig {
            strategy_key: "alpha".to_string(),
            redis_channel: None,
            api_prefix: Some("/api/alpha/".to_string()),
        });
        let dispatcher = PayoutDispatcher::new(Arc::new(backend), registry(&adapter));
        let (_tx, mut source) = ChannelTriggerSource::new();

        assert!(matches!(
            dispatcher.run(&mut source).await,
            Err(DispatcherError::NoChannels)
        ));
    }
}
