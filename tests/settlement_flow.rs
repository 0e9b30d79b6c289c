//! End-to-end deposit and payout flows against the in-memory ports

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;

use custody_sweeper::adapters::AesCbcKeystore;
use custody_sweeper::application::{
    DepositMonitor, DispatchOutcome, MonitorConfig, NetworkProfile, NetworkRegistry,
    PayoutDispatcher,
};
use custody_sweeper::domain::{
    Network, PayoutKind, ReservePolicy, StrategyConfig, SweepReportStatus, TempWallet,
    WalletStatus,
};
use custody_sweeper::ports::mocks::{
    AdapterCall, ChannelTriggerSource, InMemoryBackend, MockNetworkAdapter,
};
use custody_sweeper::ports::{AdapterError, SigningKey, TriggerMessage, TxRef};

const ENCRYPTION_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

const EVM_VAULT: &str = "0xvault";
const EVM_VAULT_KEY: &str = "a1";
const EVM_TEMP: &str = "0xtemp";
const EVM_TEMP_KEY: &str = "b2";

const TRON_VAULT: &str = "TVault";
const TRON_VAULT_KEY: &str = "c3";
const TRON_TEMP: &str = "TTemp";
const TRON_TEMP_KEY: &str = "d4";

fn strategy() -> StrategyConfig {
    StrategyConfig {
        strategy_key: "alpha".to_string(),
        redis_channel: Some("payouts:alpha".to_string()),
        api_prefix: Some("api/alpha".to_string()),
    }
}

fn temp_wallet(id: &str, address: &str, network: &str) -> TempWallet {
    TempWallet {
        id: id.to_string(),
        address: address.to_string(),
        network: network.to_string(),
        status: WalletStatus::PendingDeposit,
        detected_amount: None,
        strategy_key: "alpha".to_string(),
        api_prefix: "/api/alpha/".to_string(),
    }
}

struct Ledgers {
    arbitrum: MockNetworkAdapter,
    tron: MockNetworkAdapter,
}

impl Ledgers {
    fn new() -> Self {
        Self {
            arbitrum: MockNetworkAdapter::new(Network::Arbitrum)
                .with_fee(dec!(0.0002))
                .with_account(EVM_VAULT_KEY, EVM_VAULT)
                .with_account(EVM_TEMP_KEY, EVM_TEMP)
                .with_native_balance(EVM_VAULT, dec!(0.5))
                .with_token_balance(EVM_VAULT, dec!(120)),
            tron: MockNetworkAdapter::new(Network::Tron)
                .with_fee(dec!(2))
                .with_account(TRON_VAULT_KEY, TRON_VAULT)
                .with_account(TRON_TEMP_KEY, TRON_TEMP)
                .with_native_balance(TRON_VAULT, dec!(500))
                .with_token_balance(TRON_VAULT, dec!(1000)),
        }
    }

    fn registry(&self) -> Arc<NetworkRegistry> {
        Arc::new(
            NetworkRegistry::new()
                .with_profile(NetworkProfile::new(
                    Arc::new(self.arbitrum.clone()),
                    EVM_VAULT,
                    SigningKey::new(EVM_VAULT_KEY),
                    ReservePolicy::default_for(Network::Arbitrum),
                ))
                .with_profile(NetworkProfile::new(
                    Arc::new(self.tron.clone()),
                    TRON_VAULT,
                    SigningKey::new(TRON_VAULT_KEY),
                    ReservePolicy::default_for(Network::Tron),
                )),
        )
    }
}

fn monitor_config() -> MonitorConfig {
    MonitorConfig {
        poll_interval: Duration::from_millis(10),
        inter_wallet_delay: Duration::ZERO,
        min_deposit: dec!(0.01),
    }
}

fn payout_message(id: u32, amount: &str, network: &str, target: &str) -> TriggerMessage {
    TriggerMessage {
        channel: "payouts:alpha".to_string(),
        payload: format!(
            r#"{{"type":"daily_payout","payout_id":{},"user_id":9,"target_wallet":"{}","amount":"{}","network":"{}","payout_app":"alpha"}}"#,
            id, target, amount, network
        ),
    }
}

#[tokio::test]
async fn test_deposit_is_detected_and_swept_across_networks() {
    let ledgers = Ledgers::new();
    ledgers.arbitrum.set_token_balance(EVM_TEMP, dec!(12.50));
    ledgers.tron.set_token_balance(TRON_TEMP, dec!(75));

    let keystore = AesCbcKeystore::from_hex(ENCRYPTION_KEY).unwrap();
    let backend = InMemoryBackend::new()
        .with_strategy(strategy())
        .with_wallet(
            temp_wallet("evm-1", EVM_TEMP, "ARBITRUM"),
            Some(&keystore.encrypt(EVM_TEMP_KEY).unwrap()),
        )
        .with_wallet(
            temp_wallet("tron-1", TRON_TEMP, "TRC20"),
            Some(&keystore.encrypt(TRON_TEMP_KEY).unwrap()),
        );

    let monitor = DepositMonitor::new(
        Arc::new(backend.clone()),
        ledgers.registry(),
        Arc::new(keystore),
        monitor_config(),
    );

    // Cycle 1 reports both deposits and moves no funds
    let first = monitor.run_cycle().await.unwrap();
    assert_eq!(first.deposits_reported, 2);
    assert!(ledgers.arbitrum.transfers().is_empty());
    assert!(ledgers.tron.transfers().is_empty());

    // Cycle 2 sweeps both into their vaults
    let second = monitor.run_cycle().await.unwrap();
    assert_eq!(second.swept, 2);

    assert_eq!(ledgers.arbitrum.token_balance(EVM_VAULT), dec!(132.50));
    assert_eq!(ledgers.tron.token_balance(TRON_VAULT), dec!(1075));
    assert_eq!(backend.wallet("evm-1").unwrap().status, WalletStatus::Swept);
    assert_eq!(backend.wallet("tron-1").unwrap().status, WalletStatus::Swept);

    let reports = backend.sweeps();
    assert_eq!(reports.len(), 2);
    for report in &reports {
        assert_eq!(report.status, SweepReportStatus::SweepSuccess);
        assert!(report.sweep_tx.is_some());
        assert!(report.preparation_tx.is_some());
    }

    // Every funded transfer from the vault carried exactly the fee reserve
    assert!(ledgers.arbitrum.transfers().contains(&AdapterCall::TransferNative {
        from: EVM_VAULT.to_string(),
        to: EVM_TEMP.to_string(),
        amount: dec!(0.001),
    }));
    assert!(ledgers.tron.transfers().contains(&AdapterCall::TransferNative {
        from: TRON_VAULT.to_string(),
        to: TRON_TEMP.to_string(),
        amount: dec!(5),
    }));

    // Cycle 3 has nothing left to do
    let third = monitor.run_cycle().await.unwrap();
    assert_eq!(third.wallets, 0);
}

#[tokio::test]
async fn test_payouts_respect_reserves_and_idempotency() {
    let ledgers = Ledgers::new();
    let backend = InMemoryBackend::new().with_strategy(strategy());
    let dispatcher = PayoutDispatcher::new(Arc::new(backend.clone()), ledgers.registry());
    dispatcher.reload_strategies().await.unwrap();

    // 120 in the vault with a 50 reserve: 100 is denied, 50 is allowed
    let denied = dispatcher
        .handle_message(&payout_message(1, "100", "ARBITRUM", "0xuser"))
        .await;
    assert!(matches!(denied, DispatchOutcome::Denied(_)));

    let paid = dispatcher
        .handle_message(&payout_message(2, "50", "ARBITRUM", "0xuser"))
        .await;
    assert!(matches!(paid, DispatchOutcome::Paid(_)));
    assert_eq!(ledgers.arbitrum.token_balance("0xuser"), dec!(50));
    assert_eq!(ledgers.arbitrum.token_balance(EVM_VAULT), dec!(70));

    // Redelivery of a settled payout moves nothing
    let redelivered = dispatcher
        .handle_message(&payout_message(2, "50", "ARBITRUM", "0xuser"))
        .await;
    assert!(matches!(redelivered, DispatchOutcome::AlreadyProcessed(_)));
    assert_eq!(ledgers.arbitrum.transfers().len(), 1);

    let reports = backend.payout_reports();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].0, PayoutKind::Recurring);
    assert!(!reports[0].2.success);
    assert!(reports[1].2.success);
}

#[tokio::test]
async fn test_unconfirmed_payout_is_not_paid_again_on_redelivery() {
    let ledgers = Ledgers::new();
    ledgers.tron.fail_next_transfer(AdapterError::ConfirmationTimeout {
        tx_ref: TxRef::new("0xpending"),
        timeout_secs: 120,
    });
    let backend = InMemoryBackend::new().with_strategy(strategy());

    let dispatcher = PayoutDispatcher::new(Arc::new(backend.clone()), ledgers.registry());
    dispatcher.reload_strategies().await.unwrap();
    let first = dispatcher
        .handle_message(&payout_message(30, "40", "TRC20", "TUser"))
        .await;
    assert_eq!(first, DispatchOutcome::Unconfirmed(TxRef::new("0xpending")));

    // Redelivered to a dispatcher that never saw the first attempt
    let restarted = PayoutDispatcher::new(Arc::new(backend.clone()), ledgers.registry());
    restarted.reload_strategies().await.unwrap();
    let second = restarted
        .handle_message(&payout_message(30, "40", "TRC20", "TUser"))
        .await;
    assert!(matches!(second, DispatchOutcome::AlreadyProcessed(_)));

    assert_eq!(ledgers.tron.transfers().len(), 1);
    let reports = backend.payout_reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].2.success);
    assert_eq!(reports[0].2.tx_ref, Some(TxRef::new("0xpending")));
}

#[tokio::test]
async fn test_dispatcher_consumes_channel_until_stopped() {
    let ledgers = Ledgers::new();
    let backend = InMemoryBackend::new().with_strategy(strategy());
    let dispatcher = Arc::new(PayoutDispatcher::new(
        Arc::new(backend.clone()),
        ledgers.registry(),
    ));
    let (tx, mut source) = ChannelTriggerSource::new();

    let runner = Arc::clone(&dispatcher);
    let handle = tokio::spawn(async move { runner.run(&mut source).await });

    tx.send(payout_message(10, "30", "TRC20", "TUser")).unwrap();
    tx.send(payout_message(10, "30", "TRC20", "TUser")).unwrap();
    tx.send(TriggerMessage {
        channel: "payouts:alpha".to_string(),
        payload: r#"{"type":"ping"}"#.to_string(),
    })
    .unwrap();

    for _ in 0..100 {
        if !backend.payout_reports().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    // Let the duplicate drain before stopping
    tokio::time::sleep(Duration::from_millis(50)).await;
    dispatcher.stop().await;

    let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
    assert!(matches!(result, Ok(Ok(Ok(())))));

    assert_eq!(ledgers.tron.token_balance("TUser"), dec!(30));
    assert_eq!(ledgers.tron.transfers().len(), 1);
    assert_eq!(backend.payout_reports().len(), 1);
}
