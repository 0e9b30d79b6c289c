//! Custody Sweeper - deposit sweep and payout settlement engine
//!
//! `monitor` and `dispatch` run as separate long-lived processes sharing the
//! same configuration file.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use custody_sweeper::adapters::cli::{CheckPayoutCmd, CliApp, Command, MonitorCmd, StatusCmd};
use custody_sweeper::adapters::{AesCbcKeystore, BackendClient, BackendConfig, RedisTriggerSource};
use custody_sweeper::application::{DepositMonitor, MonitorConfig, NetworkRegistry, PayoutDispatcher};
use custody_sweeper::config::{load_config, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Secrets (vault keys, tokens) come from .env when present
    dotenvy::dotenv().ok();

    let app = CliApp::parse();
    init_logging(app.verbose, app.debug, app.json_logs)?;

    let config = load_config(&app.config)
        .with_context(|| format!("Failed to load configuration from {}", app.config.display()))?;

    match app.command {
        Command::Monitor(cmd) => monitor_command(config, cmd).await,
        Command::Dispatch(_) => dispatch_command(config).await,
        Command::Status(cmd) => status_command(config, cmd).await,
        Command::CheckPayout(cmd) => check_payout_command(config, cmd).await,
    }
}

fn init_logging(verbose: bool, debug: bool, json: bool) -> Result<()> {
    let default_level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).init();
    }
    Ok(())
}

fn backend_client(config: &Config) -> Result<Arc<BackendClient>> {
    let client = BackendClient::new(BackendConfig {
        base_url: config.backend.base_url.clone(),
        api_token: config.backend.api_token.clone(),
        auth_prefix: config.backend.auth_prefix.clone(),
        timeout: Duration::from_secs(config.backend.timeout_secs),
        max_retries: config.backend.max_retries,
    })
    .context("Failed to create backend client")?;
    Ok(Arc::new(client))
}

fn network_registry(config: &Config) -> Result<Arc<NetworkRegistry>> {
    let registry = NetworkRegistry::from_config(config).context("Failed to initialise networks")?;
    Ok(Arc::new(registry))
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {}", e);
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

async fn monitor_command(config: Config, cmd: MonitorCmd) -> Result<()> {
    tracing::info!("Starting deposit monitor...");

    let keystore = AesCbcKeystore::from_hex(config.require_keystore()?)
        .context("Invalid keystore encryption key")?;
    let monitor = Arc::new(DepositMonitor::new(
        backend_client(&config)?,
        network_registry(&config)?,
        Arc::new(keystore),
        MonitorConfig::from(&config.monitor),
    ));

    if cmd.once {
        let summary = monitor.run_cycle().await.context("Deposit cycle failed")?;
        println!("{}", summary);
        return Ok(());
    }

    // In-flight cycle gets its poll interval plus the grace period
    let force_exit_after = config.monitor.poll_interval()
        + Duration::from_secs(config.monitor.shutdown_grace_secs);
    let mon = monitor.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received");
        mon.stop().await;
        tokio::time::sleep(force_exit_after).await;
        tracing::error!("Monitor did not stop within {:?}, forcing exit", force_exit_after);
        std::process::exit(1);
    });

    monitor.run().await?;
    tracing::info!("Deposit monitor stopped");
    Ok(())
}

async fn dispatch_command(config: Config) -> Result<()> {
    tracing::info!("Starting payout dispatcher...");

    let mut source = RedisTriggerSource::new(config.require_broker()?)
        .context("Failed to create Redis client")?;
    let dispatcher = Arc::new(PayoutDispatcher::new(
        backend_client(&config)?,
        network_registry(&config)?,
    ));

    let disp = dispatcher.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received");
        disp.stop().await;
    });

    dispatcher.run(&mut source).await?;
    tracing::info!("Payout dispatcher stopped");
    Ok(())
}

async fn status_command(config: Config, cmd: StatusCmd) -> Result<()> {
    let registry = network_registry(&config)?;
    let mut rows = Vec::new();

    for profile in registry.profiles() {
        let network = profile.network();
        match profile.vault_snapshot().await {
            Ok(snapshot) => rows.push(serde_json::json!({
                "network": network.to_string(),
                "vault": profile.vault_address(),
                "settlement_balance": snapshot.settlement_balance.to_string(),
                "native_balance": snapshot.native_balance.to_string(),
                "native_symbol": network.native_symbol(),
                "payout_headroom": snapshot.payout_headroom(profile.policy()).to_string(),
                "gas_ok": snapshot.native_balance >= profile.policy().min_gas_reserve,
            })),
            Err(e) => rows.push(serde_json::json!({
                "network": network.to_string(),
                "vault": profile.vault_address(),
                "error": e.to_string(),
            })),
        }
    }

    if cmd.format == "json" {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for row in &rows {
        println!(
            "{} vault {}",
            row["network"].as_str().unwrap_or("?"),
            row["vault"].as_str().unwrap_or("?")
        );
        if let Some(error) = row["error"].as_str() {
            println!("  unavailable: {}", error);
            continue;
        }
        println!("  USDT: {}", row["settlement_balance"].as_str().unwrap_or("?"));
        println!(
            "  {}: {}{}",
            row["native_symbol"].as_str().unwrap_or("native"),
            row["native_balance"].as_str().unwrap_or("?"),
            if row["gas_ok"].as_bool().unwrap_or(false) { "" } else { "  (below gas reserve)" }
        );
        println!("  Headroom: {}", row["payout_headroom"].as_str().unwrap_or("?"));
    }
    Ok(())
}

async fn check_payout_command(config: Config, cmd: CheckPayoutCmd) -> Result<()> {
    let registry = network_registry(&config)?;
    let profile = registry
        .get(cmd.network)
        .with_context(|| format!("Network {} is not configured", cmd.network))?;

    let decision = profile
        .authorize_payout(cmd.amount)
        .await
        .context("Vault guard check failed")?;

    if decision.is_allowed() {
        println!("ALLOW {} USDT on {}", cmd.amount, cmd.network);
    } else {
        println!("DENY {} USDT on {}: {}", cmd.amount, cmd.network, decision.reason());
    }
    Ok(())
}
