//! CLI Command Definitions
//!
//! Argument parsing for the custody-sweeper binary. Handlers live in `main.rs`.

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

use crate::domain::Network;

/// Custody Sweeper - deposit sweep and payout settlement engine
#[derive(Parser, Debug)]
#[command(
    name = "custody-sweeper",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Deposit sweep and payout settlement engine for EVM and Tron USDT wallets",
    long_about = "custody-sweeper watches temp wallets for USDT deposits, sweeps them into \
                  the custodial vault and executes payouts from the vault while keeping \
                  settlement and gas reserves intact."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        default_value = "config/sweeper.toml"
    )]
    pub config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the deposit monitor
    Monitor(MonitorCmd),

    /// Run the payout dispatcher
    Dispatch(DispatchCmd),

    /// Show vault balances and payout headroom per network
    Status(StatusCmd),

    /// Check whether the vault could fund a payout, without sending anything
    CheckPayout(CheckPayoutCmd),
}

/// Run the deposit monitor
#[derive(Parser, Debug)]
pub struct MonitorCmd {
    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,
}

/// Run the payout dispatcher
#[derive(Parser, Debug)]
pub struct DispatchCmd {}

/// Show vault status
#[derive(Parser, Debug)]
pub struct StatusCmd {
    /// Output format (text, json)
    #[arg(short, long, value_name = "FORMAT", default_value = "text")]
    pub format: String,
}

/// Dry-run the vault guard
#[derive(Parser, Debug)]
pub struct CheckPayoutCmd {
    /// Network (arbitrum, bsc/bep20, tron/trc20)
    #[arg(short, long, value_name = "NETWORK")]
    pub network: Network,

    /// Payout amount in USDT
    #[arg(short, long, value_name = "AMOUNT")]
    pub amount: Decimal,
}
