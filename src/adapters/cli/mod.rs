//! CLI Adapter
//!
//! Command-line interface for the custody sweeper.
//! Uses clap derive macros for argument parsing.

mod commands;

pub use commands::{CheckPayoutCmd, CliApp, Command, DispatchCmd, MonitorCmd, StatusCmd};
