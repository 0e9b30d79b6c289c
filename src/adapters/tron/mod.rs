//! Tron Adapter
//!
//! TRX and TRC-20 balance reads and confirmed transfers via the TronGrid
//! full-node HTTP API.

pub mod address;
mod client;
mod types;

pub use client::{TronAdapter, TronConfig};
