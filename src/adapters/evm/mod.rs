//! EVM Adapter
//!
//! Native and ERC-20 balance reads and confirmed transfers over JSON-RPC.

mod client;

pub use client::{EvmAdapter, EvmConfig};
