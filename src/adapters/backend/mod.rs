//! Backend Adapter
//!
//! Implementation of the BackendPort over the backend's REST API.

mod client;
mod types;

pub use client::{BackendClient, BackendConfig};
