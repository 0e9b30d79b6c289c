//! Payout trigger port

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BrokerError {
    #[error("Broker connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Subscription failed: {0}")]
    SubscribeFailed(String),
}

/// Raw message delivered on a payout channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerMessage {
    pub channel: String,
    pub payload: String,
}

/// At-least-once stream of payout triggers
#[async_trait]
pub trait TriggerSource: Send {
    /// Start delivering messages published on `channels`
    async fn subscribe(&mut self, channels: &[String]) -> Result<(), BrokerError>;

    /// Next message, or `None` once the source is closed
    async fn next(&mut self) -> Option<TriggerMessage>;
}
