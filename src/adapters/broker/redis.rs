//! Redis pub/sub trigger source
//!
//! The first connection is made inside `subscribe` so a bad URL or an
//! unreachable broker fails startup. After that a background task owns the
//! connection, forwards every message into a channel and reconnects with
//! exponential backoff when the stream ends.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::ports::{BrokerError, TriggerMessage, TriggerSource};

/// Reconnection delay base (exponential backoff)
const RECONNECT_BASE_DELAY_MS: u64 = 1000;
/// Maximum reconnection delay
const MAX_RECONNECT_DELAY_MS: u64 = 30000;
/// Messages buffered between the connection task and the dispatcher
const BUFFER_SIZE: usize = 256;

pub struct RedisTriggerSource {
    client: redis::Client,
    rx: Option<mpsc::Receiver<TriggerMessage>>,
    task: Option<JoinHandle<()>>,
}

impl RedisTriggerSource {
    pub fn new(redis_url: &str) -> Result<Self, BrokerError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| BrokerError::ConnectionFailed(format!("{}: {}", redis_url, e)))?;
        Ok(Self {
            client,
            rx: None,
            task: None,
        })
    }
}

async fn connect(client: &redis::Client, channels: &[String]) -> Result<redis::aio::PubSub, BrokerError> {
    let mut pubsub = client
        .get_async_pubsub()
        .await
        .map_err(|e| BrokerError::ConnectionFailed(e.to_string()))?;
    pubsub
        .subscribe(channels)
        .await
        .map_err(|e| BrokerError::SubscribeFailed(e.to_string()))?;
    Ok(pubsub)
}

/// Forward messages until the connection drops. Returns false once the
/// receiving side is gone.
async fn forward(pubsub: redis::aio::PubSub, tx: &mpsc::Sender<TriggerMessage>) -> bool {
    let mut stream = pubsub.into_on_message();
    while let Some(msg) = stream.next().await {
        let channel = msg.get_channel_name().to_string();
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("[Broker] Dropping non-text message on {}: {}", channel, e);
                continue;
            }
        };
        debug!("[Broker] Message on {} ({} bytes)", channel, payload.len());
        if tx.send(TriggerMessage { channel, payload }).await.is_err() {
            return false;
        }
    }
    true
}

async fn run_loop(
    client: redis::Client,
    channels: Vec<String>,
    first: redis::aio::PubSub,
    tx: mpsc::Sender<TriggerMessage>,
) {
    let mut pubsub = Some(first);
    let mut reconnect_attempts = 0u32;

    loop {
        if let Some(conn) = pubsub.take() {
            if !forward(conn, &tx).await {
                debug!("[Broker] Receiver dropped, stopping");
                return;
            }
            warn!("[Broker] Connection lost");
        }

        if tx.is_closed() {
            return;
        }

        reconnect_attempts += 1;
        let delay_ms = std::cmp::min(
            RECONNECT_BASE_DELAY_MS * 2u64.pow(reconnect_attempts.min(10)),
            MAX_RECONNECT_DELAY_MS,
        );
        warn!(
            "[Broker] Reconnecting in {}ms (attempt {})",
            delay_ms, reconnect_attempts
        );

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            _ = tx.closed() => return,
        }

        match connect(&client, &channels).await {
            Ok(conn) => {
                info!("[Broker] Reconnected, subscribed to {}", channels.join(", "));
                reconnect_attempts = 0;
                pubsub = Some(conn);
            }
            Err(e) => error!("[Broker] Reconnect failed: {}", e),
        }
    }
}

#[async_trait]
impl TriggerSource for RedisTriggerSource {
    async fn subscribe(&mut self, channels: &[String]) -> Result<(), BrokerError> {
        if channels.is_empty() {
            return Err(BrokerError::SubscribeFailed("no channels to subscribe to".into()));
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }

        let first = connect(&self.client, channels).await?;
        info!("[Broker] Subscribed to {}", channels.join(", "));

        let (tx, rx) = mpsc::channel(BUFFER_SIZE);
        self.rx = Some(rx);
        self.task = Some(tokio::spawn(run_loop(
            self.client.clone(),
            channels.to_vec(),
            first,
            tx,
        )));
        Ok(())
    }

    async fn next(&mut self) -> Option<TriggerMessage> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }
}

impl Drop for RedisTriggerSource {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_rejected() {
        assert!(matches!(
            RedisTriggerSource::new("not a url"),
            Err(BrokerError::ConnectionFailed(_))
        ));
    }

    #[test]
    fn test_valid_url_accepted_without_connecting() {
        assert!(RedisTriggerSource::new("redis://127.0.0.1:6379").is_ok());
    }

    #[tokio::test]
    async fn test_next_before_subscribe_is_none() {
        let mut source = RedisTriggerSource::new("redis://127.0.0.1:6379").unwrap();
        assert!(source.next().await.is_none());
    }

    #[tokio::test]
    async fn test_subscribe_requires_channels() {
        let mut source = RedisTriggerSource::new("redis://127.0.0.1:6379").unwrap();
        assert!(matches!(
            source.subscribe(&[]).await,
            Err(BrokerError::SubscribeFailed(_))
        ));
    }
}
