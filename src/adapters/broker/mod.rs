//! Broker Adapter
//!
//! Payout triggers delivered over Redis pub/sub.

mod redis;

pub use self::redis::RedisTriggerSource;
