//! Payout triggers and validated payout requests

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::network::Network;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayoutKind {
    /// Scheduled strategy payout (`daily_payout*` messages)
    Recurring,
    /// User-initiated withdrawal (`withdraw*` messages)
    Withdrawal,
}

impl PayoutKind {
    /// Classify a trigger by its `type` field; unrelated messages yield `None`
    pub fn from_message_type(message_type: &str) -> Option<Self> {
        if message_type.starts_with("daily_payout") {
            Some(PayoutKind::Recurring)
        } else if message_type.starts_with("withdraw") {
            Some(PayoutKind::Withdrawal)
        } else {
            None
        }
    }
}

impl fmt::Display for PayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayoutKind::Recurring => f.write_str("payout"),
            PayoutKind::Withdrawal => f.write_str("withdrawal"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TriggerParseError {
    #[error("Malformed trigger payload: {0}")]
    Malformed(String),
    #[error("Trigger of type '{0}' carries no request id")]
    MissingId(String),
}

/// Reasons a trigger cannot become a payout; reported back to the backend
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvalidPayout {
    #[error("Missing network")]
    MissingNetwork,
    #[error("Missing recipient address")]
    MissingRecipient,
    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

#[derive(Debug, Deserialize)]
struct RawTrigger {
    #[serde(rename = "type")]
    message_type: String,
    #[serde(default)]
    payout_id: Option<Value>,
    #[serde(default)]
    request_id: Option<Value>,
    #[serde(default)]
    user_id: Option<Value>,
    #[serde(default)]
    target_wallet: Option<String>,
    #[serde(default)]
    amount: Option<Value>,
    #[serde(default)]
    network: Option<String>,
    #[serde(default)]
    payout_app: Option<String>,
}

/// Decoded trigger message, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct PayoutTrigger {
    pub kind: PayoutKind,
    pub id: String,
    pub user_id: Option<String>,
    pub target_wallet: Option<String>,
    pub amount: Option<String>,
    pub network: Option<String>,
    pub strategy_key: Option<String>,
}

/// Ids and amounts arrive either as JSON numbers or strings
fn scalar_to_string(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl PayoutTrigger {
    /// Decode a raw channel message. Messages of an unrelated type return `Ok(None)`.
    pub fn parse(payload: &str) -> Result<Option<Self>, TriggerParseError> {
        let raw: RawTrigger = serde_json::from_str(payload)
            .map_err(|e| TriggerParseError::Malformed(e.to_string()))?;

        let Some(kind) = PayoutKind::from_message_type(&raw.message_type) else {
            return Ok(None);
        };

        let id = match kind {
            PayoutKind::Recurring => scalar_to_string(raw.payout_id),
            PayoutKind::Withdrawal => scalar_to_string(raw.request_id),
        }
        .ok_or_else(|| TriggerParseError::MissingId(raw.message_type.clone()))?;

        Ok(Some(Self {
            kind,
            id,
            user_id: scalar_to_string(raw.user_id),
            target_wallet: non_empty(raw.target_wallet),
            amount: scalar_to_string(raw.amount),
            network: non_empty(raw.network),
            strategy_key: non_empty(raw.payout_app),
        }))
    }

    /// Validate into an executable request
    pub fn validate(&self, strategy_key: &str) -> Result<PayoutRequest, InvalidPayout> {
        let network_raw = self.network.as_deref().ok_or(InvalidPayout::MissingNetwork)?;
        let recipient = self
            .target_wallet
            .clone()
            .ok_or(InvalidPayout::MissingRecipient)?;
        let network = Network::from_str(network_raw)
            .map_err(|_| InvalidPayout::UnsupportedNetwork(network_raw.to_string()))?;

        let amount_raw = self
            .amount
            .as_deref()
            .ok_or_else(|| InvalidPayout::InvalidAmount("missing".to_string()))?;
        let amount = Decimal::from_str(amount_raw)
            .map_err(|_| InvalidPayout::InvalidAmount(amount_raw.to_string()))?;
        if amount <= Decimal::ZERO {
            return Err(InvalidPayout::InvalidAmount(amount_raw.to_string()));
        }

        Ok(PayoutRequest {
            id: self.id.clone(),
            kind: self.kind,
            recipient,
            amount,
            network,
            strategy_key: strategy_key.to_string(),
        })
    }
}

/// A payout ready for the vault guard and transfer
#[derive(Debug, Clone, PartialEq)]
pub struct PayoutRequest {
    pub id: String,
    pub kind: PayoutKind,
    pub recipient: String,
    pub amount: Decimal,
    pub network: Network,
    pub strategy_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_recurring_payout() {
        let payload = r#"{"type":"daily_payout","payout_id":42,"user_id":7,
            "target_wallet":"TXYZ","amount":"15.25","network":"TRC20","payout_app":"alpha"}"#;
        let trigger = PayoutTrigger::parse(payload).unwrap().unwrap();
        assert_eq!(trigger.kind, PayoutKind::Recurring);
        assert_eq!(trigger.id, "42");
        assert_eq!(trigger.strategy_key.as_deref(), Some("alpha"));

        let request = trigger.validate("alpha").unwrap();
        assert_eq!(request.amount, dec!(15.25));
        assert_eq!(request.network, Network::Tron);
    }

    #[test]
    fn test_parse_withdrawal_numeric_amount() {
        let payload = r#"{"type":"withdrawal_request","request_id":"r-9",
            "target_wallet":"0xabc","amount":100.5,"network":"ARBITRUM","payout_app":"beta"}"#;
        let trigger = PayoutTrigger::parse(payload).unwrap().unwrap();
        assert_eq!(trigger.kind, PayoutKind::Withdrawal);
        assert_eq!(trigger.id, "r-9");
        assert_eq!(trigger.validate("beta").unwrap().amount, dec!(100.5));
    }

    #[test]
    fn test_unrelated_type_is_skipped() {
        let payload = r#"{"type":"heartbeat"}"#;
        assert_eq!(PayoutTrigger::parse(payload).unwrap(), None);
    }

    #[test]
    fn test_missing_id() {
        let payload = r#"{"type":"daily_payout","amount":"1"}"#;
        assert!(matches!(
            PayoutTrigger::parse(payload),
            Err(TriggerParseError::MissingId(_))
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            PayoutTrigger::parse("not json"),
            Err(TriggerParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_missing_network_and_recipient() {
        let no_network = PayoutTrigger::parse(
            r#"{"type":"daily_payout","payout_id":1,"target_wallet":"T1","amount":"5"}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(no_network.validate("s"), Err(InvalidPayout::MissingNetwork));

        let no_recipient = PayoutTrigger::parse(
            r#"{"type":"daily_payout","payout_id":1,"network":"BEP20","amount":"5"}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(no_recipient.validate("s"), Err(InvalidPayout::MissingRecipient));
    }

    #[test]
    fn test_non_positive_amount() {
        let trigger = PayoutTrigger::parse(
            r#"{"type":"daily_payout","payout_id":1,"target_wallet":"T1","network":"TRC20","amount":"0"}"#,
        )
        .unwrap()
        .unwrap();
        assert!(matches!(trigger.validate("s"), Err(InvalidPayout::InvalidAmount(_))));
    }
}
