//! Backend REST payloads

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Ids arrive as numbers or strings depending on the endpoint
pub fn flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

/// Decimal amounts arrive as strings, numbers or null
pub fn flexible_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let parsed = match Value::deserialize(deserializer)? {
        Value::Null => return Ok(None),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => s.trim().parse::<Decimal>(),
        Value::Number(n) => n.to_string().parse::<Decimal>(),
        other => {
            return Err(serde::de::Error::custom(format!(
                "expected decimal, got {}",
                other
            )))
        }
    };
    parsed.map(Some).map_err(serde::de::Error::custom)
}

/// Entry of `temp-wallets/pending-deposit/`
#[derive(Debug, Deserialize)]
pub struct WalletDto {
    #[serde(deserialize_with = "flexible_id")]
    pub id: String,
    pub address: String,
    #[serde(default)]
    pub network: String,
    pub status: String,
    #[serde(default, deserialize_with = "flexible_decimal")]
    pub detected_amount: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct DepositPayload<'a> {
    pub address: &'a str,
    pub wallet_address: &'a str,
    pub network: &'a str,
    pub amount: String,
    pub tx_hash: Option<&'a str>,
    pub transaction_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct SweepPayload<'a> {
    pub address: &'a str,
    pub wallet_address: &'a str,
    pub status: &'a str,
    pub network: &'a str,
    pub sweep_tx_id: Option<&'a str>,
    pub sweep_tx_hash: Option<&'a str>,
    pub sweep_preparation_tx_hash: Option<&'a str>,
    pub error_message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_swept: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_amount: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusUpdatePayload<'a> {
    pub strategy_key: &'a str,
    pub wallet_id: &'a str,
    pub status: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct EncryptedKeyResponse {
    #[serde(default)]
    pub encrypted_private_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PayoutStatusResponse {
    #[serde(default)]
    pub success: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalStatusResponse {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PayoutUpdatePayload<'a> {
    pub tx_hash: Option<&'a str>,
    pub success: bool,
    pub error_message: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct WithdrawalUpdatePayload<'a> {
    pub tx_hash: Option<&'a str>,
    pub status: &'a str,
    pub error_message: Option<&'a str>,
}
