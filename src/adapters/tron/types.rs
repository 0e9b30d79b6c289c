//! TronGrid HTTP API types

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct AccountRequest<'a> {
    pub address: &'a str,
    pub visible: bool,
}

/// `/wallet/getaccount` returns `{}` for accounts that were never activated
#[derive(Debug, Deserialize, Default)]
pub struct AccountResponse {
    #[serde(default)]
    pub balance: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ContractCallRequest<'a> {
    pub owner_address: &'a str,
    pub contract_address: &'a str,
    pub function_selector: &'a str,
    pub parameter: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_value: Option<u64>,
    pub visible: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct CallResult {
    #[serde(default)]
    pub result: bool,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `triggerconstantcontract` and `triggersmartcontract`
#[derive(Debug, Deserialize)]
pub struct ContractCallResponse {
    #[serde(default)]
    pub result: Option<CallResult>,
    #[serde(default)]
    pub constant_result: Vec<String>,
    #[serde(default)]
    pub transaction: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct CreateTransactionRequest<'a> {
    pub owner_address: &'a str,
    pub to_address: &'a str,
    pub amount: u64,
    pub visible: bool,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastResponse {
    #[serde(default)]
    pub result: bool,
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransactionInfoRequest<'a> {
    pub value: &'a str,
}

#[derive(Debug, Deserialize, Default)]
pub struct TransactionReceipt {
    #[serde(default)]
    pub result: Option<String>,
}

/// `/wallet/gettransactioninfobyid`; empty until the transaction is in a block
#[derive(Debug, Deserialize, Default)]
pub struct TransactionInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "blockNumber")]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub receipt: Option<TransactionReceipt>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default, rename = "resMessage")]
    pub res_message: Option<String>,
}

/// Final state of a mined transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    Pending,
    Confirmed,
    Failed(String),
}

impl TransactionInfo {
    pub fn outcome(&self) -> TxOutcome {
        if self.id.is_none() || self.block_number.is_none() {
            return TxOutcome::Pending;
        }
        if self.result.as_deref() == Some("FAILED") {
            let message = self
                .res_message
                .as_deref()
                .map(decode_message)
                .unwrap_or_else(|| "FAILED".to_string());
            return TxOutcome::Failed(message);
        }
        // Plain TRX transfers carry no contract result in the receipt
        match self.receipt.as_ref().and_then(|r| r.result.as_deref()) {
            None | Some("SUCCESS") => TxOutcome::Confirmed,
            Some(other) => TxOutcome::Failed(other.to_string()),
        }
    }
}

/// Node error messages are hex-encoded UTF-8
pub fn decode_message(raw: &str) -> String {
    hex::decode(raw)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_info_is_pending() {
        let info: TransactionInfo = serde_json::from_str("{}").unwrap();
        assert_eq!(info.outcome(), TxOutcome::Pending);
    }

    #[test]
    fn test_trc20_success() {
        let info: TransactionInfo = serde_json::from_str(
            r#"{"id":"ab","blockNumber":1,"receipt":{"result":"SUCCESS","energy_usage_total":14650}}"#,
        )
        .unwrap();
        assert_eq!(info.outcome(), TxOutcome::Confirmed);
    }

    #[test]
    fn test_trx_transfer_without_contract_result() {
        let info: TransactionInfo =
            serde_json::from_str(r#"{"id":"ab","blockNumber":7,"receipt":{"net_usage":268}}"#).unwrap();
        assert_eq!(info.outcome(), TxOutcome::Confirmed);
    }

    #[test]
    fn test_out_of_energy() {
        let info: TransactionInfo = serde_json::from_str(
            r#"{"id":"ab","blockNumber":1,"receipt":{"result":"OUT_OF_ENERGY"}}"#,
        )
        .unwrap();
        assert_eq!(info.outcome(), TxOutcome::Failed("OUT_OF_ENERGY".to_string()));
    }

    #[test]
    fn test_failed_with_hex_message() {
        // "REVERT opcode executed"
        let info: TransactionInfo = serde_json::from_str(
            r#"{"id":"ab","blockNumber":1,"result":"FAILED","resMessage":"524556455254206f70636f6465206578656375746564","receipt":{"result":"REVERT"}}"#,
        )
        .unwrap();
        assert_eq!(
            info.outcome(),
            TxOutcome::Failed("REVERT opcode executed".to_string())
        );
    }

    #[test]
    fn test_decode_message_passthrough() {
        assert_eq!(decode_message("not hex"), "not hex");
    }
}
