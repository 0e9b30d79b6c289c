//! Backend REST client
//!
//! Bearer-token HTTP client for the system of record. Transient failures
//! (429, 5xx, transport) are retried with backoff up to `max_retries`; every
//! other response is mapped onto `BackendError` for the caller to act on.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use super::types::{
    DepositPayload, EncryptedKeyResponse, PayoutStatusResponse, PayoutUpdatePayload,
    StatusUpdatePayload, SweepPayload, WalletDto, WithdrawalStatusResponse,
    WithdrawalUpdatePayload,
};
use crate::domain::{PayoutKind, StrategyConfig, TempWallet, WalletStatus};
use crate::ports::{
    BackendError, BackendPort, DepositNotice, PayoutOutcome, RequestState, SweepReport,
};

/// Backend client configuration
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Root of the backend API, e.g. `http://localhost:8000`
    pub base_url: String,
    pub api_token: String,
    /// Prefix of the shared auth endpoints
    pub auth_prefix: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_token: String::new(),
            auth_prefix: "/api/auth/".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    config: BackendConfig,
    http: Client,
}

impl BackendClient {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    /// Join the base URL with an absolute or prefix-relative path
    fn url(&self, path: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    fn auth_path(&self, endpoint: &str) -> String {
        let prefix = self.config.auth_prefix.trim_end_matches('/');
        format!("{}/{}", prefix, endpoint)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        if self.config.api_token.is_empty() {
            req
        } else {
            req.bearer_auth(&self.config.api_token)
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<reqwest::Response, BackendError> {
        let req = self.authorize(req);
        let response = self
            .execute_with_retry(|| async {
                req.try_clone()
                    .ok_or_else(|| BackendError::Unavailable("Failed to clone request".into()))?
                    .send()
                    .await
                    .map_err(|e| BackendError::Unavailable(e.to_string()))
            })
            .await?;
        check_status(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let url = self.url(path);
        tracing::debug!("GET {}", url);
        let response = self.send(self.http.get(&url)).await?;
        response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("{}: {}", url, e)))
    }

    async fn post_json<B: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), BackendError> {
        let url = self.url(path);
        tracing::debug!("POST {}", url);
        self.send(self.http.post(&url).json(body)).await.map(|_| ())
    }

    async fn patch_json<B: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), BackendError> {
        let url = self.url(path);
        tracing::debug!("PATCH {}", url);
        self.send(self.http.patch(&url).json(body)).await.map(|_| ())
    }

    /// Execute request with retry on rate limiting, server errors and transport failures
    async fn execute_with_retry<F, Fut>(
        &self,
        request_fn: F,
    ) -> Result<reqwest::Response, BackendError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, BackendError>>,
    {
        let attempts = self.config.max_retries.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            let is_last = attempt + 1 == attempts;
            match request_fn().await {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        last_error = Some(BackendError::Unavailable("Rate limit exceeded".into()));
                        if !is_last {
                            let backoff = Duration::from_secs(2u64.pow(attempt + 1));
                            tracing::warn!(
                                "Backend rate limited (429), backing off for {:?} (attempt {}/{})",
                                backoff,
                                attempt + 1,
                                attempts
                            );
                            tokio::time::sleep(backoff).await;
                        }
                        continue;
                    }

                    if status.is_server_error() {
                        let body = response.text().await.unwrap_or_default();
                        last_error = Some(BackendError::Unavailable(format!(
                            "Server error {}: {}",
                            status, body
                        )));
                        if !is_last {
                            tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1)))
                                .await;
                        }
                        continue;
                    }

                    return Ok(response);
                }
                Err(e) => {
                    tracing::debug!("Backend request failed (attempt {}/{}): {}", attempt + 1, attempts, e);
                    last_error = Some(e);
                    if !is_last {
                        tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1))).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| BackendError::Unavailable("Max retries exceeded".into())))
    }
}

/// Map a non-retryable response onto `BackendError`
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, url, body))
}

fn classify_status(status: StatusCode, url: String, body: String) -> BackendError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Unauthorized,
        StatusCode::NOT_FOUND => BackendError::NotFound(url),
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            BackendError::Unavailable(format!("{}: {}", s, body))
        }
        s => BackendError::Rejected {
            status: s.as_u16(),
            body,
        },
    }
}

fn into_temp_wallet(dto: WalletDto, strategy_key: &str, api_prefix: &str) -> Option<TempWallet> {
    let status = match dto.status.parse::<WalletStatus>() {
        Ok(status) => status,
        Err(e) => {
            tracing::warn!("Skipping wallet {}: {}", dto.id, e);
            return None;
        }
    };
    Some(TempWallet {
        id: dto.id,
        address: dto.address,
        network: dto.network,
        status,
        detected_amount: dto.detected_amount,
        strategy_key: strategy_key.to_string(),
        api_prefix: api_prefix.to_string(),
    })
}

#[async_trait]
impl BackendPort for BackendClient {
    async fn list_strategies(&self) -> Result<Vec<StrategyConfig>, BackendError> {
        self.get_json(&self.auth_path("strategies/list/")).await
    }

    async fn pending_wallets(
        &self,
        strategy: &StrategyConfig,
    ) -> Result<Vec<TempWallet>, BackendError> {
        let prefix = strategy.normalized_prefix().ok_or_else(|| {
            BackendError::InvalidResponse(format!(
                "strategy {} has no api_prefix",
                strategy.strategy_key
            ))
        })?;

        let wallets: Vec<WalletDto> = self
            .get_json(&format!("{}temp-wallets/pending-deposit/", prefix))
            .await?;

        Ok(wallets
            .into_iter()
            .filter_map(|dto| into_temp_wallet(dto, &strategy.strategy_key, &prefix))
            .collect())
    }

    async fn notify_deposit(
        &self,
        api_prefix: &str,
        notice: &DepositNotice,
    ) -> Result<(), BackendError> {
        let payload = DepositPayload {
            address: &notice.address,
            wallet_address: &notice.address,
            network: notice.network.as_backend_str(),
            amount: notice.amount.to_string(),
            tx_hash: notice.tx_hash.as_deref(),
            transaction_id: notice.transaction_id.as_deref(),
        };
        self.post_json(&format!("{}temp-wallets/notify-deposit/", api_prefix), &payload)
            .await
    }

    async fn fetch_encrypted_key(
        &self,
        api_prefix: &str,
        wallet_id: &str,
    ) -> Result<String, BackendError> {
        let response: EncryptedKeyResponse = self
            .get_json(&format!("{}temp-wallets/{}/encrypted-key/", api_prefix, wallet_id))
            .await?;

        response
            .encrypted_private_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| BackendError::NotFound(format!("encrypted key for wallet {}", wallet_id)))
    }

    async fn notify_sweep(
        &self,
        api_prefix: &str,
        report: &SweepReport,
    ) -> Result<(), BackendError> {
        let sweep_tx = report.sweep_tx.as_ref().map(|tx| tx.as_str());
        let payload = SweepPayload {
            address: &report.address,
            wallet_address: &report.address,
            status: report.status.as_str(),
            network: report.network.as_backend_str(),
            sweep_tx_id: sweep_tx,
            sweep_tx_hash: sweep_tx,
            sweep_preparation_tx_hash: report.preparation_tx.as_ref().map(|tx| tx.as_str()),
            error_message: report.error_message.as_deref(),
            amount_swept: report.amount_swept.map(|a| a.to_string()),
            detected_amount: report.detected_amount.map(|a| a.to_string()),
        };
        self.post_json(&format!("{}temp-wallets/notify-sweep/", api_prefix), &payload)
            .await
    }

    async fn update_wallet_status(
        &self,
        strategy_key: &str,
        wallet_id: &str,
        status: WalletStatus,
    ) -> Result<(), BackendError> {
        let payload = StatusUpdatePayload {
            strategy_key,
            wallet_id,
            status: status.as_str(),
        };
        self.post_json(&self.auth_path("wallets/update-status/"), &payload)
            .await
    }

    async fn request_state(
        &self,
        api_prefix: &str,
        kind: PayoutKind,
        request_id: &str,
    ) -> Result<RequestState, BackendError> {
        match kind {
            PayoutKind::Recurring => {
                let response: PayoutStatusResponse = self
                    .get_json(&format!("{}payouts/{}/status/", api_prefix, request_id))
                    .await?;
                Ok(payout_state(&response))
            }
            PayoutKind::Withdrawal => {
                let response: WithdrawalStatusResponse = self
                    .get_json(&format!("{}withdrawals/{}/status/", api_prefix, request_id))
                    .await?;
                Ok(withdrawal_state(&response))
            }
        }
    }

    async fn report_payout(
        &self,
        api_prefix: &str,
        kind: PayoutKind,
        request_id: &str,
        outcome: &PayoutOutcome,
    ) -> Result<(), BackendError> {
        match kind {
            PayoutKind::Recurring => {
                self.patch_json(
                    &format!("{}payouts/{}/update/", api_prefix, request_id),
                    &payout_update(outcome),
                )
                .await
            }
            PayoutKind::Withdrawal => {
                self.patch_json(
                    &format!("{}withdrawals/{}/update_status/", api_prefix, request_id),
                    &withdrawal_update(outcome),
                )
                .await
            }
        }
    }
}

fn payout_update(outcome: &PayoutOutcome) -> PayoutUpdatePayload<'_> {
    PayoutUpdatePayload {
        tx_hash: outcome.tx_ref.as_ref().map(|tx| tx.as_str()),
        success: outcome.success,
        error_message: outcome.error_message.as_deref(),
    }
}

fn withdrawal_update(outcome: &PayoutOutcome) -> WithdrawalUpdatePayload<'_> {
    WithdrawalUpdatePayload {
        tx_hash: outcome.tx_ref.as_ref().map(|tx| tx.as_str()),
        status: if outcome.success { "success" } else { "failed" },
        error_message: outcome.error_message.as_deref(),
    }
}

/// A recurring payout is closed once the backend marks it successful
fn payout_state(response: &PayoutStatusResponse) -> RequestState {
    if response.success == Some(true) {
        RequestState::Processed("success".to_string())
    } else {
        RequestState::Pending
    }
}

/// A withdrawal is actionable only while `pending`
fn withdrawal_state(response: &WithdrawalStatusResponse) -> RequestState {
    match response.status.as_deref().map(str::trim) {
        Some(status) if status.eq_ignore_ascii_case("pending") => RequestState::Pending,
        Some(status) => RequestState::Processed(status.to_string()),
        None => RequestState::Processed("unknown".to_string()),
    }
}
