// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallets API client.
//!
//! ## Endpoints
//!
//! | Method | Path | Auth |
//! |--------|------|------|
//! | POST | `/wallet/v1/auth/bootstrap/code` | none |
//! | POST | `/wallet/v1/auth/bootstrap` | bootstrap access token |
//! | POST | `/wallet/v1/auth/tokens/setup` | bootstrap access / bootstrap token |
//! | GET | `/wallet/v1/auth/tokens/setup/{transactionId}` | same |
//! | POST | `/wallet/v1/auth/tokens/confirm` | same |
//! | GET | `/wallet/v1/auth/tokens/verify` | access token |
//! | POST | `/wallet/v1/auth/tokens/refresh` | refresh token (also in the body) |
//! | GET | `/wallet/v1/accounts` | access token |
//! | GET | `/wallet/v1/accounts/{accountId}/assets` | access token |
//! | POST | `/wallet/v1/accounts/{accountId}/assets/{assetId}/signatures` | access token |
//! | POST | `/wallet/v1/accounts/{accountId}/assets/{assetId}/transfers` | access token |
//! | GET | `/wallet/v1/operations/{operationId}` | access token |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

use super::types::{
    AuthTokens, JwtToken, OperationResult, OperationStatus, SetupTransactionStatus, TokenError,
    WalletAccount, WalletAccountAsset,
};

const API_PREFIX: &str = "wallet/v1";

/// Result of exchanging a bootstrap code.
#[derive(Debug, Clone)]
pub struct BootstrapSession {
    pub device_id: String,
    pub access_token: String,
}

/// Remote custody service.
#[async_trait]
pub trait WalletsApi: Send + Sync {
    async fn submit_bootstrap_code(&self, code: &str) -> Result<BootstrapSession, WalletsApiError>;

    async fn authorise_new_device(
        &self,
        token: &str,
        join_request_id: &str,
        recovery_phrase: &str,
    ) -> Result<(), WalletsApiError>;

    /// Open a key-material transaction; returns its id.
    async fn init_transaction(&self, token: &str) -> Result<String, WalletsApiError>;

    async fn transaction_status(
        &self,
        token: &str,
        transaction_id: &str,
    ) -> Result<SetupTransactionStatus, WalletsApiError>;

    async fn confirm_transaction(&self, token: &str) -> Result<AuthTokens, WalletsApiError>;

    async fn verify_access_token(&self, access_token: &str) -> Result<(), WalletsApiError>;

    async fn refresh_tokens(&self, refresh_token: &str) -> Result<AuthTokens, WalletsApiError>;

    async fn accounts(&self, access_token: &str) -> Result<Vec<WalletAccount>, WalletsApiError>;

    async fn account_assets(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<Vec<WalletAccountAsset>, WalletsApiError>;

    /// Start signing `message`; returns the operation id.
    async fn start_sign_message(
        &self,
        access_token: &str,
        account_id: &str,
        asset_id: &str,
        message: &str,
    ) -> Result<String, WalletsApiError>;

    /// Start a transfer of `amount` (decimal units); returns the operation id.
    async fn start_transfer(
        &self,
        access_token: &str,
        account_id: &str,
        asset_id: &str,
        destination: &str,
        amount: &str,
    ) -> Result<String, WalletsApiError>;

    async fn operation_status(
        &self,
        access_token: &str,
        operation_id: &str,
    ) -> Result<OperationStatus, WalletsApiError>;
}

#[derive(Debug, thiserror::Error)]
pub enum WalletsApiError {
    #[error("Invalid Wallets API URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Wallets API rejected the credentials")]
    Unauthorized,

    #[error("Wallets API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected Wallets API response: {0}")]
    Decode(String),

    #[error(transparent)]
    InvalidToken(#[from] TokenError),
}

// =============================================================================
// Wire DTOs
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitCodeRequest<'a> {
    code: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitCodeResponse {
    access_token: String,
    device_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthoriseDeviceRequest<'a> {
    wallet_join_request_id: &'a str,
    recovery_passphrase: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetupResponse {
    transaction_id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokensResponse {
    access_token: String,
    refresh_token: String,
    bootstrap_token: String,
}

impl TryFrom<TokensResponse> for AuthTokens {
    type Error = TokenError;

    fn try_from(raw: TokensResponse) -> Result<Self, Self::Error> {
        Ok(AuthTokens {
            access: JwtToken::from_jwt(raw.access_token)?,
            refresh: JwtToken::from_jwt(raw.refresh_token)?,
            bootstrap: JwtToken::from_jwt(raw.bootstrap_token)?,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct Items<T> {
    items: Vec<T>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignMessageRequest<'a> {
    message: &'a str,
    encoding: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferRequest<'a> {
    destination_address: &'a str,
    amount: &'a str,
}

#[derive(Debug, Deserialize)]
struct OperationEnvelope {
    operation: OperationDto,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationDto {
    id: String,
    status: String,
    #[serde(default)]
    transaction: Option<OperationTransactionDto>,
    #[serde(default)]
    result: Option<OperationResultDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationTransactionDto {
    #[serde(default)]
    external_vendor_transaction_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResultDto {
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    transaction_hash: Option<String>,
}

impl OperationDto {
    fn into_status(self) -> Result<OperationStatus, WalletsApiError> {
        let missing = |what: &str| {
            WalletsApiError::Decode(format!("operation {} has no {what}", self.id))
        };

        let vendor_transaction_id = self
            .transaction
            .as_ref()
            .and_then(|t| t.external_vendor_transaction_id.clone().or_else(|| t.id.clone()));

        let status = match self.status.to_ascii_uppercase().as_str() {
            "QUEUED" | "PENDING" | "SUBMITTED" => OperationStatus::Queued,
            "PROCESSING" | "BROADCASTING" | "CONFIRMING" => OperationStatus::Processing,
            "SIGNATURE_REQUIRED" | "TX_READY" => OperationStatus::SignatureRequired {
                transaction_id: vendor_transaction_id
                    .ok_or_else(|| missing("vendor transaction id"))?,
            },
            // The vendor transaction may not exist yet while the operation
            // waits for a signature.
            "PENDING_SIGNATURE" => match vendor_transaction_id {
                Some(transaction_id) => OperationStatus::SignatureRequired { transaction_id },
                None => OperationStatus::Processing,
            },
            "COMPLETED" | "SIGNED" => {
                let result = self.result.as_ref().ok_or_else(|| missing("result"))?;
                let result = match (&result.signature, &result.transaction_hash) {
                    (Some(signature), _) => OperationResult::Signature(signature.clone()),
                    (None, Some(hash)) => OperationResult::TransactionHash(hash.clone()),
                    (None, None) => return Err(missing("signature or transaction hash")),
                };
                OperationStatus::Completed { result }
            }
            reason @ ("FAILED" | "REJECTED" | "CANCELLED" | "CANCELED" | "BLOCKED" | "TIMEOUT") => {
                OperationStatus::Failed {
                    reason: reason.to_string(),
                }
            }
            other => {
                tracing::debug!(operation_id = %self.id, status = other, "Unknown operation status, still polling");
                OperationStatus::Processing
            }
        };
        Ok(status)
    }
}

// =============================================================================
// HTTP implementation
// =============================================================================

/// [`WalletsApi`] over HTTPS.
#[derive(Clone)]
pub struct HttpWalletsApi {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpWalletsApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, WalletsApiError> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| WalletsApiError::InvalidUrl(e.to_string()))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WalletsApiError::Http(e.to_string()))?;

        Ok(Self { base_url, client })
    }

    fn url(&self, path: &str) -> Result<Url, WalletsApiError> {
        self.base_url
            .join(&format!("{API_PREFIX}/{path}"))
            .map_err(|e| WalletsApiError::InvalidUrl(e.to_string()))
    }

    async fn call<B, T>(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&B>,
    ) -> Result<T, WalletsApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path)?;
        tracing::debug!(%method, path, "Wallets API request");

        let mut request = self.client.request(method, url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| WalletsApiError::Http(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(WalletsApiError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WalletsApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        // Some endpoints answer with an empty body.
        let bytes = response
            .bytes()
            .await
            .map_err(|e| WalletsApiError::Http(e.to_string()))?;
        let bytes: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
        serde_json::from_slice(bytes).map_err(|e| WalletsApiError::Decode(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, token: &str) -> Result<T, WalletsApiError> {
        self.call::<(), T>(Method::GET, path, Some(token), None).await
    }

    async fn post<B, T>(&self, path: &str, token: Option<&str>, body: &B) -> Result<T, WalletsApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call(Method::POST, path, token, Some(body)).await
    }
}

#[async_trait]
impl WalletsApi for HttpWalletsApi {
    async fn submit_bootstrap_code(&self, code: &str) -> Result<BootstrapSession, WalletsApiError> {
        let response: SubmitCodeResponse = self
            .post("auth/bootstrap/code", None, &SubmitCodeRequest { code })
            .await?;
        Ok(BootstrapSession {
            device_id: response.device_id,
            access_token: response.access_token,
        })
    }

    async fn authorise_new_device(
        &self,
        token: &str,
        join_request_id: &str,
        recovery_phrase: &str,
    ) -> Result<(), WalletsApiError> {
        let body = AuthoriseDeviceRequest {
            wallet_join_request_id: join_request_id,
            recovery_passphrase: recovery_phrase,
        };
        let _: serde_json::Value = self.post("auth/bootstrap", Some(token), &body).await?;
        Ok(())
    }

    async fn init_transaction(&self, token: &str) -> Result<String, WalletsApiError> {
        let response: SetupResponse = self
            .post("auth/tokens/setup", Some(token), &serde_json::json!({}))
            .await?;
        Ok(response.transaction_id)
    }

    async fn transaction_status(
        &self,
        token: &str,
        transaction_id: &str,
    ) -> Result<SetupTransactionStatus, WalletsApiError> {
        let response: StatusResponse = self
            .get(&format!("auth/tokens/setup/{transaction_id}"), token)
            .await?;
        Ok(SetupTransactionStatus::parse(&response.status))
    }

    async fn confirm_transaction(&self, token: &str) -> Result<AuthTokens, WalletsApiError> {
        let response: TokensResponse = self
            .post("auth/tokens/confirm", Some(token), &serde_json::json!({}))
            .await?;
        Ok(response.try_into()?)
    }

    async fn verify_access_token(&self, access_token: &str) -> Result<(), WalletsApiError> {
        let _: serde_json::Value = self.get("auth/tokens/verify", access_token).await?;
        Ok(())
    }

    async fn refresh_tokens(&self, refresh_token: &str) -> Result<AuthTokens, WalletsApiError> {
        let response: TokensResponse = self
            .post(
                "auth/tokens/refresh",
                Some(refresh_token),
                &RefreshRequest { refresh_token },
            )
            .await?;
        Ok(response.try_into()?)
    }

    async fn accounts(&self, access_token: &str) -> Result<Vec<WalletAccount>, WalletsApiError> {
        let response: Items<WalletAccount> = self.get("accounts", access_token).await?;
        Ok(response.items)
    }

    async fn account_assets(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<Vec<WalletAccountAsset>, WalletsApiError> {
        let response: Items<WalletAccountAsset> = self
            .get(&format!("accounts/{account_id}/assets?$expand=balance"), access_token)
            .await?;
        Ok(response.items)
    }

    async fn start_sign_message(
        &self,
        access_token: &str,
        account_id: &str,
        asset_id: &str,
        message: &str,
    ) -> Result<String, WalletsApiError> {
        let body = SignMessageRequest {
            message,
            encoding: "utf8",
        };
        let response: OperationEnvelope = self
            .post(
                &format!("accounts/{account_id}/assets/{asset_id}/signatures"),
                Some(access_token),
                &body,
            )
            .await?;
        Ok(response.operation.id)
    }

    async fn start_transfer(
        &self,
        access_token: &str,
        account_id: &str,
        asset_id: &str,
        destination: &str,
        amount: &str,
    ) -> Result<String, WalletsApiError> {
        let body = TransferRequest {
            destination_address: destination,
            amount,
        };
        let response: OperationEnvelope = self
            .post(
                &format!("accounts/{account_id}/assets/{asset_id}/transfers"),
                Some(access_token),
                &body,
            )
            .await?;
        Ok(response.operation.id)
    }

    async fn operation_status(
        &self,
        access_token: &str,
        operation_id: &str,
    ) -> Result<OperationStatus, WalletsApiError> {
        let response: OperationEnvelope = self
            .get(&format!("operations/{operation_id}"), access_token)
            .await?;
        response.operation.into_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use crate::mpc::types::tests::jwt_expiring_at;

    fn operation(json: serde_json::Value) -> Result<OperationStatus, WalletsApiError> {
        let envelope: OperationEnvelope = serde_json::from_value(json).unwrap();
        envelope.operation.into_status()
    }

    #[test]
    fn urls_are_rooted_under_the_api_prefix() {
        let api = HttpWalletsApi::new("https://api.example.com/base", Duration::from_secs(5)).unwrap();
        assert_eq!(
            api.url("accounts/a1/assets").unwrap().as_str(),
            "https://api.example.com/base/wallet/v1/accounts/a1/assets"
        );
        assert!(matches!(
            HttpWalletsApi::new("not a url", Duration::from_secs(5)),
            Err(WalletsApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn operation_statuses_map_from_wire() {
        let queued = operation(serde_json::json!({
            "operation": { "id": "op1", "status": "QUEUED" }
        }));
        assert_eq!(queued.unwrap(), OperationStatus::Queued);

        let needs_signature = operation(serde_json::json!({
            "operation": {
                "id": "op1",
                "status": "SIGNATURE_REQUIRED",
                "transaction": { "externalVendorTransactionId": "fb-tx-1" }
            }
        }));
        assert_eq!(
            needs_signature.unwrap(),
            OperationStatus::SignatureRequired {
                transaction_id: "fb-tx-1".into()
            }
        );

        let signed = operation(serde_json::json!({
            "operation": { "id": "op1", "status": "SIGNED", "result": { "signature": "0xsig" } }
        }));
        assert_eq!(
            signed.unwrap(),
            OperationStatus::Completed {
                result: OperationResult::Signature("0xsig".into())
            }
        );

        for status in ["FAILED", "REJECTED", "CANCELLED", "BLOCKED"] {
            let failed = operation(serde_json::json!({
                "operation": { "id": "op1", "status": status }
            }));
            assert_eq!(
                failed.unwrap(),
                OperationStatus::Failed {
                    reason: status.to_string()
                }
            );
        }
    }

    #[test]
    fn pending_signature_keeps_the_operation_in_flight() {
        let waiting = operation(serde_json::json!({
            "operation": { "id": "op1", "status": "PENDING_SIGNATURE" }
        }))
        .unwrap();
        assert_eq!(waiting, OperationStatus::Processing);
        assert!(!waiting.is_terminal());

        let with_tx = operation(serde_json::json!({
            "operation": {
                "id": "op1",
                "status": "PENDING_SIGNATURE",
                "transaction": { "id": "fb-tx-2" }
            }
        }))
        .unwrap();
        assert_eq!(
            with_tx,
            OperationStatus::SignatureRequired {
                transaction_id: "fb-tx-2".into()
            }
        );
    }

    #[test]
    fn unknown_statuses_are_not_terminal() {
        for status in ["BROADCASTING", "pending", "SOMETHING_NEW"] {
            let mapped = operation(serde_json::json!({
                "operation": { "id": "op1", "status": status }
            }))
            .unwrap();
            assert!(!mapped.is_terminal(), "{status} mapped to {mapped:?}");
        }
    }

    #[test]
    fn completed_without_result_is_a_decode_error() {
        let err = operation(serde_json::json!({
            "operation": { "id": "op1", "status": "COMPLETED" }
        }))
        .unwrap_err();
        assert!(matches!(err, WalletsApiError::Decode(_)));
    }

    /// Minimal HTTP/1.1 server answering every request with one JSON body
    /// that satisfies all response DTOs; records `(path, authorization)`.
    async fn recording_server() -> (String, Arc<Mutex<Vec<(String, Option<String>)>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/", listener.local_addr().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let jwt = jwt_expiring_at(4_000_000_000);
        let body = serde_json::json!({
            "deviceId": "device-1",
            "accessToken": jwt,
            "refreshToken": jwt,
            "bootstrapToken": jwt,
            "transactionId": "setup-tx",
            "status": "PENDING_SIGNATURE",
            "items": [],
            "operation": { "id": "op-1", "status": "QUEUED" }
        })
        .to_string();

        let recorded = seen.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { break };
                let recorded = recorded.clone();
                let body = body.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 4096];
                    let head_end = loop {
                        let n = socket.read(&mut chunk).await.unwrap();
                        if n == 0 {
                            return;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                            break pos + 4;
                        }
                    };
                    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
                    let mut lines = head.lines();
                    let path = lines
                        .next()
                        .and_then(|l| l.split_whitespace().nth(1))
                        .unwrap_or_default()
                        .to_string();
                    let mut content_length = 0;
                    let mut authorization = None;
                    for line in lines {
                        if let Some((name, value)) = line.split_once(':') {
                            let value = value.trim().to_string();
                            match name.to_ascii_lowercase().as_str() {
                                "content-length" => content_length = value.parse().unwrap(),
                                "authorization" => authorization = Some(value),
                                _ => {}
                            }
                        }
                    }
                    while buf.len() < head_end + content_length {
                        let n = socket.read(&mut chunk).await.unwrap();
                        if n == 0 {
                            break;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                    }
                    recorded.lock().unwrap().push((path, authorization));

                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    socket.write_all(response.as_bytes()).await.unwrap();
                    let _ = socket.shutdown().await;
                });
            }
        });

        (base, seen)
    }

    #[tokio::test]
    async fn every_call_but_code_submission_sends_a_bearer_token() {
        let (base, seen) = recording_server().await;
        let api = HttpWalletsApi::new(&base, Duration::from_secs(5)).unwrap();

        api.submit_bootstrap_code("123456").await.unwrap();
        api.authorise_new_device("boot", "join-1", "phrase").await.unwrap();
        api.init_transaction("boot").await.unwrap();
        api.transaction_status("boot", "setup-tx").await.unwrap();
        api.confirm_transaction("boot").await.unwrap();
        api.verify_access_token("access").await.unwrap();
        api.refresh_tokens("refresh").await.unwrap();
        api.accounts("access").await.unwrap();
        api.account_assets("access", "a1").await.unwrap();
        api.start_sign_message("access", "a1", "eth", "hi").await.unwrap();
        api.start_transfer("access", "a1", "eth", "0xdead", "1.5").await.unwrap();
        api.operation_status("access", "op-1").await.unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 12);
        for (path, authorization) in &seen {
            let expected = if path.ends_with("auth/bootstrap/code") {
                None
            } else if path.ends_with("auth/tokens/refresh") {
                Some("Bearer refresh")
            } else if path.contains("/auth/") {
                Some(if path.ends_with("tokens/verify") { "Bearer access" } else { "Bearer boot" })
            } else {
                Some("Bearer access")
            };
            assert_eq!(authorization.as_deref(), expected, "{path}");
        }
    }

    #[test]
    fn token_response_requires_real_jwts() {
        let raw = TokensResponse {
            access_token: "a".into(),
            refresh_token: "b".into(),
            bootstrap_token: "c".into(),
        };
        assert!(AuthTokens::try_from(raw).is_err());
    }
}
