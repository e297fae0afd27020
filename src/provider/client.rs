use async_trait::async_trait;
use bytes::Bytes;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use super::models::{
    ProviderAccount, ProviderTransfer, ProviderTransferEvent, TransferEventList, TransferList,
};
use super::ProviderApi;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Provider returned {status} for {path}")]
    Status { status: u16, path: String },
    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }
}

type Breaker = StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>;

/// HTTP client for the payment provider's REST API.
#[derive(Clone)]
pub struct ProviderClient {
    client: Client,
    base_url: String,
    api_token: String,
    circuit_breaker: Breaker,
}

impl ProviderClient {
    pub fn new(base_url: String, api_token: String, timeout: Duration) -> Self {
        Self::with_circuit_breaker(base_url, api_token, timeout, 3, 60)
    }

    /// Creates a client with custom circuit breaker configuration
    pub fn with_circuit_breaker(
        base_url: String,
        api_token: String,
        timeout: Duration,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        ProviderClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            circuit_breaker,
        }
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn fetch(&self, path: String) -> Result<reqwest::Response, ProviderError> {
        let request = self.client.get(self.url(&path)).bearer_auth(&self.api_token);

        self.guarded(async move {
            let response = request.send().await?;
            match response.status() {
                StatusCode::NOT_FOUND => Err(ProviderError::NotFound(path)),
                status if !status.is_success() => Err(ProviderError::Status {
                    status: status.as_u16(),
                    path,
                }),
                _ => Ok(response),
            }
        })
        .await
    }

    async fn fetch_json<T: DeserializeOwned>(&self, path: String) -> Result<T, ProviderError> {
        let response = self.fetch(path).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    /// Runs a call through the breaker. A 404 is an answer, not an outage, so it
    /// never counts towards opening the circuit.
    async fn guarded<T, F>(&self, call: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        let result = self
            .circuit_breaker
            .call_with(|e: &ProviderError| !e.is_not_found(), call)
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(ProviderError::CircuitBreakerOpen(
                "provider API circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

#[async_trait]
impl ProviderApi for ProviderClient {
    async fn get_transfer(&self, transfer_id: &str) -> Result<ProviderTransfer, ProviderError> {
        self.fetch_json(format!("/v1/transfers/{}", transfer_id)).await
    }

    async fn list_recent_transfers(
        &self,
        limit: u32,
    ) -> Result<Vec<ProviderTransfer>, ProviderError> {
        let list: TransferList = self
            .fetch_json(format!("/v1/transfers?limit={}", limit))
            .await?;
        Ok(list.transfers)
    }

    async fn list_transfer_events(
        &self,
        transfer_id: &str,
    ) -> Result<Vec<ProviderTransferEvent>, ProviderError> {
        let list: TransferEventList = self
            .fetch_json(format!("/v1/transfers/{}/events", transfer_id))
            .await?;
        Ok(list.events)
    }

    async fn get_settlement_document(&self, transfer_id: &str) -> Result<Bytes, ProviderError> {
        let response = self
            .fetch(format!("/v1/transfers/{}/settlement-document", transfer_id))
            .await?;
        Ok(response.bytes().await?)
    }

    async fn get_account_name(&self, account_id: &str) -> Result<Option<String>, ProviderError> {
        let account: ProviderAccount = self
            .fetch_json(format!("/v1/accounts/{}", account_id))
            .await?;
        Ok(account
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(server: &mockito::ServerGuard) -> ProviderClient {
        ProviderClient::new(server.url(), "secret-token".to_string(), Duration::from_secs(5))
    }

    #[test]
    fn test_provider_client_creation() {
        let client = ProviderClient::new(
            "https://provider.example.com/".to_string(),
            "t".to_string(),
            Duration::from_secs(5),
        );
        assert_eq!(client.base_url, "https://provider.example.com");
        assert_eq!(client.circuit_state(), "closed");
    }

    #[tokio::test]
    async fn test_get_transfer_with_mock() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/transfers/4481")
            .match_header("authorization", "Bearer secret-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "id": "4481",
                    "status": "processing",
                    "amount": "125.40",
                    "currency": "EUR",
                    "reference": "INV-2024-07",
                    "target_account": "acc-9",
                    "created": "2024-05-01T10:00:00Z"
                }"#,
            )
            .create_async()
            .await;

        let transfer = client_for(&server).get_transfer("4481").await.unwrap();

        assert_eq!(transfer.id, "4481");
        assert_eq!(transfer.status, "processing");
        assert_eq!(transfer.amount, "125.40".parse().unwrap());
        assert_eq!(transfer.target_account.as_deref(), Some("acc-9"));
        assert!(transfer.recipient_name.is_none());
    }

    #[tokio::test]
    async fn test_get_transfer_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/transfers/missing")
            .with_status(404)
            .create_async()
            .await;

        let result = client_for(&server).get_transfer("missing").await;
        assert!(matches!(result, Err(ProviderError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_server_error_maps_to_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/transfers/4481/events")
            .with_status(503)
            .create_async()
            .await;

        let result = client_for(&server).list_transfer_events("4481").await;
        assert!(matches!(result, Err(ProviderError::Status { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/transfers/4481")
            .with_status(200)
            .with_body(r#"{"id": 4481}"#)
            .create_async()
            .await;

        let result = client_for(&server).get_transfer("4481").await;
        assert!(matches!(result, Err(ProviderError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_account_name_blank_is_none() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/accounts/acc-1")
            .with_status(200)
            .with_body(r#"{"id": "acc-1", "name": "   "}"#)
            .create_async()
            .await;

        let name = client_for(&server).get_account_name("acc-1").await.unwrap();
        assert!(name.is_none());
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_failures() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Regex(r"^/v1/transfers/.*".into()))
            .with_status(500)
            .expect_at_least(3)
            .create_async()
            .await;

        let client = ProviderClient::with_circuit_breaker(
            server.url(),
            "t".to_string(),
            Duration::from_secs(5),
            3,
            30,
        );
        for _ in 0..3 {
            let _ = client.get_transfer("4481").await;
        }

        let result = client.get_transfer("4481").await;
        assert!(matches!(result, Err(ProviderError::CircuitBreakerOpen(_))));
    }

    #[tokio::test]
    async fn test_not_found_does_not_trip_breaker() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Regex(r"^/v1/transfers/.*".into()))
            .with_status(404)
            .create_async()
            .await;

        let client = ProviderClient::with_circuit_breaker(
            server.url(),
            "t".to_string(),
            Duration::from_secs(5),
            2,
            30,
        );
        for _ in 0..4 {
            let result = client.get_transfer("gone").await;
            assert!(matches!(result, Err(ProviderError::NotFound(_))));
        }
        assert_eq!(client.circuit_state(), "closed");
    }
}
