#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{Request, Response};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

use transfer_tracker::adapters::MemoryTransactionStore;
use transfer_tracker::provider::{
    ProviderApi, ProviderError, ProviderTransfer, ProviderTransferEvent, TransferEventKind,
};
use transfer_tracker::services::TransferObservation;
use transfer_tracker::{create_app, AppSettings, AppState};

pub const SECRET: &str = "whsec_test";
pub const SENDER: &str = "Acme Payroll";

pub const SETTLEMENT_DOCUMENT: &str = "\
:20:REF2024050100042
:32A:240501EUR125,40
:50K:/BE71096123456769
ACME PAYROLL SA
:57A:DEUT DEFF 500
:59:/DE89370400440532013000
JANE ROE
HAUPTSTRASSE 5
10115 BERLIN
:71A:SHA";

type HmacSha256 = Hmac<Sha256>;

pub fn sign(body: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
}

pub fn transfer(id: &str, status: &str) -> ProviderTransfer {
    ProviderTransfer {
        id: id.to_string(),
        status: status.to_string(),
        amount: "125.40".parse().unwrap(),
        currency: "EUR".to_string(),
        reference: Some("INV-2024-07".to_string()),
        recipient_name: None,
        target_account: None,
        created: at(7),
    }
}

pub fn provider_event(kind: TransferEventKind, hour: u32) -> ProviderTransferEvent {
    ProviderTransferEvent {
        kind,
        date: at(hour),
        status: None,
        description: None,
    }
}

pub fn observation(transfer_id: &str, status: &str, hour: u32) -> TransferObservation {
    TransferObservation {
        transfer_id: transfer_id.to_string(),
        provider_status: status.to_string(),
        occurred_at: at(hour),
        recipient_hint: None,
        reference: Some("INV-2024-07".to_string()),
        amount: "125.40".parse().unwrap(),
        currency: "EUR".to_string(),
    }
}

/// Scripted provider backed by in-memory maps.
#[derive(Default)]
pub struct MockProvider {
    transfers: Mutex<BTreeMap<String, ProviderTransfer>>,
    events: Mutex<BTreeMap<String, Vec<ProviderTransferEvent>>>,
    documents: Mutex<BTreeMap<String, Bytes>>,
    accounts: Mutex<BTreeMap<String, String>>,
    delay: Mutex<Option<Duration>>,
    events_down: AtomicBool,
}

impl MockProvider {
    pub fn put_transfer(&self, transfer: ProviderTransfer) {
        self.transfers.lock().unwrap().insert(transfer.id.clone(), transfer);
    }

    pub fn set_status(&self, transfer_id: &str, status: &str) {
        if let Some(transfer) = self.transfers.lock().unwrap().get_mut(transfer_id) {
            transfer.status = status.to_string();
        }
    }

    pub fn put_events(&self, transfer_id: &str, events: Vec<ProviderTransferEvent>) {
        self.events.lock().unwrap().insert(transfer_id.to_string(), events);
    }

    pub fn put_document(&self, transfer_id: &str, document: &str) {
        self.documents
            .lock()
            .unwrap()
            .insert(transfer_id.to_string(), Bytes::from(document.to_string()));
    }

    pub fn put_account(&self, account_id: &str, name: &str) {
        self.accounts
            .lock()
            .unwrap()
            .insert(account_id.to_string(), name.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn take_events_feed_down(&self) {
        self.events_down.store(true, Ordering::SeqCst);
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ProviderApi for MockProvider {
    async fn get_transfer(&self, transfer_id: &str) -> Result<ProviderTransfer, ProviderError> {
        self.pause().await;
        self.transfers
            .lock()
            .unwrap()
            .get(transfer_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("/v1/transfers/{}", transfer_id)))
    }

    async fn list_recent_transfers(
        &self,
        limit: u32,
    ) -> Result<Vec<ProviderTransfer>, ProviderError> {
        self.pause().await;
        Ok(self
            .transfers
            .lock()
            .unwrap()
            .values()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn list_transfer_events(
        &self,
        transfer_id: &str,
    ) -> Result<Vec<ProviderTransferEvent>, ProviderError> {
        if self.events_down.load(Ordering::SeqCst) {
            return Err(ProviderError::Status {
                status: 503,
                path: format!("/v1/transfers/{}/events", transfer_id),
            });
        }
        Ok(self
            .events
            .lock()
            .unwrap()
            .get(transfer_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_settlement_document(&self, transfer_id: &str) -> Result<Bytes, ProviderError> {
        self.documents
            .lock()
            .unwrap()
            .get(transfer_id)
            .cloned()
            .ok_or_else(|| {
                ProviderError::NotFound(format!("/v1/transfers/{}/settlement-document", transfer_id))
            })
    }

    async fn get_account_name(&self, account_id: &str) -> Result<Option<String>, ProviderError> {
        Ok(self.accounts.lock().unwrap().get(account_id).cloned())
    }
}

pub fn settings() -> AppSettings {
    AppSettings {
        sender_name: SENDER.to_string(),
        webhook_secret: SECRET.to_string(),
        provider_timeout: Duration::from_secs(2),
        keepalive: Duration::from_secs(15),
        log_request_body: false,
        allowed_origins: Vec::new(),
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryTransactionStore>,
    pub provider: Arc<MockProvider>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_settings(settings())
    }

    pub fn with_settings(settings: AppSettings) -> Self {
        let store = Arc::new(MemoryTransactionStore::new());
        let provider = Arc::new(MockProvider::default());
        let state = AppState::new(store.clone(), provider.clone(), settings);
        Self {
            state,
            store,
            provider,
        }
    }

    pub fn router(&self) -> Router {
        create_app(self.state.clone())
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post(&self, uri: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn webhook(&self, body: &str, signature: Option<&str>) -> Response<Body> {
        let mut request = Request::builder()
            .method("POST")
            .uri("/webhooks/provider")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            request = request.header("X-Signature", signature);
        }
        self.send(request.body(Body::from(body.to_string())).unwrap())
            .await
    }
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn webhook_body(transfer_id: &str, status: &str) -> String {
    serde_json::json!({
        "data": {
            "transfer_id": transfer_id,
            "status": status,
            "occurred_at": "2024-05-01T09:00:00Z",
            "description": "status update"
        }
    })
    .to_string()
}
