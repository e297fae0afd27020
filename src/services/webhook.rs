//! Webhook adapter: authenticates, validates and dispatches provider pushes.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::provider::{ProviderApi, ProviderError};
use crate::services::poller::recipient_hint;
use crate::services::reconciler::{ReconcileError, ReconcileOutcome, Reconciler, TransferObservation};
use crate::services::status;
use crate::validation::validate_transfer_id;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Signature";

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Webhook authentication failed: {0}")]
    Unauthenticated(&'static str),

    #[error("Malformed webhook payload: {0}")]
    Malformed(String),

    #[error("Unknown transfer: {0}")]
    UnknownTransfer(String),

    #[error("Unmapped provider status: {0}")]
    UnmappedStatus(String),

    #[error("Provider request failed: {0}")]
    Upstream(ProviderError),

    #[error("Reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    pub transfer_id: String,
    pub status: String,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Checks a hex encoded HMAC-SHA256 of `body` in constant time.
pub fn verify_signature(secret: &str, body: &[u8], signature: Option<&str>) -> Result<(), WebhookError> {
    let signature = signature.ok_or(WebhookError::Unauthenticated("missing signature"))?;
    let expected = hex::decode(signature.trim())
        .map_err(|_| WebhookError::Unauthenticated("invalid signature format"))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::Unauthenticated("invalid secret"))?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| WebhookError::Unauthenticated("signature mismatch"))
}

pub struct WebhookAdapter {
    provider: Arc<dyn ProviderApi>,
    reconciler: Arc<Reconciler>,
    secret: String,
}

impl WebhookAdapter {
    pub fn new(provider: Arc<dyn ProviderApi>, reconciler: Arc<Reconciler>, secret: String) -> Self {
        Self {
            provider,
            reconciler,
            secret,
        }
    }

    /// Handles one delivery. Nothing is read or written before the signature
    /// over the raw `body` checks out; on success the reconciler runs exactly once.
    pub async fn handle(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<ReconcileOutcome, WebhookError> {
        if let Err(e) = verify_signature(&self.secret, body, signature) {
            warn!(error = %e, "Rejected webhook");
            return Err(e);
        }

        let payload: WebhookPayload = serde_json::from_slice(body).map_err(|e| {
            warn!(error = %e, "Rejected malformed webhook");
            WebhookError::Malformed(e.to_string())
        })?;
        let data = payload.data;

        if let Err(e) = validate_transfer_id(&data.transfer_id) {
            warn!(error = %e, "Rejected webhook with invalid transfer id");
            return Err(WebhookError::Malformed(e.to_string()));
        }

        if !status::translate(&data.status).is_mapped() {
            warn!(transfer_id = %data.transfer_id, status = %data.status, "Rejected webhook with unmapped status");
            return Err(WebhookError::UnmappedStatus(data.status));
        }

        let transfer = self
            .provider
            .get_transfer(&data.transfer_id)
            .await
            .map_err(|e| match e {
                ProviderError::NotFound(_) => {
                    warn!(transfer_id = %data.transfer_id, "Webhook for unknown transfer");
                    WebhookError::UnknownTransfer(data.transfer_id.clone())
                }
                other => WebhookError::Upstream(other),
            })?;

        info!(
            transfer_id = %data.transfer_id,
            status = %data.status,
            description = data.description.as_deref().unwrap_or(""),
            "Webhook accepted"
        );

        let observation = TransferObservation {
            recipient_hint: recipient_hint(self.provider.as_ref(), &transfer).await,
            transfer_id: data.transfer_id,
            provider_status: data.status,
            occurred_at: data.occurred_at.unwrap_or_else(Utc::now),
            reference: transfer.reference,
            amount: transfer.amount,
            currency: transfer.currency,
        };

        Ok(self.reconciler.reconcile(observation).await?)
    }
}
