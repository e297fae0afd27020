use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::ports::StoreError;
use crate::provider::ProviderError;
use crate::services::poller::PollError;
use crate::services::reconciler::ReconcileError;
use crate::services::webhook::WebhookError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] StoreError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

impl From<ReconcileError> for AppError {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::Store(store) => AppError::Database(store),
            // Commercial fields come from the provider, so a bad observation is an upstream fault.
            ReconcileError::Invalid(invalid) => AppError::Upstream(invalid.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::NotFound(path) => AppError::NotFound(path),
            other => AppError::Upstream(other.to_string()),
        }
    }
}

impl From<PollError> for AppError {
    fn from(e: PollError) -> Self {
        match e {
            PollError::NotFound(what) => AppError::NotFound(what),
            other @ (PollError::Upstream(_) | PollError::Timeout(_)) => {
                AppError::Upstream(other.to_string())
            }
            PollError::Reconcile(inner) => inner.into(),
        }
    }
}

impl From<WebhookError> for AppError {
    fn from(e: WebhookError) -> Self {
        match e {
            WebhookError::Unauthenticated(reason) => AppError::Unauthorized(reason.to_string()),
            WebhookError::Malformed(reason) => AppError::BadRequest(reason),
            WebhookError::UnknownTransfer(id) => AppError::NotFound(format!("transfer {}", id)),
            WebhookError::UnmappedStatus(status) => AppError::Unprocessable(format!("status {}", status)),
            WebhookError::Upstream(provider) => AppError::Upstream(provider.to_string()),
            WebhookError::Reconcile(inner) => inner.into(),
        }
    }
}
