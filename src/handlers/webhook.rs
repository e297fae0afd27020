use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};

use super::ReconcileResponse;
use crate::error::AppError;
use crate::services::webhook::SIGNATURE_HEADER;
use crate::AppState;

/// Provider push endpoint. The body is taken as raw bytes because the
/// signature covers them exactly.
pub async fn provider_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state.webhooks.handle(signature, &body).await?;

    Ok(Json(ReconcileResponse::from(&outcome)))
}
