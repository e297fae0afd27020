pub mod live;
pub mod tracking;
pub mod webhook;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::domain::PublicStatus;
use crate::health::{check_health, ProviderChecker, StoreChecker};
use crate::services::{ReconcileAction, ReconcileOutcome};
use crate::AppState;

/// Body returned by endpoints that ran one reconciliation.
#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub action: ReconcileAction,
    pub tracking_code: String,
    pub status: PublicStatus,
}

impl From<&ReconcileOutcome> for ReconcileResponse {
    fn from(outcome: &ReconcileOutcome) -> Self {
        Self {
            action: outcome.action,
            tracking_code: outcome.transaction.tracking_code.clone(),
            status: outcome.transaction.status,
        }
    }
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let response = check_health(
        StoreChecker::new(state.store.clone()),
        ProviderChecker::new(state.provider.clone()),
        state.start_time,
    )
    .await;

    // Return 503 only when a critical dependency is down
    let status_code = if response.status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(response))
}
