use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ReconcileResponse;
use crate::domain::{PublicStatus, Transaction, TransactionEvent};
use crate::error::AppError;
use crate::services::status;
use crate::validation::{validate_tracking_code, validate_transfer_id};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct TrackingView {
    pub tracking_code: String,
    pub transfer_id: String,
    pub sender_name: String,
    pub recipient_name: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub reference: Option<String>,
    pub status: PublicStatus,
    pub status_label: String,
    pub final_recipient: Option<FinalRecipient>,
    pub timeline: Vec<TimelineEntry>,
    pub documents: Vec<DocumentLink>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct FinalRecipient {
    pub name: Option<String>,
    pub bank_code: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TimelineEntry {
    pub status: PublicStatus,
    pub label: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DocumentLink {
    pub kind: &'static str,
    pub href: String,
}

impl TrackingView {
    pub fn build(transaction: Transaction, events: Vec<TransactionEvent>) -> Self {
        let status_label = events
            .iter()
            .rev()
            .find(|event| event.status == transaction.status)
            .map(|event| event.label.clone())
            .unwrap_or_else(|| status::label_for(transaction.status).to_string());

        let final_recipient = transaction.has_settlement_details().then(|| FinalRecipient {
            name: transaction.final_recipient_name.clone(),
            bank_code: transaction.final_recipient_bank_code.clone(),
            address: transaction.final_recipient_address.clone(),
        });

        let documents = if final_recipient.is_some() {
            vec![DocumentLink {
                kind: "settlement",
                href: format!("/track/{}/documents/settlement", transaction.tracking_code),
            }]
        } else {
            Vec::new()
        };

        let timeline = events
            .into_iter()
            .map(|event| TimelineEntry {
                status: event.status,
                label: event.label,
                occurred_at: event.occurred_at,
            })
            .collect();

        TrackingView {
            tracking_code: transaction.tracking_code,
            transfer_id: transaction.transfer_id,
            sender_name: transaction.sender_name,
            recipient_name: transaction.recipient_name,
            amount: transaction.amount,
            currency: transaction.currency,
            reference: transaction.reference,
            status: transaction.status,
            status_label,
            final_recipient,
            timeline,
            documents,
            created_at: transaction.created_at,
            updated_at: transaction.updated_at,
        }
    }
}

/// Looks up a transaction by tracking code; malformed codes are simply unknown.
pub(crate) async fn find_tracked(state: &AppState, code: &str) -> Result<Transaction, AppError> {
    let not_found = || AppError::NotFound(format!("tracking code {}", code));
    validate_tracking_code(code).map_err(|_| not_found())?;

    state
        .store
        .find_by_tracking_code(code)
        .await?
        .ok_or_else(not_found)
}

pub async fn get_tracking(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = find_tracked(&state, &code).await?;
    let events = state.store.events(transaction.id).await?;

    Ok(Json(TrackingView::build(transaction, events)))
}

/// Manual poll-and-reconcile for one transfer. An unknown code is taken as a
/// provider transfer id so a first page load can warm the record up.
pub async fn refresh(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let transfer_id = match find_tracked(&state, &code).await {
        Ok(transaction) => transaction.transfer_id,
        Err(AppError::NotFound(_)) => {
            validate_transfer_id(&code).map_err(|e| AppError::BadRequest(e.to_string()))?;
            code
        }
        Err(e) => return Err(e),
    };

    let outcome = state.poller.poll_transfer(&transfer_id).await?;

    Ok(Json(ReconcileResponse::from(&outcome)))
}

pub async fn settlement_document(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = find_tracked(&state, &code).await?;
    let document = state
        .provider
        .get_settlement_document(&transaction.transfer_id)
        .await?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        String::from_utf8_lossy(&document).into_owned(),
    ))
}
