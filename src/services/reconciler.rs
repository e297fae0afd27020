//! Reconciliation engine.
//!
//! Turns one observation of provider-side transfer state into at most one
//! storage mutation. The provider transfer id is the idempotency key: the
//! unique index on it arbitrates concurrent first observations, and the
//! status-guarded update arbitrates concurrent transitions. Losing either
//! race sends the observation round the loop again, where it usually
//! collapses to a no-op.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{NewTransaction, NewTransactionEvent, Transaction};
use crate::ports::{StoreError, TransactionStore};
use crate::services::broker::{LiveEvent, LiveEventKind, NotificationBroker};
use crate::services::receipt::SettlementEnricher;
use crate::services::status::{self, Translation};
use crate::validation::{self, ValidationError};

/// Display name used until the real recipient name is known.
pub const RECIPIENT_PLACEHOLDER: &str = "Recipient";

const MAX_ATTEMPTS: usize = 5;

/// One observation of a provider transfer, from either ingestion path.
#[derive(Debug, Clone)]
pub struct TransferObservation {
    pub transfer_id: String,
    pub provider_status: String,
    pub occurred_at: DateTime<Utc>,
    pub recipient_hint: Option<String>,
    pub reference: Option<String>,
    pub amount: BigDecimal,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    Created,
    StatusChanged,
    RecipientRefined,
    Unchanged,
}

#[derive(Debug)]
pub struct ReconcileOutcome {
    pub action: ReconcileAction,
    pub transaction: Transaction,
    /// Settlement enrichment started for a newly created transaction.
    pub enrichment: Option<JoinHandle<()>>,
}

impl ReconcileOutcome {
    pub fn created(&self) -> bool {
        self.action == ReconcileAction::Created
    }

    pub fn updated(&self) -> bool {
        self.action == ReconcileAction::StatusChanged
    }
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid observation: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Transfer {0} kept changing underneath reconciliation")]
    Contention(String),
}

pub struct Reconciler {
    store: Arc<dyn TransactionStore>,
    broker: Arc<NotificationBroker>,
    enricher: SettlementEnricher,
    sender_name: String,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        broker: Arc<NotificationBroker>,
        enricher: SettlementEnricher,
        sender_name: String,
    ) -> Self {
        Self {
            store,
            broker,
            enricher,
            sender_name,
        }
    }

    pub async fn reconcile(
        &self,
        observation: TransferObservation,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        validate_observation(&observation)?;
        let translation = status::translate(&observation.provider_status);
        let recipient = resolve_recipient(observation.recipient_hint.as_deref());

        for attempt in 1..=MAX_ATTEMPTS {
            let existing = self
                .store
                .find_by_transfer_id(&observation.transfer_id)
                .await?;

            let step = match existing {
                None => self.create(&observation, translation, recipient).await,
                Some(current) => {
                    self.apply(current, &observation, translation, recipient)
                        .await
                }
            };

            match step {
                Ok(Some(outcome)) => return Ok(outcome),
                Ok(None) => {
                    debug!(
                        transfer_id = %observation.transfer_id,
                        attempt,
                        "Status changed concurrently, re-reading"
                    );
                }
                Err(StoreError::Conflict(reason)) => {
                    debug!(
                        transfer_id = %observation.transfer_id,
                        attempt,
                        %reason,
                        "Concurrent creation, retrying as update"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(transfer_id = %observation.transfer_id, "Gave up after repeated contention");
        Err(ReconcileError::Contention(observation.transfer_id))
    }

    async fn create(
        &self,
        observation: &TransferObservation,
        translation: Translation,
        recipient: &str,
    ) -> Result<Option<ReconcileOutcome>, StoreError> {
        let new_tx = NewTransaction::new(
            observation.transfer_id.clone(),
            self.sender_name.clone(),
            recipient.to_string(),
            observation.amount.clone(),
            observation.currency.clone(),
            observation.reference.clone(),
            translation.status,
        );
        let event =
            NewTransactionEvent::new(translation.status, translation.label, observation.occurred_at);

        let transaction = self.store.insert_with_event(new_tx, event).await?;
        info!(
            transfer_id = %transaction.transfer_id,
            tracking_code = %transaction.tracking_code,
            status = %transaction.status,
            "Transaction created"
        );

        let enricher = self.enricher.clone();
        let (id, transfer_id) = (transaction.id, transaction.transfer_id.clone());
        let enrichment = tokio::spawn(async move {
            enricher.enrich_best_effort(id, transfer_id).await;
        });

        self.notify(&transaction, LiveEventKind::Created, translation, observation.occurred_at);

        Ok(Some(ReconcileOutcome {
            action: ReconcileAction::Created,
            transaction,
            enrichment: Some(enrichment),
        }))
    }

    /// `Ok(None)` means the guarded update lost a race and the caller should re-read.
    async fn apply(
        &self,
        current: Transaction,
        observation: &TransferObservation,
        translation: Translation,
        recipient: &str,
    ) -> Result<Option<ReconcileOutcome>, StoreError> {
        if current.status != translation.status {
            let event = NewTransactionEvent::new(
                translation.status,
                translation.label,
                observation.occurred_at,
            );
            let Some(transaction) = self
                .store
                .transition_status(current.id, current.status, event)
                .await?
            else {
                return Ok(None);
            };

            info!(
                transfer_id = %transaction.transfer_id,
                tracking_code = %transaction.tracking_code,
                from = %current.status,
                to = %transaction.status,
                "Transaction status changed"
            );
            self.notify(&transaction, LiveEventKind::Status, translation, observation.occurred_at);

            return Ok(Some(ReconcileOutcome {
                action: ReconcileAction::StatusChanged,
                transaction,
                enrichment: None,
            }));
        }

        if recipient != RECIPIENT_PLACEHOLDER && recipient != current.recipient_name {
            self.store
                .update_recipient_name(current.id, recipient)
                .await?;
            debug!(transfer_id = %current.transfer_id, "Recipient name refined");

            let mut transaction = current;
            transaction.recipient_name = recipient.to_string();
            transaction.updated_at = Utc::now();
            return Ok(Some(ReconcileOutcome {
                action: ReconcileAction::RecipientRefined,
                transaction,
                enrichment: None,
            }));
        }

        Ok(Some(ReconcileOutcome {
            action: ReconcileAction::Unchanged,
            transaction: current,
            enrichment: None,
        }))
    }

    fn notify(
        &self,
        transaction: &Transaction,
        kind: LiveEventKind,
        translation: Translation,
        occurred_at: DateTime<Utc>,
    ) {
        let event = LiveEvent {
            kind,
            status: translation.status,
            label: translation.label.to_string(),
            occurred_at,
        };
        let delivered = self.broker.publish(&transaction.tracking_code, &event);
        debug!(tracking_code = %transaction.tracking_code, delivered, "Live update published");
    }
}

fn validate_observation(observation: &TransferObservation) -> Result<(), ValidationError> {
    validation::validate_transfer_id(&observation.transfer_id)?;
    validation::validate_currency(&observation.currency)?;
    validation::validate_non_negative_amount(&observation.amount)
}

/// Best-effort display name: the hint when it carries text, else the placeholder.
pub fn resolve_recipient(hint: Option<&str>) -> &str {
    hint.map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(RECIPIENT_PLACEHOLDER)
}
