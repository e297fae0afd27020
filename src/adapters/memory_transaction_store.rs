//! In-memory implementation of TransactionStore.
//!
//! Enforces the same uniqueness and compare-and-swap rules as the Postgres
//! adapter, so reconciliation behaves identically against either backend.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    NewTransaction, NewTransactionEvent, PublicStatus, SettlementDetails, Transaction,
    TransactionEvent,
};
use crate::ports::{StoreError, StoreResult, TransactionStore};

#[derive(Default)]
struct MemoryState {
    transactions: HashMap<Uuid, Transaction>,
    events: Vec<TransactionEvent>,
}

#[derive(Default)]
pub struct MemoryTransactionStore {
    state: Mutex<MemoryState>,
}

impl MemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn event_count(&self) -> usize {
        self.state.lock().await.events.len()
    }
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn find_by_transfer_id(&self, transfer_id: &str) -> StoreResult<Option<Transaction>> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .values()
            .find(|tx| tx.transfer_id == transfer_id)
            .cloned())
    }

    async fn find_by_tracking_code(&self, tracking_code: &str) -> StoreResult<Option<Transaction>> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .values()
            .find(|tx| tx.tracking_code == tracking_code)
            .cloned())
    }

    async fn insert_with_event(
        &self,
        tx: NewTransaction,
        event: NewTransactionEvent,
    ) -> StoreResult<Transaction> {
        let mut state = self.state.lock().await;

        if state
            .transactions
            .values()
            .any(|existing| existing.transfer_id == tx.transfer_id)
        {
            return Err(StoreError::Conflict(format!(
                "transfer {} is already tracked",
                tx.transfer_id
            )));
        }
        if state
            .transactions
            .values()
            .any(|existing| existing.tracking_code == tx.tracking_code)
        {
            return Err(StoreError::Conflict(format!(
                "tracking code {} is taken",
                tx.tracking_code
            )));
        }

        let transaction = tx.into_transaction();
        state.events.push(event.into_event(transaction.id));
        state.transactions.insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        expected: PublicStatus,
        event: NewTransactionEvent,
    ) -> StoreResult<Option<Transaction>> {
        let mut state = self.state.lock().await;

        let transaction = state
            .transactions
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if transaction.status != expected {
            return Ok(None);
        }

        transaction.status = event.status;
        transaction.updated_at = Utc::now();
        let updated = transaction.clone();
        state.events.push(event.into_event(id));
        Ok(Some(updated))
    }

    async fn update_recipient_name(&self, id: Uuid, recipient_name: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let transaction = state
            .transactions
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        transaction.recipient_name = recipient_name.to_string();
        transaction.updated_at = Utc::now();
        Ok(())
    }

    async fn apply_settlement(&self, id: Uuid, details: &SettlementDetails) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let transaction = state
            .transactions
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if transaction.has_settlement_details() {
            return Ok(false);
        }

        transaction.final_recipient_name = details.beneficiary_name.clone();
        transaction.final_recipient_address = details.beneficiary_address.clone();
        transaction.final_recipient_bank_code = details.beneficiary_bank_code.clone();
        transaction.updated_at = Utc::now();
        Ok(true)
    }

    async fn events(&self, transaction_id: Uuid) -> StoreResult<Vec<TransactionEvent>> {
        let state = self.state.lock().await;
        let mut events: Vec<TransactionEvent> = state
            .events
            .iter()
            .filter(|event| event.transaction_id == transaction_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            a.occurred_at
                .cmp(&b.occurred_at)
                .then(a.recorded_at.cmp(&b.recorded_at))
        });
        Ok(events)
    }

    async fn count(&self) -> StoreResult<i64> {
        Ok(self.state.lock().await.transactions.len() as i64)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
