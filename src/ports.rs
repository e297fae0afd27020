//! Storage collaborator contract.
//! The reconciliation core only talks to persistence through this trait.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    NewTransaction, NewTransactionEvent, PublicStatus, SettlementDetails, Transaction,
    TransactionEvent,
};

#[derive(Error, Debug)]
pub enum StoreError {
    /// A uniqueness constraint (transfer id or tracking code) rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => StoreError::NotFound(e.to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            _ => StoreError::Database(e.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn find_by_transfer_id(&self, transfer_id: &str) -> StoreResult<Option<Transaction>>;

    async fn find_by_tracking_code(&self, tracking_code: &str) -> StoreResult<Option<Transaction>>;

    /// Creates the transaction and its first timeline entry atomically.
    /// Fails with [`StoreError::Conflict`] if the transfer id is already tracked.
    async fn insert_with_event(
        &self,
        tx: NewTransaction,
        event: NewTransactionEvent,
    ) -> StoreResult<Transaction>;

    /// Moves `id` from `expected` to `event.status` and appends `event`, only if the
    /// stored status still equals `expected`. Returns `None` when another writer won.
    async fn transition_status(
        &self,
        id: Uuid,
        expected: PublicStatus,
        event: NewTransactionEvent,
    ) -> StoreResult<Option<Transaction>>;

    async fn update_recipient_name(&self, id: Uuid, recipient_name: &str) -> StoreResult<()>;

    /// Writes the final-recipient fields once. Returns `false` if they were already set.
    async fn apply_settlement(&self, id: Uuid, details: &SettlementDetails) -> StoreResult<bool>;

    /// Timeline ordered by occurrence ascending.
    async fn events(&self, transaction_id: Uuid) -> StoreResult<Vec<TransactionEvent>>;

    async fn count(&self) -> StoreResult<i64>;

    async fn ping(&self) -> StoreResult<()>;
}
