//! Postgres implementation of TransactionStore.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{
    NewTransaction, NewTransactionEvent, PublicStatus, SettlementDetails, Transaction,
    TransactionEvent,
};
use crate::ports::{StoreResult, TransactionStore};

const TRANSACTION_COLUMNS: &str = r#"
    id, tracking_code, transfer_id, sender_name, recipient_name, amount, currency,
    reference, final_recipient_name, final_recipient_bank_code, final_recipient_address,
    status, created_at, updated_at
"#;

/// Postgres-backed transaction store.
///
/// Per-transfer serialisation relies on the unique index on `transfer_id` and on
/// the status guard in [`TransactionStore::transition_status`], so several
/// service instances can share one database.
#[derive(Clone)]
pub struct PostgresTransactionStore {
    pool: PgPool,
}

impl PostgresTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionStore for PostgresTransactionStore {
    async fn find_by_transfer_id(&self, transfer_id: &str) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE transfer_id = $1"
        ))
        .bind(transfer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TransactionRow::into_domain))
    }

    async fn find_by_tracking_code(&self, tracking_code: &str) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE tracking_code = $1"
        ))
        .bind(tracking_code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TransactionRow::into_domain))
    }

    async fn insert_with_event(
        &self,
        tx: NewTransaction,
        event: NewTransactionEvent,
    ) -> StoreResult<Transaction> {
        let mut db_tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO transactions (
                id, tracking_code, transfer_id, sender_name, recipient_name, amount,
                currency, reference, status, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(tx.id)
        .bind(&tx.tracking_code)
        .bind(&tx.transfer_id)
        .bind(&tx.sender_name)
        .bind(&tx.recipient_name)
        .bind(&tx.amount)
        .bind(&tx.currency)
        .bind(&tx.reference)
        .bind(tx.status.as_str())
        .bind(tx.created_at)
        .fetch_one(&mut *db_tx)
        .await?;

        insert_event(&mut db_tx, event.into_event(row.id)).await?;
        db_tx.commit().await?;

        Ok(row.into_domain())
    }

    async fn transition_status(
        &self,
        id: Uuid,
        expected: PublicStatus,
        event: NewTransactionEvent,
    ) -> StoreResult<Option<Transaction>> {
        let mut db_tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            UPDATE transactions
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(expected.as_str())
        .bind(event.status.as_str())
        .fetch_optional(&mut *db_tx)
        .await?;

        let Some(row) = row else {
            db_tx.rollback().await?;
            return Ok(None);
        };

        insert_event(&mut db_tx, event.into_event(id)).await?;
        db_tx.commit().await?;

        Ok(Some(row.into_domain()))
    }

    async fn update_recipient_name(&self, id: Uuid, recipient_name: &str) -> StoreResult<()> {
        sqlx::query("UPDATE transactions SET recipient_name = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(recipient_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn apply_settlement(&self, id: Uuid, details: &SettlementDetails) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET final_recipient_name = $2,
                final_recipient_address = $3,
                final_recipient_bank_code = $4,
                updated_at = NOW()
            WHERE id = $1
              AND final_recipient_name IS NULL
              AND final_recipient_address IS NULL
              AND final_recipient_bank_code IS NULL
            "#,
        )
        .bind(id)
        .bind(&details.beneficiary_name)
        .bind(&details.beneficiary_address)
        .bind(&details.beneficiary_bank_code)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn events(&self, transaction_id: Uuid) -> StoreResult<Vec<TransactionEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, transaction_id, status, label, occurred_at, recorded_at
            FROM transaction_events
            WHERE transaction_id = $1
            ORDER BY occurred_at ASC, recorded_at ASC
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(EventRow::into_domain).collect())
    }

    async fn count(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

async fn insert_event(
    db_tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    event: TransactionEvent,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO transaction_events (id, transaction_id, status, label, occurred_at, recorded_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(event.id)
    .bind(event.transaction_id)
    .bind(event.status.as_str())
    .bind(&event.label)
    .bind(event.occurred_at)
    .bind(event.recorded_at)
    .execute(&mut **db_tx)
    .await?;
    Ok(())
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    tracking_code: String,
    transfer_id: String,
    sender_name: String,
    recipient_name: String,
    amount: bigdecimal::BigDecimal,
    currency: String,
    reference: Option<String>,
    final_recipient_name: Option<String>,
    final_recipient_bank_code: Option<String>,
    final_recipient_address: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> Transaction {
        Transaction {
            id: self.id,
            tracking_code: self.tracking_code,
            transfer_id: self.transfer_id,
            sender_name: self.sender_name,
            recipient_name: self.recipient_name,
            amount: self.amount,
            currency: self.currency,
            reference: self.reference,
            final_recipient_name: self.final_recipient_name,
            final_recipient_bank_code: self.final_recipient_bank_code,
            final_recipient_address: self.final_recipient_address,
            status: PublicStatus::parse(&self.status),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    transaction_id: Uuid,
    status: String,
    label: String,
    occurred_at: DateTime<Utc>,
    recorded_at: DateTime<Utc>,
}

impl EventRow {
    fn into_domain(self) -> TransactionEvent {
        TransactionEvent {
            id: self.id,
            transaction_id: self.transaction_id,
            status: PublicStatus::parse(&self.status),
            label: self.label,
            occurred_at: self.occurred_at,
            recorded_at: self.recorded_at,
        }
    }
}
