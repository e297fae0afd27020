//! Transaction domain entity.
//! Framework-agnostic representation of one tracked transfer and its timeline.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PublicStatus;

/// Canonical record of one provider transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub tracking_code: String,
    pub transfer_id: String,
    pub sender_name: String,
    pub recipient_name: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub reference: Option<String>,
    pub final_recipient_name: Option<String>,
    pub final_recipient_bank_code: Option<String>,
    pub final_recipient_address: Option<String>,
    pub status: PublicStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn has_settlement_details(&self) -> bool {
        self.final_recipient_name.is_some()
            || self.final_recipient_bank_code.is_some()
            || self.final_recipient_address.is_some()
    }
}

/// Append-only timeline entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub status: PublicStatus,
    pub label: String,
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}

/// Fields needed to create a transaction; identity and timestamps are assigned here.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub id: Uuid,
    pub tracking_code: String,
    pub transfer_id: String,
    pub sender_name: String,
    pub recipient_name: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub reference: Option<String>,
    pub status: PublicStatus,
    pub created_at: DateTime<Utc>,
}

impl NewTransaction {
    pub fn new(
        transfer_id: String,
        sender_name: String,
        recipient_name: String,
        amount: BigDecimal,
        currency: String,
        reference: Option<String>,
        status: PublicStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tracking_code: generate_tracking_code(),
            transfer_id,
            sender_name,
            recipient_name,
            amount,
            currency,
            reference,
            status,
            created_at: Utc::now(),
        }
    }

    pub fn into_transaction(self) -> Transaction {
        Transaction {
            id: self.id,
            tracking_code: self.tracking_code,
            transfer_id: self.transfer_id,
            sender_name: self.sender_name,
            recipient_name: self.recipient_name,
            amount: self.amount,
            currency: self.currency,
            reference: self.reference,
            final_recipient_name: None,
            final_recipient_bank_code: None,
            final_recipient_address: None,
            status: self.status,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewTransactionEvent {
    pub status: PublicStatus,
    pub label: String,
    pub occurred_at: DateTime<Utc>,
}

impl NewTransactionEvent {
    pub fn new(status: PublicStatus, label: impl Into<String>, occurred_at: DateTime<Utc>) -> Self {
        Self {
            status,
            label: label.into(),
            occurred_at,
        }
    }

    pub fn into_event(self, transaction_id: Uuid) -> TransactionEvent {
        TransactionEvent {
            id: Uuid::new_v4(),
            transaction_id,
            status: self.status,
            label: self.label,
            occurred_at: self.occurred_at,
            recorded_at: Utc::now(),
        }
    }
}

/// Final-beneficiary fields extracted from a settlement document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettlementDetails {
    pub beneficiary_name: Option<String>,
    pub beneficiary_address: Option<String>,
    pub beneficiary_bank_code: Option<String>,
    pub ordering_customer: Option<String>,
    pub value_date: Option<chrono::NaiveDate>,
    pub currency: Option<String>,
    pub amount: Option<BigDecimal>,
}

impl SettlementDetails {
    /// True when at least one of the fields persisted on the transaction was found.
    pub fn has_beneficiary(&self) -> bool {
        self.beneficiary_name.is_some()
            || self.beneficiary_address.is_some()
            || self.beneficiary_bank_code.is_some()
    }
}

/// Public tracking codes are short, upper-case and unambiguous to read aloud.
pub fn generate_tracking_code() -> String {
    let raw = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
    format!("TRK-{}", &raw[..10])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracking_code_shape() {
        let code = generate_tracking_code();
        assert!(code.starts_with("TRK-"));
        assert_eq!(code.len(), 14);
        assert!(code[4..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_new_transaction_has_matching_timestamps() {
        let tx = NewTransaction::new(
            "991".to_string(),
            "Acme Payroll".to_string(),
            "Jane Roe".to_string(),
            "10.00".parse().unwrap(),
            "EUR".to_string(),
            None,
            PublicStatus::Pending,
        )
        .into_transaction();

        assert_eq!(tx.created_at, tx.updated_at);
        assert!(!tx.has_settlement_details());
    }
}
