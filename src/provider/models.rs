//! Wire types for the provider REST surface.
//! Unrecognised shapes fail deserialisation here instead of leaking inward.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderTransfer {
    pub id: String,
    pub status: String,
    pub amount: BigDecimal,
    pub currency: String,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub recipient_name: Option<String>,
    #[serde(default)]
    pub target_account: Option<String>,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferList {
    pub transfers: Vec<ProviderTransfer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferEventKind {
    StatusChange,
    DeliveryConfirmed,
    FundsArrived,
    FundsConverted,
    #[serde(other)]
    Other,
}

impl TransferEventKind {
    /// Sub-events that prove the money reached the beneficiary.
    pub fn is_completion(&self) -> bool {
        matches!(
            self,
            TransferEventKind::DeliveryConfirmed | TransferEventKind::FundsArrived
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderTransferEvent {
    pub kind: TransferEventKind,
    pub date: DateTime<Utc>,
    /// Provider status code the transfer moved to, for `status_change` entries.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferEventList {
    pub events: Vec<ProviderTransferEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderAccount {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}
