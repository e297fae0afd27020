//! The provider fetch surface consumed by the ingestion adapters.

pub mod client;
pub mod models;

use async_trait::async_trait;
use bytes::Bytes;

pub use client::{ProviderClient, ProviderError};
pub use models::{
    ProviderAccount, ProviderTransfer, ProviderTransferEvent, TransferEventKind,
};

#[async_trait]
pub trait ProviderApi: Send + Sync {
    async fn get_transfer(&self, transfer_id: &str) -> Result<ProviderTransfer, ProviderError>;

    async fn list_recent_transfers(&self, limit: u32)
        -> Result<Vec<ProviderTransfer>, ProviderError>;

    async fn list_transfer_events(
        &self,
        transfer_id: &str,
    ) -> Result<Vec<ProviderTransferEvent>, ProviderError>;

    async fn get_settlement_document(&self, transfer_id: &str) -> Result<Bytes, ProviderError>;

    async fn get_account_name(&self, account_id: &str) -> Result<Option<String>, ProviderError>;
}
