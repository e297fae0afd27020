//! Framework-agnostic domain types.

pub mod status;
pub mod transaction;

pub use status::PublicStatus;
pub use transaction::{
    NewTransaction, NewTransactionEvent, SettlementDetails, Transaction, TransactionEvent,
};
