use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable, public status of a transfer as shown to end users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublicStatus {
    Pending,
    FundsReceived,
    Processing,
    Sent,
    Completed,
    Cancelled,
    Failed,
    Reversed,
    Unknown,
}

impl PublicStatus {
    pub const ALL: [PublicStatus; 9] = [
        PublicStatus::Pending,
        PublicStatus::FundsReceived,
        PublicStatus::Processing,
        PublicStatus::Sent,
        PublicStatus::Completed,
        PublicStatus::Cancelled,
        PublicStatus::Failed,
        PublicStatus::Reversed,
        PublicStatus::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PublicStatus::Pending => "PENDING",
            PublicStatus::FundsReceived => "FUNDS_RECEIVED",
            PublicStatus::Processing => "PROCESSING",
            PublicStatus::Sent => "SENT",
            PublicStatus::Completed => "COMPLETED",
            PublicStatus::Cancelled => "CANCELLED",
            PublicStatus::Failed => "FAILED",
            PublicStatus::Reversed => "REVERSED",
            PublicStatus::Unknown => "UNKNOWN",
        }
    }

    /// Parses a stored status. Anything unrecognised reads back as `Unknown`.
    pub fn parse(value: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(value.trim()))
            .unwrap_or(PublicStatus::Unknown)
    }

    /// Money is still moving; the transfer has not settled in either direction.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            PublicStatus::Pending
                | PublicStatus::FundsReceived
                | PublicStatus::Processing
                | PublicStatus::Sent
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PublicStatus::Completed
                | PublicStatus::Cancelled
                | PublicStatus::Failed
                | PublicStatus::Reversed
        )
    }
}

impl fmt::Display for PublicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
