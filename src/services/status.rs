//! Provider status vocabulary → public status model.
//!
//! This table is the only place provider codes are interpreted. Codes are
//! matched case-insensitively after trimming; anything not listed maps to
//! [`PublicStatus::Unknown`] so new upstream codes never break ingestion.

use crate::domain::PublicStatus;

pub const UNKNOWN_STATUS_LABEL: &str = "unknown status";

/// Provider code a completion override reconciles as.
pub const COMPLETED_PROVIDER_CODE: &str = "outgoing_payment_delivered";

const TRANSLATIONS: &[(&str, PublicStatus, &str)] = &[
    ("incoming_payment_waiting", PublicStatus::Pending, "Waiting for your payment"),
    ("incoming_payment_initiated", PublicStatus::Pending, "Payment initiated"),
    ("waiting_recipient_input_to_proceed", PublicStatus::Pending, "Waiting for recipient details"),
    ("funds_received", PublicStatus::FundsReceived, "Funds received"),
    ("processing", PublicStatus::Processing, "Processing transfer"),
    ("funds_converted", PublicStatus::Processing, "Funds converted"),
    ("outgoing_payment_sent", PublicStatus::Sent, "Sent to recipient bank"),
    ("outgoing_payment_delivered", PublicStatus::Completed, "Delivered to recipient"),
    ("cancelled", PublicStatus::Cancelled, "Transfer cancelled"),
    ("failed", PublicStatus::Failed, "Transfer failed"),
    ("funds_refunded", PublicStatus::Reversed, "Funds refunded"),
    ("bounced_back", PublicStatus::Reversed, "Returned by recipient bank"),
    ("charged_back", PublicStatus::Reversed, "Payment charged back"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translation {
    pub status: PublicStatus,
    pub label: &'static str,
}

impl Translation {
    pub fn is_mapped(&self) -> bool {
        self.status != PublicStatus::Unknown
    }
}

pub fn translate(provider_status: &str) -> Translation {
    let code = provider_status.trim();
    TRANSLATIONS
        .iter()
        .find(|(known, _, _)| known.eq_ignore_ascii_case(code))
        .map(|&(_, status, label)| Translation { status, label })
        .unwrap_or(Translation {
            status: PublicStatus::Unknown,
            label: UNKNOWN_STATUS_LABEL,
        })
}

/// First label the table gives `status`, for views with no timeline entry at hand.
pub fn label_for(status: PublicStatus) -> &'static str {
    TRANSLATIONS
        .iter()
        .find(|(_, mapped, _)| *mapped == status)
        .map(|(_, _, label)| *label)
        .unwrap_or(UNKNOWN_STATUS_LABEL)
}

pub fn known_provider_codes() -> impl Iterator<Item = &'static str> {
    TRANSLATIONS.iter().map(|(code, _, _)| *code)
}
