use bigdecimal::BigDecimal;
use std::fmt;

pub const TRANSFER_ID_MAX_LEN: usize = 64;
pub const TRACKING_CODE_MAX_LEN: usize = 64;
pub const CURRENCY_CODE_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

fn validate_identifier(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    validate_required(field, value)?;
    validate_max_len(field, value, max_len)?;

    if !value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(ValidationError::new(
            field,
            "must contain only letters, digits, '-' and '_'",
        ));
    }

    Ok(())
}

/// Provider transfer ids end up in request paths, so only URL-safe characters pass.
pub fn validate_transfer_id(transfer_id: &str) -> ValidationResult {
    validate_identifier("transfer_id", transfer_id, TRANSFER_ID_MAX_LEN)
}

pub fn validate_tracking_code(tracking_code: &str) -> ValidationResult {
    validate_identifier("tracking_code", tracking_code, TRACKING_CODE_MAX_LEN)
}

/// ISO 4217 alphabetic code.
pub fn validate_currency(currency: &str) -> ValidationResult {
    if currency.len() != CURRENCY_CODE_LEN || !currency.chars().all(|ch| ch.is_ascii_uppercase()) {
        return Err(ValidationError::new(
            "currency",
            "must be a three-letter uppercase ISO 4217 code",
        ));
    }

    Ok(())
}

pub fn validate_non_negative_amount(amount: &BigDecimal) -> ValidationResult {
    if amount < &BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must not be negative"));
    }

    Ok(())
}
