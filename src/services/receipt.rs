//! Settlement document parsing and best-effort enrichment.
//!
//! A settlement document carries an interbank message as labelled blocks:
//! a tag such as `:59:` or `:57A:` opens a block that runs until the next tag
//! or the end of the text.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use regex::Regex;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::SettlementDetails;
use crate::ports::{StoreError, TransactionStore};
use crate::provider::{ProviderApi, ProviderError};

const BENEFICIARY_TAGS: &[&str] = &["59", "59A", "59F"];
const ORDERING_CUSTOMER_TAGS: &[&str] = &["50K", "50A", "50F"];
const BENEFICIARY_BANK_TAGS: &[&str] = &["57A", "57D"];
const VALUE_DATE_AMOUNT_TAG: &str = "32A";

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // A tag must open a line or follow whitespace, so times like 12:30:45 are not tags.
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:^|\s)(:(\d{2}[A-Z]?):)").expect("tag pattern is valid")
    })
}

/// Splits the text into `tag → block` pairs. The first occurrence of a tag wins.
pub fn split_blocks(text: &str) -> HashMap<String, String> {
    let markers: Vec<(usize, usize, String)> = tag_pattern()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(1)?;
            let tag = caps.get(2)?.as_str().to_string();
            Some((whole.start(), whole.end(), tag))
        })
        .collect();

    let mut blocks = HashMap::new();
    for (i, (_, content_start, tag)) in markers.iter().enumerate() {
        let content_end = markers
            .get(i + 1)
            .map(|(next_start, _, _)| *next_start)
            .unwrap_or(text.len());
        blocks
            .entry(tag.clone())
            .or_insert_with(|| text[*content_start..content_end].trim().to_string());
    }
    blocks
}

fn first_block<'a>(blocks: &'a HashMap<String, String>, tags: &[&str]) -> Option<&'a str> {
    tags.iter()
        .find_map(|tag| blocks.get(*tag))
        .map(String::as_str)
        .filter(|block| !block.is_empty())
}

/// Non-empty trimmed lines, minus leading `/ACCOUNT` identifier lines.
fn party_lines(block: &str) -> Vec<&str> {
    block
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .skip_while(|line| line.starts_with('/'))
        .collect()
}

fn parse_value_date_amount(block: &str) -> (Option<NaiveDate>, Option<String>, Option<BigDecimal>) {
    let compact: String = block.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() < 10 || !compact.is_char_boundary(6) || !compact.is_char_boundary(9) {
        return (None, None, None);
    }

    let value_date = NaiveDate::parse_from_str(&compact[..6], "%y%m%d").ok();
    let currency = Some(&compact[6..9])
        .filter(|code| code.chars().all(|c| c.is_ascii_uppercase()))
        .map(str::to_string);
    let amount = BigDecimal::from_str(&compact[9..].replace(',', ".")).ok();

    (value_date, currency, amount)
}

/// Extracts beneficiary identity from settlement document text.
/// Missing blocks yield `None` fields, never an error.
pub fn parse_settlement_text(text: &str) -> SettlementDetails {
    let blocks = split_blocks(text);
    let mut details = SettlementDetails::default();

    if let Some(block) = first_block(&blocks, BENEFICIARY_TAGS) {
        let lines = party_lines(block);
        if let Some((name, address)) = lines.split_first() {
            details.beneficiary_name = Some(name.to_string());
            if !address.is_empty() {
                details.beneficiary_address = Some(address.join(", "));
            }
        }
    }

    if let Some(block) = first_block(&blocks, BENEFICIARY_BANK_TAGS) {
        let code: String = block.chars().filter(|c| !c.is_whitespace()).collect();
        if !code.is_empty() {
            details.beneficiary_bank_code = Some(code);
        }
    }

    if let Some(block) = first_block(&blocks, ORDERING_CUSTOMER_TAGS) {
        details.ordering_customer = party_lines(block).first().map(|name| name.to_string());
    }

    if let Some(block) = blocks.get(VALUE_DATE_AMOUNT_TAG) {
        let (value_date, currency, amount) = parse_value_date_amount(block);
        details.value_date = value_date;
        details.currency = currency;
        details.amount = amount;
    }

    details
}

/// Documents arrive as raw bytes; undecodable sequences are replaced, not rejected.
pub fn parse_settlement_document(bytes: &[u8]) -> SettlementDetails {
    parse_settlement_text(&String::from_utf8_lossy(bytes))
}

#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("settlement document unavailable: {0}")]
    Unavailable(#[from] ProviderError),
    #[error("settlement document has no beneficiary fields")]
    NothingExtracted,
    #[error("failed to store settlement details: {0}")]
    Store(#[from] StoreError),
}

/// Follow-up step after creation: fetch the settlement document, parse it, and
/// write the final-recipient fields. Never affects the primary write.
#[derive(Clone)]
pub struct SettlementEnricher {
    provider: Arc<dyn ProviderApi>,
    store: Arc<dyn TransactionStore>,
}

impl SettlementEnricher {
    pub fn new(provider: Arc<dyn ProviderApi>, store: Arc<dyn TransactionStore>) -> Self {
        Self { provider, store }
    }

    pub async fn enrich(
        &self,
        transaction_id: Uuid,
        transfer_id: &str,
    ) -> Result<SettlementDetails, EnrichmentError> {
        let document = self.provider.get_settlement_document(transfer_id).await?;
        let details = parse_settlement_document(&document);
        if !details.has_beneficiary() {
            return Err(EnrichmentError::NothingExtracted);
        }

        if self.store.apply_settlement(transaction_id, &details).await? {
            info!(%transfer_id, "Settlement details attached");
        } else {
            debug!(%transfer_id, "Settlement details already present");
        }
        Ok(details)
    }

    /// Runs [`Self::enrich`] and swallows the outcome.
    pub async fn enrich_best_effort(&self, transaction_id: Uuid, transfer_id: String) {
        if let Err(e) = self.enrich(transaction_id, &transfer_id).await {
            warn!(transfer_id = %transfer_id, error = %e, "Settlement enrichment skipped");
        }
    }
}
