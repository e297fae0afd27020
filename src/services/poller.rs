//! Poll adapter: pulls transfer state from the provider and feeds the reconciler.
//!
//! The provider's primary status field lags its own event feed, so before
//! reconciling a transfer that is still in flight the events feed is checked
//! for delivery evidence and the observation is upgraded to completed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::provider::{ProviderApi, ProviderError, ProviderTransfer, ProviderTransferEvent, TransferEventKind};
use crate::services::reconciler::{
    ReconcileAction, ReconcileError, ReconcileOutcome, Reconciler, TransferObservation,
};
use crate::services::status::{self, COMPLETED_PROVIDER_CODE};

#[derive(Error, Debug)]
pub enum PollError {
    #[error("Provider request failed: {0}")]
    Upstream(ProviderError),

    #[error("Provider did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Transfer not found: {0}")]
    NotFound(String),

    #[error("Reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),
}

impl From<ProviderError> for PollError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::NotFound(path) => PollError::NotFound(path),
            other => PollError::Upstream(other),
        }
    }
}

/// Status and occurrence instant a poll reconciles with.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveStatus {
    pub provider_status: String,
    pub occurred_at: DateTime<Utc>,
    pub overridden: bool,
}

/// Applies the completion override and picks the occurrence instant.
///
/// While the primary status is in flight, the earliest completion sub-event
/// upgrades the observation to completed at that event's date. Otherwise the
/// latest status-change sub-event for the primary status supplies the date,
/// falling back to `observed_at`.
pub fn effective_status(
    primary: &str,
    events: &[ProviderTransferEvent],
    observed_at: DateTime<Utc>,
) -> EffectiveStatus {
    if status::translate(primary).status.is_in_flight() {
        let completion = events
            .iter()
            .filter(|event| event.kind.is_completion())
            .min_by_key(|event| event.date);
        if let Some(event) = completion {
            return EffectiveStatus {
                provider_status: COMPLETED_PROVIDER_CODE.to_string(),
                occurred_at: event.date,
                overridden: true,
            };
        }
    }

    let occurred_at = events
        .iter()
        .filter(|event| event.kind == TransferEventKind::StatusChange)
        .filter(|event| {
            event
                .status
                .as_deref()
                .is_some_and(|code| code.trim().eq_ignore_ascii_case(primary.trim()))
        })
        .map(|event| event.date)
        .max()
        .unwrap_or(observed_at);

    EffectiveStatus {
        provider_status: primary.to_string(),
        occurred_at,
        overridden: false,
    }
}

/// Inline recipient name on the transfer, else the display name of its target
/// account. Lookup failures yield `None`.
pub async fn recipient_hint(provider: &dyn ProviderApi, transfer: &ProviderTransfer) -> Option<String> {
    if let Some(name) = transfer
        .recipient_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
    {
        return Some(name.to_string());
    }

    let account_id = transfer.target_account.as_deref()?;
    match provider.get_account_name(account_id).await {
        Ok(name) => name,
        Err(e) => {
            debug!(transfer_id = %transfer.id, error = %e, "Recipient lookup failed");
            None
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PollSummary {
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    pub refined: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl PollSummary {
    fn record(&mut self, action: ReconcileAction) {
        match action {
            ReconcileAction::Created => self.created += 1,
            ReconcileAction::StatusChanged => self.updated += 1,
            ReconcileAction::RecipientRefined => self.refined += 1,
            ReconcileAction::Unchanged => self.unchanged += 1,
        }
    }
}

pub struct Poller {
    provider: Arc<dyn ProviderApi>,
    reconciler: Arc<Reconciler>,
    timeout: Duration,
}

impl Poller {
    pub fn new(provider: Arc<dyn ProviderApi>, reconciler: Arc<Reconciler>, timeout: Duration) -> Self {
        Self {
            provider,
            reconciler,
            timeout,
        }
    }

    /// Fetches one transfer and reconciles it.
    pub async fn poll_transfer(&self, transfer_id: &str) -> Result<ReconcileOutcome, PollError> {
        let transfer = self.bounded(self.provider.get_transfer(transfer_id)).await??;
        self.reconcile_transfer(transfer).await
    }

    /// Fetches the most recent transfers and reconciles each one. A failing
    /// transfer is counted and skipped; only the listing itself can fail the cycle.
    pub async fn poll_recent(&self, limit: u32) -> Result<PollSummary, PollError> {
        let transfers = self
            .bounded(self.provider.list_recent_transfers(limit))
            .await??;

        let mut summary = PollSummary {
            fetched: transfers.len(),
            ..PollSummary::default()
        };

        let mut enrichments = Vec::new();
        for transfer in transfers {
            let transfer_id = transfer.id.clone();
            match self.reconcile_transfer(transfer).await {
                Ok(outcome) => {
                    summary.record(outcome.action);
                    enrichments.extend(outcome.enrichment);
                }
                Err(e) => {
                    warn!(transfer_id = %transfer_id, error = %e, "Poll failed for transfer");
                    summary.failed += 1;
                }
            }
        }

        self.settle_enrichments(enrichments).await;

        Ok(summary)
    }

    /// Waits for the enrichment tasks a cycle started, each bounded by the
    /// provider timeout. A cycle is complete only once these have landed.
    async fn settle_enrichments(&self, enrichments: Vec<JoinHandle<()>>) {
        for enrichment in enrichments {
            match self.bounded(enrichment).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Settlement enrichment task failed"),
                Err(e) => warn!(error = %e, "Settlement enrichment still running, detaching"),
            }
        }
    }

    /// Runs [`Self::poll_recent`] on every tick of `schedule` until the schedule
    /// runs out or `shutdown` flips to true. A failed cycle is logged and the
    /// next tick proceeds as usual. Shutdown is only observed between cycles.
    pub async fn run_scheduled(
        &self,
        schedule: cron::Schedule,
        batch_size: u32,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(batch_size, "Scheduled poller started");

        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                warn!("Poll schedule has no upcoming runs, stopping");
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.wait_for(|stop| *stop) => {
                    info!("Scheduled poller stopped");
                    return;
                }
            }

            match self.poll_recent(batch_size).await {
                Ok(summary) => info!(
                    fetched = summary.fetched,
                    created = summary.created,
                    updated = summary.updated,
                    refined = summary.refined,
                    unchanged = summary.unchanged,
                    failed = summary.failed,
                    "Poll cycle complete"
                ),
                Err(e) => warn!(error = %e, "Poll cycle failed"),
            }
        }
    }

    async fn reconcile_transfer(
        &self,
        transfer: ProviderTransfer,
    ) -> Result<ReconcileOutcome, PollError> {
        let observation = self.bounded(self.observe(transfer)).await?;
        Ok(self.reconciler.reconcile(observation).await?)
    }

    /// Builds the observation. Lookups made here only enrich it, so their
    /// failures degrade to the primary data.
    async fn observe(&self, transfer: ProviderTransfer) -> TransferObservation {
        let events = match self.provider.list_transfer_events(&transfer.id).await {
            Ok(events) => events,
            Err(e) => {
                debug!(transfer_id = %transfer.id, error = %e, "Events feed unavailable, using primary status");
                Vec::new()
            }
        };

        let effective = effective_status(&transfer.status, &events, Utc::now());
        if effective.overridden {
            info!(
                transfer_id = %transfer.id,
                primary = %transfer.status,
                "Completion found in events feed, overriding primary status"
            );
        }

        let recipient_hint = recipient_hint(self.provider.as_ref(), &transfer).await;

        TransferObservation {
            transfer_id: transfer.id,
            provider_status: effective.provider_status,
            occurred_at: effective.occurred_at,
            recipient_hint,
            reference: transfer.reference,
            amount: transfer.amount,
            currency: transfer.currency,
        }
    }

    async fn bounded<T>(&self, call: impl Future<Output = T>) -> Result<T, PollError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| PollError::Timeout(self.timeout))
    }
}
