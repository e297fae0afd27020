mod common;

use std::str::FromStr;
use std::time::Duration;
use tokio::sync::watch;

use common::{at, provider_event, settings, transfer, TestApp, SETTLEMENT_DOCUMENT};
use transfer_tracker::cli;
use transfer_tracker::domain::PublicStatus;
use transfer_tracker::ports::TransactionStore;
use transfer_tracker::provider::TransferEventKind;
use transfer_tracker::services::{PollError, ReconcileAction};

#[tokio::test]
async fn test_completion_event_overrides_lagging_primary_status() {
    let app = TestApp::new();
    app.provider.put_transfer(transfer("4481", "processing"));
    app.provider.put_events(
        "4481",
        vec![
            provider_event(TransferEventKind::FundsConverted, 9),
            provider_event(TransferEventKind::DeliveryConfirmed, 11),
        ],
    );

    let outcome = app.state.poller.poll_transfer("4481").await.unwrap();

    assert_eq!(outcome.transaction.status, PublicStatus::Completed);
    let events = app.store.events(outcome.transaction.id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].occurred_at, at(11));
    assert_eq!(events[0].label, "Delivered to recipient");
}

#[tokio::test]
async fn test_failed_transfer_is_not_upgraded() {
    let app = TestApp::new();
    app.provider.put_transfer(transfer("4481", "failed"));
    app.provider
        .put_events("4481", vec![provider_event(TransferEventKind::FundsArrived, 11)]);

    let outcome = app.state.poller.poll_transfer("4481").await.unwrap();

    assert_eq!(outcome.transaction.status, PublicStatus::Failed);
}

#[tokio::test]
async fn test_events_feed_outage_falls_back_to_primary_status() {
    let app = TestApp::new();
    app.provider.put_transfer(transfer("4481", "processing"));
    app.provider
        .put_events("4481", vec![provider_event(TransferEventKind::DeliveryConfirmed, 11)]);
    app.provider.take_events_feed_down();

    let outcome = app.state.poller.poll_transfer("4481").await.unwrap();

    assert_eq!(outcome.action, ReconcileAction::Created);
    assert_eq!(outcome.transaction.status, PublicStatus::Processing);
}

#[tokio::test]
async fn test_repeated_poll_is_a_no_op() {
    let app = TestApp::new();
    app.provider.put_transfer(transfer("4481", "processing"));

    app.state.poller.poll_transfer("4481").await.unwrap();
    let second = app.state.poller.poll_transfer("4481").await.unwrap();

    assert_eq!(second.action, ReconcileAction::Unchanged);
    assert_eq!(app.store.event_count().await, 1);
}

#[tokio::test]
async fn test_unknown_transfer_is_not_found() {
    let app = TestApp::new();

    let result = app.state.poller.poll_transfer("missing").await;

    assert!(matches!(result, Err(PollError::NotFound(_))));
}

#[tokio::test]
async fn test_slow_provider_times_out_single_invocation() {
    let mut settings = settings();
    settings.provider_timeout = Duration::from_millis(50);
    let app = TestApp::with_settings(settings);
    app.provider.put_transfer(transfer("4481", "processing"));
    app.provider.set_delay(Duration::from_millis(500));

    let result = app.state.poller.poll_transfer("4481").await;

    assert!(matches!(result, Err(PollError::Timeout(_))));
    assert_eq!(app.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_bulk_poll_counts_outcomes_and_isolates_failures() {
    let app = TestApp::new();
    app.provider.put_transfer(transfer("1001", "processing"));
    app.provider.put_transfer(transfer("1002", "funds_received"));
    let mut broken = transfer("1003", "processing");
    broken.currency = "euro".to_string();
    app.provider.put_transfer(broken);

    let summary = app.state.poller.poll_recent(20).await.unwrap();
    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.created, 2);
    assert_eq!(summary.failed, 1);

    app.provider.set_status("1002", "outgoing_payment_sent");
    let summary = app.state.poller.poll_recent(20).await.unwrap();
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.unchanged, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(app.store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_status_change_event_date_used_as_occurrence() {
    let app = TestApp::new();
    app.provider.put_transfer(transfer("4481", "outgoing_payment_sent"));
    let mut change = provider_event(TransferEventKind::StatusChange, 10);
    change.status = Some("outgoing_payment_sent".to_string());
    app.provider.put_events("4481", vec![change]);

    let outcome = app.state.poller.poll_transfer("4481").await.unwrap();

    let events = app.store.events(outcome.transaction.id).await.unwrap();
    assert_eq!(events[0].occurred_at, at(10));
}

#[tokio::test]
async fn test_long_reference_does_not_block_tracking() {
    let app = TestApp::new();
    let mut long = transfer("4481", "processing");
    long.reference = Some("x".repeat(300));
    app.provider.put_transfer(long);

    let outcome = app.state.poller.poll_transfer("4481").await.unwrap();

    assert_eq!(outcome.action, ReconcileAction::Created);
    assert_eq!(outcome.transaction.reference.as_deref().map(str::len), Some(300));
    assert_eq!(app.store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_bulk_poll_waits_for_settlement_enrichment() {
    let app = TestApp::new();
    app.provider.put_transfer(transfer("4481", "outgoing_payment_sent"));
    app.provider.put_document("4481", SETTLEMENT_DOCUMENT);

    let summary = app.state.poller.poll_recent(10).await.unwrap();

    assert_eq!(summary.created, 1);
    let stored = app.store.find_by_transfer_id("4481").await.unwrap().unwrap();
    assert!(stored.has_settlement_details());
    assert_eq!(stored.final_recipient_name.as_deref(), Some("JANE ROE"));
}

#[tokio::test]
async fn test_poll_command_leaves_enriched_transactions() {
    let app = TestApp::new();
    app.provider.put_transfer(transfer("4481", "outgoing_payment_sent"));
    app.provider.put_document("4481", SETTLEMENT_DOCUMENT);

    cli::handle_poll(&app.state, 10).await.unwrap();

    let stored = app.store.find_by_transfer_id("4481").await.unwrap().unwrap();
    assert!(stored.has_settlement_details());
}

#[tokio::test]
async fn test_scheduled_poller_stops_on_shutdown() {
    let app = TestApp::new();
    let schedule = cron::Schedule::from_str("0 0 0 1 1 *").unwrap();
    let (stop, shutdown) = watch::channel(false);

    let poller = app.state.poller.clone();
    let task = tokio::spawn(async move { poller.run_scheduled(schedule, 10, shutdown).await });

    stop.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("poller stops promptly")
        .unwrap();
}

#[tokio::test]
async fn test_reconcile_command_waits_for_enrichment() {
    let app = TestApp::new();
    app.provider.put_transfer(transfer("4481", "outgoing_payment_delivered"));
    app.provider.put_document("4481", SETTLEMENT_DOCUMENT);

    cli::handle_reconcile(&app.state, "4481").await.unwrap();

    let stored = app.store.find_by_transfer_id("4481").await.unwrap().unwrap();
    assert_eq!(stored.final_recipient_bank_code.as_deref(), Some("DEUTDEFF500"));
}
