use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::request::RequestKind;
use crate::sink::test_support::{RecordingSink, SinkCall};
use crate::sink::SinkError;
use crate::source::test_support::MockSource;
use crate::source::{PendingItem, SourceError};

fn fast_policy(max_idle_polls: u32) -> ConsumerPolicy {
    ConsumerPolicy {
        max_idle_polls,
        poll_interval: Duration::ZERO,
        retain_rejected: false,
    }
}

fn payload(value: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&value).unwrap()
}

fn create_payload(request_id: &str, widget_id: &str) -> Vec<u8> {
    payload(json!({
        "type": "create",
        "requestId": request_id,
        "widgetId": widget_id,
        "owner": "Sue Smith",
        "label": "GEDOQ",
        "description": "KCBCDPEA",
        "otherAttributes": [{"name": "size", "value": "777"}]
    }))
}

fn update_payload(request_id: &str, widget_id: &str) -> Vec<u8> {
    payload(json!({
        "type": "update",
        "requestId": request_id,
        "widgetId": widget_id,
        "owner": "Sue Smith",
        "description": "PUMMCL",
        "otherAttributes": []
    }))
}

fn delete_payload(request_id: &str, widget_id: &str) -> Vec<u8> {
    payload(json!({
        "type": "delete",
        "requestId": request_id,
        "widgetId": widget_id,
        "owner": "Sue Smith"
    }))
}

fn consumer(
    source: &Arc<MockSource>,
    sink: &Arc<RecordingSink>,
    policy: ConsumerPolicy,
) -> ConsumerLoop<Arc<MockSource>, Arc<RecordingSink>> {
    ConsumerLoop::new(source.clone(), sink.clone(), policy)
}

#[tokio::test]
async fn drains_in_key_order_then_stops_after_idle_budget() {
    let update = update_payload("r-2", "w-1");
    let create = create_payload("r-1", "w-1");
    let source = Arc::new(MockSource::with_payloads(vec![
        ("002-create", &create),
        ("001-update", &update),
    ]));
    let sink = Arc::new(RecordingSink::default());

    let summary = consumer(&source, &sink, fast_policy(10))
        .run(CancellationToken::new())
        .await;

    assert_eq!(
        sink.calls(),
        vec![
            SinkCall::Update {
                widget_id: "w-1".to_string()
            },
            SinkCall::Create {
                request_id: "r-1".to_string(),
                widget_id: "w-1".to_string()
            },
        ]
    );
    assert_eq!(source.acknowledged(), vec!["001-update", "002-create"]);
    assert!(source.remaining().is_empty());
    // One drain with work, then ten empty ones.
    assert_eq!(source.list_calls(), 11);
    assert_eq!(summary.drains, 11);
    assert_eq!(summary.applied, 2);
    assert_eq!(summary.idle_polls, 10);
    assert_eq!(summary.stop_reason, StopReason::IdleExhausted);
}

#[tokio::test]
async fn empty_source_stops_after_exactly_max_idle_polls() {
    let source = Arc::new(MockSource::default());
    let sink = Arc::new(RecordingSink::default());

    let summary = consumer(&source, &sink, fast_policy(3))
        .run(CancellationToken::new())
        .await;

    assert_eq!(source.list_calls(), 3);
    assert_eq!(summary.idle_polls, 3);
    assert_eq!(summary.stop_reason, StopReason::IdleExhausted);
    assert!(sink.calls().is_empty());
}

#[tokio::test]
async fn update_without_description_is_dropped_without_touching_sink() {
    let bad = payload(json!({
        "type": "update",
        "requestId": "r-1",
        "widgetId": "w-1",
        "owner": "Sue Smith",
        "otherAttributes": []
    }));
    let source = Arc::new(MockSource::with_payloads(vec![("001", &bad)]));
    let sink = Arc::new(RecordingSink::default());

    let outcome = consumer(&source, &sink, fast_policy(1))
        .dispatch(&PendingItem::keyed("001"))
        .await;

    assert_eq!(
        outcome,
        DispatchOutcome::Rejected {
            kind: Some(RequestKind::Update),
            reason: "update request is missing required field `description`".to_string(),
            dropped: true,
        }
    );
    assert!(sink.calls().is_empty());
    assert!(source.remaining().is_empty());
}

#[tokio::test]
async fn retained_rejections_stay_in_the_source() {
    let source = Arc::new(MockSource::with_payloads(vec![("001", b"{not json")]));
    let sink = Arc::new(RecordingSink::default());
    let policy = ConsumerPolicy {
        retain_rejected: true,
        ..fast_policy(1)
    };

    let outcome = consumer(&source, &sink, policy)
        .dispatch(&PendingItem::keyed("001"))
        .await;

    assert!(matches!(
        outcome,
        DispatchOutcome::Rejected {
            kind: None,
            dropped: false,
            ..
        }
    ));
    assert_eq!(source.remaining(), vec!["001"]);
    assert!(source.acknowledged().is_empty());
}

#[tokio::test]
async fn unknown_type_is_rejected() {
    let unknown = payload(json!({"type": "upsert", "requestId": "r-1"}));
    let source = Arc::new(MockSource::with_payloads(vec![("001", &unknown)]));
    let sink = Arc::new(RecordingSink::default());

    let summary = consumer(&source, &sink, fast_policy(1))
        .run(CancellationToken::new())
        .await;

    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.applied, 0);
    assert!(sink.calls().is_empty());
    assert!(source.remaining().is_empty());
}

#[tokio::test]
async fn delete_uses_normalized_owner_and_repeats_safely() {
    let delete = delete_payload("r-9", "w-1");
    let source = Arc::new(MockSource::with_payloads(vec![("001", &delete)]));
    let sink = Arc::new(RecordingSink::default());

    consumer(&source, &sink, fast_policy(1))
        .run(CancellationToken::new())
        .await;
    source.push("002", &delete);
    let summary = consumer(&source, &sink, fast_policy(1))
        .run(CancellationToken::new())
        .await;

    let expected = SinkCall::Delete {
        widget_id: "w-1".to_string(),
        owner: "sue-smith".to_string(),
    };
    assert_eq!(sink.calls(), vec![expected.clone(), expected]);
    assert_eq!(summary.applied, 1);
    assert!(source.remaining().is_empty());
}

#[tokio::test]
async fn transient_sink_failure_defers_then_applies_on_next_pass() {
    let create = create_payload("r-1", "w-1");
    let source = Arc::new(MockSource::with_payloads(vec![("001", &create)]));
    let sink = Arc::new(RecordingSink::with_outcomes(vec![Err(
        SinkError::Unavailable("throttled".to_string()),
    )]));

    let summary = consumer(&source, &sink, fast_policy(2))
        .run(CancellationToken::new())
        .await;

    assert_eq!(sink.calls().len(), 2);
    assert_eq!(summary.deferred, 1);
    assert_eq!(summary.applied, 1);
    assert_eq!(summary.idle_polls, 2);
    assert_eq!(source.acknowledged(), vec!["001"]);
}

#[tokio::test]
async fn permanent_sink_failure_drops_the_request() {
    let create = create_payload("r-1", "w-1");
    let source = Arc::new(MockSource::with_payloads(vec![("001", &create)]));
    let sink = Arc::new(RecordingSink::with_outcomes(vec![Err(SinkError::Rejected(
        "bad key".to_string(),
    ))]));

    let summary = consumer(&source, &sink, fast_policy(1))
        .run(CancellationToken::new())
        .await;

    assert_eq!(sink.calls().len(), 1);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.applied, 0);
    assert!(source.remaining().is_empty());
}

#[tokio::test]
async fn fetch_failure_defers_the_item() {
    let create = create_payload("r-1", "w-1");
    let source = Arc::new(MockSource::with_payloads(vec![("001", &create)]));
    source.fail_fetch_once("001");
    let sink = Arc::new(RecordingSink::default());

    let outcome = consumer(&source, &sink, fast_policy(1))
        .dispatch(&PendingItem::keyed("001"))
        .await;

    assert!(matches!(outcome, DispatchOutcome::Deferred { kind: None, .. }));
    assert!(sink.calls().is_empty());
    assert_eq!(source.remaining(), vec!["001"]);
}

#[tokio::test]
async fn ack_failure_still_counts_as_applied_and_redelivers() {
    let update = update_payload("r-1", "w-1");
    let source = Arc::new(MockSource::with_payloads(vec![("001", &update)]));
    source.fail_ack_once("001");
    let sink = Arc::new(RecordingSink::default());

    let summary = consumer(&source, &sink, fast_policy(1))
        .run(CancellationToken::new())
        .await;

    // Applied twice: once before the failed ack, once on redelivery.
    assert_eq!(sink.calls().len(), 2);
    assert_eq!(summary.applied, 2);
    assert_eq!(summary.ack_failures, 1);
    assert!(source.remaining().is_empty());
}

#[tokio::test]
async fn failed_listing_counts_as_idle_poll() {
    let create = create_payload("r-1", "w-1");
    let source = Arc::new(MockSource::with_payloads(vec![("001", &create)]));
    source.script_listings(vec![Some(SourceError::Unavailable("timeout".to_string()))]);
    let sink = Arc::new(RecordingSink::default());

    let summary = consumer(&source, &sink, fast_policy(2))
        .run(CancellationToken::new())
        .await;

    assert_eq!(summary.source_errors, 1);
    assert_eq!(summary.applied, 1);
    // The failed listing and the empty drain after the work share one budget.
    assert_eq!(summary.idle_polls, 2);
    assert_eq!(source.list_calls(), 3);
}

#[tokio::test]
async fn finding_work_does_not_restore_idle_budget() {
    let create = create_payload("r-1", "w-1");
    let source = Arc::new(MockSource::with_payloads(vec![("001", &create)]));
    source.script_listings(vec![
        Some(SourceError::Unavailable("timeout".to_string())),
        Some(SourceError::Unavailable("timeout".to_string())),
    ]);
    let sink = Arc::new(RecordingSink::default());

    let summary = consumer(&source, &sink, fast_policy(3))
        .run(CancellationToken::new())
        .await;

    assert_eq!(summary.applied, 1);
    assert_eq!(summary.idle_polls, 3);
    assert_eq!(source.list_calls(), 4);
    assert_eq!(summary.stop_reason, StopReason::IdleExhausted);
}

#[tokio::test]
async fn repeated_listing_failures_exhaust_the_budget() {
    let source = Arc::new(MockSource::default());
    source.script_listings(vec![
        Some(SourceError::Unavailable("down".to_string())),
        Some(SourceError::Unavailable("down".to_string())),
    ]);
    let sink = Arc::new(RecordingSink::default());

    let summary = consumer(&source, &sink, fast_policy(2))
        .run(CancellationToken::new())
        .await;

    assert_eq!(summary.source_errors, 2);
    assert_eq!(summary.stop_reason, StopReason::IdleExhausted);
}

#[tokio::test]
async fn cancelled_before_start_never_lists() {
    let create = create_payload("r-1", "w-1");
    let source = Arc::new(MockSource::with_payloads(vec![("001", &create)]));
    let sink = Arc::new(RecordingSink::default());
    let token = CancellationToken::new();
    token.cancel();

    let summary = consumer(&source, &sink, fast_policy(10)).run(token).await;

    assert_eq!(summary.stop_reason, StopReason::Shutdown);
    assert_eq!(source.list_calls(), 0);
    assert_eq!(source.remaining(), vec!["001"]);
}

#[tokio::test]
async fn shutdown_mid_pass_finishes_current_item_only() {
    let first = create_payload("r-1", "w-1");
    let second = create_payload("r-2", "w-2");
    let source = Arc::new(MockSource::with_payloads(vec![
        ("001", &first),
        ("002", &second),
    ]));
    let token = CancellationToken::new();
    let sink = Arc::new(RecordingSink::cancelling(token.clone()));

    let summary = consumer(&source, &sink, fast_policy(10)).run(token).await;

    assert_eq!(summary.stop_reason, StopReason::Shutdown);
    assert_eq!(summary.applied, 1);
    assert_eq!(source.acknowledged(), vec!["001"]);
    assert_eq!(source.remaining(), vec!["002"]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_idle_wait() {
    let source = Arc::new(MockSource::default());
    let sink = Arc::new(RecordingSink::default());
    let policy = ConsumerPolicy {
        max_idle_polls: 10,
        poll_interval: Duration::from_secs(3600),
        retain_rejected: false,
    };
    let token = CancellationToken::new();
    let consumer = consumer(&source, &sink, policy);

    let canceller = {
        let token = token.clone();
        async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        }
    };
    let (summary, ()) = tokio::join!(consumer.run(token), canceller);

    assert_eq!(summary.stop_reason, StopReason::Shutdown);
    assert_eq!(source.list_calls(), 1);
    assert_eq!(summary.idle_polls, 1);
}

#[test]
fn policy_follows_config() {
    let config = crate::config::Config {
        max_idle_polls: 4,
        poll_interval: Duration::from_millis(25),
        retain_rejected: true,
        ..Default::default()
    };
    assert_eq!(
        ConsumerPolicy::from_config(&config),
        ConsumerPolicy {
            max_idle_polls: 4,
            poll_interval: Duration::from_millis(25),
            retain_rejected: true,
        }
    );
}
