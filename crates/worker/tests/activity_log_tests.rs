//! Integration tests for the worker's activity log.

use palco_core::payloads::{to_value, DeadlineAlert, MissionUpdate};
use palco_events::{EventBus, RealtimeEvent};
use palco_worker::activity_log::{describe, run};
use serde_json::json;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Test: describe() summaries
// ---------------------------------------------------------------------------

#[test]
fn describes_deadline_alert_with_title_and_message() {
    let alert = DeadlineAlert::canned();
    let event = RealtimeEvent::new("alerta-prazo", to_value(&alert));

    let line = describe(&event);
    assert!(line.starts_with("[prazo] "));
    assert!(line.contains(&alert.title));
    assert!(line.contains(&alert.message));
}

#[test]
fn describes_mission_update_with_actor_and_delta() {
    let update = MissionUpdate::new("Ana (Equipe)", "atualizou o cronograma", 5);
    let event = RealtimeEvent::new("missao-atualizada", to_value(&update));

    assert_eq!(
        describe(&event),
        "[missão] Ana (Equipe) atualizou o cronograma (+5)"
    );
}

#[test]
fn unknown_events_fall_back_to_raw_payload() {
    let event = RealtimeEvent::new("orcamento-salvo", json!({"id": 3}));
    assert_eq!(describe(&event), r#"[orcamento-salvo] {"id":3}"#);
}

#[test]
fn event_timestamp_is_recent() {
    let event = RealtimeEvent::new("x", json!(null));
    let age = chrono::Utc::now() - event.timestamp;
    assert!(age.num_seconds() < 5);
}

// ---------------------------------------------------------------------------
// Test: run() counts logged events and honours cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_logs_until_cancelled() {
    let bus = EventBus::default();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run(bus.tap(), cancel.clone()));

    bus.publish("a", json!(1));
    bus.publish("b", json!(2));
    tokio::task::yield_now().await;

    // Give the logger a chance to drain before cancelling.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    cancel.cancel();

    let logged = task.await.expect("log task joins");
    assert_eq!(logged, 2);
}

#[tokio::test]
async fn run_stops_when_bus_is_dropped() {
    let bus = EventBus::default();
    let rx = bus.tap();
    drop(bus);

    let logged = run(rx, CancellationToken::new()).await;
    assert_eq!(logged, 0);
}
