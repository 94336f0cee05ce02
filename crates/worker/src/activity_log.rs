//! Structured logging of every event published on the realtime bus.
//!
//! [`run`] follows the bus's broadcast tap and writes one log line per
//! event. It is the daemon's stand-in for the UI's toast and activity-feed
//! widgets.

use palco_core::event_names::{EVENT_DEADLINE_ALERT, EVENT_MISSION_UPDATED};
use palco_events::RealtimeEvent;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// One-line human summary of an event.
pub fn describe(event: &RealtimeEvent) -> String {
    let field = |key: &str| event.payload.get(key).and_then(|v| v.as_str());

    match event.name.as_str() {
        EVENT_DEADLINE_ALERT => format!(
            "[prazo] {}: {}",
            field("title").unwrap_or("?"),
            field("message").unwrap_or("")
        ),
        EVENT_MISSION_UPDATED => {
            let delta = event
                .payload
                .get("progressDelta")
                .and_then(|v| v.as_i64())
                .unwrap_or(0);
            format!(
                "[missão] {} {} (+{delta})",
                field("actor").unwrap_or("Alguém"),
                field("action").unwrap_or("atualizou a missão"),
            )
        }
        other => format!("[{other}] {}", event.payload),
    }
}

/// Log every event received on `receiver` until `cancel` fires or the bus
/// is dropped. Returns the number of events logged.
pub async fn run(mut receiver: broadcast::Receiver<RealtimeEvent>, cancel: CancellationToken) -> u64 {
    let mut logged = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = receiver.recv() => match received {
                Ok(event) => {
                    logged += 1;
                    tracing::info!(event = %event.name, at = %event.timestamp, "{}", describe(&event));
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Activity log lagged, some events were not logged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, activity log shutting down");
                    break;
                }
            },
        }
    }

    logged
}
