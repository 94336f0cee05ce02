//! In-process event bus with per-name callback registration.
//!
//! [`EventBus`] is the central publish/subscribe hub for the realtime
//! simulator. Consumers register callbacks against an event name; producers
//! publish a name and a JSON payload. Every published event is additionally
//! mirrored onto a `tokio::sync::broadcast` tap for async observers that
//! want to follow the whole bus.
//!
//! # Registry rules
//!
//! - Callbacks for one name run in registration order.
//! - Registering the same [`Callback`] twice makes it run twice per publish.
//! - Unsubscribing removes the first registration sharing the callback's
//!   allocation; unknown names and callbacks are ignored.
//! - The registry lock is released before callbacks run, so a callback may
//!   subscribe or unsubscribe; the change applies from the next publish.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use palco_core::event_names::{EVENT_MISSION_UPDATED, EVENT_TASK_COMPLETED};
use palco_core::payloads::{to_value, MissionUpdate};
use palco_core::types::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::lock;
use crate::timers::TimerScope;

// ---------------------------------------------------------------------------
// Callback
// ---------------------------------------------------------------------------

/// A subscriber callback. Identity is the `Arc` allocation, so keep the
/// handle around to unsubscribe later.
pub type Callback = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// Wrap a closure as a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&serde_json::Value) + Send + Sync + 'static,
{
    Arc::new(f)
}

// ---------------------------------------------------------------------------
// RealtimeEvent
// ---------------------------------------------------------------------------

/// Envelope carried by the broadcast tap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeEvent {
    /// Topic name, e.g. `"alerta-prazo"`.
    pub name: String,

    /// Event-specific data.
    pub payload: serde_json::Value,

    /// When the event was published (UTC).
    pub timestamp: Timestamp,
}

impl RealtimeEvent {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
            timestamp: chrono::Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast tap.
const DEFAULT_CAPACITY: usize = 1024;

/// Simulated server round trip before an emitted request is answered.
pub const DEFAULT_ACK_DELAY: Duration = Duration::from_millis(600);

/// Actor reported when the current user completes a task.
pub const TASK_COMPLETED_ACTOR: &str = "Você";

/// Action reported when the current user completes a task.
pub const TASK_COMPLETED_ACTION: &str = "completou uma tarefa";

/// Progress credited for one completed task.
pub const TASK_COMPLETED_PROGRESS: i64 = 10;

/// In-process publish/subscribe registry.
///
/// Shared as `Arc<EventBus>`; [`EventBus::emit`] needs the `Arc` so the
/// delayed acknowledgement can publish after the call returns.
pub struct EventBus {
    registry: Mutex<HashMap<String, Vec<Callback>>>,
    sender: broadcast::Sender<RealtimeEvent>,
    timers: TimerScope,
    ack_delay: Duration,
}

impl EventBus {
    /// Create a bus whose delayed acknowledgements run on `timers`.
    pub fn new(timers: TimerScope, ack_delay: Duration) -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self {
            registry: Mutex::new(HashMap::new()),
            sender,
            timers,
            ack_delay,
        }
    }

    /// Register `cb` for `name`. No uniqueness check is made.
    pub fn subscribe(&self, name: &str, cb: Callback) {
        lock(&self.registry)
            .entry(name.to_string())
            .or_default()
            .push(cb);
        tracing::trace!(event = name, "Callback subscribed");
    }

    /// Remove the first registration of `cb` for `name`, if any.
    pub fn unsubscribe(&self, name: &str, cb: &Callback) {
        let mut registry = lock(&self.registry);
        let Some(callbacks) = registry.get_mut(name) else {
            return;
        };

        if let Some(pos) = callbacks.iter().position(|c| Arc::ptr_eq(c, cb)) {
            callbacks.remove(pos);
            tracing::trace!(event = name, "Callback unsubscribed");
        }
        if callbacks.is_empty() {
            registry.remove(name);
        }
    }

    /// Invoke every callback registered for `name`, in order.
    ///
    /// A panicking callback is logged and skipped; the rest still run.
    /// Returns the number of callbacks that completed normally.
    pub fn publish(&self, name: &str, payload: serde_json::Value) -> usize {
        let callbacks: Vec<Callback> = lock(&self.registry)
            .get(name)
            .cloned()
            .unwrap_or_default();

        let mut delivered = 0;
        for (index, cb) in callbacks.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| cb(&payload))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::error!(event = name, index, "Event callback panicked");
                }
            }
        }

        // Ignore the SendError; it only means the tap has no receivers.
        let _ = self.sender.send(RealtimeEvent::new(name, payload));

        delivered
    }

    /// Producer-facing send with simulated server latency.
    ///
    /// `"completar-tarefa"` is answered after the acknowledgement delay with
    /// a `"missao-atualizada"` crediting the current user. Other names are
    /// only logged. Must be called from within a Tokio runtime.
    pub fn emit(self: &Arc<Self>, name: &str, payload: serde_json::Value) {
        tracing::debug!(event = name, %payload, "Emit");

        if name != EVENT_TASK_COMPLETED {
            return;
        }

        let task_id = payload
            .get("taskId")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned);
        let bus = Arc::clone(self);

        self.timers.after(self.ack_delay, move || {
            let mut update = MissionUpdate::new(
                TASK_COMPLETED_ACTOR,
                TASK_COMPLETED_ACTION,
                TASK_COMPLETED_PROGRESS,
            );
            if let Some(task_id) = task_id {
                update = update.with_task_id(task_id);
            }
            bus.publish(EVENT_MISSION_UPDATED, to_value(&update));
        });
    }

    /// Follow every event published on this bus.
    pub fn tap(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.sender.subscribe()
    }

    /// Number of registrations currently held for `name`.
    pub fn subscriber_count(&self, name: &str) -> usize {
        lock(&self.registry).get(name).map_or(0, Vec::len)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(TimerScope::new(), DEFAULT_ACK_DELAY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    /// Callback that appends `tag` to a shared log.
    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &str) -> Callback {
        let log = Arc::clone(log);
        let tag = tag.to_string();
        callback(move |_| lock(&log).push(tag.clone()))
    }

    #[test]
    fn publish_runs_callbacks_in_registration_order() {
        let bus = EventBus::default();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe("topic", recorder(&log, "a"));
        bus.subscribe("topic", recorder(&log, "b"));
        bus.subscribe("other", recorder(&log, "x"));

        assert_eq!(bus.publish("topic", json!({})), 2);
        assert_eq!(*lock(&log), vec!["a", "b"]);
    }

    #[test]
    fn same_callback_twice_runs_twice() {
        let bus = EventBus::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        let cb = recorder(&log, "dup");

        bus.subscribe("topic", Arc::clone(&cb));
        bus.subscribe("topic", Arc::clone(&cb));
        bus.publish("topic", json!(null));
        assert_eq!(lock(&log).len(), 2);

        // Unsubscribing removes only one of the two registrations.
        bus.unsubscribe("topic", &cb);
        bus.publish("topic", json!(null));
        assert_eq!(lock(&log).len(), 3);
    }

    #[test]
    fn unsubscribe_unknown_is_noop() {
        let bus = EventBus::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        let registered = recorder(&log, "kept");
        let stranger = recorder(&log, "stranger");

        bus.subscribe("topic", Arc::clone(&registered));
        bus.unsubscribe("topic", &stranger);
        bus.unsubscribe("missing", &registered);

        assert_eq!(bus.subscriber_count("topic"), 1);
        bus.publish("topic", json!(null));
        assert_eq!(*lock(&log), vec!["kept"]);
    }

    #[test]
    fn panicking_callback_does_not_block_others() {
        let bus = EventBus::default();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe("topic", callback(|_| panic!("subscriber failure")));
        bus.subscribe("topic", recorder(&log, "after"));

        assert_eq!(bus.publish("topic", json!(null)), 1);
        assert_eq!(*lock(&log), vec!["after"]);
    }

    #[test]
    fn callback_may_unsubscribe_itself() {
        let bus = Arc::new(EventBus::default());
        let hits = Arc::new(Mutex::new(0));
        let slot: Arc<Mutex<Option<Callback>>> = Arc::new(Mutex::new(None));

        let cb = {
            let bus = Arc::clone(&bus);
            let hits = Arc::clone(&hits);
            let slot = Arc::clone(&slot);
            callback(move |_| {
                *lock(&hits) += 1;
                if let Some(me) = lock(&slot).clone() {
                    bus.unsubscribe("once", &me);
                }
            })
        };
        *lock(&slot) = Some(Arc::clone(&cb));
        bus.subscribe("once", cb);

        bus.publish("once", json!(null));
        bus.publish("once", json!(null));
        assert_eq!(*lock(&hits), 1);
    }

    #[test]
    fn payload_reaches_callback() {
        let bus = EventBus::default();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        bus.subscribe("topic", callback(move |p| *lock(&sink) = Some(p.clone())));

        bus.publish("topic", json!({"key": "value"}));
        assert_eq!(*lock(&seen), Some(json!({"key": "value"})));
    }

    #[tokio::test]
    async fn tap_sees_published_events() {
        let bus = EventBus::default();
        let mut rx = bus.tap();

        bus.publish("tapped", json!({"n": 1}));

        let event = rx.recv().await.expect("tap should receive the event");
        assert_eq!(event.name, "tapped");
        assert_eq!(event.payload["n"], 1);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        assert_eq!(bus.publish("orphan", json!(null)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn emit_task_completed_answers_after_ack_delay() {
        let bus = Arc::new(EventBus::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(
            EVENT_MISSION_UPDATED,
            callback(move |p| lock(&sink).push(p.clone())),
        );

        bus.emit(EVENT_TASK_COMPLETED, json!({"taskId": "t1"}));

        tokio::time::sleep(Duration::from_millis(599)).await;
        assert!(lock(&seen).is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        let seen = lock(&seen);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["action"], TASK_COMPLETED_ACTION);
        assert_eq!(seen[0]["progressDelta"], TASK_COMPLETED_PROGRESS);
        assert_eq!(seen[0]["actor"], TASK_COMPLETED_ACTOR);
        assert_eq!(seen[0]["taskId"], "t1");
    }

    #[tokio::test(start_paused = true)]
    async fn emit_other_names_has_no_reply() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.tap();

        bus.emit("salvar-rascunho", json!({}));
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(rx.try_recv().is_err());
    }
}
