//! Bus consumers backing the live activity feed and the deadline-alert toasts.
//!
//! Both follow the mount/unmount contract: they subscribe on construction
//! and unsubscribe on [`detach`](ActivityFeed::detach) or drop.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use palco_core::event_names::{EVENT_DEADLINE_ALERT, EVENT_MISSION_UPDATED};
use palco_core::payloads::{DeadlineAlert, MissionUpdate};

use crate::bus::{callback, Callback, EventBus};
use crate::lock;

/// Number of updates an [`ActivityFeed`] keeps by default.
pub const DEFAULT_FEED_CAPACITY: usize = 20;

/// Number of unread alerts an [`AlertTray`] keeps by default.
pub const DEFAULT_TRAY_CAPACITY: usize = 20;

/// Registration that is undone when dropped.
struct Attachment {
    bus: Arc<EventBus>,
    event: &'static str,
    cb: Option<Callback>,
}

impl Attachment {
    fn new(bus: Arc<EventBus>, event: &'static str, cb: Callback) -> Self {
        bus.subscribe(event, Arc::clone(&cb));
        Self {
            bus,
            event,
            cb: Some(cb),
        }
    }

    fn detach(&mut self) {
        if let Some(cb) = self.cb.take() {
            self.bus.unsubscribe(self.event, &cb);
        }
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.detach();
    }
}

// ---------------------------------------------------------------------------
// ActivityFeed
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FeedState {
    entries: VecDeque<MissionUpdate>,
    progress: i64,
}

/// Most recent mission updates, newest first, with a running progress total.
pub struct ActivityFeed {
    state: Arc<Mutex<FeedState>>,
    attachment: Attachment,
}

impl ActivityFeed {
    pub fn attach(bus: Arc<EventBus>, capacity: usize) -> Self {
        let state = Arc::new(Mutex::new(FeedState::default()));
        let sink = Arc::clone(&state);

        let cb = callback(move |payload| {
            let update: MissionUpdate = match serde_json::from_value(payload.clone()) {
                Ok(update) => update,
                Err(e) => {
                    tracing::warn!(error = %e, "Activity feed skipped malformed mission update");
                    return;
                }
            };

            let mut state = lock(&sink);
            state.progress += update.progress_delta;
            state.entries.push_front(update);
            state.entries.truncate(capacity);
        });

        Self {
            state,
            attachment: Attachment::new(bus, EVENT_MISSION_UPDATED, cb),
        }
    }

    /// Snapshot of the retained updates, newest first.
    pub fn entries(&self) -> Vec<MissionUpdate> {
        lock(&self.state).entries.iter().cloned().collect()
    }

    /// Sum of `progress_delta` over every update received, retained or not.
    pub fn progress(&self) -> i64 {
        lock(&self.state).progress
    }

    /// Stop receiving updates. Already collected entries stay readable.
    pub fn detach(&mut self) {
        self.attachment.detach();
    }
}

// ---------------------------------------------------------------------------
// AlertTray
// ---------------------------------------------------------------------------

/// Unread deadline alerts, oldest first. When full, the oldest alert is
/// dropped to make room.
pub struct AlertTray {
    unread: Arc<Mutex<VecDeque<DeadlineAlert>>>,
    attachment: Attachment,
}

impl AlertTray {
    pub fn attach(bus: Arc<EventBus>, capacity: usize) -> Self {
        let unread = Arc::new(Mutex::new(VecDeque::new()));
        let sink = Arc::clone(&unread);

        let cb = callback(move |payload| {
            match serde_json::from_value::<DeadlineAlert>(payload.clone()) {
                Ok(alert) => {
                    tracing::debug!(alert_id = %alert.id, "Alert tray received deadline alert");
                    let mut unread = lock(&sink);
                    unread.push_back(alert);
                    while unread.len() > capacity {
                        unread.pop_front();
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Alert tray skipped malformed deadline alert");
                }
            }
        });

        Self {
            unread,
            attachment: Attachment::new(bus, EVENT_DEADLINE_ALERT, cb),
        }
    }

    pub fn unread(&self) -> Vec<DeadlineAlert> {
        lock(&self.unread).iter().cloned().collect()
    }

    /// Remove the alert with `id`. Returns whether it was present.
    pub fn dismiss(&self, id: &str) -> bool {
        let mut unread = lock(&self.unread);
        let before = unread.len();
        unread.retain(|alert| alert.id != id);
        unread.len() != before
    }

    pub fn detach(&mut self) {
        self.attachment.detach();
    }
}
