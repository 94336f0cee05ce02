//! Simulated collaborator presence in shared rooms.
//!
//! Joining a room whose id contains `"mission"` schedules two canned
//! `"missao-atualizada"` events from fabricated teammates. By default those
//! timers survive [`RoomSimulator::leave_room`], so a stale teammate update
//! may still arrive after leaving; set `cancel_presence_on_leave` to cancel
//! them instead.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use palco_core::event_names::{EVENT_MISSION_UPDATED, MISSION_ROOM_MARKER};
use palco_core::payloads::{to_value, MissionUpdate};

use crate::bus::EventBus;
use crate::lock;
use crate::timers::TimerScope;

/// One canned teammate action fired after joining a mission room.
#[derive(Debug, Clone, Copy)]
pub struct PresenceCue {
    pub delay: Duration,
    pub actor: &'static str,
    pub action: &'static str,
    pub progress_delta: i64,
}

/// Teammate activity scheduled on every mission-room join, in firing order.
pub const MISSION_PRESENCE_CUES: [PresenceCue; 2] = [
    PresenceCue {
        delay: Duration::from_secs(5),
        actor: "Ana (Equipe)",
        action: "atualizou o cronograma",
        progress_delta: 5,
    },
    PresenceCue {
        delay: Duration::from_secs(12),
        actor: "Carlos (Financeiro)",
        action: "aprovou um item do orçamento",
        progress_delta: 15,
    },
];

/// Tracks joined rooms and fakes teammate activity in mission rooms.
pub struct RoomSimulator {
    bus: Arc<EventBus>,
    timers: TimerScope,
    /// Joined rooms, each with the scope its presence timers run under.
    rooms: Mutex<HashMap<String, TimerScope>>,
    cancel_presence_on_leave: bool,
}

impl RoomSimulator {
    pub fn new(bus: Arc<EventBus>, timers: TimerScope, cancel_presence_on_leave: bool) -> Self {
        Self {
            bus,
            timers,
            rooms: Mutex::new(HashMap::new()),
            cancel_presence_on_leave,
        }
    }

    /// Join `room_id`. Joining a room already joined does nothing.
    ///
    /// Returns `true` when the room was newly joined. Must be called from
    /// within a Tokio runtime.
    pub fn join_room(&self, room_id: &str) -> bool {
        let scope = {
            let mut rooms = lock(&self.rooms);
            if rooms.contains_key(room_id) {
                tracing::debug!(room_id, "Already in room");
                return false;
            }
            let scope = self.timers.child();
            rooms.insert(room_id.to_string(), scope.clone());
            scope
        };

        tracing::info!(room_id, "Joined room");

        if room_id.contains(MISSION_ROOM_MARKER) {
            for cue in MISSION_PRESENCE_CUES {
                let bus = Arc::clone(&self.bus);
                let room = room_id.to_string();
                scope.after(cue.delay, move || {
                    tracing::debug!(room_id = %room, actor = cue.actor, "Simulated teammate activity");
                    let update = MissionUpdate::new(cue.actor, cue.action, cue.progress_delta);
                    bus.publish(EVENT_MISSION_UPDATED, to_value(&update));
                });
            }
        }

        true
    }

    /// Leave `room_id`. Leaving a room not joined does nothing.
    ///
    /// Returns `true` when the room was joined.
    pub fn leave_room(&self, room_id: &str) -> bool {
        let Some(scope) = lock(&self.rooms).remove(room_id) else {
            return false;
        };

        if self.cancel_presence_on_leave {
            scope.token().cancel();
        }
        tracing::info!(
            room_id,
            presence_cancelled = self.cancel_presence_on_leave,
            "Left room"
        );
        true
    }

    pub fn is_member(&self, room_id: &str) -> bool {
        lock(&self.rooms).contains_key(room_id)
    }

    /// Ids of every joined room, sorted.
    pub fn joined_rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = lock(&self.rooms).keys().cloned().collect();
        rooms.sort();
        rooms
    }
}
