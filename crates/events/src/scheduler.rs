//! Deadline-alert scheduler.
//!
//! [`NotificationScheduler`] runs as a background task. On every tick it
//! consults the current [`NotificationPolicy`] and, if the policy allows it,
//! runs an independent Bernoulli trial; a successful draw manufactures a
//! deadline alert and publishes it on the [`EventBus`].
//!
//! This is not a queue: a failed draw is simply lost, and over a long window
//! the number of delivered alerts approaches
//! `min(frequency_limit, 0.2 * ticks_inside_window)`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use palco_core::event_names::EVENT_DEADLINE_ALERT;
use palco_core::notification_policy::{NotificationPolicy, Suppression};
use palco_core::payloads::{to_value, DeadlineAlert};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::bus::EventBus;
use crate::clock::{Clock, RandomSource};
use crate::lock;

/// How often the scheduler evaluates the policy.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(30);

/// A draw must exceed this value for an alert to fire (~20% per tick).
pub const ALERT_DRAW_THRESHOLD: f64 = 0.8;

/// What a single tick decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The policy gate held the alert back.
    Suppressed(Suppression),
    /// The gate was open but the random draw did not pass.
    NotDrawn,
    /// An alert was published.
    Delivered(DeadlineAlert),
}

// ---------------------------------------------------------------------------
// NotificationScheduler
// ---------------------------------------------------------------------------

/// Background service that manufactures deadline alerts on a fixed tick.
pub struct NotificationScheduler {
    bus: Arc<EventBus>,
    policy: watch::Receiver<NotificationPolicy>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    /// Alerts delivered over the scheduler's lifetime. Never decremented.
    delivered: Mutex<u64>,
    interval: Duration,
}

impl NotificationScheduler {
    pub fn new(
        bus: Arc<EventBus>,
        policy: watch::Receiver<NotificationPolicy>,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
        interval: Duration,
    ) -> Self {
        Self {
            bus,
            policy,
            clock,
            random,
            delivered: Mutex::new(0),
            interval,
        }
    }

    /// Number of alerts delivered so far.
    pub fn delivered_count(&self) -> u64 {
        *lock(&self.delivered)
    }

    /// Evaluate one tick.
    ///
    /// The counter is checked and incremented under one lock, so concurrent
    /// ticks can never push deliveries past the frequency limit. The alert
    /// is published after the lock is released.
    pub fn tick(&self) -> TickOutcome {
        let policy = self.policy.borrow().clone();
        let now = self.clock.local_time_of_day();

        {
            let mut delivered = lock(&self.delivered);

            if let Some(reason) = policy.suppression(now, *delivered) {
                tracing::debug!(?reason, now = %now, delivered = *delivered, "Deadline alert suppressed");
                return TickOutcome::Suppressed(reason);
            }

            let draw = self.random.next_unit();
            if draw <= ALERT_DRAW_THRESHOLD {
                tracing::trace!(draw, "Deadline alert not drawn");
                return TickOutcome::NotDrawn;
            }

            *delivered += 1;
        }

        let alert = DeadlineAlert::canned();
        self.bus.publish(EVENT_DEADLINE_ALERT, to_value(&alert));
        tracing::info!(
            alert_id = %alert.id,
            delivered = self.delivered_count(),
            limit = policy.frequency_limit,
            "Deadline alert delivered"
        );

        TickOutcome::Delivered(alert)
    }

    /// Run the scheduler loop.
    ///
    /// The first tick happens one full interval after the call. The loop
    /// exits when `cancel` is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_secs = self.interval.as_secs(), "Notification scheduler started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Notification scheduler cancelled");
                    break;
                }
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
