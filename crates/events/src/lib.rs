//! Palco realtime simulator.
//!
//! This crate provides the in-process building blocks behind the app's
//! "live" features:
//!
//! - [`EventBus`]: per-name publish/subscribe registry with a broadcast tap.
//! - [`NotificationScheduler`]: policy-gated, randomly drawn deadline alerts.
//! - [`SettingsSync`]: keeps the notification policy in step with the
//!   external settings store.
//! - [`RoomSimulator`]: room membership and simulated teammate activity.
//! - [`RealtimeService`]: owns all of the above with an explicit
//!   `start`/`stop` lifecycle.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod bus;
pub mod clock;
pub mod config;
pub mod consumers;
pub mod rooms;
pub mod scheduler;
pub mod service;
pub mod settings;
pub mod timers;

pub use bus::{callback, Callback, EventBus, RealtimeEvent};
pub use clock::{Clock, FixedRandom, ManualClock, RandomSource, SystemClock, ThreadRandom};
pub use config::RealtimeConfig;
pub use consumers::{ActivityFeed, AlertTray};
pub use rooms::RoomSimulator;
pub use scheduler::{NotificationScheduler, TickOutcome};
pub use service::{Dependencies, RealtimeService, ServiceError};
pub use settings::{InMemorySettingsStore, SettingsStore, SettingsSync, StoreError};
pub use timers::TimerScope;

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Subscriber callbacks run under `catch_unwind`, so a poisoned lock only
/// means a callback failed mid-update; the registry itself stays usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
