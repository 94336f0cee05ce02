//! Realtime service: lifecycle owner and public API of the simulator.
//!
//! [`RealtimeService`] is constructed explicitly with its collaborators
//! (settings store, clock, random source) so that tests can run isolated
//! instances side by side. [`RealtimeService::start`] performs the startup
//! settings read and spawns the background tasks; [`RealtimeService::stop`]
//! cancels them and waits for them to finish. Dropping a running service
//! cancels its tasks without waiting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use palco_core::notification_policy::NotificationPolicy;
use tokio::sync::watch;

use crate::bus::{Callback, EventBus};
use crate::clock::{Clock, RandomSource, SystemClock, ThreadRandom};
use crate::config::RealtimeConfig;
use crate::lock;
use crate::rooms::RoomSimulator;
use crate::scheduler::NotificationScheduler;
use crate::settings::{SettingsStore, SettingsSync};
use crate::timers::TimerScope;

/// Lifecycle misuse.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Realtime service was already started")]
    AlreadyStarted,

    #[error("Realtime service is not running")]
    NotStarted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Running,
    Stopped,
}

/// Collaborators injected into the service.
#[derive(Clone)]
pub struct Dependencies {
    pub store: Arc<dyn SettingsStore>,
    pub clock: Arc<dyn Clock>,
    pub random: Arc<dyn RandomSource>,
}

impl Dependencies {
    /// Use `store` with the system clock and the thread-local RNG.
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            random: Arc::new(ThreadRandom),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }
}

/// The in-process realtime simulator.
pub struct RealtimeService {
    config: RealtimeConfig,
    store: Arc<dyn SettingsStore>,
    bus: Arc<EventBus>,
    rooms: RoomSimulator,
    scheduler: Arc<NotificationScheduler>,
    sync: Arc<SettingsSync>,
    policy: watch::Receiver<NotificationPolicy>,
    timers: TimerScope,
    connected: Arc<AtomicBool>,
    state: Mutex<Lifecycle>,
}

impl RealtimeService {
    pub fn new(config: RealtimeConfig, deps: Dependencies) -> Self {
        let timers = TimerScope::new();
        let bus = Arc::new(EventBus::new(timers.child(), config.ack_delay));
        let rooms = RoomSimulator::new(
            Arc::clone(&bus),
            timers.child(),
            config.cancel_presence_on_leave,
        );

        let (policy_tx, policy_rx) = watch::channel(NotificationPolicy::default());
        let scheduler = Arc::new(NotificationScheduler::new(
            Arc::clone(&bus),
            policy_rx.clone(),
            deps.clock,
            deps.random,
            config.tick_interval,
        ));
        let sync = Arc::new(SettingsSync::new(config.settings_key.clone(), policy_tx));

        Self {
            config,
            store: deps.store,
            bus,
            rooms,
            scheduler,
            sync,
            policy: policy_rx,
            timers,
            connected: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(Lifecycle::Idle),
        }
    }

    /// Load settings and spawn the background tasks.
    ///
    /// The change feed is subscribed before the startup read so that a
    /// change landing between the two is not lost. A failed read is logged
    /// and the default policy stays in effect.
    pub async fn start(&self) -> Result<(), ServiceError> {
        {
            let mut state = lock(&self.state);
            if *state != Lifecycle::Idle {
                return Err(ServiceError::AlreadyStarted);
            }
            *state = Lifecycle::Running;
        }

        let changes = self.store.subscribe(&self.config.settings_key);
        self.sync.load(self.store.as_ref()).await;

        let sync = Arc::clone(&self.sync);
        let cancel = self.timers.token().clone();
        self.timers
            .spawn(async move { sync.run(changes, cancel).await });

        let scheduler = Arc::clone(&self.scheduler);
        let cancel = self.timers.token().clone();
        self.timers
            .spawn(async move { scheduler.run(cancel).await });

        let connected = Arc::clone(&self.connected);
        self.timers.after(self.config.connect_delay, move || {
            connected.store(true, Ordering::SeqCst);
            tracing::info!("Realtime service connected");
        });

        tracing::info!(
            settings_key = %self.config.settings_key,
            tick_secs = self.config.tick_interval.as_secs(),
            "Realtime service started"
        );
        Ok(())
    }

    /// Cancel every background task and timer, then wait for them to finish.
    pub async fn stop(&self) -> Result<(), ServiceError> {
        {
            let mut state = lock(&self.state);
            if *state != Lifecycle::Running {
                return Err(ServiceError::NotStarted);
            }
            *state = Lifecycle::Stopped;
        }

        self.timers.shutdown().await;
        self.connected.store(false, Ordering::SeqCst);
        tracing::info!(
            delivered_alerts = self.scheduler.delivered_count(),
            "Realtime service stopped"
        );
        Ok(())
    }

    /// Register `cb` for `event`.
    pub fn on(&self, event: &str, cb: Callback) {
        self.bus.subscribe(event, cb);
    }

    /// Remove one registration of `cb` for `event`.
    pub fn off(&self, event: &str, cb: &Callback) {
        self.bus.unsubscribe(event, cb);
    }

    /// Send `event` with simulated server latency. See [`EventBus::emit`].
    pub fn emit(&self, event: &str, payload: serde_json::Value) {
        self.bus.emit(event, payload);
    }

    pub fn join_room(&self, room_id: &str) -> bool {
        self.rooms.join_room(room_id)
    }

    pub fn leave_room(&self, room_id: &str) -> bool {
        self.rooms.leave_room(room_id)
    }

    pub fn joined_rooms(&self) -> Vec<String> {
        self.rooms.joined_rooms()
    }

    /// Whether the simulated connection handshake has completed.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// The policy currently in effect.
    pub fn policy(&self) -> NotificationPolicy {
        self.policy.borrow().clone()
    }

    /// Deadline alerts delivered since construction.
    pub fn delivered_alerts(&self) -> u64 {
        self.scheduler.delivered_count()
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }
}

impl Drop for RealtimeService {
    fn drop(&mut self) {
        if !self.timers.is_cancelled() {
            self.timers.token().cancel();
        }
    }
}
