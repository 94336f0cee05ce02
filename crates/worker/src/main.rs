//! `palco-worker` -- realtime simulator daemon.
//!
//! Boots the realtime service against an in-memory settings store, joins a
//! demo room, and logs every bus event until interrupted.
//!
//! # Environment variables
//!
//! | Variable                    | Required | Default        | Description                              |
//! |-----------------------------|----------|----------------|------------------------------------------|
//! | `PALCO_DEMO_ROOM`           | no       | `mission-demo` | Room joined on startup                   |
//! | `PALCO_NOTIFICATION_POLICY` | no       | --             | JSON policy record seeded into the store |
//!
//! Timing knobs (`REALTIME_*`) are documented on
//! [`RealtimeConfig::from_env`](palco_events::RealtimeConfig::from_env).

use std::sync::Arc;

use anyhow::Context;
use palco_events::consumers::{DEFAULT_FEED_CAPACITY, DEFAULT_TRAY_CAPACITY};
use palco_events::{
    ActivityFeed, AlertTray, Dependencies, InMemorySettingsStore, RealtimeConfig, RealtimeService,
};
use palco_worker::activity_log;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_DEMO_ROOM: &str = "mission-demo";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "palco_worker=info,palco_events=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RealtimeConfig::from_env();
    let room = std::env::var("PALCO_DEMO_ROOM").unwrap_or_else(|_| DEFAULT_DEMO_ROOM.into());

    let store = Arc::new(InMemorySettingsStore::new());
    if let Ok(raw) = std::env::var("PALCO_NOTIFICATION_POLICY") {
        let record: serde_json::Value =
            serde_json::from_str(&raw).context("PALCO_NOTIFICATION_POLICY must be valid JSON")?;
        store.put(&config.settings_key, record).await;
    }

    tracing::info!(room = %room, settings_key = %config.settings_key, "Starting palco-worker");

    let service = RealtimeService::new(config, Dependencies::new(store));
    let tray = AlertTray::attach(Arc::clone(service.bus()), DEFAULT_TRAY_CAPACITY);
    let mut feed = ActivityFeed::attach(Arc::clone(service.bus()), DEFAULT_FEED_CAPACITY);

    let log_cancel = CancellationToken::new();
    let log_task = tokio::spawn(activity_log::run(service.bus().tap(), log_cancel.clone()));

    service.start().await?;
    service.join_room(&room);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    service.leave_room(&room);
    service.stop().await?;
    feed.detach();

    log_cancel.cancel();
    let logged = log_task.await.context("Activity log task panicked")?;

    tracing::info!(
        logged,
        unread_alerts = tray.unread().len(),
        mission_progress = feed.progress(),
        "palco-worker stopped"
    );
    Ok(())
}
