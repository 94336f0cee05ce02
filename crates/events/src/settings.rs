//! Notification-policy synchronization with the external settings store.
//!
//! The store itself is an external collaborator; this module only defines
//! the boundary ([`SettingsStore`]) plus an in-memory implementation used by
//! the worker daemon and tests. [`SettingsSync`] performs the startup read
//! and then follows the store's change feed, replacing the policy published
//! on a `tokio::sync::watch` channel wholesale on every change.

use std::collections::HashMap;

use async_trait::async_trait;
use palco_core::notification_policy::NotificationPolicy;
use tokio::sync::{broadcast, watch, RwLock};
use tokio_util::sync::CancellationToken;

/// Buffer capacity of each per-key change feed.
const CHANGE_FEED_CAPACITY: usize = 16;

/// Errors surfaced by a settings store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Settings store unavailable: {0}")]
    Unavailable(String),

    #[error("Settings record could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Key/value store holding settings records as JSON documents.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Fetch the record stored under `key`, or `None` when there is none.
    async fn read(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Follow changes to `key`. Each message is the full new record.
    fn subscribe(&self, key: &str) -> broadcast::Receiver<serde_json::Value>;
}

// ---------------------------------------------------------------------------
// InMemorySettingsStore
// ---------------------------------------------------------------------------

/// Process-local [`SettingsStore`].
#[derive(Default)]
pub struct InMemorySettingsStore {
    records: RwLock<HashMap<String, serde_json::Value>>,
    feeds: std::sync::Mutex<HashMap<String, broadcast::Sender<serde_json::Value>>>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key` and notify every subscriber of that key.
    pub async fn put(&self, key: &str, value: serde_json::Value) {
        self.records
            .write()
            .await
            .insert(key.to_string(), value.clone());

        let sender = crate::lock(&self.feeds).get(key).cloned();
        if let Some(sender) = sender {
            // No live subscribers is fine.
            let _ = sender.send(value);
        }
        tracing::debug!(key, "Settings record stored");
    }

    /// Live change-feed receivers for `key`.
    pub fn subscriber_count(&self, key: &str) -> usize {
        crate::lock(&self.feeds)
            .get(key)
            .map_or(0, |sender| sender.receiver_count())
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn read(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    fn subscribe(&self, key: &str) -> broadcast::Receiver<serde_json::Value> {
        crate::lock(&self.feeds)
            .entry(key.to_string())
            .or_insert_with(|| broadcast::channel(CHANGE_FEED_CAPACITY).0)
            .subscribe()
    }
}

// ---------------------------------------------------------------------------
// SettingsSync
// ---------------------------------------------------------------------------

/// Keeps the in-memory [`NotificationPolicy`] current.
pub struct SettingsSync {
    key: String,
    policy: watch::Sender<NotificationPolicy>,
}

impl SettingsSync {
    pub fn new(key: impl Into<String>, policy: watch::Sender<NotificationPolicy>) -> Self {
        Self {
            key: key.into(),
            policy,
        }
    }

    /// Perform the startup read.
    ///
    /// An absent record keeps the current policy. A store failure is logged
    /// and absorbed; the current policy stays in effect.
    pub async fn load(&self, store: &dyn SettingsStore) {
        match store.read(&self.key).await {
            Ok(Some(record)) => {
                self.apply(record);
            }
            Ok(None) => {
                tracing::info!(key = %self.key, "No settings record, keeping current policy");
            }
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Failed to load settings, keeping current policy");
            }
        }
    }

    /// Replace the policy with the one decoded from `record`.
    ///
    /// Malformed fields decode to degenerate values rather than failing.
    /// Returns `false` only when `record` is not a policy object at all; the
    /// previous policy is kept in that case.
    pub fn apply(&self, record: serde_json::Value) -> bool {
        match serde_json::from_value::<NotificationPolicy>(record) {
            Ok(policy) => {
                tracing::info!(
                    key = %self.key,
                    enabled = policy.enabled,
                    frequency_limit = policy.frequency_limit,
                    window_start = %policy.active_window.start,
                    window_end = %policy.active_window.end,
                    "Notification policy updated"
                );
                self.policy.send_replace(policy);
                true
            }
            Err(e) => {
                let e = StoreError::from(e);
                tracing::warn!(key = %self.key, error = %e, "Ignoring undecodable settings record");
                false
            }
        }
    }

    /// Follow the change feed until `cancel` fires or the feed closes.
    ///
    /// Dropping `changes` on return cancels the store subscription.
    pub async fn run(
        &self,
        mut changes: broadcast::Receiver<serde_json::Value>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(key = %self.key, "Settings subscription cancelled");
                    break;
                }
                change = changes.recv() => match change {
                    Ok(record) => {
                        self.apply(record);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(key = %self.key, skipped = n, "Settings change feed lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!(key = %self.key, "Settings change feed closed");
                        break;
                    }
                },
            }
        }
    }
}
