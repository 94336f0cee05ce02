use std::time::Duration;

use palco_core::event_names::SETTINGS_KEY_NOTIFICATIONS;

use crate::bus::DEFAULT_ACK_DELAY;
use crate::scheduler::DEFAULT_TICK_INTERVAL;

/// Delay before the service reports itself connected.
pub const DEFAULT_CONNECT_DELAY: Duration = Duration::from_secs(1);

/// Realtime service configuration loaded from environment variables.
///
/// All fields default to the production simulator timings.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Interval between notification scheduler ticks (default: 30 s).
    pub tick_interval: Duration,
    /// Simulated "connecting..." delay before `is_connected` flips (default: 1 s).
    pub connect_delay: Duration,
    /// Simulated acknowledgement latency for emitted requests (default: 600 ms).
    pub ack_delay: Duration,
    /// Store key of the notification policy record.
    pub settings_key: String,
    /// Cancel a room's pending presence events when it is left (default: `false`).
    pub cancel_presence_on_leave: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            connect_delay: DEFAULT_CONNECT_DELAY,
            ack_delay: DEFAULT_ACK_DELAY,
            settings_key: SETTINGS_KEY_NOTIFICATIONS.to_string(),
            cancel_presence_on_leave: false,
        }
    }
}

impl RealtimeConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                             | Default         |
    /// |-------------------------------------|-----------------|
    /// | `REALTIME_TICK_SECS`                | `30`            |
    /// | `REALTIME_CONNECT_DELAY_MS`         | `1000`          |
    /// | `REALTIME_ACK_DELAY_MS`             | `600`           |
    /// | `REALTIME_SETTINGS_KEY`             | `notifications` |
    /// | `REALTIME_CANCEL_PRESENCE_ON_LEAVE` | `false`         |
    ///
    /// Values that fail to parse are logged and replaced by the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let tick_interval = Duration::from_secs(nonzero_or(
            &lookup,
            "REALTIME_TICK_SECS",
            defaults.tick_interval.as_secs(),
        ));
        let connect_delay = Duration::from_millis(nonzero_or(
            &lookup,
            "REALTIME_CONNECT_DELAY_MS",
            defaults.connect_delay.as_millis() as u64,
        ));
        let ack_delay = Duration::from_millis(nonzero_or(
            &lookup,
            "REALTIME_ACK_DELAY_MS",
            defaults.ack_delay.as_millis() as u64,
        ));

        let settings_key = lookup("REALTIME_SETTINGS_KEY")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.settings_key);

        let cancel_presence_on_leave = match lookup("REALTIME_CANCEL_PRESENCE_ON_LEAVE") {
            None => defaults.cancel_presence_on_leave,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(
                    var = "REALTIME_CANCEL_PRESENCE_ON_LEAVE",
                    value = %raw,
                    "Invalid value, using default"
                );
                defaults.cancel_presence_on_leave
            }),
        };

        Self {
            tick_interval,
            connect_delay,
            ack_delay,
            settings_key,
            cancel_presence_on_leave,
        }
    }
}

/// Parse a positive integer `name` from `lookup`, falling back to `default`
/// on a missing, malformed, or zero value. Zero is rejected so timers never
/// spin.
fn nonzero_or<F>(lookup: &F, name: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return default;
    };

    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => value,
        _ => {
            tracing::warn!(var = name, value = %raw, default, "Invalid value, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> RealtimeConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RealtimeConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_when_nothing_set() {
        let cfg = config(&[]);
        assert_eq!(cfg.tick_interval, Duration::from_secs(30));
        assert_eq!(cfg.connect_delay, Duration::from_secs(1));
        assert_eq!(cfg.ack_delay, Duration::from_millis(600));
        assert_eq!(cfg.settings_key, "notifications");
        assert!(!cfg.cancel_presence_on_leave);
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = config(&[
            ("REALTIME_TICK_SECS", "5"),
            ("REALTIME_ACK_DELAY_MS", "100"),
            ("REALTIME_SETTINGS_KEY", "notifications-staging"),
            ("REALTIME_CANCEL_PRESENCE_ON_LEAVE", "true"),
        ]);
        assert_eq!(cfg.tick_interval, Duration::from_secs(5));
        assert_eq!(cfg.ack_delay, Duration::from_millis(100));
        assert_eq!(cfg.settings_key, "notifications-staging");
        assert!(cfg.cancel_presence_on_leave);
    }

    #[test]
    fn invalid_or_zero_values_fall_back() {
        let cfg = config(&[
            ("REALTIME_TICK_SECS", "0"),
            ("REALTIME_CONNECT_DELAY_MS", "soon"),
            ("REALTIME_CANCEL_PRESENCE_ON_LEAVE", "yes"),
            ("REALTIME_SETTINGS_KEY", "  "),
        ]);
        assert_eq!(cfg.tick_interval, Duration::from_secs(30));
        assert_eq!(cfg.connect_delay, Duration::from_secs(1));
        assert!(!cfg.cancel_presence_on_leave);
        assert_eq!(cfg.settings_key, "notifications");
    }
}
