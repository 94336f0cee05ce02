//! Notification delivery policy: kill switch, frequency cap, and active window.
//!
//! The policy record lives in the external settings store under
//! [`SETTINGS_KEY_NOTIFICATIONS`](crate::event_names::SETTINGS_KEY_NOTIFICATIONS)
//! and is replaced wholesale whenever the store reports a change. No range
//! validation is applied to it: malformed windows or limits simply produce a
//! gate that always (or never) suppresses.

use std::fmt;
use std::str::FromStr;

use chrono::Timelike;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Frequency cap used when the store has no policy record.
pub const DEFAULT_FREQUENCY_LIMIT: i64 = 999;

/// Start of the default active window (local time).
pub const DEFAULT_WINDOW_START: &str = "00:00";

/// End of the default active window (local time, inclusive).
pub const DEFAULT_WINDOW_END: &str = "23:59";

// ---------------------------------------------------------------------------
// TimeOfDay
// ---------------------------------------------------------------------------

/// A wall-clock minute of the day.
///
/// Ordering is numeric (hour, then minute). Parsing accepts only the strict
/// zero-padded `HH:MM` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Result<Self, CoreError> {
        if hour > 23 || minute > 59 {
            return Err(CoreError::Validation(format!(
                "time of day out of range: {hour}:{minute}"
            )));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// Truncate a chrono time to its minute.
    pub fn from_naive(time: chrono::NaiveTime) -> Self {
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::Validation(format!("expected HH:MM, got {s:?}"));

        let (h, m) = s.split_once(':').ok_or_else(invalid)?;
        let two_digits = |part: &str| part.len() == 2 && part.bytes().all(|b| b.is_ascii_digit());
        if !two_digits(h) || !two_digits(m) {
            return Err(invalid());
        }

        let hour: u8 = h.parse().map_err(|_| invalid())?;
        let minute: u8 = m.parse().map_err(|_| invalid())?;
        Self::new(hour, minute)
    }
}

// ---------------------------------------------------------------------------
// ActiveWindow
// ---------------------------------------------------------------------------

/// Inclusive `[start, end]` local-time window, stored as the raw strings the
/// settings record carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActiveWindow {
    #[serde(deserialize_with = "lenient::bound")]
    pub start: String,
    #[serde(deserialize_with = "lenient::bound")]
    pub end: String,
}

impl ActiveWindow {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Whether `now` falls inside the window.
    ///
    /// When both bounds are well-formed `HH:MM` values the comparison is
    /// numeric. Windows that cross midnight (`end < start`) never match.
    /// When either bound is malformed, the zero-padded current time is
    /// compared lexicographically against the raw strings, so bad data
    /// yields a window that is permanently open or permanently closed.
    pub fn contains(&self, now: TimeOfDay) -> bool {
        match (self.start.parse::<TimeOfDay>(), self.end.parse::<TimeOfDay>()) {
            (Ok(start), Ok(end)) => start <= now && now <= end,
            _ => {
                let now = now.to_string();
                self.start.as_str() <= now.as_str() && now.as_str() <= self.end.as_str()
            }
        }
    }
}

impl Default for ActiveWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_START, DEFAULT_WINDOW_END)
    }
}

// ---------------------------------------------------------------------------
// NotificationPolicy
// ---------------------------------------------------------------------------

/// Why the policy gate held back a deadline alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    /// The kill switch is off.
    Disabled,
    /// The current local time is outside the active window.
    OutsideWindow,
    /// The lifetime frequency cap has been reached.
    LimitReached,
}

/// Policy governing deadline-alert delivery.
///
/// Keys missing from a stored record take the compiled-in default for that
/// key. Keys present with a null or mistyped value decode to a degenerate
/// value, so the record still replaces the policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationPolicy {
    /// Global kill switch.
    #[serde(deserialize_with = "lenient::flag")]
    pub enabled: bool,
    /// Maximum alerts delivered over the process lifetime.
    #[serde(deserialize_with = "lenient::limit")]
    pub frequency_limit: i64,
    /// Local-time window outside which alerts are suppressed.
    #[serde(deserialize_with = "lenient::window")]
    pub active_window: ActiveWindow,
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            frequency_limit: DEFAULT_FREQUENCY_LIMIT,
            active_window: ActiveWindow::default(),
        }
    }
}

impl NotificationPolicy {
    /// Evaluate the gate in order: kill switch, window, frequency cap.
    ///
    /// Returns `None` when an alert may be delivered, given that `delivered`
    /// alerts have already gone out.
    pub fn suppression(&self, now: TimeOfDay, delivered: u64) -> Option<Suppression> {
        if !self.enabled {
            return Some(Suppression::Disabled);
        }
        if !self.active_window.contains(now) {
            return Some(Suppression::OutsideWindow);
        }
        let delivered = i64::try_from(delivered).unwrap_or(i64::MAX);
        if delivered >= self.frequency_limit {
            return Some(Suppression::LimitReached);
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Lenient field decoding
// ---------------------------------------------------------------------------

/// Field decoders that never fail on a well-formed JSON value.
///
/// Null and mistyped values collapse to a value that makes the gate either
/// always open or always closed:
///
/// | Field            | null / `false` | non-numeric text, object | other       |
/// |------------------|----------------|--------------------------|-------------|
/// | `enabled`        | `false`        | `true`                   | truthiness  |
/// | `frequencyLimit` | `0`            | `i64::MAX`               | rounded up  |
/// | window bounds    | `"null"`       | JSON text                | as is       |
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::{Number, Value};

    use super::ActiveWindow;

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Bool(b) => b,
            Value::Null => false,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        })
    }

    pub fn limit<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => from_number(&n),
            Value::Null | Value::Bool(false) => 0,
            Value::Bool(true) => 1,
            Value::String(s) if s.trim().is_empty() => 0,
            Value::String(s) => s.trim().parse::<f64>().map_or(i64::MAX, round_up),
            Value::Array(_) | Value::Object(_) => i64::MAX,
        })
    }

    pub fn bound<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => s,
            other => other.to_string(),
        })
    }

    pub fn window<'de, D: Deserializer<'de>>(d: D) -> Result<ActiveWindow, D::Error> {
        match Value::deserialize(d)? {
            value @ Value::Object(_) => {
                ActiveWindow::deserialize(value).map_err(serde::de::Error::custom)
            }
            _ => Ok(ActiveWindow::default()),
        }
    }

    fn from_number(n: &Number) -> i64 {
        match n.as_i64() {
            Some(i) => i,
            None => n.as_f64().map_or(i64::MAX, round_up),
        }
    }

    // `as` saturates at the i64 bounds.
    fn round_up(f: f64) -> i64 {
        if f.is_nan() {
            i64::MAX
        } else {
            f.ceil() as i64
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn tod(s: &str) -> TimeOfDay {
        s.parse().expect("valid time of day")
    }

    // -----------------------------------------------------------------------
    // TimeOfDay
    // -----------------------------------------------------------------------

    #[test]
    fn parses_zero_padded_time() {
        let t = tod("09:05");
        assert_eq!(t.hour(), 9);
        assert_eq!(t.minute(), 5);
        assert_eq!(t.to_string(), "09:05");
    }

    #[test]
    fn rejects_unpadded_and_out_of_range() {
        assert_matches!("9:05".parse::<TimeOfDay>(), Err(CoreError::Validation(_)));
        assert_matches!("24:00".parse::<TimeOfDay>(), Err(CoreError::Validation(_)));
        assert_matches!("12:60".parse::<TimeOfDay>(), Err(CoreError::Validation(_)));
        assert_matches!("noon".parse::<TimeOfDay>(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(tod("09:59") < tod("10:00"));
        assert!(tod("23:59") > tod("00:00"));
    }

    #[test]
    fn from_naive_truncates_seconds() {
        let naive = chrono::NaiveTime::from_hms_opt(14, 30, 59).expect("valid time");
        assert_eq!(TimeOfDay::from_naive(naive), tod("14:30"));
    }

    // -----------------------------------------------------------------------
    // ActiveWindow
    // -----------------------------------------------------------------------

    #[test]
    fn window_bounds_are_inclusive() {
        let window = ActiveWindow::new("08:00", "18:00");
        assert!(window.contains(tod("08:00")));
        assert!(window.contains(tod("18:00")));
        assert!(!window.contains(tod("07:59")));
        assert!(!window.contains(tod("18:01")));
    }

    #[test]
    fn window_crossing_midnight_never_matches() {
        let window = ActiveWindow::new("22:00", "02:00");
        assert!(!window.contains(tod("23:00")));
        assert!(!window.contains(tod("01:00")));
        assert!(!window.contains(tod("12:00")));
    }

    #[test]
    fn malformed_bound_falls_back_to_string_comparison() {
        // "9:00" sorts after "10:00" as a string, so this window only
        // matches times that are >= "10:00" and <= "9:00" lexicographically.
        let window = ActiveWindow::new("10:00", "9:00");
        assert!(window.contains(tod("12:00")));
        assert!(!window.contains(tod("09:30")));

        let closed = ActiveWindow::new("zz", "23:59");
        assert!(!closed.contains(tod("12:00")));
    }

    // -----------------------------------------------------------------------
    // NotificationPolicy
    // -----------------------------------------------------------------------

    #[test]
    fn default_policy_allows_delivery() {
        let policy = NotificationPolicy::default();
        assert_eq!(policy.suppression(tod("03:00"), 0), None);
    }

    #[test]
    fn disabled_wins_over_everything() {
        let policy = NotificationPolicy {
            enabled: false,
            ..Default::default()
        };
        assert_eq!(policy.suppression(tod("03:00"), 0), Some(Suppression::Disabled));
    }

    #[test]
    fn window_checked_before_limit() {
        let policy = NotificationPolicy {
            frequency_limit: 1,
            active_window: ActiveWindow::new("08:00", "09:00"),
            ..Default::default()
        };
        assert_eq!(
            policy.suppression(tod("10:00"), 5),
            Some(Suppression::OutsideWindow)
        );
        assert_eq!(
            policy.suppression(tod("08:30"), 1),
            Some(Suppression::LimitReached)
        );
        assert_eq!(policy.suppression(tod("08:30"), 0), None);
    }

    #[test]
    fn deserializes_camel_case_record() {
        let policy: NotificationPolicy = serde_json::from_value(serde_json::json!({
            "enabled": false,
            "frequencyLimit": 3,
            "activeWindow": { "start": "08:00", "end": "20:00" }
        }))
        .expect("valid record");

        assert!(!policy.enabled);
        assert_eq!(policy.frequency_limit, 3);
        assert_eq!(policy.active_window, ActiveWindow::new("08:00", "20:00"));
    }

    #[test]
    fn missing_keys_take_defaults() {
        let policy: NotificationPolicy =
            serde_json::from_value(serde_json::json!({ "frequencyLimit": 5 }))
                .expect("partial record");

        assert!(policy.enabled);
        assert_eq!(policy.frequency_limit, 5);
        assert_eq!(policy.active_window, ActiveWindow::default());
    }

    fn decode(record: serde_json::Value) -> NotificationPolicy {
        serde_json::from_value(record).expect("lenient decode")
    }

    #[test]
    fn partial_window_takes_default_bound() {
        let policy = decode(serde_json::json!({ "activeWindow": { "start": "08:00" } }));
        assert_eq!(policy.active_window, ActiveWindow::new("08:00", DEFAULT_WINDOW_END));
    }

    #[test]
    fn null_limit_closes_the_gate() {
        let policy = decode(serde_json::json!({ "enabled": true, "frequencyLimit": null }));
        assert!(policy.enabled);
        assert_eq!(policy.frequency_limit, 0);
        assert_eq!(
            policy.suppression(tod("12:00"), 0),
            Some(Suppression::LimitReached)
        );
    }

    #[test]
    fn mistyped_scalars_degrade_instead_of_failing() {
        let policy = decode(serde_json::json!({
            "enabled": "yes",
            "frequencyLimit": "lots",
            "activeWindow": { "start": 8, "end": null }
        }));
        assert!(policy.enabled);
        assert_eq!(policy.frequency_limit, i64::MAX);
        assert_eq!(policy.active_window, ActiveWindow::new("8", "null"));

        let policy = decode(serde_json::json!({
            "enabled": 0,
            "frequencyLimit": 2.5,
            "activeWindow": "always"
        }));
        assert!(!policy.enabled);
        assert_eq!(policy.frequency_limit, 3);
        assert_eq!(policy.active_window, ActiveWindow::default());
    }

    #[test]
    fn non_object_record_is_rejected() {
        assert!(serde_json::from_value::<NotificationPolicy>(serde_json::json!("off")).is_err());
    }
}
