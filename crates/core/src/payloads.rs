//! Typed payloads for the realtime events the simulator manufactures.
//!
//! On the bus, payloads travel as `serde_json::Value`; these types define the
//! shape UI consumers can rely on.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Canned title for synthesized deadline alerts.
pub const DEADLINE_ALERT_TITLE: &str = "Prazo se aproximando";

/// Canned message for synthesized deadline alerts.
pub const DEADLINE_ALERT_MESSAGE: &str =
    "O edital que você acompanha encerra as inscrições em breve. Revise sua proposta.";

/// Severity of a deadline alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Info,
    Warning,
    Urgent,
}

/// Payload of an `alerta-prazo` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlineAlert {
    pub id: String,
    pub title: String,
    pub message: String,
    pub kind: AlertKind,
}

impl DeadlineAlert {
    /// Build the fixed alert the scheduler publishes, with a fresh id.
    pub fn canned() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: DEADLINE_ALERT_TITLE.to_string(),
            message: DEADLINE_ALERT_MESSAGE.to_string(),
            kind: AlertKind::Warning,
        }
    }
}

/// Payload of a `missao-atualizada` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionUpdate {
    /// Display name of whoever made progress.
    pub actor: String,
    /// Human-readable description of what they did.
    pub action: String,
    /// Progress points contributed to the mission.
    pub progress_delta: i64,
    pub timestamp: Timestamp,
    /// Task that was completed, when the update answers a task completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl MissionUpdate {
    pub fn new(actor: impl Into<String>, action: impl Into<String>, progress_delta: i64) -> Self {
        Self {
            actor: actor.into(),
            action: action.into(),
            progress_delta,
            timestamp: chrono::Utc::now(),
            task_id: None,
        }
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

/// Serialize a payload type into the bus representation.
///
/// Payload types here are plain data and always serialize; a failure
/// would indicate a bug, so it degrades to `null` instead of panicking.
pub fn to_value<T: Serialize>(payload: &T) -> serde_json::Value {
    serde_json::to_value(payload).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canned_alerts_have_unique_ids() {
        let a = DeadlineAlert::canned();
        let b = DeadlineAlert::canned();
        assert_ne!(a.id, b.id);
        assert_eq!(a.title, DEADLINE_ALERT_TITLE);
        assert_eq!(a.kind, AlertKind::Warning);
    }

    #[test]
    fn deadline_alert_payload_shape() {
        let value = to_value(&DeadlineAlert::canned());
        assert!(value["id"].is_string());
        assert_eq!(value["title"], DEADLINE_ALERT_TITLE);
        assert_eq!(value["message"], DEADLINE_ALERT_MESSAGE);
        assert_eq!(value["kind"], "warning");
    }

    #[test]
    fn mission_update_uses_camel_case() {
        let value = to_value(&MissionUpdate::new("Ana (Equipe)", "atualizou o cronograma", 5));
        assert_eq!(value["actor"], "Ana (Equipe)");
        assert_eq!(value["progressDelta"], 5);
        assert!(value["timestamp"].is_string());
        assert!(value.get("taskId").is_none());
    }

    #[test]
    fn mission_update_carries_task_id_when_set() {
        let update = MissionUpdate::new("Você", "completou uma tarefa", 10).with_task_id("t1");
        let value = to_value(&update);
        assert_eq!(value["taskId"], "t1");

        let back: MissionUpdate = serde_json::from_value(value).expect("round trip");
        assert_eq!(back.task_id.as_deref(), Some("t1"));
    }
}
