//! Well-known realtime event name constants.
//!
//! These are the topic names UI consumers subscribe to. They are part of the
//! public contract with the frontend and must not be renamed.

/// Deadline alert manufactured by the notification scheduler.
pub const EVENT_DEADLINE_ALERT: &str = "alerta-prazo";

/// A mission (shared task) received progress from a collaborator.
pub const EVENT_MISSION_UPDATED: &str = "missao-atualizada";

/// Producer-side request: the current user completed a task.
///
/// The bus answers it with an [`EVENT_MISSION_UPDATED`] after the simulated
/// acknowledgement delay.
pub const EVENT_TASK_COMPLETED: &str = "completar-tarefa";

/// Substring that marks a room as a mission room with simulated teammates.
pub const MISSION_ROOM_MARKER: &str = "mission";

/// Store key holding the notification policy record.
pub const SETTINGS_KEY_NOTIFICATIONS: &str = "notifications";
