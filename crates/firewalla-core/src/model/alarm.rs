// ── Alarm domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity_id::EntityId;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AlarmSeverity {
    Low,
    Medium,
    High,
    Unknown,
}

/// A security alarm raised by the box. Read-only; only counted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    pub id: EntityId,
    pub alarm_type: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub severity: AlarmSeverity,
    pub message: Option<String>,
}
