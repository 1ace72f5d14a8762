// ── Box domain type ──

use serde::{Deserialize, Serialize};

use super::entity_id::EntityId;

/// The Firewalla appliance tracked by this integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxStatus {
    pub gid: EntityId,
    pub name: String,
    pub model: String,
    pub firmware_version: Option<String>,
    pub mode: Option<String>,
    pub online: bool,
    pub license: Option<String>,
    pub public_ip: Option<String>,
    pub location: Option<String>,

    /// Counts as reported by the box itself, when present.
    pub device_count: Option<u64>,
    pub rule_count: Option<u64>,
    pub alarm_count: Option<u64>,
}
