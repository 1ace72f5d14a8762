// ── Rule domain types ──
//
// A rule's `status` is the one field under optimistic local control; the
// rest is read-only metadata for display.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity_id::EntityId;

/// Whether a rule is enforced.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RuleStatus {
    Active,
    Paused,
}

impl RuleStatus {
    /// A rule switch is on while the rule is active.
    pub fn is_on(self) -> bool {
        self == Self::Active
    }
}

/// What the rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum RuleScope {
    /// Every device behind the box.
    Box,
    Device(EntityId),
    Group(EntityId),
    /// Scope kinds this crate doesn't model (network, tag, ...).
    Other(String),
}

/// A firewall rule on the box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: EntityId,
    pub box_gid: Option<EntityId>,
    pub rule_type: String,
    /// Human-readable target, e.g. `domain: example.com`.
    pub target: String,
    pub action: Option<String>,
    pub status: RuleStatus,
    pub scope: RuleScope,
    pub disabled: bool,
    pub created_at: Option<DateTime<Utc>>,
}
