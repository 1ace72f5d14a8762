// ── Poll snapshots ──
//
// One immutable aggregate per successful poll. Entity state is derived from
// the current snapshot only; the diff against the previous one tells the
// registry what appeared, vanished, or changed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{Alarm, BoxStatus, Device, EntityId, Rule};

/// Which sections came from this poll rather than the previous snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Freshness {
    pub devices: bool,
    pub rules: bool,
    pub alarms: bool,
}

impl Freshness {
    pub const ALL: Self = Self {
        devices: true,
        rules: true,
        alarms: true,
    };

    pub fn is_complete(self) -> bool {
        self.devices && self.rules && self.alarms
    }
}

/// Result of one successful poll cycle.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Publication order, starting at 1.
    pub seq: u64,
    pub taken_at: DateTime<Utc>,
    /// Highest command sequence issued when this poll started. A command
    /// with a larger sequence was issued mid-poll and can't be confirmed by
    /// this snapshot.
    pub command_watermark: u64,
    pub box_status: BoxStatus,
    pub devices: BTreeMap<EntityId, Device>,
    pub rules: BTreeMap<EntityId, Rule>,
    pub alarms: BTreeMap<EntityId, Alarm>,
    pub freshness: Freshness,
}

impl Snapshot {
    /// Device count, preferring the box's own figure.
    pub fn device_count(&self) -> u64 {
        self.box_status
            .device_count
            .unwrap_or_else(|| len_u64(&self.devices))
    }

    pub fn rule_count(&self) -> u64 {
        self.box_status
            .rule_count
            .unwrap_or_else(|| len_u64(&self.rules))
    }

    pub fn alarm_count(&self) -> u64 {
        self.box_status
            .alarm_count
            .unwrap_or_else(|| len_u64(&self.alarms))
    }
}

fn len_u64<K, V>(map: &BTreeMap<K, V>) -> u64 {
    u64::try_from(map.len()).unwrap_or(u64::MAX)
}

/// Added/removed/changed identifiers for one entity kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KindDiff {
    pub added: Vec<EntityId>,
    pub removed: Vec<EntityId>,
    pub changed: Vec<EntityId>,
}

impl KindDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    fn between<V: PartialEq>(
        previous: Option<&BTreeMap<EntityId, V>>,
        current: &BTreeMap<EntityId, V>,
    ) -> Self {
        let mut diff = Self::default();
        let Some(previous) = previous else {
            diff.added = current.keys().cloned().collect();
            return diff;
        };

        for (id, value) in current {
            match previous.get(id) {
                None => diff.added.push(id.clone()),
                Some(old) if old != value => diff.changed.push(id.clone()),
                Some(_) => {}
            }
        }
        diff.removed = previous
            .keys()
            .filter(|id| !current.contains_key(*id))
            .cloned()
            .collect();
        diff
    }
}

/// Changes between two consecutive snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotDiff {
    pub box_changed: bool,
    pub devices: KindDiff,
    pub rules: KindDiff,
    pub alarms: KindDiff,
}

impl SnapshotDiff {
    /// Diff `current` against `previous` (`None` for the first snapshot).
    pub fn between(previous: Option<&Snapshot>, current: &Snapshot) -> Self {
        Self {
            box_changed: previous.is_none_or(|p| p.box_status != current.box_status),
            devices: KindDiff::between(previous.map(|p| &p.devices), &current.devices),
            rules: KindDiff::between(previous.map(|p| &p.rules), &current.rules),
            alarms: KindDiff::between(previous.map(|p| &p.alarms), &current.alarms),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.box_changed
            && self.devices.is_empty()
            && self.rules.is_empty()
            && self.alarms.is_empty()
    }
}
