// ── Entity registry ──
//
// Maps remote identifiers to presented entities per kind. Entities are
// created on first sight, updated in place, and removed only after they
// have been absent from enough consecutive fresh snapshots.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use super::collection::{EntityCollection, Upsert};
use crate::model::{BoxStatus, Device, EntityId, Rule, RuleStatus};
use crate::snapshot::Snapshot;
use crate::stream::EntityStream;

// ── Presented entities ───────────────────────────────────────────

/// Box online indicator plus box metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxEntity {
    pub status: BoxStatus,
    pub available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum CounterKind {
    Devices,
    Rules,
    Alarms,
}

impl CounterKind {
    pub const ALL: [Self; 3] = [Self::Devices, Self::Rules, Self::Alarms];

    fn id(self) -> EntityId {
        EntityId::from(self.as_ref())
    }
}

/// Numeric counter for one object kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterEntity {
    pub kind: CounterKind,
    pub value: u64,
    pub available: bool,
}

/// Per-device entity: online flag plus traffic counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceEntity {
    pub device: Device,
    pub available: bool,
}

/// On/off control for one rule. On means active.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleSwitch {
    pub rule: Rule,
    pub is_on: bool,
    /// A local command is awaiting confirmation or being reverted.
    pub pending: bool,
    pub available: bool,
}

// ── Reconcile report ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Changes {
    pub created: Vec<EntityId>,
    pub updated: Vec<EntityId>,
    pub removed: Vec<EntityId>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    fn record(&mut self, id: EntityId, outcome: Upsert) {
        match outcome {
            Upsert::Created => self.created.push(id),
            Upsert::Updated => self.updated.push(id),
            Upsert::Unchanged => {}
        }
    }

    fn sort(&mut self) {
        self.created.sort();
        self.updated.sort();
        self.removed.sort();
    }
}

/// What one reconcile pass did to the presented entities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub snapshot_seq: u64,
    pub devices: Changes,
    pub rules: Changes,
    /// Rule ids (with or without a switch) that aged out and are no longer
    /// tracked at all.
    pub forgotten_rules: Vec<EntityId>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty() && self.rules.is_empty() && self.forgotten_rules.is_empty()
    }
}

// ── Absence tracking ─────────────────────────────────────────────

/// Consecutive-absence counter per id.
struct AbsenceTracker {
    threshold: u32,
    missing: DashMap<EntityId, u32>,
}

impl AbsenceTracker {
    fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            missing: DashMap::new(),
        }
    }

    /// Record one fresh observation. Returns ids whose absence reached the
    /// threshold; those are no longer tracked.
    fn observe(&self, present: &HashSet<&EntityId>) -> Vec<EntityId> {
        for id in present {
            self.missing.insert((*id).clone(), 0);
        }

        let mut gone = Vec::new();
        for mut entry in self.missing.iter_mut() {
            if present.contains(entry.key()) {
                continue;
            }
            *entry.value_mut() += 1;
            if *entry.value() >= self.threshold {
                gone.push(entry.key().clone());
            }
        }
        for id in &gone {
            self.missing.remove(id);
        }
        gone.sort();
        gone
    }

    fn absent_for(&self, id: &EntityId) -> Option<u32> {
        self.missing.get(id).map(|r| *r.value())
    }

    fn is_tracked(&self, id: &EntityId) -> bool {
        self.missing.contains_key(id)
    }

    fn forget(&self, id: &EntityId) {
        self.missing.remove(id);
    }
}

// ── Registry ─────────────────────────────────────────────────────

/// Presented entity state derived from the current snapshot.
pub struct EntityRegistry {
    box_entity: watch::Sender<Option<Arc<BoxEntity>>>,
    counters: EntityCollection<CounterEntity>,
    devices: EntityCollection<DeviceEntity>,
    rules: EntityCollection<RuleSwitch>,
    device_absence: AbsenceTracker,
    rule_absence: AbsenceTracker,
    integration_available: AtomicBool,
    box_online: AtomicBool,
}

impl EntityRegistry {
    /// `missing_threshold`: consecutive fresh snapshots an entity may be
    /// absent before removal (at least 1).
    pub fn new(missing_threshold: u32) -> Self {
        let (box_entity, _) = watch::channel(None);
        Self {
            box_entity,
            counters: EntityCollection::new(),
            devices: EntityCollection::new(),
            rules: EntityCollection::new(),
            device_absence: AbsenceTracker::new(missing_threshold),
            rule_absence: AbsenceTracker::new(missing_threshold),
            integration_available: AtomicBool::new(false),
            box_online: AtomicBool::new(false),
        }
    }

    // ── Reconciliation ───────────────────────────────────────────

    /// Bring presented entities in line with `snapshot`.
    ///
    /// `overrides` carries the locally presented status of rules under
    /// optimistic control; it wins over the snapshot's status. Stale
    /// sections are skipped entirely: they neither create nor age out
    /// entities.
    pub fn reconcile(
        &self,
        snapshot: &Snapshot,
        overrides: &HashMap<EntityId, RuleStatus>,
    ) -> ReconcileReport {
        self.integration_available.store(true, Ordering::SeqCst);
        self.box_online
            .store(snapshot.box_status.online, Ordering::SeqCst);

        let mut report = ReconcileReport {
            snapshot_seq: snapshot.seq,
            ..ReconcileReport::default()
        };

        self.present_box(&snapshot.box_status);
        self.present_counters(snapshot);

        if snapshot.freshness.devices {
            self.reconcile_devices(snapshot, &mut report.devices);
        } else {
            debug!(seq = snapshot.seq, "device section stale, skipping");
        }

        if snapshot.freshness.rules {
            self.reconcile_rules(snapshot, overrides, &mut report);
        } else {
            debug!(seq = snapshot.seq, "rule section stale, skipping");
        }

        // Availability may have flipped with the box's online flag.
        self.refresh_availability();

        report.devices.sort();
        report.rules.sort();
        if !report.is_empty() {
            info!(
                seq = snapshot.seq,
                devices_created = report.devices.created.len(),
                devices_removed = report.devices.removed.len(),
                rules_created = report.rules.created.len(),
                rules_removed = report.rules.removed.len(),
                "entities reconciled"
            );
        }
        report
    }

    fn reconcile_devices(&self, snapshot: &Snapshot, changes: &mut Changes) {
        let available = self.device_available();
        for (id, device) in &snapshot.devices {
            let entity = DeviceEntity {
                device: device.clone(),
                available,
            };
            changes.record(id.clone(), self.devices.upsert_if_changed(id.clone(), entity));
        }

        let present: HashSet<&EntityId> = snapshot.devices.keys().collect();
        for id in self.device_absence.observe(&present) {
            if self.devices.remove(&id).is_some() {
                debug!(device_id = %id, "device removed after repeated absence");
                changes.removed.push(id);
            }
        }
    }

    fn reconcile_rules(
        &self,
        snapshot: &Snapshot,
        overrides: &HashMap<EntityId, RuleStatus>,
        report: &mut ReconcileReport,
    ) {
        let available = self.device_available();
        for (id, rule) in &snapshot.rules {
            if rule.disabled {
                // Disabled rules are counted but never switchable.
                if self.rules.remove(id).is_some() {
                    report.rules.removed.push(id.clone());
                }
                continue;
            }
            let presented = overrides.get(id).copied();
            let switch = RuleSwitch {
                rule: rule.clone(),
                is_on: presented.unwrap_or(rule.status).is_on(),
                pending: presented.is_some(),
                available,
            };
            report
                .rules
                .record(id.clone(), self.rules.upsert_if_changed(id.clone(), switch));
        }

        let present: HashSet<&EntityId> = snapshot.rules.keys().collect();
        for id in self.rule_absence.observe(&present) {
            if self.rules.remove(&id).is_some() {
                debug!(rule_id = %id, "rule switch removed after repeated absence");
                report.rules.removed.push(id.clone());
            }
            report.forgotten_rules.push(id);
        }
    }

    fn present_box(&self, status: &BoxStatus) {
        let entity = BoxEntity {
            status: status.clone(),
            available: self.integration_available.load(Ordering::SeqCst),
        };
        self.box_entity.send_if_modified(|current| {
            if current.as_deref() == Some(&entity) {
                false
            } else {
                *current = Some(Arc::new(entity));
                true
            }
        });
    }

    fn present_counters(&self, snapshot: &Snapshot) {
        let available = self.integration_available.load(Ordering::SeqCst);
        for kind in CounterKind::ALL {
            let value = match kind {
                CounterKind::Devices => snapshot.device_count(),
                CounterKind::Rules => snapshot.rule_count(),
                CounterKind::Alarms => snapshot.alarm_count(),
            };
            self.counters.upsert_if_changed(
                kind.id(),
                CounterEntity {
                    kind,
                    value,
                    available,
                },
            );
        }
    }

    // ── Command-driven updates ───────────────────────────────────

    /// Show `status` on a rule's switch ahead of the next snapshot.
    /// No-op for rules without a switch.
    pub fn present_rule(&self, id: &EntityId, status: RuleStatus, pending: bool) {
        let Some(current) = self.rules.get(id) else {
            return;
        };
        let mut switch = RuleSwitch::clone(&current);
        switch.is_on = status.is_on();
        switch.pending = pending;
        self.rules.upsert_if_changed(id.clone(), switch);
    }

    /// Drop a rule immediately (the remote reported it gone).
    pub fn evict_rule(&self, id: &EntityId) -> bool {
        self.rule_absence.forget(id);
        let removed = self.rules.remove(id).is_some();
        if removed {
            info!(rule_id = %id, "rule evicted");
        }
        removed
    }

    // ── Availability ─────────────────────────────────────────────

    /// Integration-wide availability, driven by coordinator health.
    pub fn set_integration_available(&self, available: bool) {
        let previous = self
            .integration_available
            .swap(available, Ordering::SeqCst);
        if previous != available {
            debug!(available, "integration availability changed");
            self.refresh_availability();
        }
    }

    fn device_available(&self) -> bool {
        self.integration_available.load(Ordering::SeqCst) && self.box_online.load(Ordering::SeqCst)
    }

    fn refresh_availability(&self) {
        let integration = self.integration_available.load(Ordering::SeqCst);
        let devices = self.device_available();

        let current_box = self.box_entity.borrow().clone();
        if let Some(current) = current_box {
            if current.available != integration {
                let mut entity = BoxEntity::clone(&current);
                entity.available = integration;
                self.box_entity.send_replace(Some(Arc::new(entity)));
            }
        }

        for counter in self.counters.snapshot().iter() {
            if counter.available != integration {
                let mut updated = CounterEntity::clone(counter);
                updated.available = integration;
                self.counters.upsert(counter.kind.id(), updated);
            }
        }
        for entity in self.devices.snapshot().iter() {
            if entity.available != devices {
                let mut updated = DeviceEntity::clone(entity);
                updated.available = devices;
                self.devices.upsert(updated.device.id.clone(), updated);
            }
        }
        for switch in self.rules.snapshot().iter() {
            if switch.available != devices {
                let mut updated = RuleSwitch::clone(switch);
                updated.available = devices;
                self.rules.upsert(updated.rule.id.clone(), updated);
            }
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn box_entity(&self) -> Option<Arc<BoxEntity>> {
        self.box_entity.borrow().clone()
    }

    pub fn subscribe_box(&self) -> watch::Receiver<Option<Arc<BoxEntity>>> {
        self.box_entity.subscribe()
    }

    pub fn counter(&self, kind: CounterKind) -> Option<Arc<CounterEntity>> {
        self.counters.get(&kind.id())
    }

    pub fn counters_snapshot(&self) -> Arc<Vec<Arc<CounterEntity>>> {
        self.counters.snapshot()
    }

    pub fn device(&self, id: &EntityId) -> Option<Arc<DeviceEntity>> {
        self.devices.get(id)
    }

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<DeviceEntity>>> {
        self.devices.snapshot()
    }

    pub fn rule_switch(&self, id: &EntityId) -> Option<Arc<RuleSwitch>> {
        self.rules.get(id)
    }

    pub fn rule_switches_snapshot(&self) -> Arc<Vec<Arc<RuleSwitch>>> {
        self.rules.snapshot()
    }

    /// Whether a rule id is currently tracked (switch or not).
    pub fn knows_rule(&self, id: &EntityId) -> bool {
        self.rule_absence.is_tracked(id)
    }

    /// Consecutive fresh snapshots a device has been missing from.
    pub fn device_absence(&self, id: &EntityId) -> Option<u32> {
        self.device_absence.absent_for(id)
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn rule_switch_count(&self) -> usize {
        self.rules.len()
    }

    pub fn subscribe_devices(&self) -> EntityStream<DeviceEntity> {
        EntityStream::new(self.devices.subscribe())
    }

    pub fn subscribe_rule_switches(&self) -> EntityStream<RuleSwitch> {
        EntityStream::new(self.rules.subscribe())
    }

    pub fn subscribe_counters(&self) -> EntityStream<CounterEntity> {
        EntityStream::new(self.counters.subscribe())
    }
}
