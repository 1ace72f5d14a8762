// ── Rule control service ──
//
// Pause/resume with optimistic presentation. A command flips the presented
// switch before the remote call; each fresh snapshot then confirms the
// target, keeps waiting, or gives up and adopts the remote status. Every
// command takes a number from one shared monotonic sequence, so a late
// completion can tell it has been superseded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::RemoteApi;
use crate::error::CoreError;
use crate::model::{EntityId, RuleStatus};
use crate::snapshot::Snapshot;
use crate::store::{EntityRegistry, ReconcileReport};

// ── Command sequence ─────────────────────────────────────────────

/// Monotonic counter shared by the control service (which issues numbers)
/// and the coordinator (which stamps each poll with the latest one).
#[derive(Debug, Default)]
pub struct CommandSequence(AtomicU64);

impl CommandSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest number issued so far.
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

// ── Control state ────────────────────────────────────────────────

/// Requested rule change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RuleAction {
    Pause,
    Resume,
}

impl RuleAction {
    pub fn target(self) -> RuleStatus {
        match self {
            Self::Pause => RuleStatus::Paused,
            Self::Resume => RuleStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ControlState {
    /// Presented status equals the last authoritative status.
    Confirmed,
    /// A command's target is presented until a snapshot agrees.
    Optimistic {
        target: RuleStatus,
        /// Sequence number of the command that set this target.
        seq: u64,
        /// The remote accepted the command.
        acknowledged: bool,
        /// Fresh post-command snapshots that disagreed so far.
        cycles: u32,
    },
    /// Rolling back to `restore`; resolves at the next fresh snapshot.
    Reverting { restore: RuleStatus },
}

/// Control bookkeeping for one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuleControl {
    /// Last status the remote reported.
    pub confirmed: RuleStatus,
    pub state: ControlState,
    /// Sequence number of the newest command for this rule (0 if none).
    pub latest_seq: u64,
}

impl RuleControl {
    fn confirmed(status: RuleStatus) -> Self {
        Self {
            confirmed: status,
            state: ControlState::Confirmed,
            latest_seq: 0,
        }
    }

    /// Status the switch should show.
    pub fn presented(&self) -> RuleStatus {
        self.override_status().unwrap_or(self.confirmed)
    }

    /// Presented status when it isn't simply the confirmed one.
    fn override_status(&self) -> Option<RuleStatus> {
        match self.state {
            ControlState::Confirmed => None,
            ControlState::Optimistic { target, .. } => Some(target),
            ControlState::Reverting { restore } => Some(restore),
        }
    }
}

/// How a command ended, when it didn't fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CommandOutcome {
    /// Remote accepted; waiting for a snapshot to confirm.
    Applied,
    /// Rule was already confirmed in the requested state. The remote was
    /// still told.
    AlreadyInState,
    /// Remote accepted, but a newer command for the same rule took over.
    Superseded,
    /// Remote reports the rule gone; it has been evicted locally.
    RuleRemoved,
}

/// Reject ids that can't name a rule before touching any state.
pub fn validate_rule_id(raw: &str) -> Result<EntityId, CoreError> {
    if raw.trim().is_empty() {
        return Err(CoreError::validation("rule id must not be empty"));
    }
    if raw.contains('/') || raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CoreError::validation(format!(
            "invalid rule id {raw:?}: must not contain '/' or whitespace"
        )));
    }
    Ok(EntityId::from(raw))
}

// ── Service ──────────────────────────────────────────────────────

pub struct RuleControlService<A> {
    api: Arc<A>,
    registry: Arc<EntityRegistry>,
    sequence: Arc<CommandSequence>,
    confirm_cycles: u32,
    rules: DashMap<EntityId, RuleControl>,
    /// Every rule id a fresh snapshot ever listed, with its last reported
    /// status. Only grows.
    seen: DashMap<EntityId, RuleStatus>,
    /// Serializes "decide presented status" with "write it to the registry"
    /// between commands and snapshot reconciliation. Never held across
    /// an await.
    presentation: Mutex<()>,
    shutdown: CancellationToken,
}

impl<A: RemoteApi> RuleControlService<A> {
    pub fn new(
        api: Arc<A>,
        registry: Arc<EntityRegistry>,
        sequence: Arc<CommandSequence>,
        confirm_cycles: u32,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            api,
            registry,
            sequence,
            confirm_cycles,
            rules: DashMap::new(),
            seen: DashMap::new(),
            presentation: Mutex::new(()),
            shutdown,
        }
    }

    pub async fn pause(&self, rule_id: &str) -> Result<CommandOutcome, CoreError> {
        self.execute(RuleAction::Pause, rule_id).await
    }

    pub async fn resume(&self, rule_id: &str) -> Result<CommandOutcome, CoreError> {
        self.execute(RuleAction::Resume, rule_id).await
    }

    /// Run one pause/resume command end to end.
    pub async fn execute(
        &self,
        action: RuleAction,
        rule_id: &str,
    ) -> Result<CommandOutcome, CoreError> {
        let id = validate_rule_id(rule_id)?;
        if self.shutdown.is_cancelled() {
            return Err(CoreError::Disconnected);
        }

        let (seq, idempotent) = self.begin(action, &id)?;
        debug!(rule_id = %id, %action, seq, idempotent, "issuing rule command");

        let result = match action {
            RuleAction::Pause => self.api.pause_rule(&id).await,
            RuleAction::Resume => self.api.resume_rule(&id).await,
        };

        if self.shutdown.is_cancelled() {
            debug!(rule_id = %id, seq, "shut down while in flight, discarding result");
            return Err(CoreError::Disconnected);
        }
        self.complete(&id, seq, idempotent, result)
    }

    /// Record the command and present its target. Returns the command's
    /// sequence number and whether it was a no-op locally.
    fn begin(&self, action: RuleAction, id: &EntityId) -> Result<(u64, bool), CoreError> {
        let target = action.target();
        let _guard = self.lock_presentation();

        if !self.rules.contains_key(id) {
            // Aged out locally; the remote decides whether it still exists.
            let Some(last) = self.seen.get(id).map(|r| *r.value()) else {
                return Err(CoreError::validation(format!("unknown rule id: {id}")));
            };
            debug!(rule_id = %id, "command for forgotten rule, forwarding to remote");
            self.rules.insert(id.clone(), RuleControl::confirmed(last));
        }
        let Some(mut control) = self.rules.get_mut(id) else {
            return Err(CoreError::validation(format!("unknown rule id: {id}")));
        };
        let seq = self.sequence.next();
        control.latest_seq = seq;

        let idempotent =
            control.state == ControlState::Confirmed && control.confirmed == target;
        if !idempotent {
            control.state = ControlState::Optimistic {
                target,
                seq,
                acknowledged: false,
                cycles: 0,
            };
        }
        drop(control);

        if !idempotent {
            self.registry.present_rule(id, target, true);
        }
        Ok((seq, idempotent))
    }

    /// Apply the remote result, unless a newer command owns the rule now.
    fn complete(
        &self,
        id: &EntityId,
        seq: u64,
        idempotent: bool,
        result: Result<(), CoreError>,
    ) -> Result<CommandOutcome, CoreError> {
        let _guard = self.lock_presentation();

        let Some(mut control) = self.rules.get_mut(id) else {
            // Forgotten while in flight.
            return match result {
                Ok(()) => Ok(CommandOutcome::RuleRemoved),
                Err(e) if e.is_not_found() => Ok(CommandOutcome::RuleRemoved),
                Err(e) => Err(e),
            };
        };

        if control.latest_seq != seq {
            drop(control);
            debug!(rule_id = %id, seq, "stale command completion ignored");
            return match result {
                Ok(()) => Ok(CommandOutcome::Superseded),
                Err(e) if e.is_not_found() => {
                    self.forget_and_evict(id);
                    Ok(CommandOutcome::RuleRemoved)
                }
                Err(e) => Err(e),
            };
        }

        match result {
            Ok(()) if idempotent => Ok(CommandOutcome::AlreadyInState),
            Ok(()) => {
                if let ControlState::Optimistic { acknowledged, .. } = &mut control.state {
                    *acknowledged = true;
                }
                Ok(CommandOutcome::Applied)
            }
            Err(e) if e.is_not_found() => {
                drop(control);
                warn!(rule_id = %id, "rule no longer exists remotely");
                self.forget_and_evict(id);
                Ok(CommandOutcome::RuleRemoved)
            }
            Err(e) if idempotent => Err(e),
            Err(e) => {
                let restore = control.confirmed;
                control.state = ControlState::Reverting { restore };
                drop(control);
                warn!(rule_id = %id, error = %e, %restore, "rule command failed, reverting");
                self.registry.present_rule(id, restore, true);
                Err(e)
            }
        }
    }

    fn forget_and_evict(&self, id: &EntityId) {
        self.rules.remove(id);
        self.registry.evict_rule(id);
    }

    // ── Snapshot reconciliation ──────────────────────────────────

    /// Advance every rule's control state against `snapshot`, then reconcile
    /// the registry with the resulting presented statuses.
    pub fn reconcile(&self, snapshot: &Snapshot) -> ReconcileReport {
        let _guard = self.lock_presentation();
        let mut overrides = HashMap::new();

        if snapshot.freshness.rules {
            for (id, rule) in &snapshot.rules {
                self.seen.insert(id.clone(), rule.status);
                match self.rules.entry(id.clone()) {
                    Entry::Vacant(slot) => {
                        slot.insert(RuleControl::confirmed(rule.status));
                    }
                    Entry::Occupied(mut slot) => {
                        let control = slot.get_mut();
                        self.advance(id, control, rule.status, snapshot.command_watermark);
                        if let Some(status) = control.override_status() {
                            overrides.insert(id.clone(), status);
                        }
                    }
                }
            }
        } else {
            // Stale rules never confirm or expire anything; keep presenting
            // whatever is in flight.
            for entry in self.rules.iter() {
                if let Some(status) = entry.override_status() {
                    overrides.insert(entry.key().clone(), status);
                }
            }
        }

        let report = self.registry.reconcile(snapshot, &overrides);
        for id in &report.forgotten_rules {
            self.rules.remove(id);
        }
        if snapshot.freshness.rules {
            // Entries revived by a command for a forgotten rule that no
            // snapshot has listed since.
            self.rules.retain(|id, _| self.registry.knows_rule(id));
        }
        report
    }

    fn advance(&self, id: &EntityId, control: &mut RuleControl, remote: RuleStatus, watermark: u64) {
        match control.state {
            ControlState::Confirmed => control.confirmed = remote,
            ControlState::Reverting { .. } => {
                control.confirmed = remote;
                control.state = ControlState::Confirmed;
                debug!(rule_id = %id, %remote, "revert settled");
            }
            ControlState::Optimistic {
                target,
                seq,
                acknowledged,
                cycles,
            } => {
                if watermark < seq {
                    // Poll began before the command; says nothing about it.
                    return;
                }
                if remote == target {
                    control.confirmed = remote;
                    control.state = ControlState::Confirmed;
                    info!(rule_id = %id, status = %remote, "rule command confirmed");
                    return;
                }
                let cycles = cycles + 1;
                if acknowledged && cycles > self.confirm_cycles {
                    warn!(
                        rule_id = %id,
                        %target,
                        %remote,
                        cycles,
                        "remote never confirmed rule command, adopting remote status"
                    );
                    control.confirmed = remote;
                    control.state = ControlState::Reverting { restore: remote };
                } else {
                    control.state = ControlState::Optimistic {
                        target,
                        seq,
                        acknowledged,
                        cycles,
                    };
                }
            }
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    /// Control bookkeeping for one rule, if it is known.
    pub fn control(&self, id: &EntityId) -> Option<RuleControl> {
        self.rules.get(id).map(|r| *r.value())
    }

    pub fn is_known(&self, id: &EntityId) -> bool {
        self.rules.contains_key(id)
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    fn lock_presentation(&self) -> MutexGuard<'_, ()> {
        self.presentation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::Ordering;

    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use tokio_test::{assert_pending, task};

    use super::*;
    use crate::error::ErrorKind;
    use crate::snapshot::{Freshness, Snapshot};
    use crate::testing::MockApi;

    struct Harness {
        api: MockApi,
        sequence: Arc<CommandSequence>,
        service: Arc<RuleControlService<MockApi>>,
        cancel: CancellationToken,
        snapshot_seq: u64,
    }

    impl Harness {
        fn new(api: MockApi) -> Self {
            let sequence = Arc::new(CommandSequence::new());
            let cancel = CancellationToken::new();
            let service = Arc::new(RuleControlService::new(
                Arc::new(api.clone()),
                Arc::new(EntityRegistry::new(2)),
                Arc::clone(&sequence),
                2,
                cancel.clone(),
            ));
            Self {
                api,
                sequence,
                service,
                cancel,
                snapshot_seq: 0,
            }
        }

        /// Build a snapshot of the mock's current remote state, as a poll
        /// starting now would see it.
        async fn poll(&mut self) -> ReconcileReport {
            let watermark = self.sequence.current();
            self.poll_with_watermark(watermark).await
        }

        async fn poll_with_watermark(&mut self, watermark: u64) -> ReconcileReport {
            self.snapshot_seq += 1;
            let box_status = self.api.fetch_box_status().await.unwrap();
            let rules = self.api.fetch_rules().await.unwrap();
            let snapshot = Snapshot {
                seq: self.snapshot_seq,
                taken_at: Utc::now(),
                command_watermark: watermark,
                box_status,
                devices: Default::default(),
                rules: rules.into_iter().map(|r| (r.id.clone(), r)).collect(),
                alarms: Default::default(),
                freshness: Freshness::ALL,
            };
            self.service.reconcile(&snapshot)
        }

        fn state(&self, id: &str) -> ControlState {
            self.service.control(&EntityId::from(id)).unwrap().state
        }

        fn switch_on(&self, id: &str) -> bool {
            self.service
                .registry()
                .rule_switch(&EntityId::from(id))
                .unwrap()
                .is_on
        }
    }

    #[test]
    fn validate_rejects_malformed_ids() {
        assert!(validate_rule_id("").is_err());
        assert!(validate_rule_id("   ").is_err());
        assert!(validate_rule_id("r1/pause").is_err());
        assert!(validate_rule_id("r 1").is_err());
        assert_eq!(validate_rule_id("r1").unwrap(), EntityId::from("r1"));
    }

    #[tokio::test]
    async fn unknown_rule_is_rejected_without_api_call() {
        let mut h = Harness::new(MockApi::new().with_rule("R1", RuleStatus::Active));
        h.poll().await;

        let err = h.service.pause("R99").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(h.api.command_calls.load(Ordering::SeqCst), 0);
        assert!(!h.service.is_known(&EntityId::from("R99")));
        assert!(h.service.registry().rule_switch(&EntityId::from("R99")).is_none());
    }

    #[tokio::test]
    async fn pause_presents_immediately_then_confirms() {
        let mut h = Harness::new(MockApi::new().with_rule("R1", RuleStatus::Active));
        h.poll().await;
        assert!(h.switch_on("R1"));

        let outcome = h.service.pause("R1").await.unwrap();
        assert_eq!(outcome, CommandOutcome::Applied);
        assert!(!h.switch_on("R1"));
        assert!(matches!(
            h.state("R1"),
            ControlState::Optimistic {
                target: RuleStatus::Paused,
                acknowledged: true,
                ..
            }
        ));

        h.poll().await;
        assert_eq!(h.state("R1"), ControlState::Confirmed);
        assert!(!h.switch_on("R1"));
    }

    #[tokio::test]
    async fn lagging_remote_goes_optimistic_optimistic_confirmed() {
        let api = MockApi::new().with_rule("R1", RuleStatus::Active);
        api.ignore_commands();
        let mut h = Harness::new(api);
        h.poll().await;

        h.service.pause("R1").await.unwrap();

        // Remote still reports active for one cycle.
        h.poll().await;
        assert!(matches!(h.state("R1"), ControlState::Optimistic { cycles: 1, .. }));
        assert!(!h.switch_on("R1"));

        // Remote catches up.
        h.api.set_rule("R1", RuleStatus::Paused);
        h.poll().await;
        assert_eq!(h.state("R1"), ControlState::Confirmed);
        assert!(!h.switch_on("R1"));
    }

    #[tokio::test]
    async fn never_confirmed_command_reverts_after_bounded_cycles() {
        let api = MockApi::new().with_rule("R1", RuleStatus::Active);
        api.ignore_commands();
        let mut h = Harness::new(api);
        h.poll().await;
        h.service.pause("R1").await.unwrap();

        h.poll().await;
        h.poll().await;
        assert!(matches!(h.state("R1"), ControlState::Optimistic { cycles: 2, .. }));
        assert!(!h.switch_on("R1"));

        h.poll().await;
        assert_eq!(
            h.state("R1"),
            ControlState::Reverting {
                restore: RuleStatus::Active
            }
        );
        assert!(h.switch_on("R1"));

        h.poll().await;
        assert_eq!(h.state("R1"), ControlState::Confirmed);
        assert!(h.switch_on("R1"));
        assert!(!h.service.registry().rule_switch(&EntityId::from("R1")).unwrap().pending);
    }

    #[tokio::test]
    async fn snapshot_from_before_command_does_not_count() {
        let api = MockApi::new().with_rule("R1", RuleStatus::Active);
        api.ignore_commands();
        let mut h = Harness::new(api);
        h.poll().await;

        let before = h.sequence.current();
        h.service.pause("R1").await.unwrap();

        // Five polls that all started before the command was issued.
        for _ in 0..5 {
            h.poll_with_watermark(before).await;
        }
        assert!(matches!(h.state("R1"), ControlState::Optimistic { cycles: 0, .. }));
        assert!(!h.switch_on("R1"));
    }

    #[tokio::test]
    async fn api_failure_reverts_and_surfaces_error() {
        let api = MockApi::new().with_rule("R1", RuleStatus::Active);
        api.fail_commands(Some(ErrorKind::Transient));
        let mut h = Harness::new(api);
        h.poll().await;

        let err = h.service.pause("R1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert_eq!(
            h.state("R1"),
            ControlState::Reverting {
                restore: RuleStatus::Active
            }
        );
        assert!(h.switch_on("R1"));

        h.poll().await;
        assert_eq!(h.state("R1"), ControlState::Confirmed);
    }

    #[tokio::test]
    async fn not_found_evicts_rule() {
        let mut h = Harness::new(MockApi::new().with_rule("R1", RuleStatus::Active));
        h.poll().await;
        h.api.remove_rule("R1");

        let outcome = h.service.pause("R1").await.unwrap();

        assert_eq!(outcome, CommandOutcome::RuleRemoved);
        assert!(!h.service.is_known(&EntityId::from("R1")));
        assert!(h.service.registry().rule_switch(&EntityId::from("R1")).is_none());
    }

    #[tokio::test]
    async fn repeated_command_is_idempotent() {
        let mut h = Harness::new(MockApi::new().with_rule("R1", RuleStatus::Paused));
        h.poll().await;
        let mut switches = h.service.registry().subscribe_rule_switches();

        let outcome = h.service.pause("R1").await.unwrap();
        assert_eq!(outcome, CommandOutcome::AlreadyInState);
        assert_eq!(h.state("R1"), ControlState::Confirmed);
        assert_eq!(h.api.command_calls.load(Ordering::SeqCst), 1);
        h.service.pause("R1").await.unwrap();

        // Neither command touched the presented switch.
        let mut changed = task::spawn(switches.changed());
        assert_pending!(changed.poll());
        drop(changed);
        assert!(!h.service.registry().rule_switch(&EntityId::from("R1")).unwrap().pending);

        h.poll().await;
        assert_eq!(h.state("R1"), ControlState::Confirmed);
        assert!(!h.switch_on("R1"));
        assert_eq!(h.api.remote_status("R1"), Some(RuleStatus::Paused));
    }

    #[tokio::test]
    async fn resume_then_pause_ends_confirmed_paused() {
        let mut h = Harness::new(MockApi::new().with_rule("R1", RuleStatus::Paused));
        h.poll().await;

        h.service.resume("R1").await.unwrap();
        h.service.pause("R1").await.unwrap();
        h.poll().await;

        assert_eq!(h.state("R1"), ControlState::Confirmed);
        assert!(!h.switch_on("R1"));
        assert_eq!(h.api.remote_status("R1"), Some(RuleStatus::Paused));
    }

    #[tokio::test]
    async fn stale_completion_does_not_overwrite_newer_target() {
        let mut h = Harness::new(MockApi::new().with_rule("R1", RuleStatus::Active));
        h.poll().await;
        let gate = h.api.gate_commands();

        let first = tokio::spawn({
            let service = Arc::clone(&h.service);
            async move { service.pause("R1").await }
        });
        tokio::task::yield_now().await;
        while h.api.command_calls.load(Ordering::SeqCst) < 1 {
            tokio::task::yield_now().await;
        }
        let second = tokio::spawn({
            let service = Arc::clone(&h.service);
            async move { service.resume("R1").await }
        });
        while h.api.command_calls.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }

        // Release both; whichever order they land in, the resume owns the rule.
        gate.add_permits(2);
        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        assert_eq!(first, CommandOutcome::Superseded);
        assert_eq!(second, CommandOutcome::Applied);
        assert!(matches!(
            h.state("R1"),
            ControlState::Optimistic {
                target: RuleStatus::Active,
                ..
            }
        ));
        assert!(h.switch_on("R1"));
    }

    #[tokio::test]
    async fn in_flight_command_never_expires() {
        let api = MockApi::new().with_rule("R1", RuleStatus::Active);
        let mut h = Harness::new(api);
        h.poll().await;
        let gate = h.api.gate_commands();

        let pending = tokio::spawn({
            let service = Arc::clone(&h.service);
            async move { service.pause("R1").await }
        });
        while h.api.command_calls.load(Ordering::SeqCst) < 1 {
            tokio::task::yield_now().await;
        }

        for _ in 0..5 {
            h.poll().await;
        }
        assert!(matches!(
            h.state("R1"),
            ControlState::Optimistic {
                acknowledged: false,
                ..
            }
        ));
        assert!(!h.switch_on("R1"));

        gate.add_permits(1);
        assert_eq!(pending.await.unwrap().unwrap(), CommandOutcome::Applied);
        h.poll().await;
        assert_eq!(h.state("R1"), ControlState::Confirmed);
    }

    #[tokio::test]
    async fn shutdown_discards_in_flight_result() {
        let mut h = Harness::new(MockApi::new().with_rule("R1", RuleStatus::Active));
        h.poll().await;
        let gate = h.api.gate_commands();

        let pending = tokio::spawn({
            let service = Arc::clone(&h.service);
            async move { service.pause("R1").await }
        });
        while h.api.command_calls.load(Ordering::SeqCst) < 1 {
            tokio::task::yield_now().await;
        }
        h.cancel.cancel();
        gate.add_permits(1);

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, CoreError::Disconnected));
        assert!(matches!(
            h.state("R1"),
            ControlState::Optimistic {
                acknowledged: false,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn removed_rules_drop_control_entries() {
        let mut h = Harness::new(MockApi::new().with_rule("R1", RuleStatus::Active));
        h.poll().await;
        h.api.remove_rule("R1");

        h.poll().await;
        assert!(h.service.is_known(&EntityId::from("R1")));
        let report = h.poll().await;

        assert_eq!(report.forgotten_rules, vec![EntityId::from("R1")]);
        assert!(!h.service.is_known(&EntityId::from("R1")));
    }

    #[tokio::test]
    async fn forgotten_rule_command_reaches_remote() {
        let mut h = Harness::new(MockApi::new().with_rule("R1", RuleStatus::Active));
        h.poll().await;
        h.api.remove_rule("R1");
        h.poll().await;
        h.poll().await;
        assert!(!h.service.is_known(&EntityId::from("R1")));

        let outcome = h.service.pause("R1").await.unwrap();

        assert_eq!(outcome, CommandOutcome::RuleRemoved);
        assert_eq!(h.api.command_calls.load(Ordering::SeqCst), 1);
        assert!(!h.service.is_known(&EntityId::from("R1")));
        assert!(h.service.registry().rule_switch(&EntityId::from("R1")).is_none());
    }

    #[tokio::test]
    async fn forgotten_rule_that_returns_is_controlled_again() {
        let mut h = Harness::new(MockApi::new().with_rule("R1", RuleStatus::Active));
        h.poll().await;
        h.api.remove_rule("R1");
        h.poll().await;
        h.poll().await;

        // Back on the remote before the next poll notices.
        h.api.set_rule("R1", RuleStatus::Active);
        let outcome = h.service.pause("R1").await.unwrap();
        assert_eq!(outcome, CommandOutcome::Applied);
        assert!(matches!(
            h.state("R1"),
            ControlState::Optimistic {
                target: RuleStatus::Paused,
                acknowledged: true,
                ..
            }
        ));

        h.poll().await;
        assert_eq!(h.state("R1"), ControlState::Confirmed);
        assert!(!h.switch_on("R1"));
    }

    #[tokio::test]
    async fn revived_entry_is_dropped_when_rule_stays_absent() {
        let api = MockApi::new().with_rule("R1", RuleStatus::Active);
        let mut h = Harness::new(api);
        h.poll().await;
        h.api.remove_rule("R1");
        h.poll().await;
        h.poll().await;

        // Remote error keeps the revived entry in Reverting.
        h.api.fail_commands(Some(ErrorKind::Transient));
        assert!(h.service.pause("R1").await.is_err());
        assert!(h.service.is_known(&EntityId::from("R1")));

        h.poll().await;
        assert!(!h.service.is_known(&EntityId::from("R1")));
    }
}
