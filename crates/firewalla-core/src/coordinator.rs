// ── Polling coordinator ──
//
// One periodic poller. Each cycle fetches box status, devices, rules and
// alarms concurrently, folds them into an immutable snapshot, diffs it
// against the previous one and hands both to the observer. Polls never
// overlap; a tick that finds a poll in flight is skipped.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Notify, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::RemoteApi;
use crate::control::CommandSequence;
use crate::error::CoreError;
use crate::model::EntityId;
use crate::snapshot::{Freshness, Snapshot, SnapshotDiff};

// ── Observable state ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PollState {
    Idle,
    Polling,
}

/// Integration health as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "health", rename_all = "snake_case")]
pub enum Health {
    /// Last poll succeeded.
    Available,
    /// Recent polls failed; last-good data is still served.
    Degraded { consecutive_failures: u32 },
    /// Too many failures (or no data yet); entities are unavailable.
    Unavailable { consecutive_failures: u32 },
    /// The token was rejected. Polling has stopped.
    ReauthRequired,
}

impl Health {
    pub fn is_available(self) -> bool {
        matches!(self, Self::Available | Self::Degraded { .. })
    }
}

/// Receives every published snapshot, in publication order.
///
/// Called synchronously from inside the poll, so no two calls overlap.
pub trait SnapshotObserver: Send + Sync {
    fn snapshot_published(&self, snapshot: &Arc<Snapshot>, diff: &SnapshotDiff);

    fn health_changed(&self, _health: Health) {}
}

#[derive(Debug, Clone)]
pub enum PollOutcome {
    Published {
        snapshot: Arc<Snapshot>,
        diff: SnapshotDiff,
    },
    /// Another poll was already running.
    Skipped,
}

/// Resets the poll state to `Idle` when the poll ends or is abandoned.
struct PollGuard<'a>(&'a watch::Sender<PollState>);

impl Drop for PollGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(PollState::Idle);
    }
}

// ── Coordinator ──────────────────────────────────────────────────

pub struct Coordinator<A> {
    api: Arc<A>,
    failure_threshold: u32,
    sequence: Arc<CommandSequence>,
    observer: Arc<dyn SnapshotObserver>,
    current: ArcSwapOption<Snapshot>,
    poll_state: watch::Sender<PollState>,
    health: watch::Sender<Health>,
    failures: AtomicU32,
    published: AtomicU64,
}

impl<A: RemoteApi> Coordinator<A> {
    pub fn new(
        api: Arc<A>,
        failure_threshold: u32,
        sequence: Arc<CommandSequence>,
        observer: Arc<dyn SnapshotObserver>,
    ) -> Self {
        let (poll_state, _) = watch::channel(PollState::Idle);
        let (health, _) = watch::channel(Health::Unavailable {
            consecutive_failures: 0,
        });
        Self {
            api,
            failure_threshold: failure_threshold.max(1),
            sequence,
            observer,
            current: ArcSwapOption::empty(),
            poll_state,
            health,
            failures: AtomicU32::new(0),
            published: AtomicU64::new(0),
        }
    }

    /// Run one poll cycle.
    ///
    /// Returns `Skipped` if a poll is already in flight. Fails iff box
    /// status could not be fetched (or any fetch hit an auth error); a
    /// failing device/rule/alarm fetch only marks that section stale.
    pub async fn poll_once(&self) -> Result<PollOutcome, CoreError> {
        let entered = self.poll_state.send_if_modified(|state| {
            if *state == PollState::Idle {
                *state = PollState::Polling;
                true
            } else {
                false
            }
        });
        if !entered {
            debug!("poll already in flight, skipping");
            return Ok(PollOutcome::Skipped);
        }
        let _guard = PollGuard(&self.poll_state);

        let watermark = self.sequence.current();
        let (box_res, devices_res, rules_res, alarms_res) = tokio::join!(
            self.api.fetch_box_status(),
            self.api.fetch_devices(),
            self.api.fetch_rules(),
            self.api.fetch_alarms(),
        );

        let auth_failure = [
            box_res.as_ref().err(),
            devices_res.as_ref().err(),
            rules_res.as_ref().err(),
            alarms_res.as_ref().err(),
        ]
        .into_iter()
        .flatten()
        .find(|e| e.is_auth())
        .map(ToString::to_string);
        if let Some(message) = auth_failure {
            error!(error = %message, "token rejected, reauthentication required");
            self.set_health(Health::ReauthRequired);
            return Err(CoreError::Auth { message });
        }

        let box_status = match box_res {
            Ok(status) => status,
            Err(e) => return Err(self.record_failure(e)),
        };

        let previous = self.current.load_full();
        let prev = previous.as_deref();
        let (devices, devices_fresh) =
            section("devices", devices_res, prev.map(|p| &p.devices), |d| &d.id);
        let (rules, rules_fresh) = section("rules", rules_res, prev.map(|p| &p.rules), |r| &r.id);
        let (alarms, alarms_fresh) =
            section("alarms", alarms_res, prev.map(|p| &p.alarms), |a| &a.id);

        let snapshot = Arc::new(Snapshot {
            seq: self.published.fetch_add(1, Ordering::SeqCst) + 1,
            taken_at: Utc::now(),
            command_watermark: watermark,
            box_status,
            devices,
            rules,
            alarms,
            freshness: Freshness {
                devices: devices_fresh,
                rules: rules_fresh,
                alarms: alarms_fresh,
            },
        });
        let diff = SnapshotDiff::between(prev, &snapshot);

        self.current.store(Some(Arc::clone(&snapshot)));
        self.failures.store(0, Ordering::SeqCst);
        self.set_health(Health::Available);
        debug!(
            seq = snapshot.seq,
            devices = snapshot.devices.len(),
            rules = snapshot.rules.len(),
            alarms = snapshot.alarms.len(),
            complete = snapshot.freshness.is_complete(),
            "snapshot published"
        );
        self.observer.snapshot_published(&snapshot, &diff);

        Ok(PollOutcome::Published { snapshot, diff })
    }

    /// Poll on `interval` until cancelled or the token is rejected.
    ///
    /// A `wake` notification triggers an early poll. Cancellation abandons
    /// an in-flight poll.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken, wake: Arc<Notify>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                () = wake.notified() => debug!("refresh requested"),
            }

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = self.poll_once() => result,
            };

            match result {
                Ok(_) => {}
                Err(e) if e.is_auth() => {
                    warn!("stopping poll loop until reauthentication");
                    break;
                }
                Err(e) => warn!(error = %e, "poll failed"),
            }
        }
        debug!("poll loop stopped");
    }

    fn record_failure(&self, err: CoreError) -> CoreError {
        let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        let health = if failures >= self.failure_threshold || self.current.load().is_none() {
            Health::Unavailable {
                consecutive_failures: failures,
            }
        } else {
            Health::Degraded {
                consecutive_failures: failures,
            }
        };
        warn!(error = %err, consecutive_failures = failures, ?health, "box status fetch failed");
        self.set_health(health);
        err
    }

    fn set_health(&self, health: Health) {
        let changed = self.health.send_if_modified(|current| {
            if *current == health {
                false
            } else {
                *current = health;
                true
            }
        });
        if changed {
            info!(?health, "health changed");
            self.observer.health_changed(health);
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    /// The current snapshot, if any poll has succeeded.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.current.load_full()
    }

    pub fn health(&self) -> Health {
        *self.health.borrow()
    }

    pub fn subscribe_health(&self) -> watch::Receiver<Health> {
        self.health.subscribe()
    }

    pub fn poll_state(&self) -> PollState {
        *self.poll_state.borrow()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }
}

/// Fresh section from `result`, or the previous one (possibly empty) when
/// the fetch failed.
fn section<T: Clone>(
    name: &str,
    result: Result<Vec<T>, CoreError>,
    previous: Option<&BTreeMap<EntityId, T>>,
    key: impl Fn(&T) -> &EntityId,
) -> (BTreeMap<EntityId, T>, bool) {
    match result {
        Ok(items) => (
            items
                .into_iter()
                .map(|item| (key(&item).clone(), item))
                .collect(),
            true,
        ),
        Err(e) => {
            warn!(section = name, error = %e, "fetch failed, carrying previous data forward");
            (previous.cloned().unwrap_or_default(), false)
        }
    }
}
