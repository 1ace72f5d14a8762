// In-memory `RemoteApi` double for unit tests.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

use crate::api::RemoteApi;
use crate::error::{CoreError, ErrorKind};
use crate::model::{Alarm, BoxStatus, Device, EntityId, Rule, RuleStatus};
use crate::snapshot::fixtures;

fn error_for(kind: ErrorKind, what: &str) -> CoreError {
    match kind {
        ErrorKind::Auth => CoreError::Auth {
            message: format!("{what}: token rejected"),
        },
        ErrorKind::Transient => CoreError::Transient {
            message: format!("{what}: connection reset"),
        },
        ErrorKind::NotFound => CoreError::NotFound {
            entity_type: "Rule".into(),
            identifier: what.into(),
        },
        ErrorKind::Validation => CoreError::Validation {
            message: format!("{what}: malformed payload"),
        },
    }
}

#[derive(Default)]
struct Failures {
    box_status: Option<ErrorKind>,
    devices: Option<ErrorKind>,
    rules: Option<ErrorKind>,
    alarms: Option<ErrorKind>,
    command: Option<ErrorKind>,
}

struct Remote {
    box_status: BoxStatus,
    devices: Vec<Device>,
    rules: BTreeMap<EntityId, Rule>,
    alarms: Vec<Alarm>,
    /// Whether pause/resume change the remote rule status.
    apply_commands: bool,
    failures: Failures,
}

/// Scriptable fake MSP account. Clones share state.
#[derive(Clone)]
pub(crate) struct MockApi {
    remote: Arc<Mutex<Remote>>,
    /// When set, commands wait for a permit before answering.
    command_gate: Arc<Mutex<Option<Arc<Semaphore>>>>,
    /// When set, `fetch_rules` waits for a permit before answering.
    fetch_gate: Arc<Mutex<Option<Arc<Semaphore>>>>,
    pub(crate) box_fetches: Arc<AtomicUsize>,
    pub(crate) command_calls: Arc<AtomicUsize>,
}

impl MockApi {
    pub(crate) fn new() -> Self {
        Self {
            remote: Arc::new(Mutex::new(Remote {
                box_status: fixtures::box_status(true),
                devices: Vec::new(),
                rules: BTreeMap::new(),
                alarms: Vec::new(),
                apply_commands: true,
                failures: Failures::default(),
            })),
            command_gate: Arc::new(Mutex::new(None)),
            fetch_gate: Arc::new(Mutex::new(None)),
            box_fetches: Arc::new(AtomicUsize::new(0)),
            command_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn with_rule(self, id: &str, status: RuleStatus) -> Self {
        self.set_rule(id, status);
        self
    }

    pub(crate) fn with_device(self, id: &str) -> Self {
        self.remote
            .lock()
            .unwrap()
            .devices
            .push(fixtures::device(id, true));
        self
    }

    pub(crate) fn set_rule(&self, id: &str, status: RuleStatus) {
        let rule = fixtures::rule(id, status);
        self.remote.lock().unwrap().rules.insert(rule.id.clone(), rule);
    }

    pub(crate) fn remove_rule(&self, id: &str) {
        self.remote.lock().unwrap().rules.remove(id);
    }

    pub(crate) fn remove_device(&self, id: &str) {
        self.remote
            .lock()
            .unwrap()
            .devices
            .retain(|d| d.id.as_str() != id);
    }

    pub(crate) fn remote_status(&self, id: &str) -> Option<RuleStatus> {
        self.remote.lock().unwrap().rules.get(id).map(|r| r.status)
    }

    pub(crate) fn set_box_online(&self, online: bool) {
        self.remote.lock().unwrap().box_status.online = online;
    }

    /// Commands succeed but the remote keeps its old status.
    pub(crate) fn ignore_commands(&self) {
        self.remote.lock().unwrap().apply_commands = false;
    }

    pub(crate) fn fail_box(&self, kind: Option<ErrorKind>) {
        self.remote.lock().unwrap().failures.box_status = kind;
    }

    pub(crate) fn fail_devices(&self, kind: Option<ErrorKind>) {
        self.remote.lock().unwrap().failures.devices = kind;
    }

    pub(crate) fn fail_rules(&self, kind: Option<ErrorKind>) {
        self.remote.lock().unwrap().failures.rules = kind;
    }

    pub(crate) fn fail_commands(&self, kind: Option<ErrorKind>) {
        self.remote.lock().unwrap().failures.command = kind;
    }

    /// Hold every command until a permit is added to the returned semaphore.
    pub(crate) fn gate_commands(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.command_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Hold every rules fetch until a permit is added.
    pub(crate) fn gate_fetches(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.fetch_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    async fn pass(gate: &Mutex<Option<Arc<Semaphore>>>) {
        let gate = gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
    }

    async fn command(&self, id: &EntityId, status: RuleStatus) -> Result<(), CoreError> {
        self.command_calls.fetch_add(1, Ordering::SeqCst);
        Self::pass(&self.command_gate).await;

        let mut remote = self.remote.lock().unwrap();
        if let Some(kind) = remote.failures.command {
            return Err(error_for(kind, id.as_str()));
        }
        let apply = remote.apply_commands;
        match remote.rules.get_mut(id) {
            Some(rule) => {
                if apply {
                    rule.status = status;
                }
                Ok(())
            }
            None => Err(error_for(ErrorKind::NotFound, id.as_str())),
        }
    }
}

impl RemoteApi for MockApi {
    async fn fetch_box_status(&self) -> Result<BoxStatus, CoreError> {
        self.box_fetches.fetch_add(1, Ordering::SeqCst);
        let remote = self.remote.lock().unwrap();
        match remote.failures.box_status {
            Some(kind) => Err(error_for(kind, "boxes")),
            None => Ok(remote.box_status.clone()),
        }
    }

    async fn fetch_devices(&self) -> Result<Vec<Device>, CoreError> {
        let remote = self.remote.lock().unwrap();
        match remote.failures.devices {
            Some(kind) => Err(error_for(kind, "devices")),
            None => Ok(remote.devices.clone()),
        }
    }

    async fn fetch_rules(&self) -> Result<Vec<Rule>, CoreError> {
        // Read before waiting so a gated fetch observes pre-gate state.
        let result = {
            let remote = self.remote.lock().unwrap();
            match remote.failures.rules {
                Some(kind) => Err(error_for(kind, "rules")),
                None => Ok(remote.rules.values().cloned().collect()),
            }
        };
        Self::pass(&self.fetch_gate).await;
        result
    }

    async fn fetch_alarms(&self) -> Result<Vec<Alarm>, CoreError> {
        let remote = self.remote.lock().unwrap();
        match remote.failures.alarms {
            Some(kind) => Err(error_for(kind, "alarms")),
            None => Ok(remote.alarms.clone()),
        }
    }

    async fn pause_rule(&self, id: &EntityId) -> Result<(), CoreError> {
        self.command(id, RuleStatus::Paused).await
    }

    async fn resume_rule(&self, id: &EntityId) -> Result<(), CoreError> {
        self.command(id, RuleStatus::Active).await
    }
}
