// ── Integration facade ──
//
// Lifecycle for one Firewalla box: first refresh, background polling,
// command processing and shutdown. Consumers read presented entities and
// issue pause/resume through here.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use firewalla_api::FirewallaClient;
use serde::Serialize;
use tokio::sync::{Mutex, Notify, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::RemoteApi;
use crate::command::{Command, CommandEnvelope};
use crate::config::SyncConfig;
use crate::control::{CommandOutcome, CommandSequence, RuleControl, RuleControlService};
use crate::coordinator::{Coordinator, Health, PollOutcome, SnapshotObserver};
use crate::error::CoreError;
use crate::model::EntityId;
use crate::snapshot::{Snapshot, SnapshotDiff};
use crate::store::{
    BoxEntity, CounterEntity, DeviceEntity, EntityRegistry, ReconcileReport, RuleSwitch,
};
use crate::stream::EntityStream;

const COMMAND_CHANNEL_SIZE: usize = 64;
const EVENT_CHANNEL_SIZE: usize = 256;

/// Broadcast to every `events()` subscriber.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    SnapshotPublished {
        seq: u64,
        diff: SnapshotDiff,
        report: ReconcileReport,
    },
    HealthChanged(Health),
}

/// Feeds each published snapshot through rule control and the registry.
struct Reconciler<A> {
    control: Arc<RuleControlService<A>>,
    registry: Arc<EntityRegistry>,
    events: broadcast::Sender<Arc<SyncEvent>>,
}

impl<A: RemoteApi> SnapshotObserver for Reconciler<A> {
    fn snapshot_published(&self, snapshot: &Arc<Snapshot>, diff: &SnapshotDiff) {
        let report = self.control.reconcile(snapshot);
        if !report.is_empty() {
            debug!(
                seq = snapshot.seq,
                devices_created = report.devices.created.len(),
                devices_removed = report.devices.removed.len(),
                rules_created = report.rules.created.len(),
                rules_removed = report.rules.removed.len(),
                "registry reconciled"
            );
        }
        let _ = self.events.send(Arc::new(SyncEvent::SnapshotPublished {
            seq: snapshot.seq,
            diff: diff.clone(),
            report,
        }));
    }

    fn health_changed(&self, health: Health) {
        self.registry.set_integration_available(health.is_available());
        let _ = self.events.send(Arc::new(SyncEvent::HealthChanged(health)));
    }
}

// ── Integration ──────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<IntegrationInner>`. Does nothing until
/// [`setup()`](Self::setup) succeeds.
pub struct Integration<A: RemoteApi = FirewallaClient> {
    inner: Arc<IntegrationInner<A>>,
}

impl<A: RemoteApi> Clone for Integration<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct IntegrationInner<A> {
    poll_interval: Duration,
    coordinator: Arc<Coordinator<A>>,
    control: Arc<RuleControlService<A>>,
    registry: Arc<EntityRegistry>,
    events: broadcast::Sender<Arc<SyncEvent>>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    command_rx: Mutex<Option<mpsc::Receiver<CommandEnvelope>>>,
    wake: Arc<Notify>,
    running: AtomicBool,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Integration<FirewallaClient> {
    /// Build an integration talking to the MSP API described by `config`.
    pub fn new(config: &SyncConfig) -> Result<Self, CoreError> {
        let mut client = FirewallaClient::new(&config.url, &config.api_key, &config.transport())?
            .with_retry(config.retry.clone());
        if let Some(gid) = &config.box_gid {
            client = client.with_box_gid(gid.clone());
        }
        Ok(Self::with_api(Arc::new(client), config))
    }

    /// One-shot: set up, run the closure, shut down.
    ///
    /// Skips background polling; only the first refresh runs.
    pub async fn oneshot<F, Fut, T>(config: &SyncConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Integration) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let mut cfg = config.clone();
        cfg.poll_interval = Duration::ZERO;

        let integration = Self::new(&cfg)?;
        integration.setup().await?;
        let result = f(integration.clone()).await;
        integration.shutdown().await;
        result
    }
}

impl<A: RemoteApi> Integration<A> {
    /// Build an integration over any [`RemoteApi`]. Only the sync settings
    /// of `config` are used; the endpoint and credential belong to `api`.
    pub fn with_api(api: Arc<A>, config: &SyncConfig) -> Self {
        let registry = Arc::new(EntityRegistry::new(config.missing_threshold));
        let sequence = Arc::new(CommandSequence::new());
        let cancel = CancellationToken::new();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);

        let control = Arc::new(RuleControlService::new(
            Arc::clone(&api),
            Arc::clone(&registry),
            Arc::clone(&sequence),
            config.confirm_cycles,
            cancel.clone(),
        ));
        let reconciler = Arc::new(Reconciler {
            control: Arc::clone(&control),
            registry: Arc::clone(&registry),
            events: events.clone(),
        });
        let coordinator = Arc::new(Coordinator::new(
            api,
            config.failure_threshold,
            sequence,
            reconciler,
        ));

        Self {
            inner: Arc::new(IntegrationInner {
                poll_interval: config.poll_interval,
                coordinator,
                control,
                registry,
                events,
                command_tx,
                command_rx: Mutex::new(Some(command_rx)),
                wake: Arc::new(Notify::new()),
                running: AtomicBool::new(false),
                cancel,
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Run the first refresh and start the background tasks.
    ///
    /// Fails if the first refresh fails; nothing is spawned in that case.
    /// A zero poll interval skips the poll loop.
    pub async fn setup(&self) -> Result<(), CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::Disconnected);
        }
        if self.inner.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.inner.coordinator.poll_once().await?;

        let mut handles = self.inner.task_handles.lock().await;

        if let Some(rx) = self.inner.command_rx.lock().await.take() {
            let control = Arc::clone(&self.inner.control);
            let cancel = self.inner.cancel.clone();
            handles.push(tokio::spawn(command_processor_task(control, rx, cancel)));
        }

        let interval = self.inner.poll_interval;
        if !interval.is_zero() {
            let coordinator = Arc::clone(&self.inner.coordinator);
            let cancel = self.inner.cancel.clone();
            let wake = Arc::clone(&self.inner.wake);
            handles.push(tokio::spawn(async move {
                coordinator.run(interval, cancel, wake).await;
            }));
        }

        self.inner.running.store(true, Ordering::SeqCst);
        info!(
            poll_interval = ?interval,
            devices = self.inner.registry.device_count(),
            rules = self.inner.registry.rule_switch_count(),
            "integration set up"
        );
        Ok(())
    }

    /// Stop polling and command processing.
    ///
    /// In-flight fetches are abandoned. Commands already sent to the
    /// remote run to completion but their results are discarded.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "background task ended abnormally");
            }
        }
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.registry.set_integration_available(false);
        debug!("integration shut down");
    }

    /// Poll now. Returns `Skipped` if a poll is already running.
    pub async fn refresh(&self) -> Result<PollOutcome, CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::Disconnected);
        }
        self.inner.coordinator.poll_once().await
    }

    /// Ask the poll loop for an early poll without waiting for it.
    pub fn request_refresh(&self) {
        self.inner.wake.notify_one();
    }

    // ── Commands ─────────────────────────────────────────────────

    pub async fn pause_rule(&self, rule_id: &str) -> Result<CommandOutcome, CoreError> {
        self.execute(Command::PauseRule {
            id: rule_id.to_owned(),
        })
        .await
    }

    pub async fn resume_rule(&self, rule_id: &str) -> Result<CommandOutcome, CoreError> {
        self.execute(Command::ResumeRule {
            id: rule_id.to_owned(),
        })
        .await
    }

    /// Send a command to the processor task and await its result.
    pub async fn execute(&self, command: Command) -> Result<CommandOutcome, CoreError> {
        if !self.inner.running.load(Ordering::SeqCst) || self.inner.cancel.is_cancelled() {
            return Err(CoreError::Disconnected);
        }

        let (tx, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(CommandEnvelope {
                command,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::Disconnected)?;

        rx.await.map_err(|_| CoreError::Disconnected)?
    }

    // ── State observation ────────────────────────────────────────

    pub fn health(&self) -> Health {
        self.inner.coordinator.health()
    }

    pub fn subscribe_health(&self) -> watch::Receiver<Health> {
        self.inner.coordinator.subscribe_health()
    }

    pub fn events(&self) -> broadcast::Receiver<Arc<SyncEvent>> {
        self.inner.events.subscribe()
    }

    /// Current snapshot, if any poll has succeeded.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.inner.coordinator.snapshot()
    }

    pub fn rule_control(&self, id: &EntityId) -> Option<RuleControl> {
        self.inner.control.control(id)
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.inner.registry
    }

    pub fn box_entity(&self) -> Option<Arc<BoxEntity>> {
        self.inner.registry.box_entity()
    }

    pub fn counters_snapshot(&self) -> Arc<Vec<Arc<CounterEntity>>> {
        self.inner.registry.counters_snapshot()
    }

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<DeviceEntity>>> {
        self.inner.registry.devices_snapshot()
    }

    pub fn rule_switches_snapshot(&self) -> Arc<Vec<Arc<RuleSwitch>>> {
        self.inner.registry.rule_switches_snapshot()
    }

    // ── Entity streams ───────────────────────────────────────────

    pub fn devices(&self) -> EntityStream<DeviceEntity> {
        self.inner.registry.subscribe_devices()
    }

    pub fn rule_switches(&self) -> EntityStream<RuleSwitch> {
        self.inner.registry.subscribe_rule_switches()
    }

    pub fn counters(&self) -> EntityStream<CounterEntity> {
        self.inner.registry.subscribe_counters()
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Receive commands and run each in its own task, so a slow remote call
/// never holds up the next command.
async fn command_processor_task<A: RemoteApi>(
    control: Arc<RuleControlService<A>>,
    mut rx: mpsc::Receiver<CommandEnvelope>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let control = Arc::clone(&control);
                tokio::spawn(async move {
                    let command = envelope.command;
                    let result = control.execute(command.action(), command.rule_id()).await;
                    let _ = envelope.response_tx.send(result);
                });
            }
        }
    }
    debug!("command processor stopped");
}
