// firewalla-core: sync and control layer between firewalla-api and consumers.

pub mod api;
pub mod command;
pub mod config;
pub mod control;
pub mod convert;
pub mod coordinator;
pub mod error;
pub mod integration;
pub mod model;
pub mod snapshot;
pub mod store;
pub mod stream;

#[cfg(test)]
mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use api::RemoteApi;
pub use command::Command;
pub use config::{SyncConfig, TlsVerification};
pub use control::{CommandOutcome, ControlState, RuleAction, RuleControl, validate_rule_id};
pub use coordinator::{Health, PollOutcome, PollState};
pub use error::{CoreError, ErrorKind};
pub use integration::{Integration, SyncEvent};
pub use snapshot::{Freshness, KindDiff, Snapshot, SnapshotDiff};
pub use store::{
    BoxEntity, Changes, CounterEntity, CounterKind, DeviceEntity, EntityRegistry,
    ReconcileReport, RuleSwitch,
};
pub use stream::{EntityStream, EntityWatchStream};

pub use model::{Alarm, AlarmSeverity, BoxStatus, Device, EntityId, Rule, RuleScope, RuleStatus};
