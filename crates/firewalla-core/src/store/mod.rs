// ── Presented entity store ──

mod collection;
mod registry;

pub use registry::{
    BoxEntity, Changes, CounterEntity, CounterKind, DeviceEntity, EntityRegistry,
    ReconcileReport, RuleSwitch,
};
