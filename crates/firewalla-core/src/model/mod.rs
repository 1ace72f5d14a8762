// ── Domain model ──
//
// Canonical representations of the objects the MSP API reports. Wire
// quirks (numeric ids, two target shapes, status vs paused flag) are
// resolved in `convert` before anything here is built.

pub mod alarm;
pub mod box_status;
pub mod device;
pub mod entity_id;
pub mod rule;

pub use alarm::{Alarm, AlarmSeverity};
pub use box_status::BoxStatus;
pub use device::Device;
pub use entity_id::EntityId;
pub use rule::{Rule, RuleScope, RuleStatus};
