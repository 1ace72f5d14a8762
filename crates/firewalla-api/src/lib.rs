// firewalla-api: Async Rust client for the Firewalla MSP cloud API

pub mod client;
pub mod error;
pub mod models;
pub mod retry;
pub mod transport;

mod alarms;
mod boxes;
mod devices;
mod rules;

pub use client::FirewallaClient;
pub use error::{Error, ErrorKind};
pub use models::{AlarmRecord, BoxInfo, NamedRef, NetworkDevice, RuleRecord, RuleScopeRecord, RuleTargetRecord};
pub use retry::RetryPolicy;
pub use transport::{TlsMode, TransportConfig};
