// ── Runtime sync configuration ──
//
// Describes how to reach the MSP API and how the poll/reconcile loop
// behaves. Carries the credential but never touches disk; the CLI builds
// a `SyncConfig` from a config profile and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use firewalla_api::transport::{TlsMode, TransportConfig};
use firewalla_api::RetryPolicy;
use secrecy::SecretString;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict). The MSP cloud always has a public cert.
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification.
    DangerAcceptInvalid,
}

/// Configuration for one Firewalla MSP account entry.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// MSP domain, e.g. `mycompany.firewalla.net` or a full URL.
    pub url: String,
    /// MSP personal access token.
    pub api_key: SecretString,
    /// Box to track. `None` tracks the first box the token can see.
    pub box_gid: Option<String>,
    pub tls: TlsVerification,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Delay between poll cycles.
    pub poll_interval: Duration,
    /// Consecutive failed polls before the integration turns unavailable.
    pub failure_threshold: u32,
    /// Consecutive fresh snapshots an entity may be absent before removal.
    pub missing_threshold: u32,
    /// Post-command cycles an optimistic rule may disagree with the remote
    /// before it reverts.
    pub confirm_cycles: u32,
    pub retry: RetryPolicy,
}

impl SyncConfig {
    /// Defaults for everything except the endpoint and credential.
    pub fn new(url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            url: url.into(),
            api_key,
            box_gid: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(60),
            failure_threshold: 3,
            missing_threshold: 2,
            confirm_cycles: 2,
            retry: RetryPolicy::default(),
        }
    }

    pub(crate) fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: match &self.tls {
                TlsVerification::SystemDefaults => TlsMode::System,
                TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
                TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
            },
            timeout: self.timeout,
        }
    }
}
