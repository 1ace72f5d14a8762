// ── Command API ──
//
// Rule writes flow through the `Command` enum and the integration's
// command channel. The processor hands each one to the rule control
// service.

use tokio::sync::oneshot;

use crate::control::{CommandOutcome, RuleAction};
use crate::error::CoreError;

/// A command plus the channel its result goes back on.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: oneshot::Sender<Result<CommandOutcome, CoreError>>,
}

/// Write operations against a Firewalla box.
///
/// Ids are raw strings; the control service validates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    PauseRule { id: String },
    ResumeRule { id: String },
}

impl Command {
    pub fn action(&self) -> RuleAction {
        match self {
            Self::PauseRule { .. } => RuleAction::Pause,
            Self::ResumeRule { .. } => RuleAction::Resume,
        }
    }

    pub fn rule_id(&self) -> &str {
        match self {
            Self::PauseRule { id } | Self::ResumeRule { id } => id,
        }
    }
}
