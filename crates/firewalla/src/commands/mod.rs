//! Command dispatch: bridges CLI args -> core integration -> output formatting.

pub mod config_cmd;
pub mod rules;
pub mod status;
pub mod watch;

use firewalla_core::SyncConfig;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a box-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    profile: &str,
    config: &SyncConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let result = match cmd {
        Command::Status(args) => status::handle(config, &args, global).await,
        Command::Watch(args) => watch::handle(config, &args, global).await,
        Command::Pause(args) => rules::pause(config, &args, global).await,
        Command::Resume(args) => rules::resume(config, &args, global).await,
        // Handled before a config is resolved
        Command::Config(_) | Command::Completions(_) => Ok(()),
    };
    result.map_err(|e| e.for_profile(profile))
}
