//! `firewalla pause` / `firewalla resume`.

use serde::Serialize;

use firewalla_core::{CommandOutcome, Integration, RuleAction, SyncConfig, validate_rule_id};

use crate::cli::{GlobalOpts, RuleArgs};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct CommandReport {
    rule_id: String,
    action: RuleAction,
    outcome: CommandOutcome,
}

fn describe(report: &CommandReport) -> String {
    let verb = match report.action {
        RuleAction::Pause => "paused",
        RuleAction::Resume => "resumed",
    };
    match report.outcome {
        CommandOutcome::Applied => format!("Rule {} {verb}", report.rule_id),
        CommandOutcome::Superseded => format!(
            "Rule {} accepted the {} request, but a newer command for it took over",
            report.rule_id, report.action
        ),
        CommandOutcome::AlreadyInState => format!("Rule {} was already {verb}", report.rule_id),
        CommandOutcome::RuleRemoved => {
            format!("Rule {} no longer exists on the box", report.rule_id)
        }
    }
}

pub async fn pause(
    config: &SyncConfig,
    args: &RuleArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    run(RuleAction::Pause, config, args, global).await
}

pub async fn resume(
    config: &SyncConfig,
    args: &RuleArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    run(RuleAction::Resume, config, args, global).await
}

async fn run(
    action: RuleAction,
    config: &SyncConfig,
    args: &RuleArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let id = validate_rule_id(&args.rule_id)?;
    let rule_id = id.to_string();

    let outcome = Integration::oneshot(config, |integration| async move {
        match action {
            RuleAction::Pause => integration.pause_rule(id.as_str()).await,
            RuleAction::Resume => integration.resume_rule(id.as_str()).await,
        }
    })
    .await?;

    let report = CommandReport {
        rule_id,
        action,
        outcome,
    };
    let out = output::render_single(&global.output, &report, describe, |r| {
        r.outcome.to_string()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
