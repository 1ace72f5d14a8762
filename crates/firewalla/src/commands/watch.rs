//! `firewalla watch`: keep polling and print what changes until Ctrl-C.

use owo_colors::OwoColorize;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use firewalla_core::{Health, Integration, KindDiff, SyncConfig, SyncEvent};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(
    config: &SyncConfig,
    args: &WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut config = config.clone();
    if let Some(interval) = args.interval {
        if interval.is_zero() {
            return Err(CliError::Validation {
                field: "interval".into(),
                reason: "must be greater than zero".into(),
            });
        }
        config.poll_interval = interval;
    }

    let color = output::should_color(&global.color);
    let integration = Integration::new(&config)?;
    let mut events = integration.events();
    integration.setup().await?;

    if let Some(entity) = integration.box_entity() {
        let banner = format!(
            "Watching {} ({}) every {}: {} devices, {} rules",
            entity.status.name,
            entity.status.gid,
            humantime::format_duration(config.poll_interval),
            integration.devices_snapshot().len(),
            integration.rule_switches_snapshot().len(),
        );
        if !global.quiet && matches!(global.output, OutputFormat::Table | OutputFormat::Plain) {
            eprintln!("{banner}");
        }
    }

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            event = events.recv() => match event {
                Ok(event) => {
                    match render_event(&event, &global.output, color) {
                        Ok(line) => output::print_output(&line, global.quiet),
                        Err(e) => break Err(e),
                    }
                    if matches!(*event, SyncEvent::HealthChanged(Health::ReauthRequired)) {
                        break Err(CliError::AuthFailed {
                            profile: String::new(),
                            message: "the MSP rejected the API token while watching".into(),
                        });
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "watch output fell behind"),
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    integration.shutdown().await;
    result
}

fn render_event(event: &SyncEvent, format: &OutputFormat, color: bool) -> Result<String, CliError> {
    match format {
        OutputFormat::Json | OutputFormat::JsonCompact | OutputFormat::Yaml => {
            // One record per line so the stream stays parseable.
            output::render_json(event, true)
        }
        OutputFormat::Table | OutputFormat::Plain => Ok(describe_event(event, color)),
    }
}

fn describe_event(event: &SyncEvent, color: bool) -> String {
    match event {
        SyncEvent::HealthChanged(health) => {
            format!("health: {}", output::health_label(*health, color))
        }
        SyncEvent::SnapshotPublished { seq, diff, report } => {
            let mut parts = Vec::new();
            if diff.box_changed {
                parts.push("box updated".to_owned());
            }
            push_kind(&mut parts, "devices", &diff.devices);
            push_kind(&mut parts, "rules", &diff.rules);
            push_kind(&mut parts, "alarms", &diff.alarms);
            if !report.forgotten_rules.is_empty() {
                parts.push(format!("{} rules forgotten", report.forgotten_rules.len()));
            }
            let summary = if parts.is_empty() {
                "no changes".to_owned()
            } else {
                parts.join(", ")
            };
            let prefix = format!("[poll {seq}]");
            if color {
                format!("{} {summary}", prefix.dimmed())
            } else {
                format!("{prefix} {summary}")
            }
        }
    }
}

fn push_kind(parts: &mut Vec<String>, label: &str, diff: &KindDiff) {
    if diff.is_empty() {
        return;
    }
    parts.push(format!(
        "{label} +{} -{} ~{}",
        diff.added.len(),
        diff.removed.len(),
        diff.changed.len()
    ));
}
