//! `firewalla status`: one poll, then box summary, devices or rules.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::Tabled;

use firewalla_core::{
    CounterKind, DeviceEntity, Health, Integration, RuleScope, RuleSwitch, SyncConfig,
};

use crate::cli::{GlobalOpts, StatusArgs, StatusView};
use crate::error::CliError;
use crate::output;

// ── Box summary ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct BoxSummary {
    gid: String,
    name: String,
    model: String,
    firmware_version: Option<String>,
    mode: Option<String>,
    online: bool,
    license: Option<String>,
    public_ip: Option<String>,
    location: Option<String>,
    health: Health,
    devices: u64,
    rules: u64,
    alarms: u64,
    polled_at: Option<DateTime<Utc>>,
}

fn summarize(integration: &Integration) -> Result<BoxSummary, firewalla_core::CoreError> {
    let entity = integration
        .box_entity()
        .ok_or_else(|| firewalla_core::CoreError::Internal("no box after first refresh".into()))?;
    let counter = |kind| {
        integration
            .registry()
            .counter(kind)
            .map_or(0, |c| c.value)
    };
    let status = &entity.status;
    Ok(BoxSummary {
        gid: status.gid.to_string(),
        name: status.name.clone(),
        model: status.model.clone(),
        firmware_version: status.firmware_version.clone(),
        mode: status.mode.clone(),
        online: status.online,
        license: status.license.clone(),
        public_ip: status.public_ip.clone(),
        location: status.location.clone(),
        health: integration.health(),
        devices: counter(CounterKind::Devices),
        rules: counter(CounterKind::Rules),
        alarms: counter(CounterKind::Alarms),
        polled_at: integration.snapshot().map(|s| s.taken_at),
    })
}

fn box_detail(s: &BoxSummary, color: bool) -> String {
    let dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".into());
    [
        format!("Box:      {} ({})", s.name, s.gid),
        format!("Model:    {}", s.model),
        format!("Firmware: {}", dash(&s.firmware_version)),
        format!("Mode:     {}", dash(&s.mode)),
        format!("Online:   {}", output::switch_label(s.online, color)),
        format!("IP:       {}", dash(&s.public_ip)),
        format!("Location: {}", dash(&s.location)),
        format!("Health:   {}", output::health_label(s.health, color)),
        format!("Devices:  {}", s.devices),
        format!("Rules:    {}", s.rules),
        format!("Alarms:   {}", s.alarms),
    ]
    .join("\n")
}

// ── Devices ─────────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "Online")]
    online: String,
    #[tabled(rename = "Download")]
    download: String,
    #[tabled(rename = "Upload")]
    upload: String,
    #[tabled(rename = "Group")]
    group: String,
}

fn device_row(e: &Arc<DeviceEntity>, color: bool) -> DeviceRow {
    let d = &e.device;
    DeviceRow {
        id: d.id.to_string(),
        name: d.name.clone(),
        ip: d.ip.map(|ip| ip.to_string()).unwrap_or_default(),
        online: output::switch_label(d.online, color),
        download: format_bytes(d.download_bytes),
        upload: format_bytes(d.upload_bytes),
        group: d
            .group_name
            .clone()
            .or_else(|| d.group_id.as_ref().map(ToString::to_string))
            .unwrap_or_default(),
    }
}

// ── Rules ───────────────────────────────────────────────────────────

#[derive(Tabled)]
struct RuleRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Type")]
    rule_type: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Scope")]
    scope: String,
    #[tabled(rename = "Switch")]
    switch: String,
}

fn rule_row(s: &Arc<RuleSwitch>, color: bool) -> RuleRow {
    let r = &s.rule;
    let mut switch = output::switch_label(s.is_on, color);
    if s.pending {
        switch.push_str(" (pending)");
    }
    RuleRow {
        id: r.id.to_string(),
        rule_type: r.rule_type.clone(),
        target: r.target.clone(),
        action: r.action.clone().unwrap_or_default(),
        scope: scope_label(&r.scope),
        switch,
    }
}

fn scope_label(scope: &RuleScope) -> String {
    match scope {
        RuleScope::Box => "box".into(),
        RuleScope::Device(id) => format!("device {id}"),
        RuleScope::Group(id) => format!("group {id}"),
        RuleScope::Other(kind) => kind.clone(),
    }
}

/// Human-readable byte count, binary units.
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut unit = 0;
    let mut whole = bytes;
    let mut rem = 0;
    while whole >= 1024 && unit < UNITS.len() - 1 {
        rem = whole % 1024;
        whole /= 1024;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{whole}.{} {}", rem * 10 / 1024, UNITS[unit])
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    config: &SyncConfig,
    args: &StatusArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    let view = args.view;

    let rendered = Integration::oneshot(config, |integration| async move {
        Ok(match view {
            StatusView::Box => Rendered::Box(summarize(&integration)?),
            StatusView::Devices => Rendered::Devices(integration.devices_snapshot()),
            StatusView::Rules => Rendered::Rules(integration.rule_switches_snapshot()),
        })
    })
    .await?;

    let out = match rendered {
        Rendered::Box(summary) => output::render_single(
            &global.output,
            &summary,
            |s| box_detail(s, color),
            |s| s.gid.clone(),
        )?,
        Rendered::Devices(devices) => output::render_list(
            &global.output,
            devices.as_slice(),
            |d| device_row(d, color),
            |d| d.device.id.to_string(),
        )?,
        Rendered::Rules(rules) => output::render_list(
            &global.output,
            rules.as_slice(),
            |r| rule_row(r, color),
            |r| r.rule.id.to_string(),
        )?,
    };
    output::print_output(&out, global.quiet);
    Ok(())
}

enum Rendered {
    Box(BoxSummary),
    Devices(Arc<Vec<Arc<DeviceEntity>>>),
    Rules(Arc<Vec<Arc<RuleSwitch>>>),
}
