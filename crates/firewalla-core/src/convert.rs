// ── API-to-domain type conversions ──
//
// Bridges raw `firewalla_api` records into `firewalla_core::model` types.
// Each `From` impl normalizes names, parses strings into strong types,
// and fills defaults for missing optional data.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde_json::Value;

use firewalla_api::models::{
    AlarmRecord, BoxInfo, NetworkDevice, RuleRecord, RuleScopeRecord, RuleTargetRecord,
};

use crate::model::{
    Alarm, AlarmSeverity, BoxStatus, Device, EntityId, Rule, RuleScope, RuleStatus,
};

// ── Helpers ────────────────────────────────────────────────────────

/// Parse an optional string to an `IpAddr`, dropping unparseable values.
fn parse_ip(raw: Option<&str>) -> Option<IpAddr> {
    raw.and_then(|s| s.trim().parse().ok())
}

/// Fractional epoch seconds to `DateTime<Utc>`. Millisecond epochs (some
/// firmware) are detected by magnitude.
#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn epoch_to_datetime(epoch: Option<f64>) -> Option<DateTime<Utc>> {
    let secs = epoch.filter(|ts| ts.is_finite() && *ts > 0.0)?;
    let secs = if secs > 1e12 { secs / 1000.0 } else { secs };
    DateTime::from_timestamp_millis((secs * 1000.0) as i64)
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty())
}

// ── Box ────────────────────────────────────────────────────────────

impl From<BoxInfo> for BoxStatus {
    fn from(b: BoxInfo) -> Self {
        let name = non_empty(b.name).unwrap_or_else(|| "Firewalla".into());
        Self {
            gid: EntityId::from(b.gid),
            name,
            model: non_empty(b.model).unwrap_or_default(),
            firmware_version: non_empty(b.version),
            mode: non_empty(b.mode),
            online: b.online,
            license: non_empty(b.license),
            public_ip: non_empty(b.public_ip),
            location: b.location.as_ref().and_then(location_text),
            device_count: b.device_count,
            rule_count: b.rule_count,
            alarm_count: b.alarm_count,
        }
    }
}

/// Location is a plain string on some firmware, `{city, country, ...}` on others.
fn location_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Object(map) => {
            let parts: Vec<&str> = ["city", "region", "country"]
                .iter()
                .filter_map(|k| map.get(*k).and_then(Value::as_str))
                .filter(|s| !s.is_empty())
                .collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        _ => None,
    }
}

// ── Device ─────────────────────────────────────────────────────────

impl From<NetworkDevice> for Device {
    fn from(d: NetworkDevice) -> Self {
        let id = EntityId::from(d.id);
        let (group_id, group_name) = d
            .group
            .map(|g| (g.id.map(EntityId::from), non_empty(g.name)))
            .unwrap_or_default();
        Self {
            name: non_empty(d.name).unwrap_or_else(|| id.to_string()),
            box_gid: d.gid.map(EntityId::from),
            ip: parse_ip(d.ip.as_deref()),
            online: d.online,
            download_bytes: d.total_download,
            upload_bytes: d.total_upload,
            group_id,
            group_name,
            network_name: d.network.and_then(|n| non_empty(n.name)),
            mac_vendor: non_empty(d.mac_vendor),
            last_seen: epoch_to_datetime(d.last_seen),
            ip_reserved: d.ip_reserved.unwrap_or(false),
            id,
        }
    }
}

// ── Rule ───────────────────────────────────────────────────────────

fn target_text(target: Option<RuleTargetRecord>) -> String {
    match target {
        Some(RuleTargetRecord::Structured { kind, value }) => match (kind, value) {
            (Some(kind), Some(value)) => format!("{kind}: {value}"),
            (None, Some(value)) => value,
            (Some(kind), None) => kind,
            (None, None) => "unknown".into(),
        },
        Some(RuleTargetRecord::Plain(s)) if !s.is_empty() => s,
        _ => "unknown".into(),
    }
}

fn scope_from(scope: Option<RuleScopeRecord>) -> RuleScope {
    let Some(scope) = scope else {
        return RuleScope::Box;
    };
    let value = non_empty(scope.value);
    match (scope.kind.to_ascii_lowercase().as_str(), value) {
        ("device" | "mac", Some(v)) => RuleScope::Device(EntityId::from(v)),
        ("group" | "tag" | "devicegroup", Some(v)) => RuleScope::Group(EntityId::from(v)),
        ("box" | "global" | "", _) | (_, None) => RuleScope::Box,
        (other, Some(_)) => RuleScope::Other(other.to_owned()),
    }
}

impl From<RuleRecord> for Rule {
    fn from(r: RuleRecord) -> Self {
        let status = if r.is_paused() {
            RuleStatus::Paused
        } else {
            RuleStatus::Active
        };
        Self {
            id: EntityId::from(r.id),
            box_gid: r.gid.map(EntityId::from),
            rule_type: non_empty(r.kind).unwrap_or_else(|| "unknown".into()),
            target: target_text(r.target),
            action: non_empty(r.action),
            status,
            scope: scope_from(r.scope),
            disabled: r.disabled,
            created_at: epoch_to_datetime(r.created_at),
        }
    }
}

// ── Alarm ──────────────────────────────────────────────────────────

fn parse_severity(raw: Option<&str>) -> AlarmSeverity {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        Some("low" | "1") => AlarmSeverity::Low,
        Some("medium" | "2") => AlarmSeverity::Medium,
        Some("high" | "critical" | "3") => AlarmSeverity::High,
        _ => AlarmSeverity::Unknown,
    }
}

impl From<AlarmRecord> for Alarm {
    fn from(a: AlarmRecord) -> Self {
        Self {
            id: EntityId::from(a.aid),
            alarm_type: non_empty(a.kind).unwrap_or_else(|| "unknown".into()),
            timestamp: epoch_to_datetime(a.ts),
            severity: parse_severity(a.severity.as_deref()),
            message: non_empty(a.message),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn rule(value: Value) -> Rule {
        Rule::from(serde_json::from_value::<RuleRecord>(value).unwrap())
    }

    #[test]
    fn rule_target_and_scope_normalize() {
        let r = rule(json!({
            "id": "r1",
            "type": "internet",
            "target": { "type": "domain", "value": "example.com" },
            "scope": { "type": "device", "value": "AA:BB" },
            "status": "paused"
        }));
        assert_eq!(r.target, "domain: example.com");
        assert_eq!(r.scope, RuleScope::Device(EntityId::from("AA:BB")));
        assert_eq!(r.status, RuleStatus::Paused);

        let r = rule(json!({ "id": "r2", "target": "youtube" }));
        assert_eq!(r.target, "youtube");
        assert_eq!(r.scope, RuleScope::Box);
        assert_eq!(r.status, RuleStatus::Active);
        assert_eq!(r.rule_type, "unknown");
    }

    #[test]
    fn device_name_falls_back_to_id() {
        let dev = Device::from(
            serde_json::from_value::<NetworkDevice>(json!({
                "id": "AA:BB:CC:DD:EE:FF",
                "ip": "not-an-ip",
                "lastSeen": 1_700_000_000.25
            }))
            .unwrap(),
        );
        assert_eq!(dev.name, "AA:BB:CC:DD:EE:FF");
        assert!(dev.ip.is_none());
        assert_eq!(dev.last_seen.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn millisecond_epochs_are_detected() {
        let dt = epoch_to_datetime(Some(1_700_000_000_123.0)).unwrap();
        assert_eq!(dt.timestamp(), 1_700_000_000);
    }

    #[test]
    fn box_location_object_is_flattened() {
        let status = BoxStatus::from(
            serde_json::from_value::<BoxInfo>(json!({
                "gid": "g-1",
                "location": { "city": "Austin", "country": "US" }
            }))
            .unwrap(),
        );
        assert_eq!(status.location.as_deref(), Some("Austin, US"));
        assert_eq!(status.name, "Firewalla");
    }

    #[test]
    fn alarm_severity_maps_numbers_and_words() {
        assert_eq!(parse_severity(Some("HIGH")), AlarmSeverity::High);
        assert_eq!(parse_severity(Some("2")), AlarmSeverity::Medium);
        assert_eq!(parse_severity(None), AlarmSeverity::Unknown);
    }
}
