// Wire types for the Firewalla MSP API (v2)
//
// Fields follow the API's camelCase JSON. Everything beyond the identifier
// is optional because the MSP API omits fields freely between firmware
// versions; unknown fields land in `extra`.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One Firewalla box from `GET /v2/boxes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxInfo {
    pub gid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default, rename = "publicIP")]
    pub public_ip: Option<String>,
    /// Free-form: a city string on some firmware, an object on others.
    #[serde(default)]
    pub location: Option<Value>,
    #[serde(default)]
    pub device_count: Option<u64>,
    #[serde(default)]
    pub rule_count: Option<u64>,
    #[serde(default)]
    pub alarm_count: Option<u64>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// `{ id, name }` reference to a network or device group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// One client device from `GET /v2/devices`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDevice {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub gid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub total_download: u64,
    #[serde(default)]
    pub total_upload: u64,
    #[serde(default)]
    pub mac_vendor: Option<String>,
    #[serde(default)]
    pub network: Option<NamedRef>,
    #[serde(default)]
    pub group: Option<NamedRef>,
    /// Epoch seconds, fractional.
    #[serde(default)]
    pub last_seen: Option<f64>,
    #[serde(default)]
    pub ip_reserved: Option<bool>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// Rule target: structured `{type, value}` on current firmware, a bare
/// string on older boxes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleTargetRecord {
    Structured {
        #[serde(rename = "type", default)]
        kind: Option<String>,
        #[serde(default)]
        value: Option<String>,
    },
    Plain(String),
}

/// Rule scope `{type: "device" | "group" | ..., value}`. Absent means box-wide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleScopeRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: Option<String>,
}

/// One rule from `GET /v2/rules`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub gid: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub target: Option<RuleTargetRecord>,
    #[serde(default)]
    pub scope: Option<RuleScopeRecord>,
    #[serde(default)]
    pub action: Option<String>,
    /// `"active"` or `"paused"` when present.
    #[serde(default)]
    pub status: Option<String>,
    /// Older payloads only carry this flag.
    #[serde(default)]
    pub paused: Option<bool>,
    #[serde(default)]
    pub disabled: bool,
    /// Epoch seconds, fractional.
    #[serde(default, alias = "ts")]
    pub created_at: Option<f64>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl RuleRecord {
    /// Whether the remote reports this rule paused. `status` wins over `paused`.
    pub fn is_paused(&self) -> bool {
        match self.status.as_deref() {
            Some(s) => s.eq_ignore_ascii_case("paused"),
            None => self.paused.unwrap_or(false),
        }
    }
}

/// One alarm from `GET /v2/alarms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmRecord {
    #[serde(alias = "id", deserialize_with = "string_or_number")]
    pub aid: String,
    #[serde(default)]
    pub gid: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "opt_string_or_number")]
    pub kind: Option<String>,
    /// Epoch seconds, fractional.
    #[serde(default)]
    pub ts: Option<f64>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub severity: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

// ── Lenient scalars ─────────────────────────────────────────────────

/// The MSP API sends some identifiers as numbers (alarm ids, rule ids on
/// older firmware).
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn box_info_parses_msp_shape() {
        let info: BoxInfo = serde_json::from_value(json!({
            "gid": "g-1",
            "name": "Home",
            "model": "gold",
            "version": "1.979",
            "mode": "router",
            "online": true,
            "publicIP": "203.0.113.7",
            "deviceCount": 12,
            "ruleCount": 4,
            "alarmCount": 1,
            "syncedAt": 123
        }))
        .unwrap();

        assert_eq!(info.public_ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(info.device_count, Some(12));
        assert!(info.extra.contains_key("syncedAt"));
    }

    #[test]
    fn device_defaults_missing_counters() {
        let dev: NetworkDevice = serde_json::from_value(json!({
            "id": "AA:BB:CC:DD:EE:FF",
            "network": { "id": 3, "name": "LAN" },
            "group": { "name": "Kids" }
        }))
        .unwrap();

        assert_eq!(dev.total_download, 0);
        assert!(!dev.online);
        assert_eq!(dev.network.unwrap().id.as_deref(), Some("3"));
        assert_eq!(dev.group.unwrap().name.as_deref(), Some("Kids"));
    }

    #[test]
    fn rule_target_accepts_both_shapes() {
        let structured: RuleRecord = serde_json::from_value(json!({
            "id": "r1",
            "target": { "type": "domain", "value": "example.com" },
            "status": "paused"
        }))
        .unwrap();
        assert_eq!(
            structured.target,
            Some(RuleTargetRecord::Structured {
                kind: Some("domain".into()),
                value: Some("example.com".into()),
            })
        );
        assert!(structured.is_paused());

        let plain: RuleRecord = serde_json::from_value(json!({
            "id": 42,
            "target": "youtube",
            "paused": true
        }))
        .unwrap();
        assert_eq!(plain.id, "42");
        assert_eq!(plain.target, Some(RuleTargetRecord::Plain("youtube".into())));
        assert!(plain.is_paused());
    }

    #[test]
    fn rule_status_overrides_paused_flag() {
        let rule: RuleRecord = serde_json::from_value(json!({
            "id": "r1",
            "status": "active",
            "paused": true
        }))
        .unwrap();
        assert!(!rule.is_paused());
    }

    #[test]
    fn alarm_accepts_numeric_fields() {
        let alarm: AlarmRecord = serde_json::from_value(json!({
            "aid": 1001,
            "type": 5,
            "ts": 1_700_000_000.5,
            "severity": "high"
        }))
        .unwrap();
        assert_eq!(alarm.aid, "1001");
        assert_eq!(alarm.kind.as_deref(), Some("5"));
    }

    #[test]
    fn rule_without_id_is_rejected() {
        let err = serde_json::from_value::<RuleRecord>(json!({ "type": "block" }));
        assert!(err.is_err());
    }
}
