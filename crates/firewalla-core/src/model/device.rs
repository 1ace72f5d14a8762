// ── Device domain type ──

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity_id::EntityId;

/// A client device seen by the box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Usually the MAC address.
    pub id: EntityId,
    pub box_gid: Option<EntityId>,
    pub name: String,
    pub ip: Option<IpAddr>,
    pub online: bool,
    pub download_bytes: u64,
    pub upload_bytes: u64,
    pub group_id: Option<EntityId>,
    pub group_name: Option<String>,
    pub network_name: Option<String>,
    pub mac_vendor: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub ip_reserved: bool,
}
