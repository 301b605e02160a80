//! CSP wire entities and request bodies.
//!
//! These are the JSON shapes the CSI driver sees. `volume_group_id` and
//! `target_scope` are stable placeholders (`""` and `"volume"`): the
//! appliance has no matching concept, and the driver only requires the
//! fields to be present and constant.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Volume properties echoed back to the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub compression: String,
    pub deduplication: String,
    pub sync: String,
    pub volblocksize: String,
    /// Stable placeholder.
    pub target_scope: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub description: String,
    pub base_snapshot_id: String,
    /// Stable placeholder.
    pub volume_group_id: String,
    pub published: bool,
    pub config: VolumeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVolumeRequest {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub clone: bool,
    #[serde(default)]
    pub base_snapshot_id: Option<String>,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl CreateVolumeRequest {
    pub fn cfg_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateVolumeRequest {
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub host_uuid: String,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl PublishRequest {
    pub fn cfg_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnpublishRequest {
    pub host_uuid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishResult {
    pub discovery_ips: Vec<String>,
    pub access_protocol: String,
    pub lun_id: u8,
    pub serial_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chap_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chap_password: Option<String>,
    pub target_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRequest {
    pub uuid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub iqns: Vec<String>,
    #[serde(default)]
    pub networks: Vec<String>,
    #[serde(default)]
    pub chap_user: Option<String>,
    #[serde(default)]
    pub chap_password: Option<String>,
    #[serde(default)]
    pub wwpns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: i64,
    pub name: String,
    pub uuid: String,
    pub iqns: Vec<String>,
    pub networks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chap_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chap_password: Option<String>,
    pub wwpns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub name: String,
    pub description: String,
    pub volume_id: String,
    pub volume_name: String,
    pub creation_time: i64,
    pub ready_to_use: bool,
    #[serde(default)]
    pub config: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSnapshotRequest {
    pub name: String,
    pub volume_id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: Map<String, Value>,
}

/// Reply to a Tokens POST. The CSP is stateless, so the "session" is just
/// the validated credentials echoed back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenReply {
    pub id: String,
    pub session_token: String,
    pub array_ip: String,
    #[serde(default)]
    pub username: Option<String>,
    pub creation_time: i64,
    pub expiry_time: i64,
}
