//! Wire types for the appliance iSCSI resources.
//!
//! Only the fields the adapter reads or writes are modeled. Ids are the
//! appliance's integer primary keys except for datasets and snapshots,
//! which live in `crate::zfs::properties`.

use serde::{Deserialize, Serialize};

/// An iSCSI target. On SCALE the target carries the CIDR-form
/// `auth_networks` restriction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub groups: Vec<TargetGroup>,
    #[serde(default)]
    pub auth_networks: Vec<String>,
}

/// A portal-group entry on a target, tying a portal to an initiator group
/// and optionally to a CHAP credential tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetGroup {
    pub portal: i64,
    #[serde(default)]
    pub initiator: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authmethod: Option<String>,
}

/// An extent exposing a zvol as a LUN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extent {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub naa: String,
    #[serde(default, rename = "type")]
    pub extent_type: Option<String>,
    #[serde(default)]
    pub disk: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl Extent {
    /// Serial number for the CSP publish response: the NAA without its
    /// `0x` prefix.
    pub fn serial_number(&self) -> &str {
        self.naa.strip_prefix("0x").unwrap_or(&self.naa)
    }
}

/// A target-extent mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetExtent {
    pub id: i64,
    pub target: i64,
    pub extent: i64,
    #[serde(default)]
    pub lunid: i64,
}

/// An initiator group. Host groups carry the host uuid in `comment`;
/// target groups carry the access name. On CORE/legacy `auth_network`
/// holds host-form addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Initiator {
    pub id: i64,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub initiators: Vec<String>,
    #[serde(default)]
    pub auth_network: Vec<String>,
}

/// One listen address of a portal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalListen {
    pub ip: String,
    #[serde(default)]
    pub port: Option<u16>,
}

/// An iSCSI portal, selected by its comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portal {
    pub id: i64,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub listen: Vec<PortalListen>,
}

impl Portal {
    pub fn listen_ips(&self) -> Vec<String> {
        self.listen.iter().map(|l| l.ip.clone()).collect()
    }
}

/// A CHAP credential record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapAuth {
    pub id: i64,
    pub tag: u32,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub secret: String,
}

/// The service-wide iSCSI configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IscsiGlobal {
    #[serde(default)]
    pub basename: String,
}
