//! Wire types for the appliance dataset and snapshot resources.
//!
//! ZFS properties arrive as `{"value": ..., "rawvalue": ...}` objects where
//! `value` is the human form ("1G", "LZ4") and `rawvalue` the exact one.
//! Only the fields the adapter reads are modeled; the appliance sends many
//! more.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One ZFS property as reported by the appliance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZfsProperty {
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub rawvalue: Option<String>,
}

impl ZfsProperty {
    /// The human-form value as text, when it is a string.
    pub fn text(&self) -> Option<&str> {
        self.value.as_ref().and_then(Value::as_str)
    }

    /// The raw value as an integer.
    pub fn raw_u64(&self) -> Option<u64> {
        self.rawvalue.as_ref().and_then(|raw| raw.parse().ok())
    }

    /// The value as an integer, accepting both number and string forms.
    pub fn as_u64(&self) -> Option<u64> {
        match self.value.as_ref()? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// A zvol-backed dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetEntry {
    /// Dataset path; doubles as the resource id.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub volsize: ZfsProperty,
    #[serde(default)]
    pub comments: Option<ZfsProperty>,
    #[serde(default)]
    pub compression: ZfsProperty,
    #[serde(default)]
    pub deduplication: ZfsProperty,
    #[serde(default)]
    pub sync: ZfsProperty,
    #[serde(default)]
    pub volblocksize: ZfsProperty,
    #[serde(default)]
    pub origin: ZfsProperty,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotProperties {
    #[serde(default)]
    pub creation: ZfsProperty,
    #[serde(default)]
    pub numclones: ZfsProperty,
}

/// A ZFS snapshot (`dataset@name`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// `dataset@name`; doubles as the resource id.
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub dataset: String,
    pub snapshot_name: String,
    #[serde(default)]
    pub properties: SnapshotProperties,
    /// Hold tags, present when queried with the `holds` extra.
    #[serde(default)]
    pub holds: serde_json::Map<String, Value>,
}

impl SnapshotEntry {
    pub fn numclones(&self) -> u64 {
        self.properties.numclones.as_u64().unwrap_or(0)
    }

    pub fn is_held(&self) -> bool {
        !self.holds.is_empty()
    }
}
