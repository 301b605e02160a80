//! Volume life-cycle against `pool/dataset`.
//!
//! Volumes are zvols under `<root>/<name>`. The appliance is the only
//! source of truth: every operation re-reads the state it needs, and
//! deletion polls until the dataset is actually gone because the appliance
//! acknowledges destroys that are still queued.

use regex::Regex;
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use super::error::{Result, ZfsError};
use super::properties::{DatasetEntry, SnapshotEntry, ZfsProperty};
use crate::api::types::{CreateVolumeRequest, UpdateVolumeRequest, Volume, VolumeConfig};
use crate::backend::{Backend, Filter, uri_id};
use crate::config::CspConfig;
use crate::ident;
use crate::iscsi::types::Initiator;

/// Keys a volume mutation may carry, besides the top-level size and
/// description fields.
const DATASET_MUTABLES: [&str; 6] = [
    "size",
    "description",
    "deduplication",
    "compression",
    "sync",
    "volblocksize",
];

pub struct DatasetManager<'a> {
    backend: &'a Backend,
    config: &'a CspConfig,
}

impl<'a> DatasetManager<'a> {
    pub fn new(backend: &'a Backend, config: &'a CspConfig) -> Self {
        Self { backend, config }
    }

    /// Dataset for a CSP volume id.
    pub async fn find_by_id(&self, volume_id: &str) -> Result<Option<DatasetEntry>> {
        self.dataset_by_path(&ident::id_to_dataset(volume_id)).await
    }

    /// Dataset by its full path.
    pub async fn dataset_by_path(&self, dataset: &str) -> Result<Option<DatasetEntry>> {
        Ok(self
            .backend
            .find_one("pool/dataset", Filter::eq("name", dataset))
            .await?)
    }

    /// Dataset whose leaf name matches, wherever it lives under a pool.
    pub async fn find_by_leaf_name(&self, name: &str) -> Result<Option<DatasetEntry>> {
        let pattern = Regex::new(&format!(".*/{}$", regex::escape(name)))
            .map_err(|_| ZfsError::InvalidConfig(format!("volume name '{name}' is not searchable")))?;
        Ok(self
            .backend
            .find_one_matching("pool/dataset", "name", &pattern)
            .await?)
    }

    /// Create a fresh zvol from the request, filling unset config keys from
    /// the provisioning defaults.
    #[instrument(skip(self, req), fields(volume = %req.name))]
    pub async fn create(&self, req: &CreateVolumeRequest) -> Result<DatasetEntry> {
        let defaults = &self.config.dataset_defaults;
        let name = format!(
            "{}/{}",
            req.cfg_str("root").unwrap_or(&defaults.root),
            req.name
        );

        let sparse_raw = req.cfg_str("sparse").unwrap_or(&defaults.sparse);
        let sparse = match sparse_raw.to_ascii_lowercase().as_str() {
            "true" => true,
            "false" => false,
            other => {
                return Err(ZfsError::InvalidConfig(format!(
                    "sparse must be \"true\" or \"false\", got \"{other}\""
                )));
            }
        };

        let description = render_description(
            req.description.as_deref().unwrap_or(&defaults.description),
            req,
        );

        let body = json!({
            "type": "VOLUME",
            "comments": description,
            "name": name,
            "volsize": req.size,
            "volblocksize": req.cfg_str("volblocksize").unwrap_or(&defaults.volblocksize),
            "sparse": sparse,
            "deduplication": req.cfg_str("deduplication").unwrap_or(&defaults.deduplication),
            "sync": req.cfg_str("sync").unwrap_or(&defaults.sync),
            "compression": req.cfg_str("compression").unwrap_or(&defaults.compression),
        });

        let reply = self.backend.post("pool/dataset", &body).await?;
        if !reply.ok() {
            return Err(ZfsError::Api(reply.text().to_string()));
        }

        info!(dataset = %name, "volume created");
        Ok(reply.decode()?)
    }

    /// Create a volume by cloning an existing snapshot.
    #[instrument(skip(self, req), fields(volume = %req.name))]
    pub async fn create_clone(&self, req: &CreateVolumeRequest) -> Result<DatasetEntry> {
        let base = req
            .base_snapshot_id
            .as_deref()
            .ok_or_else(|| ZfsError::InvalidConfig("clone requires base_snapshot_id".to_string()))?;

        let defaults = &self.config.dataset_defaults;
        let destination = format!(
            "{}/{}",
            req.cfg_str("root").unwrap_or(&defaults.root),
            req.name
        );

        let body = json!({
            "snapshot": ident::id_to_dataset(base),
            "dataset_dst": destination,
        });

        let reply = self.backend.post("zfs/snapshot/clone", &body).await?;
        if !reply.ok() {
            return Err(ZfsError::Api(reply.text().to_string()));
        }

        info!(dataset = %destination, snapshot = %base, "volume cloned");
        self.dataset_by_path(&destination)
            .await?
            .ok_or_else(|| ZfsError::Malformed("cloned dataset did not materialize".to_string()))
    }

    /// Apply a mutation through a single dataset PUT. Unknown config keys
    /// are rejected before anything is sent.
    #[instrument(skip(self, entry, req), fields(dataset = %entry.id))]
    pub async fn update(
        &self,
        entry: &DatasetEntry,
        req: &UpdateVolumeRequest,
    ) -> Result<DatasetEntry> {
        let body = update_body(req)?;

        let reply = self
            .backend
            .put(&uri_id("pool/dataset", &entry.id), &body)
            .await?;
        if !reply.ok() {
            return Err(ZfsError::Api(reply.text().to_string()));
        }

        info!(dataset = %entry.id, "volume updated");
        self.dataset_by_path(&entry.id)
            .await?
            .ok_or_else(|| ZfsError::NotFound(ident::dataset_to_id(&entry.id)))
    }

    /// A volume is published while an initiator group named after its leaf
    /// exists with a non-empty IQN list.
    pub async fn is_published(&self, dataset: &str) -> Result<bool> {
        let leaf = ident::leaf_name(dataset);
        let initiator: Option<Initiator> = self
            .backend
            .find_one("iscsi/initiator", Filter::eq("comment", leaf))
            .await?;
        Ok(initiator.is_some_and(|i| !i.initiators.is_empty()))
    }

    /// A dataset is busy while another dataset originates from one of its
    /// snapshots, or one of its snapshots is held or still has clones.
    #[instrument(skip(self, entry), fields(dataset = %entry.id))]
    pub async fn is_busy(&self, entry: &DatasetEntry) -> Result<bool> {
        let origin_prefix = format!("{}@", entry.id);

        let dependents: Vec<DatasetEntry> = self
            .backend
            .find_all(
                "pool/dataset",
                Some(Filter::starts_with("origin.value", origin_prefix.clone())),
                None,
            )
            .await?;
        if !dependents.is_empty() {
            debug!("dataset has clone dependents");
            return Ok(true);
        }

        let snapshots: Vec<SnapshotEntry> = self
            .backend
            .find_all(
                "zfs/snapshot",
                Some(Filter::starts_with("name", origin_prefix)),
                Some(json!({"holds": true})),
            )
            .await?;
        for snapshot in &snapshots {
            if snapshot.is_held() || snapshot.numclones() > 0 {
                debug!(snapshot = %snapshot.id, "snapshot is busy");
                return Ok(true);
            }
        }

        debug!("dataset clear for removal");
        Ok(false)
    }

    /// Delete the dataset after the published and busy guards, then poll
    /// until a lookup comes back empty, re-issuing the DELETE each round.
    #[instrument(skip(self, entry), fields(dataset = %entry.id))]
    pub async fn delete(&self, entry: &DatasetEntry) -> Result<()> {
        if self.is_published(&entry.id).await? {
            return Err(ZfsError::Published);
        }
        if self.is_busy(entry).await? {
            return Err(ZfsError::Busy(entry.id.clone()));
        }

        let uri = uri_id("pool/dataset", &entry.id);
        let body = json!({"recursive": true, "force": true});
        self.backend.delete(&uri, Some(&body)).await?;

        let mut remaining = self.config.retry.attempts;
        while remaining > 0 && self.dataset_by_path(&entry.id).await?.is_some() {
            remaining -= 1;
            self.config.retry.wait().await;
            self.backend.delete(&uri, Some(&body)).await?;
            info!("dataset deletion retried");
        }

        info!("volume deleted");
        Ok(())
    }

    /// Shape a dataset into the CSP volume entity.
    pub async fn to_volume(&self, entry: &DatasetEntry) -> Result<Volume> {
        let size = entry
            .volsize
            .raw_u64()
            .ok_or_else(|| ZfsError::Malformed(format!("dataset {} has no volsize", entry.id)))?;

        Ok(Volume {
            id: ident::dataset_to_id(&entry.id),
            name: ident::leaf_name(&entry.id).to_string(),
            size,
            description: entry
                .comments
                .as_ref()
                .and_then(ZfsProperty::text)
                .unwrap_or_default()
                .to_string(),
            base_snapshot_id: ident::dataset_to_id(entry.origin.text().unwrap_or_default()),
            volume_group_id: String::new(),
            published: self.is_published(&entry.id).await?,
            config: VolumeConfig {
                compression: entry.compression.text().unwrap_or_default().to_string(),
                deduplication: entry.deduplication.text().unwrap_or_default().to_string(),
                sync: entry.sync.text().unwrap_or_default().to_string(),
                volblocksize: entry.volblocksize.text().unwrap_or_default().to_string(),
                target_scope: "volume".to_string(),
            },
        })
    }
}

/// Render the description template with the PVC annotations the CSI driver
/// passes through the volume config.
fn render_description(template: &str, req: &CreateVolumeRequest) -> String {
    template
        .replace(
            "{pv}",
            req.cfg_str("csi.storage.k8s.io/pv/name").unwrap_or("pv"),
        )
        .replace(
            "{pvc}",
            req.cfg_str("csi.storage.k8s.io/pvc/name").unwrap_or("pvc"),
        )
        .replace(
            "{namespace}",
            req.cfg_str("csi.storage.k8s.io/pvc/namespace")
                .unwrap_or("namespace"),
        )
}

/// Translate a mutation request into the dataset PUT body.
fn update_body(req: &UpdateVolumeRequest) -> Result<Value> {
    let mut body = serde_json::Map::new();

    if let Some(size) = req.size {
        body.insert("volsize".to_string(), json!(size));
    }
    if let Some(description) = &req.description {
        body.insert("comments".to_string(), json!(description));
    }

    if let Some(config) = &req.config {
        for (key, value) in config {
            if !DATASET_MUTABLES.contains(&key.as_str()) {
                return Err(ZfsError::UnknownKey(key.clone()));
            }
            match key.as_str() {
                "size" => {
                    let size = value
                        .as_u64()
                        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
                        .ok_or_else(|| {
                            ZfsError::InvalidConfig(format!("size must be a byte count, got {value}"))
                        })?;
                    body.insert("volsize".to_string(), json!(size));
                }
                "description" => {
                    body.insert("comments".to_string(), value.clone());
                }
                _ => {
                    body.insert(key.clone(), value.clone());
                }
            }
        }
    }

    Ok(Value::Object(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn create_request(config: Value) -> CreateVolumeRequest {
        CreateVolumeRequest {
            name: "pvc-1".to_string(),
            size: 1_073_741_824,
            description: None,
            clone: false,
            base_snapshot_id: None,
            config: config.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_render_description_with_annotations() {
        let req = create_request(json!({
            "csi.storage.k8s.io/pv/name": "pv-123",
            "csi.storage.k8s.io/pvc/name": "data",
            "csi.storage.k8s.io/pvc/namespace": "prod",
        }));
        let rendered = render_description("{pv} in {namespace} from {pvc}", &req);
        assert_eq!(rendered, "pv-123 in prod from data");
    }

    #[test]
    fn test_render_description_fallbacks() {
        let req = create_request(json!({}));
        let rendered = render_description("{pv}/{pvc}/{namespace}", &req);
        assert_eq!(rendered, "pv/pvc/namespace");
    }

    #[test]
    fn test_update_body_maps_fields() {
        let req = UpdateVolumeRequest {
            size: Some(2_147_483_648),
            description: Some("resized".to_string()),
            config: None,
        };
        let body = update_body(&req).unwrap();
        assert_eq!(body["volsize"], json!(2_147_483_648u64));
        assert_eq!(body["comments"], json!("resized"));
    }

    #[test]
    fn test_update_body_config_passthrough() {
        let mut config = Map::new();
        config.insert("compression".to_string(), json!("ZSTD"));
        config.insert("sync".to_string(), json!("ALWAYS"));
        let req = UpdateVolumeRequest {
            size: None,
            description: None,
            config: Some(config),
        };
        let body = update_body(&req).unwrap();
        assert_eq!(body["compression"], json!("ZSTD"));
        assert_eq!(body["sync"], json!("ALWAYS"));
    }

    #[test]
    fn test_update_body_rejects_unknown_key() {
        let mut config = Map::new();
        config.insert("volmode".to_string(), json!("dev"));
        let req = UpdateVolumeRequest {
            size: None,
            description: None,
            config: Some(config),
        };
        match update_body(&req) {
            Err(ZfsError::UnknownKey(key)) => assert_eq!(key, "volmode"),
            other => panic!("expected UnknownKey, got {other:?}"),
        }
    }

    #[test]
    fn test_update_body_config_size_forms() {
        let mut config = Map::new();
        config.insert("size".to_string(), json!("1073741824"));
        let req = UpdateVolumeRequest {
            size: None,
            description: None,
            config: Some(config),
        };
        let body = update_body(&req).unwrap();
        assert_eq!(body["volsize"], json!(1_073_741_824u64));
    }
}
