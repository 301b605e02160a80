//! Snapshot life-cycle against `zfs/snapshot`.
//!
//! Creation is idempotent because the CSI driver retries freely. On SCALE
//! a hold is placed on every user-initiated snapshot so the appliance
//! cannot destroy it behind the CSP's back; snapshots taken only to back a
//! clone (the `snap-for-clone-` prefix) stay unheld. Deletion waits for
//! clones to drop and degrades to a logical delete when they never do.

use serde_json::json;
use tracing::{info, instrument, warn};

use super::error::{Result, ZfsError};
use super::properties::SnapshotEntry;
use crate::api::types::Snapshot;
use crate::backend::{Backend, Filter, uri_id};
use crate::config::{CLONE_FROM_PVC_PREFIX, CspConfig};
use crate::ident;

/// What a delete call actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The snapshot is gone from the appliance.
    Deleted,
    /// Clones never dropped; the snapshot disappears from the CSP's view
    /// but stays on the appliance until its last clone is destroyed.
    DeferredClones,
}

pub struct SnapshotManager<'a> {
    backend: &'a Backend,
    config: &'a CspConfig,
}

impl<'a> SnapshotManager<'a> {
    pub fn new(backend: &'a Backend, config: &'a CspConfig) -> Self {
        Self { backend, config }
    }

    /// Snapshot by its full `dataset@name` form.
    pub async fn find_by_full_name(&self, full_name: &str) -> Result<Option<SnapshotEntry>> {
        Ok(self
            .backend
            .find_one("zfs/snapshot", Filter::eq("name", full_name))
            .await?)
    }

    /// Snapshot for a CSP snapshot id.
    pub async fn find_by_id(&self, snapshot_id: &str) -> Result<Option<SnapshotEntry>> {
        Ok(self
            .backend
            .find_one("zfs/snapshot", Filter::eq("id", ident::id_to_dataset(snapshot_id)))
            .await?)
    }

    /// Snapshot by its bare name, wherever it lives.
    pub async fn find_by_snapshot_name(&self, name: &str) -> Result<Option<SnapshotEntry>> {
        Ok(self
            .backend
            .find_one(
                "zfs/snapshot",
                Filter::eq("snapshot_name", ident::id_to_dataset(name)),
            )
            .await?)
    }

    /// Snapshots of one volume. On SCALE only held snapshots are reported,
    /// which hides the clone-auxiliary ones; CORE and legacy have no holds
    /// and report everything.
    pub async fn list_for_volume(&self, volume_id: &str) -> Result<Vec<SnapshotEntry>> {
        let dataset = ident::id_to_dataset(volume_id);
        let snapshots: Vec<SnapshotEntry> = self
            .backend
            .find_all(
                "zfs/snapshot",
                Some(Filter::eq("dataset", dataset)),
                Some(json!({"holds": true})),
            )
            .await?;

        if self.backend.system_version().await?.is_scale() {
            Ok(snapshots.into_iter().filter(SnapshotEntry::is_held).collect())
        } else {
            Ok(snapshots)
        }
    }

    /// Create `dataset@name`, returning the existing snapshot when it is
    /// already there. On SCALE a hold is placed unless the name marks a
    /// clone-backing snapshot.
    #[instrument(skip(self), fields(volume = %volume_id, snapshot = %name))]
    pub async fn create(&self, volume_id: &str, name: &str) -> Result<SnapshotEntry> {
        let dataset = ident::id_to_dataset(volume_id);
        let full_name = format!("{dataset}@{name}");

        if let Some(existing) = self.find_by_full_name(&full_name).await? {
            info!("snapshot already exists");
            return Ok(existing);
        }

        let body = json!({"name": name, "dataset": dataset});
        let reply = self.backend.post("zfs/snapshot", &body).await?;
        if !reply.ok() {
            return Err(ZfsError::Api(reply.text().to_string()));
        }

        // The creation reply lacks properties, so read the snapshot back.
        let entry = self
            .find_by_full_name(&full_name)
            .await?
            .ok_or_else(|| ZfsError::Malformed("created snapshot did not materialize".to_string()))?;

        if self.backend.system_version().await?.is_scale()
            && !name.starts_with(CLONE_FROM_PVC_PREFIX)
        {
            let reply = self
                .backend
                .post("zfs/snapshot/hold", &json!({"id": entry.id}))
                .await?;
            if !reply.ok() {
                warn!(snapshot = %entry.id, "placing snapshot hold failed: {}", reply.text());
            }
        }

        info!("snapshot created");
        Ok(entry)
    }

    /// Delete a snapshot. Waits out `numclones` before destroying; if the
    /// clones never drop the snapshot is only logically deleted. On SCALE
    /// the hold is released first (release is idempotent).
    #[instrument(skip(self), fields(snapshot = %snapshot_id))]
    pub async fn delete(&self, snapshot_id: &str) -> Result<DeleteOutcome> {
        let mut entry = self
            .find_by_id(snapshot_id)
            .await?
            .ok_or_else(|| ZfsError::NotFound(snapshot_id.to_string()))?;

        if entry.numclones() > 0 {
            let mut remaining = self.config.retry.attempts;
            while entry.numclones() > 0 {
                if remaining == 0 {
                    info!("snapshot still has clones, deferring deletion");
                    return Ok(DeleteOutcome::DeferredClones);
                }
                remaining -= 1;
                info!("snapshot has clones, waiting");
                self.config.retry.wait().await;
                if let Some(refreshed) = self.find_by_id(snapshot_id).await? {
                    entry = refreshed;
                } else {
                    return Ok(DeleteOutcome::Deleted);
                }
            }
        }

        if self.backend.system_version().await?.is_scale() {
            let reply = self
                .backend
                .post("zfs/snapshot/release", &json!({"id": entry.id}))
                .await?;
            if !reply.ok() {
                warn!(snapshot = %entry.id, "releasing snapshot hold failed: {}", reply.text());
            }
        }

        let uri = uri_id("zfs/snapshot", &entry.id);
        self.backend.delete(&uri, None).await?;

        let mut remaining = self.config.retry.attempts;
        while remaining > 0 && self.find_by_id(snapshot_id).await?.is_some() {
            remaining -= 1;
            self.config.retry.wait().await;
            self.backend.delete(&uri, None).await?;
            info!("snapshot deletion retried");
        }

        info!("snapshot deleted");
        Ok(DeleteOutcome::Deleted)
    }

    /// Shape a snapshot into the CSP snapshot entity.
    pub fn to_snapshot(&self, entry: &SnapshotEntry) -> Snapshot {
        Snapshot {
            id: ident::dataset_to_id(&entry.id),
            name: entry.snapshot_name.clone(),
            description: format!("Snapshot of {}", ident::leaf_name(&entry.dataset)),
            volume_id: ident::dataset_to_id(&entry.dataset),
            volume_name: ident::leaf_name(&entry.dataset).to_string(),
            creation_time: entry.properties.creation.raw_u64().unwrap_or(0) as i64,
            ready_to_use: true,
            config: serde_json::Map::new(),
        }
    }
}
