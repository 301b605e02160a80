//! The publish/unpublish state machine.
//!
//! Publishing composes the target triple, merges the host's IQNs into the
//! volume's target initiator group and rewrites the target's portal
//! grouping. Unpublishing removes the host's IQNs and deletes the group
//! when the last publisher leaves. Every step starts with a fetch and
//! either creates-if-missing or updates-if-present, so an interrupted call
//! converges on the next attempt. Both operations hold the per-access-name
//! lock for their whole duration.

use std::collections::{BTreeSet, HashSet};

use serde_json::json;
use tracing::{info, instrument};

use super::error::{IscsiError, Result};
use super::initiator::InitiatorManager;
use super::target::TargetComposer;
use super::types::{Target, TargetExtent, TargetGroup};
use crate::api::types::{PublishRequest, PublishResult, UnpublishRequest};
use crate::backend::{Backend, Filter, uri_id};
use crate::config::CspConfig;
use crate::ident;
use crate::locks::LockTable;
use crate::net;
use crate::zfs::DatasetEntry;

pub struct PublishCoordinator<'a> {
    backend: &'a Backend,
    config: &'a CspConfig,
    locks: &'a LockTable,
}

impl<'a> PublishCoordinator<'a> {
    pub fn new(backend: &'a Backend, config: &'a CspConfig, locks: &'a LockTable) -> Self {
        Self {
            backend,
            config,
            locks,
        }
    }

    /// Attach a host to a volume.
    #[instrument(skip(self, dataset, req), fields(dataset = %dataset.id, host = %req.host_uuid))]
    pub async fn publish(
        &self,
        dataset: &DatasetEntry,
        req: &PublishRequest,
    ) -> Result<PublishResult> {
        let access_name = ident::leaf_name(&dataset.id).to_string();
        let _serialized = self.locks.acquire(&access_name).await;

        let composer = TargetComposer::new(self.backend, self.config);
        let global = composer.validate_global().await?;
        let portal = composer.discovery_portal().await?;
        let discovery_ips = portal.listen_ips();

        let triple = match composer.lookup_triple(&access_name).await? {
            Some(existing) => existing,
            None => {
                composer
                    .create_triple(dataset, req.cfg_str("auth_networks"))
                    .await?
            }
        };

        let initiators = InitiatorManager::new(self.backend, self.config);
        let host = initiators
            .find_by_comment(&req.host_uuid)
            .await?
            .ok_or_else(|| IscsiError::HostNotFound(req.host_uuid.clone()))?;
        let group = initiators.ensure_group(&access_name).await?;

        // The target group's IQN set is the union of everything publishing
        // this volume; sets keep repeated publishes idempotent.
        let mut merged: BTreeSet<String> = group.initiators.iter().cloned().collect();
        merged.extend(host.initiators.iter().cloned());

        let auth_network = if self.backend.system_version().await?.host_form_networks() {
            let mut networks: BTreeSet<String> =
                net::cidrs_to_hosts(&host.auth_network)?.into_iter().collect();
            networks.extend(group.auth_network.iter().cloned());
            Some(networks.into_iter().collect())
        } else {
            None
        };

        let group = initiators
            .update_members(&group, merged.into_iter().collect(), auth_network)
            .await?;

        let auth = initiators.chap_auth().await?;
        let portal_group = TargetGroup {
            portal: portal.id,
            initiator: Some(group.id),
            auth: auth.as_ref().map(|_| self.config.chap_tag),
            authmethod: auth.as_ref().map(|_| "CHAP".to_string()),
        };

        let body = json!({"name": access_name, "groups": [portal_group]});
        let reply = self
            .backend
            .put(&uri_id("iscsi/target", &triple.target.id.to_string()), &body)
            .await?;
        if !reply.ok() {
            return Err(IscsiError::Api(reply.text().to_string()));
        }

        info!("volume published");
        Ok(PublishResult {
            discovery_ips,
            access_protocol: "iscsi".to_string(),
            lun_id: 0,
            serial_number: triple.extent.serial_number().to_string(),
            chap_user: auth.as_ref().map(|a| a.user.clone()),
            chap_password: auth.as_ref().map(|a| a.secret.clone()),
            target_names: vec![format!("{}:{}", global.basename, access_name)],
        })
    }

    /// Detach a host from a volume. Detaching a host that is not
    /// publishing is a no-op.
    #[instrument(skip(self, req), fields(volume = %volume_id, host = %req.host_uuid))]
    pub async fn unpublish(&self, volume_id: &str, req: &UnpublishRequest) -> Result<()> {
        let dataset_id = ident::id_to_dataset(volume_id);
        let access_name = ident::leaf_name(&dataset_id).to_string();
        let _serialized = self.locks.acquire(&access_name).await;

        let initiators = InitiatorManager::new(self.backend, self.config);

        let target: Option<Target> = self
            .backend
            .find_one("iscsi/target", Filter::eq("name", access_name.clone()))
            .await?;
        let host = initiators.find_by_comment(&req.host_uuid).await?;
        let Some(group) = initiators.find_by_comment(&access_name).await? else {
            info!("volume not published, nothing to unpublish");
            return Ok(());
        };

        let host_iqns: HashSet<String> = host
            .map(|h| h.initiators.into_iter().collect())
            .unwrap_or_default();
        let preserved: Vec<String> = group
            .initiators
            .iter()
            .filter(|iqn| !host_iqns.contains(*iqn))
            .cloned()
            .collect();

        if !preserved.is_empty() {
            initiators.update_members(&group, preserved, None).await?;
            info!("host detached, other publishers remain");
            return Ok(());
        }

        initiators.delete(group.id).await?;

        // Legacy FreeNAS leaves the target machinery behind when its
        // initiator group goes away; remove the whole triple there.
        if self.backend.system_version().await?.is_legacy() {
            let composer = TargetComposer::new(self.backend, self.config);
            if let Some(target) = target {
                composer.delete_target(&target).await?;

                let mapping: Option<TargetExtent> = self
                    .backend
                    .find_one("iscsi/targetextent", Filter::eq("target", target.id))
                    .await?;
                if let Some(mapping) = mapping {
                    composer.delete_targetextent(&mapping).await?;
                }

                let extent = self
                    .backend
                    .find_one("iscsi/extent", Filter::eq("name", access_name.clone()))
                    .await?;
                if let Some(extent) = extent {
                    composer.delete_extent(&extent).await?;
                }
            }
        }

        info!("volume unpublished");
        Ok(())
    }
}
