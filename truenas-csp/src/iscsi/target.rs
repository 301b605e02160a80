//! Target-triple composition.
//!
//! Every addressable volume owns exactly one target, one extent and one
//! target-extent mapping, all named by the access name (the dataset leaf).
//! The appliance settles these resources asynchronously, so creation polls
//! for the target id and deletion retries before falling back to a forced
//! delete, which is what actually starts the teardown while an initiator
//! is still connected.

use serde_json::json;
use tracing::{debug, info, instrument};

use super::error::{IscsiError, Result};
use super::types::{Extent, IscsiGlobal, Portal, Target, TargetExtent};
use crate::backend::{Backend, Filter, uri_id};
use crate::config::{ACCEPTED_BASENAMES, CspConfig, EXTENT_COMMENT, TARGET_PORTAL_COMMENT};
use crate::ident;
use crate::net::{self, InterfaceEntry};
use crate::zfs::DatasetEntry;

/// The three iSCSI resources backing one published volume.
#[derive(Debug, Clone)]
pub struct TargetTriple {
    pub target: Target,
    pub extent: Extent,
    pub targetextent: TargetExtent,
}

pub struct TargetComposer<'a> {
    backend: &'a Backend,
    config: &'a CspConfig,
}

impl<'a> TargetComposer<'a> {
    pub fn new(backend: &'a Backend, config: &'a CspConfig) -> Self {
        Self { backend, config }
    }

    /// The service-wide iSCSI config, with its basename checked against the
    /// accepted set.
    pub async fn validate_global(&self) -> Result<IscsiGlobal> {
        let mut globals: Vec<IscsiGlobal> = self.backend.find_all("iscsi/global", None, None).await?;
        if globals.is_empty() {
            return Err(IscsiError::Misconfigured(
                "unable to read the iSCSI service configuration".to_string(),
            ));
        }
        let global = globals.remove(0);

        if !ACCEPTED_BASENAMES.contains(&global.basename.as_str()) {
            return Err(IscsiError::Misconfigured(format!(
                "{} is not a valid basename, use {}",
                global.basename,
                ACCEPTED_BASENAMES.join(" or ")
            )));
        }

        Ok(global)
    }

    /// The discovery portal: exactly one portal carrying the managed
    /// comment, with at least one non-wildcard listen address.
    pub async fn discovery_portal(&self) -> Result<Portal> {
        let mut portals: Vec<Portal> = self
            .backend
            .find_all(
                "iscsi/portal",
                Some(Filter::eq("comment", TARGET_PORTAL_COMMENT)),
                None,
            )
            .await?;

        if portals.is_empty() {
            return Err(IscsiError::Unconfigured(format!(
                "No iSCSI portal with comment {TARGET_PORTAL_COMMENT} found"
            )));
        }
        if portals.len() > 1 {
            return Err(IscsiError::Misconfigured(format!(
                "{} iSCSI portals carry the comment {TARGET_PORTAL_COMMENT}, expected one",
                portals.len()
            )));
        }
        let portal = portals.remove(0);

        if portal.listen.is_empty() {
            return Err(IscsiError::Misconfigured(
                "the discovery portal has no listen addresses".to_string(),
            ));
        }
        for listen in &portal.listen {
            if listen.ip == "0.0.0.0" || listen.ip == "::" {
                return Err(IscsiError::Misconfigured(format!(
                    "Using {} as listening interface on the portal is not supported.",
                    listen.ip
                )));
            }
        }

        Ok(portal)
    }

    /// The existing triple for an access name, if all three pieces exist.
    pub async fn lookup_triple(&self, access_name: &str) -> Result<Option<TargetTriple>> {
        let target: Option<Target> = self
            .backend
            .find_one("iscsi/target", Filter::eq("name", access_name))
            .await?;
        let extent: Option<Extent> = self
            .backend
            .find_one("iscsi/extent", Filter::eq("name", access_name))
            .await?;

        let targetextent: Option<TargetExtent> = match &extent {
            Some(extent) => {
                self.backend
                    .find_one("iscsi/targetextent", Filter::eq("extent", extent.id))
                    .await?
            }
            None => None,
        };

        Ok(match (target, extent, targetextent) {
            (Some(target), Some(extent), Some(targetextent)) => Some(TargetTriple {
                target,
                extent,
                targetextent,
            }),
            _ => None,
        })
    }

    /// The triple for a dataset, created when missing.
    pub async fn ensure_triple(
        &self,
        dataset: &DatasetEntry,
        custom_auth_networks: Option<&str>,
    ) -> Result<TargetTriple> {
        let access_name = ident::leaf_name(&dataset.id);
        match self.lookup_triple(access_name).await? {
            Some(triple) => Ok(triple),
            None => self.create_triple(dataset, custom_auth_networks).await,
        }
    }

    /// Create target, extent and mapping for a dataset. On SCALE the
    /// target carries `auth_networks`: the user-supplied CSV when present,
    /// otherwise the networks enclosing the discovery addresses.
    #[instrument(skip(self, dataset, custom_auth_networks), fields(dataset = %dataset.id))]
    pub async fn create_triple(
        &self,
        dataset: &DatasetEntry,
        custom_auth_networks: Option<&str>,
    ) -> Result<TargetTriple> {
        let access_name = ident::leaf_name(&dataset.id).to_string();

        let mut target_body = json!({"name": access_name});
        if self.backend.system_version().await?.is_scale() {
            let networks = self.auth_networks(custom_auth_networks).await?;
            debug!(?networks, "restricting target to auth networks");
            target_body["auth_networks"] = json!(networks);
        }

        let mut target: Option<Target> = self
            .backend
            .find_one("iscsi/target", Filter::eq("name", access_name.clone()))
            .await?;

        if target.is_none() {
            let mut remaining = self.config.retry.attempts;
            loop {
                let reply = self.backend.post("iscsi/target", &target_body).await?;
                if reply.ok() {
                    if let Ok(created) = reply.decode::<Target>() {
                        target = Some(created);
                        debug!(target = %access_name, "target created");
                        break;
                    }
                }
                debug!(target = %access_name, "target creation retried: {}", reply.text());
                if remaining == 0 {
                    break;
                }
                remaining -= 1;
                self.config.retry.wait().await;
            }
        }

        let target = target.ok_or_else(|| {
            IscsiError::Api(format!("unable to create target {access_name}"))
        })?;

        let extent_body = json!({
            "type": "DISK",
            "comment": EXTENT_COMMENT,
            "name": access_name,
            "disk": format!("zvol/{}", dataset.id),
        });
        let reply = self.backend.post("iscsi/extent", &extent_body).await?;
        if !reply.ok() {
            return Err(IscsiError::Api(reply.text().to_string()));
        }
        let extent: Extent = reply.decode()?;
        debug!(extent = extent.id, "extent created");

        let mapping_body = json!({
            "target": target.id,
            "extent": extent.id,
            "lunid": 0,
        });
        let reply = self.backend.post("iscsi/targetextent", &mapping_body).await?;
        if !reply.ok() {
            return Err(IscsiError::Api(reply.text().to_string()));
        }
        let targetextent: TargetExtent = reply.decode()?;
        debug!(mapping = targetextent.id, "target extent created");

        info!(target = %target.name, "iSCSI target composed");
        Ok(TargetTriple {
            target,
            extent,
            targetextent,
        })
    }

    /// Auth networks for a SCALE target.
    async fn auth_networks(&self, custom: Option<&str>) -> Result<Vec<String>> {
        if let Some(csv) = custom {
            return Ok(net::parse_auth_networks(csv)?);
        }

        let portal = self.discovery_portal().await?;
        let interfaces: Vec<InterfaceEntry> = self.backend.find_all("interface", None, None).await?;
        Ok(net::addrs_to_networks(&portal.listen_ips(), &interfaces)?)
    }

    /// Delete a target, retrying while it lingers and forcing on the last
    /// attempt.
    #[instrument(skip(self, target), fields(target = %target.name))]
    pub async fn delete_target(&self, target: &Target) -> Result<()> {
        let uri = uri_id("iscsi/target", &target.id.to_string());
        self.backend.delete(&uri, None).await?;

        let mut remaining = self.config.retry.attempts;
        while remaining > 0
            && self
                .backend
                .find_one::<Target>("iscsi/target", Filter::eq("name", target.name.clone()))
                .await?
                .is_some()
        {
            remaining -= 1;
            self.config.retry.wait().await;
            self.backend.delete(&uri, None).await?;
            debug!("target deletion retried");
        }

        if remaining == 0 {
            self.backend.delete(&uri, Some(&json!(true))).await?;
        }
        Ok(())
    }

    /// Delete a target-extent mapping, with the same retry discipline.
    #[instrument(skip(self, mapping), fields(mapping = mapping.id))]
    pub async fn delete_targetextent(&self, mapping: &TargetExtent) -> Result<()> {
        let uri = uri_id("iscsi/targetextent", &mapping.id.to_string());
        self.backend.delete(&uri, None).await?;

        let mut remaining = self.config.retry.attempts;
        while remaining > 0
            && self
                .backend
                .find_one::<TargetExtent>("iscsi/targetextent", Filter::eq("target", mapping.target))
                .await?
                .is_some()
        {
            remaining -= 1;
            self.config.retry.wait().await;
            self.backend.delete(&uri, None).await?;
            debug!("target extent deletion retried");
        }

        if remaining == 0 {
            self.backend.delete(&uri, Some(&json!(true))).await?;
        }
        Ok(())
    }

    /// Delete an extent. The forced form also removes the backing file
    /// association.
    #[instrument(skip(self, extent), fields(extent = %extent.name))]
    pub async fn delete_extent(&self, extent: &Extent) -> Result<()> {
        let uri = uri_id("iscsi/extent", &extent.id.to_string());
        self.backend.delete(&uri, None).await?;

        let mut remaining = self.config.retry.attempts;
        while remaining > 0
            && self
                .backend
                .find_one::<Extent>("iscsi/extent", Filter::eq("name", extent.name.clone()))
                .await?
                .is_some()
        {
            remaining -= 1;
            self.config.retry.wait().await;
            self.backend.delete(&uri, None).await?;
            debug!("extent deletion retried");
        }

        if remaining == 0 {
            self.backend
                .delete(&uri, Some(&json!({"force": true, "remove": true})))
                .await?;
        }
        Ok(())
    }
}
