//! Initiator groups and CHAP credentials.
//!
//! Two kinds of initiator group share the `iscsi/initiator` resource,
//! distinguished by their comment: host groups carry the host uuid and the
//! host's IQNs, target groups carry the access name and the union of all
//! IQNs currently publishing that volume. CHAP credentials live in a
//! single `iscsi/auth` record identified by the configured tag.

use serde_json::json;
use tracing::{info, instrument};

use super::error::{IscsiError, Result};
use super::types::{ChapAuth, Initiator};
use crate::api::types::HostRequest;
use crate::backend::{Backend, Filter, Reply, uri_id};
use crate::config::CspConfig;
use crate::net;

pub struct InitiatorManager<'a> {
    backend: &'a Backend,
    config: &'a CspConfig,
}

impl<'a> InitiatorManager<'a> {
    pub fn new(backend: &'a Backend, config: &'a CspConfig) -> Self {
        Self { backend, config }
    }

    pub async fn find_by_comment(&self, comment: &str) -> Result<Option<Initiator>> {
        Ok(self
            .backend
            .find_one("iscsi/initiator", Filter::eq("comment", comment))
            .await?)
    }

    /// The CHAP record for the configured tag, if one exists.
    pub async fn chap_auth(&self) -> Result<Option<ChapAuth>> {
        Ok(self
            .backend
            .find_one("iscsi/auth", Filter::eq("tag", self.config.chap_tag))
            .await?)
    }

    /// Reconcile the CHAP record with the supplied credentials: create it
    /// when absent, rewrite it when drifted.
    #[instrument(skip_all)]
    pub async fn apply_chap(&self, user: &str, secret: &str) -> Result<ChapAuth> {
        match self.chap_auth().await? {
            Some(auth) => {
                info!(tag = auth.tag, "CHAP found");
                if auth.user != user || auth.secret != secret {
                    let body = json!({"user": user, "secret": secret});
                    let reply = self
                        .backend
                        .put(&uri_id("iscsi/auth", &auth.id.to_string()), &body)
                        .await?;
                    if !reply.ok() {
                        return Err(IscsiError::Api(reply.text().to_string()));
                    }
                    info!(tag = auth.tag, "CHAP updated");
                    return Ok(reply.decode()?);
                }
                Ok(auth)
            }
            None => {
                let body = json!({
                    "tag": self.config.chap_tag,
                    "user": user,
                    "secret": secret,
                });
                let reply = self.backend.post("iscsi/auth", &body).await?;
                if !reply.ok() {
                    return Err(IscsiError::Api(reply.text().to_string()));
                }
                info!(tag = self.config.chap_tag, "CHAP created");
                Ok(reply.decode()?)
            }
        }
    }

    /// Create or update the host initiator group keyed by the host uuid.
    /// CHAP credentials, when present, are applied first. CORE and legacy
    /// additionally restrict the group to the host-form of the provided
    /// networks.
    #[instrument(skip(self, req), fields(host = %req.uuid))]
    pub async fn apply_host(&self, req: &HostRequest) -> Result<Initiator> {
        if let (Some(user), Some(secret)) = (&req.chap_user, &req.chap_password) {
            self.apply_chap(user, secret).await?;
        }

        let mut body = json!({
            "comment": req.uuid,
            "initiators": req.iqns,
        });
        if self.backend.system_version().await?.host_form_networks() {
            body["auth_network"] = json!(net::cidrs_to_hosts(&req.networks)?);
        }

        match self.find_by_comment(&req.uuid).await? {
            Some(existing) => {
                let reply = self
                    .backend
                    .put(&uri_id("iscsi/initiator", &existing.id.to_string()), &body)
                    .await?;
                if !reply.ok() {
                    return Err(IscsiError::Api(reply.text().to_string()));
                }
                info!("host updated");
                Ok(reply.decode()?)
            }
            None => {
                let reply = self.backend.post("iscsi/initiator", &body).await?;
                if !reply.ok() {
                    return Err(IscsiError::Api(reply.text().to_string()));
                }
                info!("host created");
                Ok(reply.decode()?)
            }
        }
    }

    /// The target initiator group for an access name, created empty when
    /// missing.
    pub async fn ensure_group(&self, comment: &str) -> Result<Initiator> {
        if let Some(group) = self.find_by_comment(comment).await? {
            return Ok(group);
        }

        let body = json!({"comment": comment, "initiators": []});
        let reply = self.backend.post("iscsi/initiator", &body).await?;
        if !reply.ok() {
            return Err(IscsiError::Api(reply.text().to_string()));
        }
        info!(group = %comment, "target initiator group created");
        Ok(reply.decode()?)
    }

    /// Replace a group's member IQNs and, when given, its access networks.
    pub async fn update_members(
        &self,
        group: &Initiator,
        initiators: Vec<String>,
        auth_network: Option<Vec<String>>,
    ) -> Result<Initiator> {
        let mut body = json!({"initiators": initiators});
        if let Some(networks) = auth_network {
            body["auth_network"] = json!(networks);
        }

        let reply = self
            .backend
            .put(&uri_id("iscsi/initiator", &group.id.to_string()), &body)
            .await?;
        if !reply.ok() {
            return Err(IscsiError::Api(reply.text().to_string()));
        }
        Ok(reply.decode()?)
    }

    /// Delete a group by id, returning the appliance reply so callers can
    /// pass the status through.
    pub async fn delete(&self, id: i64) -> Result<Reply> {
        Ok(self
            .backend
            .delete(&uri_id("iscsi/initiator", &id.to_string()), None)
            .await?)
    }
}
