//! Host registration endpoints.
//!
//! A host is an initiator group whose comment is the host uuid.
//! Registration is an idempotent apply and runs under a per-uuid lock so
//! concurrent registrations of the same host cannot interleave.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::info;

use super::AppState;
use super::error::CspError;
use super::types::{Host, HostRequest};
use crate::backend::Backend;
use crate::iscsi::InitiatorManager;
use crate::metrics::CspOperation;

pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(backend): Extension<Backend>,
    Json(req): Json<HostRequest>,
) -> Result<Json<Host>, CspError> {
    let measure = CspOperation::HostApply.measure();
    let _serialized = state.locks.acquire(&format!("host:{}", req.uuid)).await;

    let manager = InitiatorManager::new(&backend, &state.config);
    let initiator = match manager.apply_host(&req).await {
        Ok(initiator) => {
            measure.finish("success");
            initiator
        }
        Err(err) => {
            let err = CspError::from(err);
            measure.finish(err.code());
            return Err(err);
        }
    };

    Ok(Json(Host {
        id: initiator.id,
        name: initiator.comment.clone(),
        uuid: initiator.comment,
        iqns: initiator.initiators,
        networks: req.networks,
        chap_user: req.chap_user,
        chap_password: req.chap_password,
        wwpns: Vec::new(),
    }))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    Extension(backend): Extension<Backend>,
    Path(host_id): Path<String>,
) -> Result<Response, CspError> {
    let measure = CspOperation::HostDelete.measure();
    let manager = InitiatorManager::new(&backend, &state.config);

    let Some(initiator) = manager.find_by_comment(&host_id).await? else {
        info!(host = %host_id, "host not found");
        measure.finish("Not found");
        return Err(CspError::NotFound(format!("Host {host_id} not found.")));
    };

    match manager.delete(initiator.id).await {
        Ok(reply) => {
            measure.finish("success");
            info!(host = %host_id, "host deleted");

            // The appliance status is passed through verbatim.
            let status = StatusCode::from_u16(reply.status.as_u16())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            Ok(status.into_response())
        }
        Err(err) => {
            let err = CspError::from(err);
            measure.finish(err.code());
            Err(err)
        }
    }
}
