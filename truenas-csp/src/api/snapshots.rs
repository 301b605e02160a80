//! Snapshot endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use tracing::info;

use super::AppState;
use super::error::CspError;
use super::types::{CreateSnapshotRequest, Snapshot};
use crate::backend::Backend;
use crate::metrics::CspOperation;
use crate::zfs::SnapshotManager;

pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(backend): Extension<Backend>,
    Json(req): Json<CreateSnapshotRequest>,
) -> Result<Json<Snapshot>, CspError> {
    let measure = CspOperation::SnapshotCreate.measure();
    let manager = SnapshotManager::new(&backend, &state.config);

    match manager.create(&req.volume_id, &req.name).await {
        Ok(entry) => {
            measure.finish("success");
            Ok(Json(manager.to_snapshot(&entry)))
        }
        Err(err) => {
            let err = CspError::from(err);
            measure.finish(err.code());
            Err(err)
        }
    }
}

pub async fn lookup(
    State(state): State<Arc<AppState>>,
    Extension(backend): Extension<Backend>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Snapshot>>, CspError> {
    let manager = SnapshotManager::new(&backend, &state.config);

    if let Some(name) = params.get("name") {
        return match manager.find_by_snapshot_name(name).await? {
            Some(entry) => Ok(Json(vec![manager.to_snapshot(&entry)])),
            None => Err(CspError::NotFound(format!("Snapshot {name} not found."))),
        };
    }

    if let Some(volume_id) = params.get("volume_id") {
        let entries = manager.list_for_volume(volume_id).await?;
        info!(volume = %volume_id, count = entries.len(), "snapshots listed");
        return Ok(Json(
            entries.iter().map(|entry| manager.to_snapshot(entry)).collect(),
        ));
    }

    Err(CspError::BadRequest(
        "expected a name or volume_id query parameter".to_string(),
    ))
}

pub async fn inspect(
    State(state): State<Arc<AppState>>,
    Extension(backend): Extension<Backend>,
    Path(snapshot_id): Path<String>,
) -> Result<Json<Snapshot>, CspError> {
    let manager = SnapshotManager::new(&backend, &state.config);
    match manager.find_by_id(&snapshot_id).await? {
        Some(entry) => Ok(Json(manager.to_snapshot(&entry))),
        None => Err(CspError::NotFound(format!(
            "Snapshot not found {snapshot_id}"
        ))),
    }
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    Extension(backend): Extension<Backend>,
    Path(snapshot_id): Path<String>,
) -> Result<StatusCode, CspError> {
    let measure = CspOperation::SnapshotDelete.measure();
    let manager = SnapshotManager::new(&backend, &state.config);

    match manager.delete(&snapshot_id).await {
        Ok(_) => {
            measure.finish("success");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(err) => {
            let err = CspError::from(err);
            measure.finish(err.code());
            Err(err)
        }
    }
}
