//! Volume endpoints.
//!
//! Creation builds the iSCSI target triple right away so the volume is
//! addressable before its first publish; some CSI flows stage the
//! attachment before asking for one.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use tracing::info;

use super::AppState;
use super::error::CspError;
use super::types::{
    CreateVolumeRequest, PublishRequest, PublishResult, UnpublishRequest, UpdateVolumeRequest,
    Volume,
};
use crate::backend::Backend;
use crate::iscsi::{PublishCoordinator, TargetComposer};
use crate::metrics::CspOperation;
use crate::zfs::DatasetManager;

pub async fn lookup(
    State(state): State<Arc<AppState>>,
    Extension(backend): Extension<Backend>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Volume>>, CspError> {
    let Some(name) = params.get("name") else {
        return Ok(Json(Vec::new()));
    };

    let manager = DatasetManager::new(&backend, &state.config);
    match manager.find_by_leaf_name(name).await? {
        Some(entry) => {
            info!(volume = %name, "volume found");
            Ok(Json(vec![manager.to_volume(&entry).await?]))
        }
        None => Err(CspError::NotFound(format!(
            "Volume with name {name} not found."
        ))),
    }
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(backend): Extension<Backend>,
    Json(req): Json<CreateVolumeRequest>,
) -> Result<Json<Volume>, CspError> {
    let measure = CspOperation::VolumeCreate.measure();
    let manager = DatasetManager::new(&backend, &state.config);

    let result = async {
        let entry = if req.clone {
            manager.create_clone(&req).await?
        } else {
            manager.create(&req).await?
        };

        // Compose the target triple immediately; publish will find it.
        let composer = TargetComposer::new(&backend, &state.config);
        composer
            .ensure_triple(&entry, req.cfg_str("auth_networks"))
            .await
            .map_err(CspError::from)?;

        Ok::<Volume, CspError>(manager.to_volume(&entry).await?)
    }
    .await;

    match result {
        Ok(volume) => {
            measure.finish("success");
            Ok(Json(volume))
        }
        Err(err) => {
            measure.finish(err.code());
            Err(err)
        }
    }
}

pub async fn inspect(
    State(state): State<Arc<AppState>>,
    Extension(backend): Extension<Backend>,
    Path(volume_id): Path<String>,
) -> Result<Json<Volume>, CspError> {
    let manager = DatasetManager::new(&backend, &state.config);
    match manager.find_by_id(&volume_id).await? {
        Some(entry) => Ok(Json(manager.to_volume(&entry).await?)),
        None => Err(CspError::NotFound(format!(
            "Volume with id {volume_id} not found."
        ))),
    }
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(backend): Extension<Backend>,
    Path(volume_id): Path<String>,
    Json(req): Json<UpdateVolumeRequest>,
) -> Result<Json<Volume>, CspError> {
    let measure = CspOperation::VolumeUpdate.measure();
    let manager = DatasetManager::new(&backend, &state.config);

    let Some(entry) = manager.find_by_id(&volume_id).await? else {
        measure.finish("Not found");
        return Err(CspError::NotFound(format!(
            "Volume with id {volume_id} not found."
        )));
    };

    let result = async {
        let updated = manager.update(&entry, &req).await?;
        Ok::<Volume, CspError>(manager.to_volume(&updated).await?)
    }
    .await;

    match result {
        Ok(volume) => {
            measure.finish("success");
            Ok(Json(volume))
        }
        Err(err) => {
            measure.finish(err.code());
            Err(err)
        }
    }
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    Extension(backend): Extension<Backend>,
    Path(volume_id): Path<String>,
) -> Result<StatusCode, CspError> {
    let measure = CspOperation::VolumeDelete.measure();
    let manager = DatasetManager::new(&backend, &state.config);

    let Some(entry) = manager.find_by_id(&volume_id).await? else {
        measure.finish("Not found");
        return Err(CspError::NotFound(format!(
            "Volume with id {volume_id} not found."
        )));
    };

    match manager.delete(&entry).await {
        Ok(()) => {
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

pub async fn publish(
    State(state): State<Arc<AppState>>,
    Extension(backend): Extension<Backend>,
    Path(volume_id): Path<String>,
    Json(req): Json<PublishRequest>,
) -> Result<Json<PublishResult>, CspError> {
    let measure = CspOperation::Publish.measure();
    let manager = DatasetManager::new(&backend, &state.config);

    let Some(entry) = manager.find_by_id(&volume_id).await? else {
        measure.finish("Not found");
        return Err(CspError::NotFound(format!(
            "Volume with id {volume_id} not found."
        )));
    };

    let coordinator = PublishCoordinator::new(&backend, &state.config, &state.locks);
    match coordinator.publish(&entry, &req).await {
        Ok(result) => {
            measure.finish("success");
            Ok(Json(result))
        }
        Err(err) => {
            let err = CspError::from(err);
            measure.finish(err.code());
            Err(err)
        }
    }
}

pub async fn unpublish(
    State(state): State<Arc<AppState>>,
    Extension(backend): Extension<Backend>,
    Path(volume_id): Path<String>,
    Json(req): Json<UnpublishRequest>,
) -> Result<StatusCode, CspError> {
    let measure = CspOperation::Unpublish.measure();
    let coordinator = PublishCoordinator::new(&backend, &state.config, &state.locks);

    match coordinator.unpublish(&volume_id, &req).await {
        Ok(()) => {
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
