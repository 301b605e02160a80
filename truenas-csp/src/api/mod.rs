//! HTTP facade for the CSP contract.
//!
//! Routes, credential middleware and response shaping. Credentials travel
//! on every request (`x-auth-token` / `x-array-ip`); the middleware builds
//! a per-request `Backend` from them, validates it against `core/ping` and
//! hands it to the handlers through request extensions. The Tokens routes
//! sit outside the middleware: the POST may carry credentials in its body
//! and the DELETE needs none at all.

pub mod error;
pub mod hosts;
pub mod snapshots;
pub mod tokens;
pub mod types;
pub mod volumes;

use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, post, put};
use tower_http::trace::TraceLayer;
use tracing::debug;

pub use error::CspError;

use crate::backend::Backend;
use crate::config::CspConfig;
use crate::locks::LockTable;

pub struct AppState {
    pub config: CspConfig,
    pub http: reqwest::Client,
    pub locks: LockTable,
}

impl AppState {
    /// Build the shared state, including the one HTTP client all backend
    /// connections pool through.
    pub fn new(config: CspConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()?;
        Ok(Self {
            config,
            http,
            locks: LockTable::new(),
        })
    }

    /// A backend client bound to one request's credentials.
    pub fn backend(&self, array: &str, token: &str) -> Backend {
        Backend::new(
            self.http.clone(),
            self.config.backend_scheme.clone(),
            array,
            token,
            self.config.retry.delay,
        )
    }
}

/// Extract and validate credentials, then attach the backend client to the
/// request.
async fn credentials(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, CspError> {
    let token = header_value(&req, "x-auth-token").ok_or(CspError::MissingToken)?;
    let array = header_value(&req, "x-array-ip").ok_or(CspError::MissingArrayIp)?;

    debug!(method = %req.method(), uri = %req.uri(), array = %array, token = "*****", "CSP request");

    let backend = state.backend(&array, &token);
    if !backend.ping().await {
        return Err(CspError::AuthFailed);
    }

    req.extensions_mut().insert(backend);
    Ok(next.run(req).await)
}

fn header_value(req: &Request, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// The CSP router.
pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/containers/v1/hosts", post(hosts::create))
        .route("/containers/v1/hosts/{host_id}", delete(hosts::remove))
        .route(
            "/containers/v1/volumes",
            get(volumes::lookup).post(volumes::create),
        )
        .route(
            "/containers/v1/volumes/{volume_id}",
            get(volumes::inspect)
                .put(volumes::update)
                .delete(volumes::remove),
        )
        .route(
            "/containers/v1/volumes/{volume_id}/actions/publish",
            put(volumes::publish),
        )
        .route(
            "/containers/v1/volumes/{volume_id}/actions/unpublish",
            put(volumes::unpublish),
        )
        .route(
            "/containers/v1/snapshots",
            get(snapshots::lookup).post(snapshots::create),
        )
        .route(
            "/containers/v1/snapshots/{snapshot_id}",
            get(snapshots::inspect).delete(snapshots::remove),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), credentials));

    Router::new()
        .route("/containers/v1/tokens", post(tokens::create))
        .route("/containers/v1/tokens/{token_id}", delete(tokens::remove))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
