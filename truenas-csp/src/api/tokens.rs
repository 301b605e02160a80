//! Token endpoints.
//!
//! The adapter keeps no session state; a Tokens POST validates the
//! credentials and the portal configuration, then echoes a token object
//! back. Deleting a token is a no-op kept for contract compatibility.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::error::CspError;
use super::types::TokenReply;
use super::AppState;
use crate::iscsi::TargetComposer;

const TOKEN_LIFETIME_SECS: i64 = 86_400;

pub async fn create(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<TokenReply>, CspError> {
    let content: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    let token = field_or_header(&content, "password", &headers, "x-auth-token")
        .ok_or(CspError::MissingToken)?;
    let array = field_or_header(&content, "array_ip", &headers, "x-array-ip")
        .ok_or(CspError::MissingArrayIp)?;

    let backend = state.backend(&array, &token);
    if !backend.ping().await {
        return Err(CspError::AuthFailed);
    }

    // A token is only useful if publishing can work later, so the portal
    // configuration is validated up front.
    let composer = TargetComposer::new(&backend, &state.config);
    composer.discovery_portal().await.map_err(CspError::from)?;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| CspError::Exception(err.to_string()))?
        .as_secs() as i64;

    info!("token created (not logged)");
    Ok(Json(TokenReply {
        id: Uuid::new_v4().to_string(),
        session_token: token,
        array_ip: array,
        username: params.get("username").cloned(),
        creation_time: now,
        expiry_time: now + TOKEN_LIFETIME_SECS,
    }))
}

pub async fn remove(Path(_token_id): Path<i64>) -> StatusCode {
    StatusCode::NO_CONTENT
}

fn field_or_header(
    content: &Value,
    field: &str,
    headers: &HeaderMap,
    header: &str,
) -> Option<String> {
    content
        .get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| {
            headers
                .get(header)
                .and_then(|value| value.to_str().ok())
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_or_header_precedence() {
        let content = json!({"password": "from-body"});
        let mut headers = HeaderMap::new();
        headers.insert("x-auth-token", "from-header".parse().unwrap());

        assert_eq!(
            field_or_header(&content, "password", &headers, "x-auth-token"),
            Some("from-body".to_string())
        );
        assert_eq!(
            field_or_header(&Value::Null, "password", &headers, "x-auth-token"),
            Some("from-header".to_string())
        );
        assert_eq!(
            field_or_header(&Value::Null, "password", &HeaderMap::new(), "x-auth-token"),
            None
        );
    }
}
