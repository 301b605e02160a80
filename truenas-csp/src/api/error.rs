//! Error kinds surfaced to the CSI driver.
//!
//! Every failure leaves the handler as a `CspError` and is rendered as
//! `{"errors": [{"code": ..., "message": ...}]}` with the status the
//! contract prescribes. Appliance rejections keep the historical
//! `Bad Request` code under a 500 status.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::backend::BackendError;
use crate::iscsi::IscsiError;
use crate::zfs::ZfsError;

#[derive(Error, Debug)]
pub enum CspError {
    #[error("Missing x-auth-token in header or password in Tokens request")]
    MissingToken,

    #[error("Missing x-array-ip in header or array_ip in Tokens request")]
    MissingArrayIp,

    #[error("Unable to authenticate with provided credentials")]
    AuthFailed,

    #[error("{0}")]
    Misconfigured(String),

    #[error("{0}")]
    Unconfigured(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    /// The appliance rejected a request the adapter forwarded.
    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Exception(String),
}

impl CspError {
    pub fn code(&self) -> &'static str {
        match self {
            CspError::MissingToken => "Missing token",
            CspError::MissingArrayIp => "Missing backend array IP",
            CspError::AuthFailed => "Authentication failed",
            CspError::Misconfigured(_) => "Misconfigured",
            CspError::Unconfigured(_) => "Unconfigured",
            CspError::NotFound(_) => "Not found",
            CspError::BadRequest(_) | CspError::Upstream(_) => "Bad Request",
            CspError::Conflict(_) => "Conflict",
            CspError::Exception(_) => "Exception",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            CspError::MissingToken | CspError::AuthFailed => StatusCode::UNAUTHORIZED,
            CspError::MissingArrayIp | CspError::Misconfigured(_) | CspError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            CspError::Unconfigured(_) | CspError::NotFound(_) => StatusCode::NOT_FOUND,
            CspError::Conflict(_) => StatusCode::CONFLICT,
            CspError::Upstream(_) | CspError::Exception(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CspError {
    fn into_response(self) -> Response {
        error!("{}: {}", self.code(), self);
        let body = json!({
            "errors": [{"code": self.code(), "message": self.to_string()}]
        });
        (self.status(), Json(body)).into_response()
    }
}

impl From<BackendError> for CspError {
    fn from(err: BackendError) -> Self {
        CspError::Exception(err.to_string())
    }
}

impl From<ZfsError> for CspError {
    fn from(err: ZfsError) -> Self {
        match err {
            ZfsError::NotFound(_) => CspError::NotFound(err.to_string()),
            ZfsError::Busy(_) => CspError::Conflict(err.to_string()),
            ZfsError::Published => CspError::BadRequest(err.to_string()),
            ZfsError::UnknownKey(key) => CspError::BadRequest(format!(
                "The request could not be understood by the server. \
                 Unexpected argument \"{key}\""
            )),
            ZfsError::InvalidConfig(_) => CspError::BadRequest(err.to_string()),
            ZfsError::Api(_) => CspError::Upstream(err.to_string()),
            ZfsError::Malformed(_) | ZfsError::Backend(_) => CspError::Exception(err.to_string()),
        }
    }
}

impl From<IscsiError> for CspError {
    fn from(err: IscsiError) -> Self {
        match err {
            IscsiError::Misconfigured(_) => CspError::Misconfigured(err.to_string()),
            IscsiError::Unconfigured(_) => CspError::Unconfigured(err.to_string()),
            IscsiError::HostNotFound(_)
            | IscsiError::Api(_)
            | IscsiError::Net(_)
            | IscsiError::Backend(_) => CspError::Exception(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(CspError::MissingToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(CspError::MissingArrayIp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(CspError::AuthFailed.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            CspError::Misconfigured("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CspError::NotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(CspError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(
            CspError::Upstream("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            CspError::Exception("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_upstream_keeps_bad_request_code() {
        let err = CspError::Upstream("TrueNAS API returned: boom".into());
        assert_eq!(err.code(), "Bad Request");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_published_guard_maps_to_400() {
        let err: CspError = ZfsError::Published.into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "cannot delete a published volume");
    }

    #[test]
    fn test_busy_maps_to_conflict() {
        let err: CspError = ZfsError::Busy("tank/pvc-1".into()).into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}
