use thiserror::Error;

use crate::backend::BackendError;

#[derive(Error, Debug)]
pub enum ZfsError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("dataset '{0}' is busy")]
    Busy(String),

    #[error("cannot delete a published volume")]
    Published,

    #[error("unexpected argument \"{0}\"")]
    UnknownKey(String),

    #[error("invalid volume config: {0}")]
    InvalidConfig(String),

    #[error("TrueNAS API returned: {0}")]
    Api(String),

    #[error("malformed dataset payload: {0}")]
    Malformed(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type Result<T> = std::result::Result<T, ZfsError>;
