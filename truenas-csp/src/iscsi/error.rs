use thiserror::Error;

use crate::backend::BackendError;
use crate::net::NetError;

#[derive(Error, Debug)]
pub enum IscsiError {
    #[error("{0}")]
    Misconfigured(String),

    #[error("{0}")]
    Unconfigured(String),

    #[error("host initiator group for '{0}' not found")]
    HostNotFound(String),

    #[error("TrueNAS API returned: {0}")]
    Api(String),

    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type Result<T> = std::result::Result<T, IscsiError>;
