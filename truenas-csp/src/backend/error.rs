use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("appliance request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected appliance payload: {0}")]
    Payload(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BackendError>;
