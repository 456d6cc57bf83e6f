use thiserror::Error;

/// Everything the lifecycle engine can refuse or fail with.
///
/// Expired and exhausted drops both surface as `Gone` so callers cannot
/// tell which one happened.
#[derive(Debug, Error)]
pub enum DropError {
    #[error("drop not found")]
    NotFound,

    #[error("drop is no longer available")]
    Gone,

    #[error("delete token does not match")]
    Forbidden,

    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("blob storage failure: {0:#}")]
    Storage(anyhow::Error),

    #[error("record store failure: {0:#}")]
    RecordStore(anyhow::Error),
}
