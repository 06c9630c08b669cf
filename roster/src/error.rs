use crate::store::StoreError;
use crate::upstream::UpstreamError;

/// Result type alias for roster operations
pub type Result<T, E = SyncError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("no upstream identity for character {0:?}")]
    IdentityNotFound(String),

    #[error("no stored record for {0:?}")]
    RecordNotFound(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(#[from] UpstreamError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid upstream data: {0}")]
    InvalidUpstreamData(String),
}
