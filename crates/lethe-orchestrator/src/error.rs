use lethe_domain::PartitionKey;
use lethe_store::StoreError;
use thiserror::Error;

/// Everything that can end an erasure request. `code()` is the stable kind
/// persisted in front of the operator-facing `error_message`.
#[derive(Debug, Error)]
pub enum ErasureError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("partition scan failed: {0}")]
    LocatorQueryFailed(String),

    #[error("staging query failed for {partition}: {reason}")]
    RewriteStagingFailed {
        partition: PartitionKey,
        reason: String,
    },

    #[error("file-set swap failed for {partition}: {reason}")]
    RewriteSwapFailed {
        partition: PartitionKey,
        reason: String,
    },

    #[error("warehouse delete failed: {0}")]
    WarehouseDeleteFailed(String),

    #[error("request not found in the log: {0}")]
    RequestNotFound(String),

    #[error("request deadline exceeded during {step} after {seconds} seconds")]
    DeadlineExceeded { step: &'static str, seconds: u64 },

    #[error("request log error: {0}")]
    Store(#[from] StoreError),
}

impl ErasureError {
    pub fn code(&self) -> &'static str {
        match self {
            ErasureError::InvalidInput(_) => "INVALID_INPUT",
            ErasureError::LocatorQueryFailed(_) => "LOCATOR_QUERY_FAILED",
            ErasureError::RewriteStagingFailed { .. } => "REWRITE_STAGING_FAILED",
            ErasureError::RewriteSwapFailed { .. } => "REWRITE_SWAP_FAILED",
            ErasureError::WarehouseDeleteFailed(_) => "WAREHOUSE_DELETE_FAILED",
            ErasureError::RequestNotFound(_) => "REQUEST_NOT_FOUND",
            ErasureError::DeadlineExceeded { .. } => "DEADLINE_EXCEEDED",
            ErasureError::Store(_) => "REQUEST_LOG_ERROR",
        }
    }
}
