use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request not found: {0}")]
    RequestNotFound(String),

    #[error("request already exists: {0}")]
    DuplicateRequest(String),

    /// The conditional update was rejected: the prior status did not match,
    /// or the request is already terminal.
    #[error("conditional update rejected for {request_id}: {detail}")]
    StatusConflict { request_id: String, detail: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("malformed stored request: {0}")]
    Malformed(String),

    #[error("store backend error: {0}")]
    Backend(#[from] lethe_aws::AwsError),

    #[error("change stream error: {0}")]
    Stream(String),
}
