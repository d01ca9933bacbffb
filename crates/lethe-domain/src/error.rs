use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid patient id hash (expected 64 lowercase hex chars): {0:?}")]
    InvalidSubjectHash(String),

    #[error("invalid request status: {0}")]
    InvalidStatus(String),
}
