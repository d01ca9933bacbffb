use thiserror::Error;

#[derive(Debug, Error)]
pub enum AwsError {
    #[error("credentials: {0}")]
    Credentials(String),

    #[error("{service} transport: {detail}")]
    Transport { service: &'static str, detail: String },

    #[error("{service} [{code}]: {message}")]
    Api {
        service: &'static str,
        code: String,
        message: String,
    },

    #[error("malformed {service} response: {detail}")]
    Malformed { service: &'static str, detail: String },
}

impl AwsError {
    /// The service error code, when this is an API-level rejection.
    pub fn code(&self) -> Option<&str> {
        match self {
            AwsError::Api { code, .. } => Some(code),
            _ => None,
        }
    }
}
