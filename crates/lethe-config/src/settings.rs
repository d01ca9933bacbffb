use std::env::{self, VarError};

use tracing::debug;

use crate::error::ConfigError;

/// Process configuration, read once at startup.
///
/// Names the resources the orchestrator touches but does not own: the request
/// log table, the curated bucket, the catalog database/table the query engine
/// reads, and the workgroups that scope query and warehouse execution.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Environment dimension stamped onto every emitted metric.
    pub environment_name: String,
    pub region: String,
    /// Bucket holding both `curated/` and `temp-erasure/` prefixes.
    pub curated_bucket: String,
    pub glue_database: String,
    pub glue_table: String,
    pub athena_workgroup: String,
    pub redshift_workgroup: String,
    pub redshift_database: String,
    pub requests_table: String,
}

impl Settings {
    /// Load from the environment. A missing required variable is a
    /// startup-time fatal error; variables with well-known defaults fall back
    /// to them.
    pub fn from_env() -> Result<Self, ConfigError> {
        let settings = Self {
            environment_name: optional("ENVIRONMENT_NAME", "gdpr-healthcare")?,
            region: optional("AWS_REGION", "eu-central-1")?,
            curated_bucket: required("CURATED_BUCKET")?,
            glue_database: required("GLUE_DATABASE")?,
            glue_table: optional("GLUE_TABLE", "curated_health_records")?,
            athena_workgroup: required("ATHENA_WORKGROUP")?,
            redshift_workgroup: required("REDSHIFT_WORKGROUP")?,
            redshift_database: optional("REDSHIFT_DATABASE", "healthcare_analytics")?,
            requests_table: required("REQUESTS_TABLE")?,
        };
        debug!(
            environment = %settings.environment_name,
            region = %settings.region,
            "configuration loaded"
        );
        Ok(settings)
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    match env::var(var) {
        Ok(v) if !v.is_empty() => Ok(v),
        Ok(_) | Err(VarError::NotPresent) => Err(ConfigError::MissingVar(var)),
        Err(VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode { var }),
    }
}

fn optional(var: &'static str, default: &str) -> Result<String, ConfigError> {
    match env::var(var) {
        Ok(v) if !v.is_empty() => Ok(v),
        Ok(_) | Err(VarError::NotPresent) => Ok(default.to_string()),
        Err(VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode { var }),
    }
}
