use serde_json::json;
use tracing::debug;

use crate::api::AwsApi;
use crate::error::AwsError;

const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

#[derive(Debug, Clone)]
pub struct StatementStatus {
    /// `SUBMITTED | PICKED | STARTED | FINISHED | FAILED | ABORTED`.
    pub status: String,
    /// Rows affected; populated once the statement is `FINISHED`.
    pub result_rows: i64,
    pub error: Option<String>,
}

/// Redshift Data API: asynchronous statement submission against a serverless
/// workgroup, no persistent connection.
pub struct RedshiftDataClient {
    api: AwsApi,
    endpoint: String,
}

impl RedshiftDataClient {
    pub fn new(api: AwsApi) -> Self {
        let endpoint = format!("https://redshift-data.{}.amazonaws.com", api.region());
        Self { api, endpoint }
    }

    pub fn with_endpoint(api: AwsApi, endpoint: impl Into<String>) -> Self {
        Self {
            api,
            endpoint: endpoint.into(),
        }
    }

    pub async fn execute_statement(
        &self,
        sql: &str,
        workgroup: &str,
        database: &str,
    ) -> Result<String, AwsError> {
        let resp = self
            .api
            .json_target(
                &self.endpoint,
                "redshift-data",
                CONTENT_TYPE,
                "RedshiftData.ExecuteStatement",
                &json!({
                    "WorkgroupName": workgroup,
                    "Database": database,
                    "Sql": sql,
                }),
            )
            .await?;

        let id = resp["Id"]
            .as_str()
            .ok_or_else(|| AwsError::Malformed {
                service: "redshift-data",
                detail: "ExecuteStatement: no Id".into(),
            })?
            .to_string();
        debug!(statement_id = %id, "redshift statement submitted");
        Ok(id)
    }

    pub async fn describe_statement(&self, id: &str) -> Result<StatementStatus, AwsError> {
        let resp = self
            .api
            .json_target(
                &self.endpoint,
                "redshift-data",
                CONTENT_TYPE,
                "RedshiftData.DescribeStatement",
                &json!({ "Id": id }),
            )
            .await?;

        let status = resp["Status"]
            .as_str()
            .ok_or_else(|| AwsError::Malformed {
                service: "redshift-data",
                detail: "DescribeStatement: no Status".into(),
            })?
            .to_string();
        Ok(StatementStatus {
            status,
            result_rows: resp["ResultRows"].as_i64().unwrap_or(0),
            error: resp["Error"].as_str().map(str::to_string),
        })
    }
}
