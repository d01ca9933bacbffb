use serde_json::json;
use tracing::debug;

use crate::api::AwsApi;
use crate::error::AwsError;

const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

#[derive(Debug, Clone)]
pub struct QueryExecutionStatus {
    /// `QUEUED | RUNNING | SUCCEEDED | FAILED | CANCELLED`.
    pub state: String,
    pub state_change_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResultsPage {
    pub rows: Vec<Vec<String>>,
    pub next_token: Option<String>,
}

pub struct AthenaClient {
    api: AwsApi,
    endpoint: String,
}

impl AthenaClient {
    pub fn new(api: AwsApi) -> Self {
        let endpoint = format!("https://athena.{}.amazonaws.com", api.region());
        Self { api, endpoint }
    }

    pub fn with_endpoint(api: AwsApi, endpoint: impl Into<String>) -> Self {
        Self {
            api,
            endpoint: endpoint.into(),
        }
    }

    /// Submit a query; result location and encryption come from the workgroup.
    pub async fn start_query_execution(
        &self,
        sql: &str,
        workgroup: &str,
    ) -> Result<String, AwsError> {
        let resp = self
            .api
            .json_target(
                &self.endpoint,
                "athena",
                CONTENT_TYPE,
                "AmazonAthena.StartQueryExecution",
                &json!({ "QueryString": sql, "WorkGroup": workgroup }),
            )
            .await?;

        let id = resp["QueryExecutionId"]
            .as_str()
            .ok_or_else(|| AwsError::Malformed {
                service: "athena",
                detail: "StartQueryExecution: no QueryExecutionId".into(),
            })?
            .to_string();
        debug!(execution_id = %id, "athena query submitted");
        Ok(id)
    }

    pub async fn get_query_execution(
        &self,
        execution_id: &str,
    ) -> Result<QueryExecutionStatus, AwsError> {
        let resp = self
            .api
            .json_target(
                &self.endpoint,
                "athena",
                CONTENT_TYPE,
                "AmazonAthena.GetQueryExecution",
                &json!({ "QueryExecutionId": execution_id }),
            )
            .await?;

        let status = &resp["QueryExecution"]["Status"];
        let state = status["State"]
            .as_str()
            .ok_or_else(|| AwsError::Malformed {
                service: "athena",
                detail: "GetQueryExecution: no Status.State".into(),
            })?
            .to_string();
        Ok(QueryExecutionStatus {
            state,
            state_change_reason: status["StateChangeReason"].as_str().map(str::to_string),
        })
    }

    /// Fetch one page of results. Every cell is its `VarCharValue`, missing
    /// values becoming empty strings. Header handling belongs to the caller:
    /// the engine includes the column-header row only in the first page.
    pub async fn get_query_results(
        &self,
        execution_id: &str,
        next_token: Option<&str>,
    ) -> Result<ResultsPage, AwsError> {
        let mut body = json!({ "QueryExecutionId": execution_id });
        if let Some(token) = next_token {
            body["NextToken"] = json!(token);
        }

        let resp = self
            .api
            .json_target(
                &self.endpoint,
                "athena",
                CONTENT_TYPE,
                "AmazonAthena.GetQueryResults",
                &body,
            )
            .await?;

        let empty = Vec::new();
        let rows = resp["ResultSet"]["Rows"]
            .as_array()
            .unwrap_or(&empty)
            .iter()
            .map(|row| {
                row["Data"]
                    .as_array()
                    .unwrap_or(&empty)
                    .iter()
                    .map(|col| col["VarCharValue"].as_str().unwrap_or("").to_string())
                    .collect()
            })
            .collect();

        Ok(ResultsPage {
            rows,
            next_token: resp["NextToken"].as_str().map(str::to_string),
        })
    }
}
