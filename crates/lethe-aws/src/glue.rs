use serde_json::json;

use crate::api::AwsApi;
use crate::error::AwsError;

const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// The slice of the Glue catalog API the orchestrator needs: dropping the
/// temporary table entries left behind by staging queries.
pub struct GlueClient {
    api: AwsApi,
    endpoint: String,
}

impl GlueClient {
    pub fn new(api: AwsApi) -> Self {
        let endpoint = format!("https://glue.{}.amazonaws.com", api.region());
        Self { api, endpoint }
    }

    pub fn with_endpoint(api: AwsApi, endpoint: impl Into<String>) -> Self {
        Self {
            api,
            endpoint: endpoint.into(),
        }
    }

    pub async fn delete_table(&self, database: &str, table: &str) -> Result<(), AwsError> {
        self.api
            .json_target(
                &self.endpoint,
                "glue",
                CONTENT_TYPE,
                "AWSGlue.DeleteTable",
                &json!({ "DatabaseName": database, "Name": table }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::test_api;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn delete_table_targets_glue() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-amz-target", "AWSGlue.DeleteTable"))
            .and(body_partial_json(serde_json::json!({
                "DatabaseName": "health_db",
                "Name": "temp_erasure_2025_01_15_1700000000000",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = GlueClient::with_endpoint(test_api(), server.uri());
        client
            .delete_table("health_db", "temp_erasure_2025_01_15_1700000000000")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_table_surfaces_entity_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                r#"{"__type":"EntityNotFoundException","message":"Table not found"}"#,
            ))
            .mount(&server)
            .await;

        let client = GlueClient::with_endpoint(test_api(), server.uri());
        let err = client.delete_table("health_db", "gone").await.unwrap_err();
        assert_eq!(err.code(), Some("EntityNotFoundException"));
    }
}
