use serde_json::{json, Value};

use crate::api::AwsApi;
use crate::error::AwsError;

const CONTENT_TYPE: &str = "application/x-amz-json-1.0";
const TARGET_PREFIX: &str = "DynamoDB_20120810";

/// DynamoDB low-level client. Items are raw attribute-value maps
/// (`{"request_id": {"S": "..."}}`); marshalling to domain types belongs to
/// the store layer.
pub struct DynamoDbClient {
    api: AwsApi,
    endpoint: String,
}

impl DynamoDbClient {
    pub fn new(api: AwsApi) -> Self {
        let endpoint = format!("https://dynamodb.{}.amazonaws.com", api.region());
        Self { api, endpoint }
    }

    pub fn with_endpoint(api: AwsApi, endpoint: impl Into<String>) -> Self {
        Self {
            api,
            endpoint: endpoint.into(),
        }
    }

    async fn call(&self, action: &str, body: &Value) -> Result<Value, AwsError> {
        self.api
            .json_target(
                &self.endpoint,
                "dynamodb",
                CONTENT_TYPE,
                &format!("{}.{}", TARGET_PREFIX, action),
                body,
            )
            .await
    }

    pub async fn put_item(
        &self,
        table: &str,
        item: &Value,
        condition_expression: Option<&str>,
    ) -> Result<(), AwsError> {
        let mut body = json!({ "TableName": table, "Item": item });
        if let Some(cond) = condition_expression {
            body["ConditionExpression"] = json!(cond);
        }
        self.call("PutItem", &body).await?;
        Ok(())
    }

    /// Strongly consistent read; `None` when the key does not exist.
    pub async fn get_item(&self, table: &str, key: &Value) -> Result<Option<Value>, AwsError> {
        let resp = self
            .call(
                "GetItem",
                &json!({ "TableName": table, "Key": key, "ConsistentRead": true }),
            )
            .await?;
        match resp.get("Item") {
            Some(item) if item.is_object() => Ok(Some(item.clone())),
            _ => Ok(None),
        }
    }

    /// Conditional update returning the full new image.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_item(
        &self,
        table: &str,
        key: &Value,
        update_expression: &str,
        condition_expression: Option<&str>,
        expression_names: &Value,
        expression_values: &Value,
    ) -> Result<Value, AwsError> {
        let mut body = json!({
            "TableName": table,
            "Key": key,
            "UpdateExpression": update_expression,
            "ExpressionAttributeNames": expression_names,
            "ExpressionAttributeValues": expression_values,
            "ReturnValues": "ALL_NEW",
        });
        if let Some(cond) = condition_expression {
            body["ConditionExpression"] = json!(cond);
        }
        let resp = self.call("UpdateItem", &body).await?;
        resp.get("Attributes")
            .filter(|a| a.is_object())
            .cloned()
            .ok_or_else(|| AwsError::Malformed {
                service: "dynamodb",
                detail: "UpdateItem: no Attributes in ALL_NEW response".into(),
            })
    }

    /// Query a secondary index to exhaustion, following `LastEvaluatedKey`.
    pub async fn query_index(
        &self,
        table: &str,
        index: &str,
        key_condition: &str,
        expression_names: &Value,
        expression_values: &Value,
    ) -> Result<Vec<Value>, AwsError> {
        let mut items = Vec::new();
        let mut start_key: Option<Value> = None;

        loop {
            let mut body = json!({
                "TableName": table,
                "IndexName": index,
                "KeyConditionExpression": key_condition,
                "ExpressionAttributeNames": expression_names,
                "ExpressionAttributeValues": expression_values,
            });
            if let Some(k) = &start_key {
                body["ExclusiveStartKey"] = k.clone();
            }

            let resp = self.call("Query", &body).await?;
            if let Some(page) = resp["Items"].as_array() {
                items.extend(page.iter().cloned());
            }
            match resp.get("LastEvaluatedKey") {
                Some(k) if k.is_object() => start_key = Some(k.clone()),
                _ => break,
            }
        }
        Ok(items)
    }

    /// The table's change-stream ARN, when streams are enabled.
    pub async fn stream_arn(&self, table: &str) -> Result<Option<String>, AwsError> {
        let resp = self
            .call("DescribeTable", &json!({ "TableName": table }))
            .await?;
        Ok(resp["Table"]["LatestStreamArn"].as_str().map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::test_api;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn update_item_returns_new_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-amz-target", "DynamoDB_20120810.UpdateItem"))
            .and(body_partial_json(serde_json::json!({
                "ReturnValues": "ALL_NEW",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"Attributes":{"request_id":{"S":"req-1"},"status":{"S":"PROCESSING"}}}"#,
            ))
            .mount(&server)
            .await;

        let client = DynamoDbClient::with_endpoint(test_api(), server.uri());
        let image = client
            .update_item(
                "erasure-requests",
                &json!({"request_id": {"S": "req-1"}}),
                "SET #status = :status",
                Some("#status = :expected"),
                &json!({"#status": "status"}),
                &json!({":status": {"S": "PROCESSING"}, ":expected": {"S": "APPROVED"}}),
            )
            .await
            .unwrap();
        assert_eq!(image["status"]["S"], "PROCESSING");
    }

    #[tokio::test]
    async fn conditional_failure_keeps_exception_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                r#"{"__type":"com.amazonaws.dynamodb.v20120810#ConditionalCheckFailedException","message":"The conditional request failed"}"#,
            ))
            .mount(&server)
            .await;

        let client = DynamoDbClient::with_endpoint(test_api(), server.uri());
        let err = client
            .update_item(
                "erasure-requests",
                &json!({"request_id": {"S": "req-1"}}),
                "SET #status = :status",
                Some("#status = :expected"),
                &json!({"#status": "status"}),
                &json!({":status": {"S": "PROCESSING"}}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("ConditionalCheckFailedException"));
    }

    #[tokio::test]
    async fn get_item_maps_missing_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"ConsistentRead": true})))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let client = DynamoDbClient::with_endpoint(test_api(), server.uri());
        let item = client
            .get_item(
                "erasure-requests",
                &json!({"request_id": {"S": "missing"}}),
            )
            .await
            .unwrap();
        assert!(item.is_none());
    }

    #[tokio::test]
    async fn query_index_follows_last_evaluated_key() {
        let server = MockServer::start().await;

        let page1 = r#"{
            "Items": [ {"request_id": {"S": "req-1"}} ],
            "LastEvaluatedKey": {"request_id": {"S": "req-1"}}
        }"#;
        let page2 = r#"{ "Items": [ {"request_id": {"S": "req-2"}} ] }"#;

        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "ExclusiveStartKey": {"request_id": {"S": "req-1"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(page2))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page1))
            .mount(&server)
            .await;

        let client = DynamoDbClient::with_endpoint(test_api(), server.uri());
        let items = client
            .query_index(
                "erasure-requests",
                "status-index",
                "#status = :s",
                &json!({"#status": "status"}),
                &json!({":s": {"S": "PENDING"}}),
            )
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
    }
}
