use serde_json::{json, Value};

use crate::api::AwsApi;
use crate::error::AwsError;

const CONTENT_TYPE: &str = "application/x-amz-json-1.0";
const TARGET_PREFIX: &str = "DynamoDBStreams_20120810";

/// One change record: the mutation kind plus the item images the stream was
/// configured to carry (`NEW_AND_OLD_IMAGES` for the request log).
#[derive(Debug, Clone)]
pub struct StreamRecord {
    /// `INSERT | MODIFY | REMOVE`.
    pub event_name: String,
    pub new_image: Option<Value>,
    pub old_image: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct RecordsPage {
    pub records: Vec<StreamRecord>,
    /// `None` when the shard is closed and fully drained.
    pub next_iterator: Option<String>,
}

/// DynamoDB Streams client: the commit-ordered change feed of a table.
pub struct DynamoStreamsClient {
    api: AwsApi,
    endpoint: String,
}

impl DynamoStreamsClient {
    pub fn new(api: AwsApi) -> Self {
        let endpoint = format!("https://streams.dynamodb.{}.amazonaws.com", api.region());
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

    /// Shard ids currently present on the stream, oldest first.
    pub async fn list_shards(&self, stream_arn: &str) -> Result<Vec<String>, AwsError> {
        let resp = self
            .call("DescribeStream", &json!({ "StreamArn": stream_arn }))
            .await?;
        let empty = Vec::new();
        Ok(resp["StreamDescription"]["Shards"]
            .as_array()
            .unwrap_or(&empty)
            .iter()
            .filter_map(|s| s["ShardId"].as_str().map(str::to_string))
            .collect())
    }

    /// `iterator_type` is `LATEST` or `TRIM_HORIZON`.
    pub async fn shard_iterator(
        &self,
        stream_arn: &str,
        shard_id: &str,
        iterator_type: &str,
    ) -> Result<String, AwsError> {
        let resp = self
            .call(
                "GetShardIterator",
                &json!({
                    "StreamArn": stream_arn,
                    "ShardId": shard_id,
                    "ShardIteratorType": iterator_type,
                }),
            )
            .await?;
        resp["ShardIterator"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AwsError::Malformed {
                service: "dynamodb",
                detail: "GetShardIterator: no ShardIterator".into(),
            })
    }

    pub async fn get_records(&self, iterator: &str) -> Result<RecordsPage, AwsError> {
        let resp = self
            .call("GetRecords", &json!({ "ShardIterator": iterator }))
            .await?;

        let empty = Vec::new();
        let records = resp["Records"]
            .as_array()
            .unwrap_or(&empty)
            .iter()
            .map(|r| StreamRecord {
                event_name: r["eventName"].as_str().unwrap_or("").to_string(),
                new_image: r["dynamodb"]
                    .get("NewImage")
                    .filter(|v| v.is_object())
                    .cloned(),
                old_image: r["dynamodb"]
                    .get("OldImage")
                    .filter(|v| v.is_object())
                    .cloned(),
            })
            .collect();

        Ok(RecordsPage {
            records,
            next_iterator: resp["NextShardIterator"].as_str().map(str::to_string),
        })
    }
}
