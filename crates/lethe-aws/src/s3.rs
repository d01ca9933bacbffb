use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use md5::{Digest as _, Md5};
use reqwest::Method;
use tracing::debug;

use crate::api::AwsApi;
use crate::error::AwsError;
use crate::sign::uri_encode;
use crate::xml::{xml_all_texts, xml_text};

/// Batched delete limit imposed by the DeleteObjects API.
pub const DELETE_BATCH_MAX: usize = 1000;

pub struct S3Client {
    api: AwsApi,
    endpoint: String,
}

impl S3Client {
    /// Path-style addressing against the regional endpoint; object keys are
    /// appended as `/{bucket}/{key}`.
    pub fn new(api: AwsApi) -> Self {
        let endpoint = format!("https://s3.{}.amazonaws.com", api.region());
        Self { api, endpoint }
    }

    pub fn with_endpoint(api: AwsApi, endpoint: impl Into<String>) -> Self {
        Self {
            api,
            endpoint: endpoint.into(),
        }
    }

    /// List every key under `prefix`, following continuation tokens.
    pub async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, AwsError> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut query: Vec<(&str, String)> = vec![
                ("list-type", "2".to_string()),
                ("prefix", prefix.to_string()),
            ];
            if let Some(t) = &token {
                query.push(("continuation-token", t.clone()));
            }

            let body = self
                .api
                .rest(
                    "s3",
                    Method::GET,
                    &self.endpoint,
                    &format!("/{}", bucket),
                    &query,
                    &[],
                    None,
                    Vec::new(),
                )
                .await?;

            keys.extend(xml_all_texts(&body, "Key"));

            let truncated = xml_text(&body, "IsTruncated").as_deref() == Some("true");
            token = xml_text(&body, "NextContinuationToken");
            if !truncated || token.is_none() {
                break;
            }
        }

        debug!(bucket, prefix, count = keys.len(), "listed objects");
        Ok(keys)
    }

    /// Delete the given keys in batches of up to [`DELETE_BATCH_MAX`].
    /// Returns the number of keys submitted for deletion.
    pub async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<usize, AwsError> {
        for chunk in keys.chunks(DELETE_BATCH_MAX) {
            let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Delete>"#);
            for key in chunk {
                xml.push_str("<Object><Key>");
                xml.push_str(&xml_escape(key));
                xml.push_str("</Key></Object>");
            }
            xml.push_str("<Quiet>true</Quiet></Delete>");
            let body = xml.into_bytes();

            let md5 = BASE64.encode(Md5::digest(&body));
            let extra = [("content-md5", md5)];

            let resp = self
                .api
                .rest(
                    "s3",
                    Method::POST,
                    &self.endpoint,
                    &format!("/{}", bucket),
                    &[("delete", String::new())],
                    &extra,
                    Some("application/xml"),
                    body,
                )
                .await?;

            // Quiet mode reports only the keys that failed; any <Code> in the
            // body is a per-key failure inside a 200 response.
            if let Some(code) = xml_text(&resp, "Code") {
                return Err(AwsError::Api {
                    service: "s3",
                    code,
                    message: xml_text(&resp, "Message")
                        .unwrap_or_else(|| "batch delete partially failed".into()),
                });
            }
        }
        Ok(keys.len())
    }

    /// Server-side copy within (or across) buckets.
    pub async fn copy_object(
        &self,
        bucket: &str,
        source_key: &str,
        dest_key: &str,
    ) -> Result<(), AwsError> {
        let source = uri_encode(&format!("/{}/{}", bucket, source_key), true);
        let extra = [("x-amz-copy-source", source)];
        let resp = self
            .api
            .rest(
                "s3",
                Method::PUT,
                &self.endpoint,
                &format!("/{}/{}", bucket, dest_key),
                &[],
                &extra,
                None,
                Vec::new(),
            )
            .await?;

        // CopyObject reports some failures inside a 200 body.
        if resp.contains("<Error>") {
            return Err(AwsError::Api {
                service: "s3",
                code: xml_text(&resp, "Code").unwrap_or_else(|| "Unknown".into()),
                message: xml_text(&resp, "Message").unwrap_or_else(|| "copy failed".into()),
            });
        }
        Ok(())
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), AwsError> {
        self.api
            .rest(
                "s3",
                Method::DELETE,
                &self.endpoint,
                &format!("/{}/{}", bucket, key),
                &[],
                &[],
                None,
                Vec::new(),
            )
            .await?;
        Ok(())
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::test_api;
    use wiremock::matchers::{header_exists, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn list_objects_follows_continuation_tokens() {
        let server = MockServer::start().await;

        let page1 = r#"<ListBucketResult>
            <IsTruncated>true</IsTruncated>
            <NextContinuationToken>tok-2</NextContinuationToken>
            <Contents><Key>curated/year=2025/month=01/day=15/a.parquet</Key></Contents>
        </ListBucketResult>"#;
        let page2 = r#"<ListBucketResult>
            <IsTruncated>false</IsTruncated>
            <Contents><Key>curated/year=2025/month=01/day=15/b.parquet</Key></Contents>
        </ListBucketResult>"#;

        Mock::given(method("GET"))
            .and(path("/curated-bucket"))
            .and(query_param_is_missing("continuation-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page1))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/curated-bucket"))
            .and(query_param("continuation-token", "tok-2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page2))
            .mount(&server)
            .await;

        let s3 = S3Client::with_endpoint(test_api(), server.uri());
        let keys = s3
            .list_objects("curated-bucket", "curated/year=2025/month=01/day=15/")
            .await
            .unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys[1].ends_with("b.parquet"));
    }

    #[tokio::test]
    async fn delete_objects_sends_md5_and_reports_count() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/curated-bucket"))
            .and(query_param("delete", ""))
            .and(header_exists("content-md5"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<DeleteResult/>"))
            .expect(1)
            .mount(&server)
            .await;

        let s3 = S3Client::with_endpoint(test_api(), server.uri());
        let n = s3
            .delete_objects(
                "curated-bucket",
                &["a.parquet".to_string(), "b.parquet".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(n, 2);
    }

    #[tokio::test]
    async fn delete_objects_surfaces_per_key_failures() {
        let server = MockServer::start().await;
        let body = r#"<DeleteResult>
            <Error><Key>a.parquet</Key><Code>AccessDenied</Code><Message>denied</Message></Error>
        </DeleteResult>"#;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let s3 = S3Client::with_endpoint(test_api(), server.uri());
        let err = s3
            .delete_objects("curated-bucket", &["a.parquet".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("AccessDenied"));
    }

    #[tokio::test]
    async fn copy_object_sets_encoded_copy_source() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(header_exists("x-amz-copy-source"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<CopyObjectResult><ETag>etag</ETag></CopyObjectResult>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let s3 = S3Client::with_endpoint(test_api(), server.uri());
        s3.copy_object(
            "curated-bucket",
            "temp-erasure/t1/part-0.parquet",
            "curated/year=2025/month=01/day=15/part-0.parquet",
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn copy_object_detects_error_in_200_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<Error><Code>InternalError</Code><Message>try again</Message></Error>",
            ))
            .mount(&server)
            .await;

        let s3 = S3Client::with_endpoint(test_api(), server.uri());
        let err = s3.copy_object("b", "src", "dst").await.unwrap_err();
        assert_eq!(err.code(), Some("InternalError"));
    }

    #[tokio::test]
    async fn delete_object_issues_delete() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let s3 = S3Client::with_endpoint(test_api(), server.uri());
        s3.delete_object("curated-bucket", "temp-erasure/t1/part-0.parquet")
            .await
            .unwrap();
    }
}
