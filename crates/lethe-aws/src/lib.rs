pub mod api;
pub mod athena;
pub mod credentials;
pub mod dynamodb;
pub mod error;
pub mod glue;
pub mod redshift;
pub mod s3;
mod sign;
pub mod streams;
mod xml;

pub use api::AwsApi;
pub use athena::{AthenaClient, QueryExecutionStatus, ResultsPage};
pub use credentials::{AwsCredentials, CredentialsProvider, StaticCredentials, default_chain};
pub use dynamodb::DynamoDbClient;
pub use error::AwsError;
pub use glue::GlueClient;
pub use redshift::{RedshiftDataClient, StatementStatus};
pub use s3::S3Client;
pub use streams::{DynamoStreamsClient, RecordsPage, StreamRecord};
