use thiserror::Error;

#[derive(Debug, Error)]
pub enum LakeError {
    #[error(transparent)]
    Aws(#[from] lethe_aws::AwsError),

    #[error("query engine: {0}")]
    Engine(String),

    #[error("object store: {0}")]
    ObjectStore(String),

    #[error("warehouse: {0}")]
    Warehouse(String),

    #[error("catalog: {0}")]
    Catalog(String),
}
