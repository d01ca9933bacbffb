use async_trait::async_trait;
use lethe_domain::{PartitionKey, SubjectHash};

use crate::error::LakeError;

// ── Query engine ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryHandle(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryState {
    Running,
    Succeeded,
    Failed(String),
    Cancelled(String),
}

/// The catalog-backed query engine over the curated dataset. Submission is
/// asynchronous; callers poll [`QueryEngine::query_state`] to a terminal
/// state. The two query shapes the orchestrator needs are expressed as
/// operations so the engine owns its own query text; the validated
/// [`SubjectHash`] is the only value ever interpolated.
#[async_trait]
pub trait QueryEngine: Send + Sync + 'static {
    /// The distinct `(year, month, day)` partitions holding rows for the
    /// subject.
    async fn submit_partition_scan(&self, subject: &SubjectHash)
        -> Result<QueryHandle, LakeError>;

    /// A staging rewrite of one partition: everything except the subject's
    /// rows, written as a new file set under the staging table's location.
    async fn submit_partition_rewrite(
        &self,
        partition: &PartitionKey,
        staging_table: &str,
        exclude: &SubjectHash,
    ) -> Result<QueryHandle, LakeError>;

    async fn query_state(&self, handle: &QueryHandle) -> Result<QueryState, LakeError>;

    /// All data rows of a succeeded query, header row already removed.
    async fn fetch_rows(&self, handle: &QueryHandle) -> Result<Vec<Vec<String>>, LakeError>;
}

// ── Object store ──────────────────────────────────────────────────────────────

/// The curated bucket. Keys are bucket-relative; the orchestrator only
/// touches the `curated/` and `temp-erasure/` prefixes.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, LakeError>;

    /// Batched delete; returns the number of keys submitted.
    async fn delete_all(&self, keys: &[String]) -> Result<usize, LakeError>;

    async fn copy(&self, from: &str, to: &str) -> Result<(), LakeError>;

    async fn delete(&self, key: &str) -> Result<(), LakeError>;
}

// ── Warehouse ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementHandle(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementState {
    Running,
    Finished { rows_affected: i64 },
    Failed(String),
    Aborted(String),
}

/// The analytical warehouse. One operation: delete every row belonging to a
/// subject. Submission is asynchronous with polled completion.
#[async_trait]
pub trait Warehouse: Send + Sync + 'static {
    async fn submit_subject_delete(
        &self,
        subject: &SubjectHash,
    ) -> Result<StatementHandle, LakeError>;

    async fn statement_state(&self, handle: &StatementHandle)
        -> Result<StatementState, LakeError>;
}

// ── Catalog ───────────────────────────────────────────────────────────────────

/// Catalog cleanup: dropping the staging table entries CTAS leaves behind.
#[async_trait]
pub trait Catalog: Send + Sync + 'static {
    async fn drop_staging_table(&self, table: &str) -> Result<(), LakeError>;
}
