use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use lethe_domain::{PartitionKey, SubjectHash};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::LakeError;
use crate::traits::{
    Catalog, ObjectStore, QueryEngine, QueryHandle, QueryState, StatementHandle, StatementState,
    Warehouse,
};

/// One logical row of the curated dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LakeRow {
    pub patient_id_hash: String,
    pub partition: PartitionKey,
    pub payload: String,
}

impl LakeRow {
    pub fn new(
        patient_id_hash: impl Into<String>,
        partition: PartitionKey,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            patient_id_hash: patient_id_hash.into(),
            partition,
            payload: payload.into(),
        }
    }
}

struct QueryRecord {
    state: QueryState,
    rows: Vec<Vec<String>>,
}

#[derive(Default)]
struct State {
    /// Object key → rows held by that file.
    objects: BTreeMap<String, Vec<LakeRow>>,
    /// Staging table name → staging prefix.
    staging_tables: HashMap<String, String>,
    /// One entry per warehouse row: the row's subject hash.
    warehouse: Vec<String>,
    queries: HashMap<String, QueryRecord>,
    statements: HashMap<String, StatementState>,
    next_id: u64,
    fail_staging: HashSet<PartitionKey>,
    fail_swap_prefixes: HashSet<String>,
    fail_warehouse: bool,
    fail_catalog: bool,
}

/// An in-memory stand-in for the whole data plane: dataset objects, staging
/// tables, warehouse rows, queries and statements. Queries execute eagerly at
/// submission and park their terminal state for the poller, which keeps the
/// orchestrator's polling paths honest without a real engine.
///
/// Fault injection covers the failure modes the pipeline must survive:
/// a partition whose staging query fails, a partition whose destination swap
/// fails, a failing warehouse statement, and failing catalog cleanup.
#[derive(Clone, Default)]
pub struct LocalLake {
    inner: Arc<Mutex<State>>,
}

impl LocalLake {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Seeding ───────────────────────────────────────────────────────────────

    /// Create one dataset object under the partition's live prefix.
    pub async fn seed_partition_object(
        &self,
        partition: &PartitionKey,
        file: &str,
        rows: Vec<LakeRow>,
    ) {
        let key = format!("{}{}", partition.dest_prefix(), file);
        self.inner.lock().await.objects.insert(key, rows);
    }

    pub async fn seed_warehouse_rows(&self, subject_hash: &str, count: usize) {
        let mut guard = self.inner.lock().await;
        for _ in 0..count {
            guard.warehouse.push(subject_hash.to_string());
        }
    }

    // ── Fault injection ───────────────────────────────────────────────────────

    pub async fn fail_staging_for(&self, partition: &PartitionKey) {
        self.inner.lock().await.fail_staging.insert(partition.clone());
    }

    pub async fn fail_swap_for(&self, partition: &PartitionKey) {
        self.inner
            .lock()
            .await
            .fail_swap_prefixes
            .insert(partition.dest_prefix());
    }

    pub async fn fail_warehouse(&self) {
        self.inner.lock().await.fail_warehouse = true;
    }

    pub async fn fail_catalog_cleanup(&self) {
        self.inner.lock().await.fail_catalog = true;
    }

    /// Reset every injected fault. Data, staging tables and orphaned objects
    /// are left exactly as they are, which is what a retried request sees.
    pub async fn clear_failures(&self) {
        let mut guard = self.inner.lock().await;
        guard.fail_staging.clear();
        guard.fail_swap_prefixes.clear();
        guard.fail_warehouse = false;
        guard.fail_catalog = false;
    }

    // ── Inspection ────────────────────────────────────────────────────────────

    pub async fn object_keys(&self, prefix: &str) -> Vec<String> {
        let guard = self.inner.lock().await;
        guard
            .objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Every row currently stored under the partition's live prefix.
    pub async fn partition_rows(&self, partition: &PartitionKey) -> Vec<LakeRow> {
        let prefix = partition.dest_prefix();
        let guard = self.inner.lock().await;
        guard
            .objects
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .flat_map(|(_, rows)| rows.iter().cloned())
            .collect()
    }

    pub async fn subject_rows_in_partition(
        &self,
        partition: &PartitionKey,
        subject_hash: &str,
    ) -> usize {
        self.partition_rows(partition)
            .await
            .iter()
            .filter(|r| r.patient_id_hash == subject_hash)
            .count()
    }

    pub async fn warehouse_rows(&self, subject_hash: &str) -> usize {
        let guard = self.inner.lock().await;
        guard
            .warehouse
            .iter()
            .filter(|h| h.as_str() == subject_hash)
            .count()
    }

    pub async fn staging_table_names(&self) -> Vec<String> {
        let guard = self.inner.lock().await;
        let mut names: Vec<String> = guard.staging_tables.keys().cloned().collect();
        names.sort();
        names
    }

    fn fresh_id(state: &mut State, kind: &str) -> String {
        state.next_id += 1;
        format!("local-{}-{}", kind, state.next_id)
    }
}

// ── QueryEngine ───────────────────────────────────────────────────────────────

#[async_trait]
impl QueryEngine for LocalLake {
    async fn submit_partition_scan(
        &self,
        subject: &SubjectHash,
    ) -> Result<QueryHandle, LakeError> {
        let mut guard = self.inner.lock().await;
        let mut partitions: Vec<PartitionKey> = guard
            .objects
            .iter()
            .filter(|(k, _)| k.starts_with("curated/"))
            .flat_map(|(_, rows)| rows.iter())
            .filter(|r| r.patient_id_hash == subject.as_str())
            .map(|r| r.partition.clone())
            .collect();
        partitions.sort();
        partitions.dedup();

        let rows = partitions
            .into_iter()
            .map(|p| vec![p.year, p.month, p.day])
            .collect();

        let id = Self::fresh_id(&mut guard, "query");
        guard.queries.insert(
            id.clone(),
            QueryRecord {
                state: QueryState::Succeeded,
                rows,
            },
        );
        Ok(QueryHandle(id))
    }

    async fn submit_partition_rewrite(
        &self,
        partition: &PartitionKey,
        staging_table: &str,
        exclude: &SubjectHash,
    ) -> Result<QueryHandle, LakeError> {
        let mut guard = self.inner.lock().await;
        let id = Self::fresh_id(&mut guard, "query");

        if guard.fail_staging.contains(partition) {
            guard.queries.insert(
                id.clone(),
                QueryRecord {
                    state: QueryState::Failed("injected staging failure".into()),
                    rows: Vec::new(),
                },
            );
            return Ok(QueryHandle(id));
        }

        let dest_prefix = partition.dest_prefix();
        let surviving: Vec<LakeRow> = guard
            .objects
            .iter()
            .filter(|(k, _)| k.starts_with(&dest_prefix))
            .flat_map(|(_, rows)| rows.iter())
            .filter(|r| r.patient_id_hash != exclude.as_str())
            .cloned()
            .collect();

        let staging_prefix = PartitionKey::staging_prefix(staging_table);
        // An empty result writes no files, matching engine behavior.
        if !surviving.is_empty() {
            let key = format!("{}part-00000.snappy.parquet", staging_prefix);
            guard.objects.insert(key, surviving);
        }
        guard
            .staging_tables
            .insert(staging_table.to_string(), staging_prefix);

        debug!(partition = %partition, staging_table, "local rewrite staged");
        guard.queries.insert(
            id.clone(),
            QueryRecord {
                state: QueryState::Succeeded,
                rows: Vec::new(),
            },
        );
        Ok(QueryHandle(id))
    }

    async fn query_state(&self, handle: &QueryHandle) -> Result<QueryState, LakeError> {
        let guard = self.inner.lock().await;
        guard
            .queries
            .get(&handle.0)
            .map(|q| q.state.clone())
            .ok_or_else(|| LakeError::Engine(format!("unknown query {}", handle.0)))
    }

    async fn fetch_rows(&self, handle: &QueryHandle) -> Result<Vec<Vec<String>>, LakeError> {
        let guard = self.inner.lock().await;
        guard
            .queries
            .get(&handle.0)
            .map(|q| q.rows.clone())
            .ok_or_else(|| LakeError::Engine(format!("unknown query {}", handle.0)))
    }
}

// ── ObjectStore ───────────────────────────────────────────────────────────────

#[async_trait]
impl ObjectStore for LocalLake {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, LakeError> {
        Ok(self.object_keys(prefix).await)
    }

    async fn delete_all(&self, keys: &[String]) -> Result<usize, LakeError> {
        let mut guard = self.inner.lock().await;
        for key in keys {
            guard.objects.remove(key);
        }
        Ok(keys.len())
    }

    async fn copy(&self, from: &str, to: &str) -> Result<(), LakeError> {
        let mut guard = self.inner.lock().await;
        if guard
            .fail_swap_prefixes
            .iter()
            .any(|p| to.starts_with(p.as_str()))
        {
            return Err(LakeError::ObjectStore("injected copy failure".into()));
        }
        let rows = guard
            .objects
            .get(from)
            .cloned()
            .ok_or_else(|| LakeError::ObjectStore(format!("no such key: {}", from)))?;
        guard.objects.insert(to.to_string(), rows);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), LakeError> {
        self.inner.lock().await.objects.remove(key);
        Ok(())
    }
}

// ── Warehouse ─────────────────────────────────────────────────────────────────

#[async_trait]
impl Warehouse for LocalLake {
    async fn submit_subject_delete(
        &self,
        subject: &SubjectHash,
    ) -> Result<StatementHandle, LakeError> {
        let mut guard = self.inner.lock().await;
        let id = Self::fresh_id(&mut guard, "stmt");

        let state = if guard.fail_warehouse {
            StatementState::Failed("injected warehouse failure".into())
        } else {
            let before = guard.warehouse.len();
            guard.warehouse.retain(|h| h != subject.as_str());
            StatementState::Finished {
                rows_affected: (before - guard.warehouse.len()) as i64,
            }
        };
        guard.statements.insert(id.clone(), state);
        Ok(StatementHandle(id))
    }

    async fn statement_state(
        &self,
        handle: &StatementHandle,
    ) -> Result<StatementState, LakeError> {
        let guard = self.inner.lock().await;
        guard
            .statements
            .get(&handle.0)
            .cloned()
            .ok_or_else(|| LakeError::Warehouse(format!("unknown statement {}", handle.0)))
    }
}

// ── Catalog ───────────────────────────────────────────────────────────────────

#[async_trait]
impl Catalog for LocalLake {
    async fn drop_staging_table(&self, table: &str) -> Result<(), LakeError> {
        let mut guard = self.inner.lock().await;
        if guard.fail_catalog {
            return Err(LakeError::Catalog("injected catalog failure".into()));
        }
        guard.staging_tables.remove(table);
        Ok(())
    }
}
