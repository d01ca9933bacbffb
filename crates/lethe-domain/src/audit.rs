use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{PartitionKey, RequestId};

// ── Per-partition rewrite record ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteOutcome {
    Success,
    Failed,
}

/// The sub-step of the per-partition rewrite protocol that was in flight when
/// a rewrite failed. Recorded so operators can reconcile the partition:
/// anything at or past `ClearDestination` means the destination may be in an
/// intermediate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteSubStep {
    Staging,
    ClearDestination,
    Swap,
    CatalogCleanup,
}

impl std::fmt::Display for RewriteSubStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RewriteSubStep::Staging => "staging",
            RewriteSubStep::ClearDestination => "clear_destination",
            RewriteSubStep::Swap => "swap",
            RewriteSubStep::CatalogCleanup => "catalog_cleanup",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionRewrite {
    pub partition: PartitionKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_files_deleted: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_files_created: Option<usize>,
    pub status: RewriteOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_sub_step: Option<RewriteSubStep>,
}

impl PartitionRewrite {
    pub fn success(partition: PartitionKey, deleted: usize, created: usize) -> Self {
        Self {
            partition,
            original_files_deleted: Some(deleted),
            new_files_created: Some(created),
            status: RewriteOutcome::Success,
            error: None,
            failed_sub_step: None,
        }
    }

    pub fn failed(partition: PartitionKey, sub_step: RewriteSubStep, error: String) -> Self {
        Self {
            partition,
            original_files_deleted: None,
            new_files_created: None,
            status: RewriteOutcome::Failed,
            error: Some(error),
            failed_sub_step: Some(sub_step),
        }
    }
}

// ── Step records ──────────────────────────────────────────────────────────────

/// One entry in the ordered audit trail. The tag value is the step name the
/// document is queried by; counts are always derived by name, never by the
/// position of the record in the sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepRecord {
    FindPartitions {
        partitions_found: usize,
        partitions: Vec<PartitionKey>,
        completed_at: DateTime<Utc>,
    },
    RewritePartitions {
        partitions_rewritten: usize,
        details: Vec<PartitionRewrite>,
        completed_at: DateTime<Utc>,
    },
    WarehouseDelete {
        rows_deleted: i64,
        completed_at: DateTime<Utc>,
    },
}

impl StepRecord {
    pub fn name(&self) -> &'static str {
        match self {
            StepRecord::FindPartitions { .. } => "find_partitions",
            StepRecord::RewritePartitions { .. } => "rewrite_partitions",
            StepRecord::WarehouseDelete { .. } => "warehouse_delete",
        }
    }
}

// ── Audit log document ────────────────────────────────────────────────────────

/// The structured audit document persisted with every significant status
/// transition. Step records appear in invocation order; a document ends with
/// either `completed_at` + `duration_seconds` or `failed_at` + `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    pub request_id: RequestId,
    pub started_at: DateTime<Utc>,
    pub steps: Vec<StepRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditLog {
    pub fn begin(request_id: RequestId, started_at: DateTime<Utc>) -> Self {
        Self {
            request_id,
            started_at,
            steps: Vec::new(),
            completed_at: None,
            duration_seconds: None,
            failed_at: None,
            error: None,
        }
    }

    pub fn record(&mut self, step: StepRecord) {
        self.steps.push(step);
    }

    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.completed_at = Some(now);
        let secs = (now - self.started_at).num_milliseconds() as f64 / 1000.0;
        self.duration_seconds = Some((secs * 100.0).round() / 100.0);
    }

    pub fn fail(&mut self, now: DateTime<Utc>, error: String) {
        self.failed_at = Some(now);
        self.error = Some(error);
    }

    fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.name() == name)
    }

    /// Partition count from the `find_partitions` record, looked up by name.
    pub fn partitions_found(&self) -> Option<usize> {
        match self.step("find_partitions") {
            Some(StepRecord::FindPartitions { partitions_found, .. }) => Some(*partitions_found),
            _ => None,
        }
    }

    /// Successfully rewritten partition count, looked up by name.
    pub fn partitions_rewritten(&self) -> Option<usize> {
        match self.step("rewrite_partitions") {
            Some(StepRecord::RewritePartitions { partitions_rewritten, .. }) => {
                Some(*partitions_rewritten)
            }
            _ => None,
        }
    }

    pub fn warehouse_rows_deleted(&self) -> Option<i64> {
        match self.step("warehouse_delete") {
            Some(StepRecord::WarehouseDelete { rows_deleted, .. }) => Some(*rows_deleted),
            _ => None,
        }
    }

    /// Wire form for the request log's `audit_log` attribute.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
