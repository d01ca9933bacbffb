use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lethe_domain::{AuditLog, ErasureRequest, RequestId, RequestStatus};

use crate::error::StoreError;

// ── Status updates ────────────────────────────────────────────────────────────

/// The payload of a status transition. Only the fields relevant to the target
/// status are populated.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: RequestStatus,
    pub error_message: Option<String>,
    pub audit_log: Option<AuditLog>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StatusUpdate {
    pub fn approved() -> Self {
        Self::bare(RequestStatus::Approved)
    }

    pub fn processing() -> Self {
        Self::bare(RequestStatus::Processing)
    }

    pub fn completed(audit_log: AuditLog, completed_at: DateTime<Utc>) -> Self {
        Self {
            status: RequestStatus::Completed,
            error_message: None,
            audit_log: Some(audit_log),
            completed_at: Some(completed_at),
        }
    }

    pub fn failed(error_message: String, audit_log: Option<AuditLog>) -> Self {
        Self {
            status: RequestStatus::Failed,
            error_message: Some(error_message),
            audit_log,
            completed_at: None,
        }
    }

    fn bare(status: RequestStatus) -> Self {
        Self {
            status,
            error_message: None,
            audit_log: None,
            completed_at: None,
        }
    }
}

// ── Change stream ─────────────────────────────────────────────────────────────

/// One committed mutation of the request log, carrying the new image and,
/// when the mutation was an update, the old one.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub old: Option<ErasureRequest>,
    pub new: ErasureRequest,
}

/// A forward-only feed of [`ChangeEvent`]s in commit order. Delivery is
/// at-least-once; consumers must tolerate duplicates.
#[async_trait]
pub trait ChangeStream: Send + 'static {
    /// The next batch of events. May block on the backend's poll cadence and
    /// may legitimately return an empty batch; an `Err` means the stream is
    /// broken and the consumer should stop.
    async fn next_batch(&mut self) -> Result<Vec<ChangeEvent>, StoreError>;
}

// ── Request store ─────────────────────────────────────────────────────────────

/// The erasure request log. Writes are idempotent at the application
/// layer: a re-issued terminal update whose first attempt already landed
/// converges to success without mutating anything, while a duplicate
/// non-terminal claim is rejected so exactly one worker wins.
#[async_trait]
pub trait RequestStore: Send + Sync + 'static {
    /// Append a new request. The write is durable before the call returns.
    /// Rejects an already-used `request_id` with `DuplicateRequest`.
    async fn put(&self, request: &ErasureRequest) -> Result<(), StoreError>;

    async fn get(&self, id: &RequestId) -> Result<Option<ErasureRequest>, StoreError>;

    /// Conditional compare-and-set transition. When `expected` is given, the
    /// update applies only if the current status matches; terminal statuses
    /// reject every transition regardless. Returns the new image.
    async fn update_status(
        &self,
        id: &RequestId,
        expected: Option<RequestStatus>,
        update: StatusUpdate,
    ) -> Result<ErasureRequest, StoreError>;

    /// Bulk operational query over the status secondary index.
    async fn list_by_status(&self, status: RequestStatus)
        -> Result<Vec<ErasureRequest>, StoreError>;

    /// Open a change stream positioned at the tail of the log.
    async fn subscribe(&self) -> Result<Box<dyn ChangeStream>, StoreError>;
}
