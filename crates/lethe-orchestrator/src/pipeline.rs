use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lethe_domain::{AuditLog, RequestId, RequestStatus, RewriteOutcome, StepRecord, SubjectHash};
use lethe_lake::{Catalog, ObjectStore, QueryEngine, Warehouse};
use lethe_store::{RequestStore, StatusUpdate, StoreError};
use tracing::{error, info, warn};

use crate::deadline::Deadline;
use crate::error::ErasureError;
use crate::locator;
use crate::metrics::ErasureMetrics;
use crate::rewriter::{self, RewriteContext};
use crate::warehouse;

// ── Tunables ──────────────────────────────────────────────────────────────────

/// Polling and deadline knobs. The defaults mirror the per-call-site budgets
/// of the reference deployment: 300 s for query-engine work, 120 s for the
/// warehouse, 900 s end to end, 2 s between completion polls.
#[derive(Debug, Clone)]
pub struct Tunables {
    pub query_timeout: Duration,
    pub warehouse_timeout: Duration,
    pub request_deadline: Duration,
    pub poll_interval: Duration,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(300),
            warehouse_timeout: Duration::from_secs(120),
            request_deadline: Duration::from_secs(900),
            poll_interval: Duration::from_secs(2),
        }
    }
}

// ── Outcome ───────────────────────────────────────────────────────────────────

/// What became of one dispatched request.
#[derive(Debug, Clone)]
pub enum Outcome {
    Completed {
        partitions_rewritten: usize,
        warehouse_rows_deleted: i64,
        duration_seconds: f64,
    },
    /// Another worker owns the request, or it vanished from the log.
    Skipped { reason: String },
    /// The request reached FAILED; the terminal status is already persisted.
    Failed { code: &'static str, message: String },
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

/// The per-request erasure pipeline: claim, locate, rewrite, delete, record.
/// Holds one client per remote system, built once at startup.
pub struct Orchestrator {
    store: Arc<dyn RequestStore>,
    engine: Arc<dyn QueryEngine>,
    objects: Arc<dyn ObjectStore>,
    warehouse: Arc<dyn Warehouse>,
    catalog: Arc<dyn Catalog>,
    metrics: ErasureMetrics,
    tunables: Tunables,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn RequestStore>,
        engine: Arc<dyn QueryEngine>,
        objects: Arc<dyn ObjectStore>,
        warehouse: Arc<dyn Warehouse>,
        catalog: Arc<dyn Catalog>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            store,
            engine,
            objects,
            warehouse,
            catalog,
            metrics: ErasureMetrics::new(environment),
            tunables: Tunables::default(),
        }
    }

    pub fn with_tunables(mut self, tunables: Tunables) -> Self {
        self.tunables = tunables;
        self
    }

    /// Execute one erasure request end to end. `raw_hash` is the wire value
    /// from the request image and is validated here, at the first point the
    /// orchestrator touches it.
    ///
    /// `Ok` covers every outcome that was recorded in the request log,
    /// including failures; `Err` means the log itself could not be updated.
    pub async fn process(
        &self,
        request_id: &RequestId,
        raw_hash: &str,
    ) -> Result<Outcome, ErasureError> {
        let started = Utc::now();
        let deadline = Deadline::after(self.tunables.request_deadline);
        info!(request_id = %request_id, "processing erasure request");

        // Reject malformed hashes before anything else runs: the request goes
        // straight from APPROVED to FAILED with no data-plane calls.
        let subject = match SubjectHash::parse(raw_hash) {
            Ok(subject) => subject,
            Err(e) => {
                let err = ErasureError::InvalidInput(e.to_string());
                let message = format!("{}: {}", err.code(), err);
                return self
                    .finish_failed(request_id, RequestStatus::Approved, message)
                    .await;
            }
        };

        // Claim: APPROVED → PROCESSING. The conditional write serializes
        // duplicate stream deliveries; the loser observes the conflict and
        // walks away.
        match self
            .store
            .update_status(
                request_id,
                Some(RequestStatus::Approved),
                StatusUpdate::processing(),
            )
            .await
        {
            Ok(_) => {}
            Err(StoreError::StatusConflict { detail, .. }) => {
                info!(request_id = %request_id, detail = %detail, "request already claimed; skipping");
                return Ok(Outcome::Skipped { reason: detail });
            }
            Err(StoreError::RequestNotFound(id)) => {
                warn!(request_id = %id, "request missing from the log; dropping event");
                return Ok(Outcome::Skipped {
                    reason: format!("request not found: {}", id),
                });
            }
            Err(e) => return Err(e.into()),
        }

        let mut audit = AuditLog::begin(request_id.clone(), started);
        let result = self.execute(&subject, &mut audit, &deadline).await;
        let now = Utc::now();

        match result {
            Ok((partitions_rewritten, warehouse_rows_deleted)) => {
                audit.complete(now);
                let duration_seconds = audit.duration_seconds.unwrap_or(0.0);
                self.store
                    .update_status(
                        request_id,
                        Some(RequestStatus::Processing),
                        StatusUpdate::completed(audit.clone(), now),
                    )
                    .await?;
                self.metrics.request_processed();
                self.metrics.duration_seconds(duration_seconds);
                info!(
                    request_id = %request_id,
                    partitions_rewritten,
                    warehouse_rows_deleted,
                    duration_seconds,
                    "erasure request completed"
                );
                Ok(Outcome::Completed {
                    partitions_rewritten,
                    warehouse_rows_deleted,
                    duration_seconds,
                })
            }
            Err(err) => {
                let message = format!("{}: {}", err.code(), err);
                audit.fail(now, message.clone());
                error!(request_id = %request_id, error = %message, "erasure request failed");
                self.store
                    .update_status(
                        request_id,
                        Some(RequestStatus::Processing),
                        StatusUpdate::failed(message.clone(), Some(audit.clone())),
                    )
                    .await?;
                self.metrics.failure();
                Ok(Outcome::Failed {
                    code: err.code(),
                    message,
                })
            }
        }
    }

    /// The three ordered steps. The audit document is filled in as outcomes
    /// are observed, so on failure it already holds everything up to and
    /// including the failed step.
    async fn execute(
        &self,
        subject: &SubjectHash,
        audit: &mut AuditLog,
        deadline: &Deadline,
    ) -> Result<(usize, i64), ErasureError> {
        let partitions = locator::find_affected_partitions(
            self.engine.as_ref(),
            subject,
            &self.tunables,
            deadline,
        )
        .await?;
        audit.record(StepRecord::FindPartitions {
            partitions_found: partitions.len(),
            partitions: partitions.clone(),
            completed_at: Utc::now(),
        });

        let mut partitions_rewritten = 0;
        if partitions.is_empty() {
            info!(subject = subject.abbrev(), "no partitions hold subject rows; skipping rewrite");
        } else {
            let ctx = RewriteContext {
                engine: self.engine.as_ref(),
                objects: self.objects.as_ref(),
                catalog: self.catalog.as_ref(),
                tunables: &self.tunables,
            };
            let mut details = Vec::new();
            let result =
                rewriter::rewrite_partitions(&ctx, subject, &partitions, deadline, &mut details)
                    .await;
            partitions_rewritten = details
                .iter()
                .filter(|d| d.status == RewriteOutcome::Success)
                .count();
            audit.record(StepRecord::RewritePartitions {
                partitions_rewritten,
                details,
                completed_at: Utc::now(),
            });
            result?;
            self.metrics.partitions_rewritten(partitions_rewritten as u64);
        }

        let warehouse_rows_deleted = warehouse::delete_subject_rows(
            self.warehouse.as_ref(),
            subject,
            &self.tunables,
            deadline,
        )
        .await?;
        audit.record(StepRecord::WarehouseDelete {
            rows_deleted: warehouse_rows_deleted,
            completed_at: Utc::now(),
        });

        Ok((partitions_rewritten, warehouse_rows_deleted))
    }

    async fn finish_failed(
        &self,
        request_id: &RequestId,
        expected: RequestStatus,
        message: String,
    ) -> Result<Outcome, ErasureError> {
        match self
            .store
            .update_status(
                request_id,
                Some(expected),
                StatusUpdate::failed(message.clone(), None),
            )
            .await
        {
            Ok(_) => {
                error!(request_id = %request_id, error = %message, "request rejected");
                self.metrics.failure();
                Ok(Outcome::Failed {
                    code: "INVALID_INPUT",
                    message,
                })
            }
            Err(StoreError::StatusConflict { detail, .. }) => {
                Ok(Outcome::Skipped { reason: detail })
            }
            Err(StoreError::RequestNotFound(id)) => Ok(Outcome::Skipped {
                reason: format!("request not found: {}", id),
            }),
            Err(e) => Err(e.into()),
        }
    }
}
