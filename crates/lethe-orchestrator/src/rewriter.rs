//! Partition rewriting: for each affected partition, stage a subject-free
//! file set, then swap it into the live prefix.
//!
//! The destination is never touched before the staging query has reached
//! SUCCEEDED. From that point until the swap finishes the code performs no
//! deadline checks, so the request deadline cannot interrupt a partition
//! that has already lost its destination files.

use chrono::Utc;
use lethe_domain::{PartitionKey, PartitionRewrite, RewriteSubStep, SubjectHash};
use lethe_lake::{Catalog, ObjectStore, QueryEngine};
use tracing::{info, warn};

use crate::deadline::Deadline;
use crate::error::ErasureError;
use crate::pipeline::Tunables;
use crate::wait::{await_query, WaitError};

pub(crate) struct RewriteContext<'a> {
    pub engine: &'a dyn QueryEngine,
    pub objects: &'a dyn ObjectStore,
    pub catalog: &'a dyn Catalog,
    pub tunables: &'a Tunables,
}

struct RewriteFailure {
    sub_step: RewriteSubStep,
    staging_table: String,
    error: ErasureError,
}

/// Rewrite `partitions` sequentially, appending one record per attempted
/// partition to `details`. Aborts on the first failure: earlier partitions
/// stay rewritten (the subject is already gone from them), later ones stay
/// untouched.
pub(crate) async fn rewrite_partitions(
    ctx: &RewriteContext<'_>,
    subject: &SubjectHash,
    partitions: &[PartitionKey],
    deadline: &Deadline,
    details: &mut Vec<PartitionRewrite>,
) -> Result<(), ErasureError> {
    for partition in partitions {
        // Safe interruption point: nothing of this partition is in flight.
        deadline.check("rewrite_partitions")?;

        match rewrite_one(ctx, subject, partition, deadline).await {
            Ok(record) => details.push(record),
            Err(failure) => {
                warn!(
                    partition = %partition,
                    staging_table = %failure.staging_table,
                    sub_step = %failure.sub_step,
                    error = %failure.error,
                    "partition rewrite failed; staging prefix and catalog entry left as cleanup debt"
                );
                details.push(PartitionRewrite::failed(
                    partition.clone(),
                    failure.sub_step,
                    failure.error.to_string(),
                ));
                return Err(failure.error);
            }
        }
    }
    Ok(())
}

async fn rewrite_one(
    ctx: &RewriteContext<'_>,
    subject: &SubjectHash,
    partition: &PartitionKey,
    deadline: &Deadline,
) -> Result<PartitionRewrite, RewriteFailure> {
    let nonce = Utc::now().timestamp_millis();
    let staging_table = partition.staging_table(nonce);
    let staging_prefix = PartitionKey::staging_prefix(&staging_table);
    info!(partition = %partition, staging_table = %staging_table, "rewriting partition");

    let staging = |error: ErasureError| RewriteFailure {
        sub_step: RewriteSubStep::Staging,
        staging_table: staging_table.clone(),
        error,
    };

    // Stage the subject-free file set. Until this succeeds the destination
    // is not touched.
    let handle = ctx
        .engine
        .submit_partition_rewrite(partition, &staging_table, subject)
        .await
        .map_err(|e| {
            staging(ErasureError::RewriteStagingFailed {
                partition: partition.clone(),
                reason: e.to_string(),
            })
        })?;
    // The staging poll is still interruptible, so it honors the request
    // deadline as well as its own budget; whichever was the binding cap
    // names the error.
    let cap = ctx.tunables.query_timeout.min(deadline.remaining());
    await_query(ctx.engine, &handle, cap, ctx.tunables.poll_interval)
        .await
        .map_err(|e: WaitError| {
            let timed_out = matches!(e, WaitError::TimedOut { .. });
            staging(if timed_out && deadline.expired() {
                deadline.exceeded("rewrite_partitions")
            } else {
                ErasureError::RewriteStagingFailed {
                    partition: partition.clone(),
                    reason: e.describe(),
                }
            })
        })?;

    // ── Critical section: staging succeeded, swap must run to the end ────────

    let swap = |sub_step: RewriteSubStep, reason: String| RewriteFailure {
        sub_step,
        staging_table: staging_table.clone(),
        error: ErasureError::RewriteSwapFailed {
            partition: partition.clone(),
            reason,
        },
    };

    // Clear the destination. Listing before deleting also gives the audit
    // its original file count.
    let dest_prefix = partition.dest_prefix();
    let original = ctx
        .objects
        .list(&dest_prefix)
        .await
        .map_err(|e| swap(RewriteSubStep::ClearDestination, e.to_string()))?;
    ctx.objects
        .delete_all(&original)
        .await
        .map_err(|e| swap(RewriteSubStep::ClearDestination, e.to_string()))?;

    // Move the staged file set in, preserving each key's relative suffix.
    // A zero-hit partition stages no files and legitimately moves nothing.
    let staged = ctx
        .objects
        .list(&staging_prefix)
        .await
        .map_err(|e| swap(RewriteSubStep::Swap, e.to_string()))?;
    let mut moved = 0usize;
    for key in &staged {
        let dest_key = format!("{}{}", dest_prefix, &key[staging_prefix.len()..]);
        ctx.objects
            .copy(key, &dest_key)
            .await
            .map_err(|e| swap(RewriteSubStep::Swap, e.to_string()))?;
        ctx.objects
            .delete(key)
            .await
            .map_err(|e| swap(RewriteSubStep::Swap, e.to_string()))?;
        moved += 1;
    }

    // ── End of critical section ───────────────────────────────────────────────

    // Catalog residue is a warning, never a failure.
    if let Err(e) = ctx.catalog.drop_staging_table(&staging_table).await {
        warn!(
            staging_table = %staging_table,
            error = %e,
            "staging table cleanup failed; catalog entry left behind"
        );
    }

    info!(
        partition = %partition,
        original_files_deleted = original.len(),
        new_files_created = moved,
        "partition rewritten"
    );
    Ok(PartitionRewrite::success(
        partition.clone(),
        original.len(),
        moved,
    ))
}
