use lethe_domain::{ErasureRequest, RewriteOutcome, StepRecord};
use lethe_orchestrator::Outcome;

/// One-line form for listings.
pub fn render_request_line(request: &ErasureRequest) -> String {
    format!(
        "{}  {:<10}  {}  {}",
        request.request_id,
        request.status.to_string(),
        request.requested_at.format("%Y-%m-%d %H:%M:%S"),
        request.requester,
    )
}

/// Full request view with the audit trail.
pub fn render_request(request: &ErasureRequest) -> String {
    let mut out = String::new();
    out.push_str(&format!("request    {}\n", request.request_id));
    out.push_str(&format!("status     {}\n", request.status));
    out.push_str(&format!("subject    {}\n", request.patient_id_hash));
    out.push_str(&format!("requester  {}\n", request.requester));
    out.push_str(&format!(
        "requested  {}\n",
        request.requested_at.format("%Y-%m-%d %H:%M:%S")
    ));
    if let Some(at) = request.completed_at {
        out.push_str(&format!("completed  {}\n", at.format("%Y-%m-%d %H:%M:%S")));
    }
    if let Some(message) = &request.error_message {
        out.push_str(&format!("error      {}\n", message));
    }

    if let Some(audit) = &request.audit_log {
        out.push_str("audit:\n");
        for step in &audit.steps {
            match step {
                StepRecord::FindPartitions {
                    partitions_found, ..
                } => {
                    out.push_str(&format!(
                        "  find_partitions      {} partition(s)\n",
                        partitions_found
                    ));
                }
                StepRecord::RewritePartitions {
                    partitions_rewritten,
                    details,
                    ..
                } => {
                    out.push_str(&format!(
                        "  rewrite_partitions   {}/{} rewritten\n",
                        partitions_rewritten,
                        details.len()
                    ));
                    for d in details {
                        match d.status {
                            RewriteOutcome::Success => out.push_str(&format!(
                                "    + {} ({} deleted, {} created)\n",
                                d.partition,
                                d.original_files_deleted.unwrap_or(0),
                                d.new_files_created.unwrap_or(0),
                            )),
                            RewriteOutcome::Failed => out.push_str(&format!(
                                "    ! {} failed at {}: {}\n",
                                d.partition,
                                d.failed_sub_step
                                    .map(|s| s.to_string())
                                    .unwrap_or_else(|| "unknown".into()),
                                d.error.as_deref().unwrap_or("unknown error"),
                            )),
                        }
                    }
                }
                StepRecord::WarehouseDelete { rows_deleted, .. } => {
                    out.push_str(&format!("  warehouse_delete     {} row(s)\n", rows_deleted));
                }
            }
        }
        if let Some(secs) = audit.duration_seconds {
            out.push_str(&format!("  duration             {:.2}s\n", secs));
        }
        if let Some(error) = &audit.error {
            out.push_str(&format!("  failed               {}\n", error));
        }
    }
    out.trim_end().to_string()
}

pub fn render_outcome(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Completed {
            partitions_rewritten,
            warehouse_rows_deleted,
            duration_seconds,
        } => format!(
            "COMPLETED: {} partition(s) rewritten, {} warehouse row(s) deleted in {:.2}s",
            partitions_rewritten, warehouse_rows_deleted, duration_seconds
        ),
        Outcome::Skipped { reason } => format!("SKIPPED: {}", reason),
        Outcome::Failed { message, .. } => format!("FAILED: {}", message),
    }
}
