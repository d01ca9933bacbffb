//! Warehouse erasure: one DELETE by subject hash, polled to completion.

use lethe_domain::SubjectHash;
use lethe_lake::Warehouse;
use tracing::info;

use crate::deadline::Deadline;
use crate::error::ErasureError;
use crate::pipeline::Tunables;
use crate::wait::{await_statement, WaitError};

pub(crate) async fn delete_subject_rows(
    warehouse: &dyn Warehouse,
    subject: &SubjectHash,
    tunables: &Tunables,
    deadline: &Deadline,
) -> Result<i64, ErasureError> {
    deadline.check("warehouse_delete")?;

    let handle = warehouse
        .submit_subject_delete(subject)
        .await
        .map_err(|e| ErasureError::WarehouseDeleteFailed(e.to_string()))?;

    // The poll cap is the lesser of the step budget and the request
    // deadline; when the deadline is what ran out, report it as such.
    let cap = tunables.warehouse_timeout.min(deadline.remaining());
    let rows = match await_statement(warehouse, &handle, cap, tunables.poll_interval).await {
        Ok(rows) => rows,
        Err(WaitError::TimedOut { .. }) if deadline.expired() => {
            return Err(deadline.exceeded("warehouse_delete"));
        }
        Err(e) => return Err(ErasureError::WarehouseDeleteFailed(e.describe())),
    };

    info!(
        subject = subject.abbrev(),
        rows_deleted = rows,
        "warehouse delete finished"
    );
    Ok(rows)
}
