//! Partition discovery: which `(year, month, day)` directories hold rows for
//! the subject.

use lethe_domain::{PartitionKey, SubjectHash};
use lethe_lake::QueryEngine;
use tracing::info;

use crate::deadline::Deadline;
use crate::error::ErasureError;
use crate::pipeline::Tunables;
use crate::wait::{await_query, WaitError};

pub(crate) async fn find_affected_partitions(
    engine: &dyn QueryEngine,
    subject: &SubjectHash,
    tunables: &Tunables,
    deadline: &Deadline,
) -> Result<Vec<PartitionKey>, ErasureError> {
    deadline.check("find_partitions")?;

    let handle = engine
        .submit_partition_scan(subject)
        .await
        .map_err(|e| ErasureError::LocatorQueryFailed(e.to_string()))?;

    // The poll cap is the lesser of the step budget and the request
    // deadline; when the deadline is what ran out, report it as such.
    let cap = tunables.query_timeout.min(deadline.remaining());
    match await_query(engine, &handle, cap, tunables.poll_interval).await {
        Ok(()) => {}
        Err(WaitError::TimedOut { .. }) if deadline.expired() => {
            return Err(deadline.exceeded("find_partitions"));
        }
        Err(e) => return Err(ErasureError::LocatorQueryFailed(e.describe())),
    }

    let rows = engine
        .fetch_rows(&handle)
        .await
        .map_err(|e| ErasureError::LocatorQueryFailed(e.to_string()))?;

    let mut partitions: Vec<PartitionKey> = rows
        .iter()
        .filter(|row| row.len() >= 3)
        .map(|row| PartitionKey::new(&row[0], &row[1], &row[2]))
        .collect();
    partitions.sort();
    partitions.dedup();

    info!(
        subject = subject.abbrev(),
        count = partitions.len(),
        "located affected partitions"
    );
    Ok(partitions)
}
