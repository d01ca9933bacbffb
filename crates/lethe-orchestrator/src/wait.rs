//! Bounded completion polling for the asynchronous remote APIs.

use std::time::{Duration, Instant};

use lethe_lake::{
    LakeError, QueryEngine, QueryHandle, QueryState, StatementHandle, StatementState, Warehouse,
};

#[derive(Debug)]
pub(crate) enum WaitError {
    /// The remote work reached a failed terminal state.
    Failed(String),
    /// The query was cancelled out from under us.
    Cancelled(String),
    /// No terminal state within the per-call cap.
    TimedOut { seconds: u64 },
    /// Polling itself failed.
    Lake(LakeError),
}

impl WaitError {
    pub(crate) fn describe(self) -> String {
        match self {
            WaitError::Failed(reason) => reason,
            WaitError::Cancelled(reason) => format!("cancelled: {}", reason),
            WaitError::TimedOut { seconds } => format!("timed out after {} seconds", seconds),
            WaitError::Lake(e) => e.to_string(),
        }
    }
}

/// Poll a query to a terminal state. The first poll happens immediately;
/// subsequent polls wait `interval`.
pub(crate) async fn await_query(
    engine: &dyn QueryEngine,
    handle: &QueryHandle,
    cap: Duration,
    interval: Duration,
) -> Result<(), WaitError> {
    let started = Instant::now();
    loop {
        match engine.query_state(handle).await.map_err(WaitError::Lake)? {
            QueryState::Succeeded => return Ok(()),
            QueryState::Failed(reason) => return Err(WaitError::Failed(reason)),
            QueryState::Cancelled(reason) => return Err(WaitError::Cancelled(reason)),
            QueryState::Running => {}
        }
        if started.elapsed() >= cap {
            return Err(WaitError::TimedOut {
                seconds: cap.as_secs(),
            });
        }
        tokio::time::sleep(interval).await;
    }
}

/// Poll a warehouse statement to a terminal state, returning rows affected.
pub(crate) async fn await_statement(
    warehouse: &dyn Warehouse,
    handle: &StatementHandle,
    cap: Duration,
    interval: Duration,
) -> Result<i64, WaitError> {
    let started = Instant::now();
    loop {
        match warehouse
            .statement_state(handle)
            .await
            .map_err(WaitError::Lake)?
        {
            StatementState::Finished { rows_affected } => return Ok(rows_affected),
            StatementState::Failed(reason) => return Err(WaitError::Failed(reason)),
            StatementState::Aborted(reason) => {
                return Err(WaitError::Failed(format!("aborted: {}", reason)))
            }
            StatementState::Running => {}
        }
        if started.elapsed() >= cap {
            return Err(WaitError::TimedOut {
                seconds: cap.as_secs(),
            });
        }
        tokio::time::sleep(interval).await;
    }
}
