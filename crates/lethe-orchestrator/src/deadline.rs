use std::time::{Duration, Instant};

use crate::error::ErasureError;

/// The end-to-end budget of one erasure request, passed explicitly through
/// every step. Steps call [`Deadline::check`] at their suspension points;
/// the rewriter deliberately performs no checks inside the staging-success →
/// swap critical section, which makes that section uncancellable.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Instant,
    total: Duration,
}

impl Deadline {
    pub fn after(total: Duration) -> Self {
        Self {
            expires_at: Instant::now() + total,
            total,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    pub fn check(&self, step: &'static str) -> Result<(), ErasureError> {
        if self.expired() {
            Err(self.exceeded(step))
        } else {
            Ok(())
        }
    }

    /// The error this deadline produces for `step`. Callers that capped a
    /// poll with [`Deadline::remaining`] use this when the deadline, rather
    /// than the step's own budget, was the binding constraint.
    pub fn exceeded(&self, step: &'static str) -> ErasureError {
        ErasureError::DeadlineExceeded {
            step,
            seconds: self.total.as_secs(),
        }
    }
}
