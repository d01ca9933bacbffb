use std::sync::Arc;

use lethe_store::{ChangeEvent, ChangeStream};
use lethe_domain::RequestStatus;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::error::ErasureError;
use crate::pipeline::{Orchestrator, Outcome};

/// The event trigger: filters the request log's change stream down to
/// fresh APPROVED transitions and dispatches a worker per accepted request.
///
/// The filter is re-asserted here even when the stream source already
/// filters, and duplicate deliveries are harmless: the APPROVED → PROCESSING
/// compare-and-set in the pipeline is what serializes them.
pub struct Trigger {
    orchestrator: Arc<Orchestrator>,
    max_in_flight: usize,
}

impl Trigger {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            max_in_flight: 4,
        }
    }

    pub fn with_max_in_flight(self, max_in_flight: usize) -> Self {
        Self {
            max_in_flight: max_in_flight.max(1),
            ..self
        }
    }

    /// An event fires only when the new image is APPROVED and the old image
    /// (if any) was not.
    fn accepts(event: &ChangeEvent) -> bool {
        event.new.status == RequestStatus::Approved
            && event
                .old
                .as_ref()
                .map(|old| old.status != RequestStatus::Approved)
                .unwrap_or(true)
    }

    /// Consume the stream until it breaks. Workers run concurrently up to
    /// `max_in_flight`; each processes exactly one request.
    pub async fn run(&self, mut stream: Box<dyn ChangeStream>) -> Result<(), ErasureError> {
        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        info!(max_in_flight = self.max_in_flight, "trigger consuming change stream");

        loop {
            let batch = stream.next_batch().await?;
            for event in batch {
                if !Self::accepts(&event) {
                    debug!(
                        request_id = %event.new.request_id,
                        status = %event.new.status,
                        "discarding event"
                    );
                    continue;
                }

                // The semaphore is never closed, so acquisition only fails on
                // shutdown paths that drop the trigger anyway.
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    continue;
                };
                let orchestrator = self.orchestrator.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    let request_id = event.new.request_id.clone();
                    match orchestrator
                        .process(&request_id, &event.new.patient_id_hash)
                        .await
                    {
                        Ok(Outcome::Completed { .. }) | Ok(Outcome::Failed { .. }) => {}
                        Ok(Outcome::Skipped { reason }) => {
                            debug!(request_id = %request_id, reason = %reason, "request skipped")
                        }
                        Err(e) => {
                            error!(request_id = %request_id, error = %e, "worker could not record outcome")
                        }
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lethe_domain::{ErasureRequest, RequestId};

    fn request(status: RequestStatus) -> ErasureRequest {
        let mut r = ErasureRequest::new(
            RequestId::new("req-1"),
            "a".repeat(64),
            "dpo@example.org",
            Utc::now(),
        );
        r.status = status;
        r
    }

    #[test]
    fn accepts_fresh_approval_insert() {
        let event = ChangeEvent {
            old: None,
            new: request(RequestStatus::Approved),
        };
        assert!(Trigger::accepts(&event));
    }

    #[test]
    fn accepts_pending_to_approved_transition() {
        let event = ChangeEvent {
            old: Some(request(RequestStatus::Pending)),
            new: request(RequestStatus::Approved),
        };
        assert!(Trigger::accepts(&event));
    }

    #[test]
    fn rejects_non_approved_images() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Processing,
            RequestStatus::Completed,
            RequestStatus::Failed,
        ] {
            let event = ChangeEvent {
                old: None,
                new: request(status),
            };
            assert!(!Trigger::accepts(&event), "accepted {:?}", status);
        }
    }

    #[test]
    fn rejects_already_approved_old_image() {
        // A re-delivered or touched record that was already APPROVED must not
        // fire again; the CAS would reject it anyway, but the filter is cheap.
        let event = ChangeEvent {
            old: Some(request(RequestStatus::Approved)),
            new: request(RequestStatus::Approved),
        };
        assert!(!Trigger::accepts(&event));
    }
}
