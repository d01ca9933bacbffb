use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use lethe_domain::{ErasureRequest, RequestId, RequestStatus};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::{ChangeEvent, ChangeStream, RequestStore, StatusUpdate};

#[derive(Default)]
struct Inner {
    requests: HashMap<RequestId, ErasureRequest>,
    subscribers: Vec<UnboundedSender<ChangeEvent>>,
}

impl Inner {
    fn notify(&mut self, event: ChangeEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// In-memory implementation of [`RequestStore`].
///
/// All data is lost on process exit. Suitable for tests and the local demo.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestStore for InMemoryStore {
    async fn put(&self, request: &ErasureRequest) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if guard.requests.contains_key(&request.request_id) {
            return Err(StoreError::DuplicateRequest(request.request_id.to_string()));
        }
        guard
            .requests
            .insert(request.request_id.clone(), request.clone());
        guard.notify(ChangeEvent {
            old: None,
            new: request.clone(),
        });
        Ok(())
    }

    async fn get(&self, id: &RequestId) -> Result<Option<ErasureRequest>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.requests.get(id).cloned())
    }

    async fn update_status(
        &self,
        id: &RequestId,
        expected: Option<RequestStatus>,
        update: StatusUpdate,
    ) -> Result<ErasureRequest, StoreError> {
        let mut guard = self.inner.write().await;
        let current = guard
            .requests
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::RequestNotFound(id.to_string()))?;

        // Idempotent convergence for terminal writes: a re-issued COMPLETED or
        // FAILED update whose first attempt already landed is a no-op success.
        // Non-terminal transitions never converge, so a duplicate
        // APPROVED → PROCESSING claim is rejected and exactly one worker wins.
        if current.status == update.status && update.status.is_terminal() {
            return Ok(current);
        }
        if current.status.is_terminal() {
            return Err(StoreError::StatusConflict {
                request_id: id.to_string(),
                detail: format!("terminal status {} is immutable", current.status),
            });
        }
        if let Some(expected) = expected {
            if current.status != expected {
                return Err(StoreError::StatusConflict {
                    request_id: id.to_string(),
                    detail: format!("status is {}, expected {}", current.status, expected),
                });
            }
        }
        if !current.status.can_transition_to(update.status) {
            return Err(StoreError::StatusConflict {
                request_id: id.to_string(),
                detail: format!("illegal transition {} -> {}", current.status, update.status),
            });
        }

        let mut next = current.clone();
        next.status = update.status;
        next.updated_at = Utc::now();
        if let Some(at) = update.completed_at {
            next.completed_at = Some(at);
        }
        if let Some(msg) = update.error_message {
            next.error_message = Some(msg);
        }
        if let Some(audit) = update.audit_log {
            next.audit_log = Some(audit);
        }

        guard.requests.insert(id.clone(), next.clone());
        guard.notify(ChangeEvent {
            old: Some(current),
            new: next.clone(),
        });
        Ok(next)
    }

    async fn list_by_status(
        &self,
        status: RequestStatus,
    ) -> Result<Vec<ErasureRequest>, StoreError> {
        let guard = self.inner.read().await;
        let mut out: Vec<ErasureRequest> = guard
            .requests
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        Ok(out)
    }

    async fn subscribe(&self) -> Result<Box<dyn ChangeStream>, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.write().await.subscribers.push(tx);
        Ok(Box::new(MemoryChangeStream { rx }))
    }
}

struct MemoryChangeStream {
    rx: UnboundedReceiver<ChangeEvent>,
}

#[async_trait]
impl ChangeStream for MemoryChangeStream {
    async fn next_batch(&mut self) -> Result<Vec<ChangeEvent>, StoreError> {
        let first = self
            .rx
            .recv()
            .await
            .ok_or_else(|| StoreError::Stream("change stream closed".into()))?;
        let mut batch = vec![first];
        while let Ok(event) = self.rx.try_recv() {
            batch.push(event);
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lethe_domain::AuditLog;

    fn request(id: &str) -> ErasureRequest {
        ErasureRequest::new(
            RequestId::new(id),
            "a".repeat(64),
            "dpo@example.org",
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn put_and_get() {
        let store = InMemoryStore::new();
        store.put(&request("req-1")).await.unwrap();
        let got = store.get(&RequestId::new("req-1")).await.unwrap().unwrap();
        assert_eq!(got.status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn put_rejects_duplicate_id() {
        let store = InMemoryStore::new();
        store.put(&request("req-1")).await.unwrap();
        assert!(matches!(
            store.put(&request("req-1")).await,
            Err(StoreError::DuplicateRequest(_))
        ));
    }

    #[tokio::test]
    async fn cas_serializes_duplicate_claims() {
        let store = InMemoryStore::new();
        store.put(&request("req-1")).await.unwrap();
        let id = RequestId::new("req-1");
        store
            .update_status(&id, Some(RequestStatus::Pending), StatusUpdate::approved())
            .await
            .unwrap();

        // First claim wins.
        let claimed = store
            .update_status(&id, Some(RequestStatus::Approved), StatusUpdate::processing())
            .await
            .unwrap();
        assert_eq!(claimed.status, RequestStatus::Processing);

        // A duplicate claim observes PROCESSING and loses.
        let err = store
            .update_status(&id, Some(RequestStatus::Approved), StatusUpdate::processing())
            .await;
        assert!(matches!(err, Err(StoreError::StatusConflict { .. })));
    }

    #[tokio::test]
    async fn reissued_terminal_write_converges() {
        let store = InMemoryStore::new();
        store.put(&request("req-1")).await.unwrap();
        let id = RequestId::new("req-1");
        store.update_status(&id, None, StatusUpdate::approved()).await.unwrap();
        store.update_status(&id, None, StatusUpdate::processing()).await.unwrap();

        let audit = AuditLog::begin(id.clone(), Utc::now());
        let now = Utc::now();
        store
            .update_status(
                &id,
                Some(RequestStatus::Processing),
                StatusUpdate::completed(audit.clone(), now),
            )
            .await
            .unwrap();

        // The same terminal write, re-issued after an ambiguous failure,
        // must converge rather than conflict.
        let again = store
            .update_status(
                &id,
                Some(RequestStatus::Processing),
                StatusUpdate::completed(audit, now),
            )
            .await
            .unwrap();
        assert_eq!(again.status, RequestStatus::Completed);
    }

    #[tokio::test]
    async fn terminal_states_are_immutable() {
        let store = InMemoryStore::new();
        store.put(&request("req-1")).await.unwrap();
        let id = RequestId::new("req-1");
        store.update_status(&id, None, StatusUpdate::approved()).await.unwrap();
        store.update_status(&id, None, StatusUpdate::processing()).await.unwrap();
        let audit = AuditLog::begin(id.clone(), Utc::now());
        let done = store
            .update_status(&id, None, StatusUpdate::completed(audit, Utc::now()))
            .await
            .unwrap();
        assert_eq!(done.status, RequestStatus::Completed);
        assert!(done.completed_at.is_some());

        let err = store
            .update_status(
                &id,
                None,
                StatusUpdate::failed("late failure".into(), None),
            )
            .await;
        assert!(matches!(err, Err(StoreError::StatusConflict { .. })));

        // The terminal tuple is frozen.
        let frozen = store.get(&id).await.unwrap().unwrap();
        assert_eq!(frozen.status, RequestStatus::Completed);
        assert!(frozen.error_message.is_none());
    }

    #[tokio::test]
    async fn missing_request_is_not_found() {
        let store = InMemoryStore::new();
        let err = store
            .update_status(&RequestId::new("ghost"), None, StatusUpdate::processing())
            .await;
        assert!(matches!(err, Err(StoreError::RequestNotFound(_))));
    }

    #[tokio::test]
    async fn list_by_status_filters() {
        let store = InMemoryStore::new();
        store.put(&request("req-1")).await.unwrap();
        store.put(&request("req-2")).await.unwrap();
        store
            .update_status(&RequestId::new("req-2"), None, StatusUpdate::approved())
            .await
            .unwrap();

        let pending = store.list_by_status(RequestStatus::Pending).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].request_id.as_str(), "req-1");
        let approved = store.list_by_status(RequestStatus::Approved).await.unwrap();
        assert_eq!(approved.len(), 1);
    }

    #[tokio::test]
    async fn change_stream_carries_old_and_new_images() {
        let store = InMemoryStore::new();
        let mut stream = store.subscribe().await.unwrap();

        store.put(&request("req-1")).await.unwrap();
        let batch = stream.next_batch().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert!(batch[0].old.is_none());
        assert_eq!(batch[0].new.status, RequestStatus::Pending);

        store
            .update_status(&RequestId::new("req-1"), None, StatusUpdate::approved())
            .await
            .unwrap();
        let batch = stream.next_batch().await.unwrap();
        assert_eq!(batch[0].old.as_ref().unwrap().status, RequestStatus::Pending);
        assert_eq!(batch[0].new.status, RequestStatus::Approved);
    }
}
