//! End-to-end pipeline scenarios over the in-memory request log and the
//! local data-plane simulation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lethe_domain::{ErasureRequest, PartitionKey, RequestId, RequestStatus, RewriteOutcome};
use lethe_lake::{LakeRow, LocalLake};
use lethe_orchestrator::{Orchestrator, Outcome, Trigger, Tunables};
use lethe_store::{InMemoryStore, RequestStore, StatusUpdate};
use uuid::Uuid;

const SUBJECT: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const BYSTANDER: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

fn fast_tunables() -> Tunables {
    Tunables {
        poll_interval: Duration::from_millis(1),
        ..Tunables::default()
    }
}

fn orchestrator(store: &Arc<InMemoryStore>, lake: &LocalLake) -> Arc<Orchestrator> {
    Arc::new(
        Orchestrator::new(
            store.clone(),
            Arc::new(lake.clone()),
            Arc::new(lake.clone()),
            Arc::new(lake.clone()),
            Arc::new(lake.clone()),
            "test",
        )
        .with_tunables(fast_tunables()),
    )
}

async fn approved_request(store: &Arc<InMemoryStore>, id: &str, hash: &str) -> RequestId {
    let request_id = RequestId::new(id);
    store
        .put(&ErasureRequest::new(
            request_id.clone(),
            hash,
            "dpo@example.org",
            Utc::now(),
        ))
        .await
        .unwrap();
    store
        .update_status(&request_id, Some(RequestStatus::Pending), StatusUpdate::approved())
        .await
        .unwrap();
    request_id
}

fn day_partition(day: usize) -> PartitionKey {
    // Spread days over a year of (month, day) pairs with synthetic padding.
    let month = day / 31 + 1;
    let dom = day % 31 + 1;
    PartitionKey::new("2025", format!("{:02}", month), format!("{:02}", dom))
}

async fn seed_mixed_partition(
    lake: &LocalLake,
    partition: &PartitionKey,
    subject_rows: usize,
    bystander_rows: usize,
) {
    let mut rows = Vec::new();
    for i in 0..subject_rows {
        rows.push(LakeRow::new(SUBJECT, partition.clone(), format!("s{}", i)));
    }
    for i in 0..bystander_rows {
        rows.push(LakeRow::new(BYSTANDER, partition.clone(), format!("b{}", i)));
    }
    lake.seed_partition_object(partition, "data-000.snappy.parquet", rows)
        .await;
}

// ── Scenario 1: one subject row among 100 in a single partition ───────────────

#[tokio::test]
async fn single_partition_single_row() {
    let store = Arc::new(InMemoryStore::new());
    let lake = LocalLake::new();
    let p = PartitionKey::new("2025", "01", "15");
    seed_mixed_partition(&lake, &p, 1, 99).await;
    lake.seed_warehouse_rows(SUBJECT, 1).await;
    lake.seed_warehouse_rows(BYSTANDER, 10).await;

    let orch = orchestrator(&store, &lake);
    let id = approved_request(&store, "req-1", SUBJECT).await;
    let outcome = orch.process(&id, SUBJECT).await.unwrap();

    match outcome {
        Outcome::Completed {
            partitions_rewritten,
            warehouse_rows_deleted,
            ..
        } => {
            assert_eq!(partitions_rewritten, 1);
            assert_eq!(warehouse_rows_deleted, 1);
        }
        other => panic!("expected Completed, got {:?}", other),
    }

    // 99 bystander rows survive; the subject is gone everywhere.
    assert_eq!(lake.partition_rows(&p).await.len(), 99);
    assert_eq!(lake.subject_rows_in_partition(&p, SUBJECT).await, 0);
    assert_eq!(lake.warehouse_rows(SUBJECT).await, 0);
    assert_eq!(lake.warehouse_rows(BYSTANDER).await, 10);

    let stored = store.get(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Completed);
    assert!(stored.completed_at.is_some());
    let audit = stored.audit_log.unwrap();
    assert_eq!(audit.partitions_found(), Some(1));
    assert_eq!(audit.partitions_rewritten(), Some(1));
    assert_eq!(audit.warehouse_rows_deleted(), Some(1));
    assert!(audit.duration_seconds.is_some());
}

// ── Scenario 2: no partitions, warehouse delete still runs ────────────────────

#[tokio::test]
async fn zero_partitions_still_deletes_from_warehouse() {
    let store = Arc::new(InMemoryStore::new());
    let lake = LocalLake::new();
    lake.seed_warehouse_rows(SUBJECT, 2).await;

    let orch = orchestrator(&store, &lake);
    let id = approved_request(&store, "req-1", SUBJECT).await;
    let outcome = orch.process(&id, SUBJECT).await.unwrap();

    match outcome {
        Outcome::Completed {
            partitions_rewritten,
            warehouse_rows_deleted,
            ..
        } => {
            assert_eq!(partitions_rewritten, 0);
            assert_eq!(warehouse_rows_deleted, 2);
        }
        other => panic!("expected Completed, got {:?}", other),
    }

    let audit = store.get(&id).await.unwrap().unwrap().audit_log.unwrap();
    assert_eq!(audit.partitions_found(), Some(0));
    // The rewrite step never ran, so no record exists for it.
    assert_eq!(audit.partitions_rewritten(), None);
    assert_eq!(audit.warehouse_rows_deleted(), Some(2));
}

// ── Scenario 3: a year of partitions, rewritten in order ──────────────────────

#[tokio::test]
async fn full_year_of_partitions_rewrites_in_order() {
    let store = Arc::new(InMemoryStore::new());
    let lake = LocalLake::new();
    let partitions: Vec<PartitionKey> = (0..365).map(day_partition).collect();
    for p in &partitions {
        seed_mixed_partition(&lake, p, 1, 0).await;
    }
    lake.seed_warehouse_rows(SUBJECT, 365).await;

    let orch = orchestrator(&store, &lake);
    let id = approved_request(&store, "req-1", SUBJECT).await;
    let outcome = orch.process(&id, SUBJECT).await.unwrap();
    assert!(matches!(
        outcome,
        Outcome::Completed { partitions_rewritten: 365, .. }
    ));

    let audit = store.get(&id).await.unwrap().unwrap().audit_log.unwrap();
    assert_eq!(audit.partitions_found(), Some(365));
    let details = audit
        .steps
        .iter()
        .find_map(|s| match s {
            lethe_domain::StepRecord::RewritePartitions { details, .. } => Some(details),
            _ => None,
        })
        .unwrap();
    assert_eq!(details.len(), 365);
    assert!(details.iter().all(|d| d.status == RewriteOutcome::Success));

    // Audit order matches sorted partition order.
    let mut expected = partitions.clone();
    expected.sort();
    let audited: Vec<PartitionKey> = details.iter().map(|d| d.partition.clone()).collect();
    assert_eq!(audited, expected);

    for p in &partitions {
        assert_eq!(lake.subject_rows_in_partition(p, SUBJECT).await, 0);
    }
}

// ── Scenario 4: staging failure mid-sequence, then manual resubmission ────────

#[tokio::test]
async fn staging_failure_keeps_prior_rewrites_and_resubmission_finishes() {
    let store = Arc::new(InMemoryStore::new());
    let lake = LocalLake::new();
    let partitions: Vec<PartitionKey> = (0..30).map(day_partition).collect();
    for p in &partitions {
        seed_mixed_partition(&lake, p, 1, 1).await;
    }
    // Partitions process in sorted order; fail the seventh.
    let mut ordered = partitions.clone();
    ordered.sort();
    lake.fail_staging_for(&ordered[6]).await;
    lake.seed_warehouse_rows(SUBJECT, 30).await;

    let orch = orchestrator(&store, &lake);
    let id = approved_request(&store, "req-1", SUBJECT).await;
    let outcome = orch.process(&id, SUBJECT).await.unwrap();
    match outcome {
        Outcome::Failed { code, .. } => assert_eq!(code, "REWRITE_STAGING_FAILED"),
        other => panic!("expected Failed, got {:?}", other),
    }

    let stored = store.get(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Failed);
    assert!(stored
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("REWRITE_STAGING_FAILED"));
    let audit = stored.audit_log.unwrap();
    assert_eq!(audit.partitions_found(), Some(30));
    assert_eq!(audit.partitions_rewritten(), Some(6));
    assert!(audit.error.is_some());
    assert!(audit.failed_at.is_some());
    // The warehouse step never ran.
    assert_eq!(audit.warehouse_rows_deleted(), None);
    assert_eq!(lake.warehouse_rows(SUBJECT).await, 30);

    // 1..6 erased, 7 untouched, 8..30 untouched.
    for p in &ordered[..6] {
        assert_eq!(lake.subject_rows_in_partition(p, SUBJECT).await, 0);
    }
    for p in &ordered[6..] {
        assert_eq!(lake.subject_rows_in_partition(p, SUBJECT).await, 1);
    }

    // Operator retry: a fresh request id over the same subject completes the
    // remaining 24 partitions.
    lake.clear_failures().await;
    let retry_id = approved_request(&store, &Uuid::new_v4().to_string(), SUBJECT).await;
    let outcome = orch.process(&retry_id, SUBJECT).await.unwrap();
    match outcome {
        Outcome::Completed {
            partitions_rewritten,
            warehouse_rows_deleted,
            ..
        } => {
            assert_eq!(partitions_rewritten, 24);
            assert_eq!(warehouse_rows_deleted, 30);
        }
        other => panic!("expected Completed, got {:?}", other),
    }
    for p in &ordered {
        assert_eq!(lake.subject_rows_in_partition(p, SUBJECT).await, 0);
        // Bystanders preserved throughout.
        assert_eq!(lake.subject_rows_in_partition(p, BYSTANDER).await, 1);
    }
}

// ── Scenario 5: duplicate delivery and concurrent same-subject requests ───────

#[tokio::test]
async fn duplicate_delivery_is_serialized_by_cas() {
    let store = Arc::new(InMemoryStore::new());
    let lake = LocalLake::new();
    let p = PartitionKey::new("2025", "01", "15");
    seed_mixed_partition(&lake, &p, 1, 1).await;

    let orch = orchestrator(&store, &lake);
    let id = approved_request(&store, "req-1", SUBJECT).await;

    let first = orch.process(&id, SUBJECT).await.unwrap();
    assert!(matches!(first, Outcome::Completed { .. }));

    // Re-delivery of the same request observes a terminal status and exits.
    let second = orch.process(&id, SUBJECT).await.unwrap();
    assert!(matches!(second, Outcome::Skipped { .. }));

    let stored = store.get(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Completed);
}

#[tokio::test]
async fn second_request_for_same_subject_completes_with_zero_effect() {
    let store = Arc::new(InMemoryStore::new());
    let lake = LocalLake::new();
    let p = PartitionKey::new("2025", "01", "15");
    seed_mixed_partition(&lake, &p, 2, 3).await;
    lake.seed_warehouse_rows(SUBJECT, 2).await;

    let orch = orchestrator(&store, &lake);
    let first_id = approved_request(&store, "req-1", SUBJECT).await;
    assert!(matches!(
        orch.process(&first_id, SUBJECT).await.unwrap(),
        Outcome::Completed { .. }
    ));

    let second_id = approved_request(&store, "req-2", SUBJECT).await;
    let outcome = orch.process(&second_id, SUBJECT).await.unwrap();
    match outcome {
        Outcome::Completed {
            partitions_rewritten,
            warehouse_rows_deleted,
            ..
        } => {
            // Already-erased data means nothing left to locate or delete.
            assert_eq!(partitions_rewritten, 0);
            assert_eq!(warehouse_rows_deleted, 0);
        }
        other => panic!("expected Completed, got {:?}", other),
    }
    assert_eq!(lake.subject_rows_in_partition(&p, BYSTANDER).await, 3);
}

// ── Scenario 6: malformed hash ────────────────────────────────────────────────

#[tokio::test]
async fn malformed_hash_fails_without_touching_the_lake() {
    let store = Arc::new(InMemoryStore::new());
    let lake = LocalLake::new();
    lake.seed_warehouse_rows(SUBJECT, 1).await;

    let orch = orchestrator(&store, &lake);
    let id = approved_request(&store, "req-1", "PATIENT-0001").await;
    let outcome = orch.process(&id, "PATIENT-0001").await.unwrap();
    match outcome {
        Outcome::Failed { code, message } => {
            assert_eq!(code, "INVALID_INPUT");
            assert!(message.starts_with("INVALID_INPUT"));
        }
        other => panic!("expected Failed, got {:?}", other),
    }

    let stored = store.get(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Failed);
    assert!(stored.audit_log.is_none());
    // No data-plane effect of any kind.
    assert!(lake.staging_table_names().await.is_empty());
    assert_eq!(lake.warehouse_rows(SUBJECT).await, 1);
}

// ── Swap failure surfaces REWRITE_SWAP_FAILED ─────────────────────────────────

#[tokio::test]
async fn swap_failure_is_recorded_with_its_sub_step() {
    let store = Arc::new(InMemoryStore::new());
    let lake = LocalLake::new();
    let p = PartitionKey::new("2025", "01", "15");
    seed_mixed_partition(&lake, &p, 1, 1).await;
    lake.fail_swap_for(&p).await;

    let orch = orchestrator(&store, &lake);
    let id = approved_request(&store, "req-1", SUBJECT).await;
    let outcome = orch.process(&id, SUBJECT).await.unwrap();
    assert!(matches!(outcome, Outcome::Failed { code: "REWRITE_SWAP_FAILED", .. }));

    let audit = store.get(&id).await.unwrap().unwrap().audit_log.unwrap();
    let details = audit
        .steps
        .iter()
        .find_map(|s| match s {
            lethe_domain::StepRecord::RewritePartitions { details, .. } => Some(details),
            _ => None,
        })
        .unwrap();
    assert_eq!(details[0].status, RewriteOutcome::Failed);
    assert_eq!(
        details[0].failed_sub_step,
        Some(lethe_domain::RewriteSubStep::Swap)
    );
}

// ── Deadline ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn expired_deadline_fails_the_request() {
    let store = Arc::new(InMemoryStore::new());
    let lake = LocalLake::new();
    let orch = Arc::new(
        Orchestrator::new(
            store.clone(),
            Arc::new(lake.clone()),
            Arc::new(lake.clone()),
            Arc::new(lake.clone()),
            Arc::new(lake.clone()),
            "test",
        )
        .with_tunables(Tunables {
            request_deadline: Duration::ZERO,
            poll_interval: Duration::from_millis(1),
            ..Tunables::default()
        }),
    );

    let id = approved_request(&store, "req-1", SUBJECT).await;
    let outcome = orch.process(&id, SUBJECT).await.unwrap();
    match outcome {
        Outcome::Failed { code, message } => {
            assert_eq!(code, "DEADLINE_EXCEEDED");
            assert!(message.contains("find_partitions"));
        }
        other => panic!("expected Failed, got {:?}", other),
    }
    assert_eq!(
        store.get(&id).await.unwrap().unwrap().status,
        RequestStatus::Failed
    );
}

// ── Terminal immutability ─────────────────────────────────────────────────────

#[tokio::test]
async fn completed_requests_are_frozen() {
    let store = Arc::new(InMemoryStore::new());
    let lake = LocalLake::new();
    let orch = orchestrator(&store, &lake);
    let id = approved_request(&store, "req-1", SUBJECT).await;
    orch.process(&id, SUBJECT).await.unwrap();

    let before = store.get(&id).await.unwrap().unwrap();
    let err = store
        .update_status(&id, None, StatusUpdate::failed("tamper".into(), None))
        .await;
    assert!(err.is_err());
    let after = store.get(&id).await.unwrap().unwrap();
    assert_eq!(after, before);
}

// ── Trigger end to end ────────────────────────────────────────────────────────

#[tokio::test]
async fn trigger_processes_approval_from_change_stream() {
    let store = Arc::new(InMemoryStore::new());
    let lake = LocalLake::new();
    let p = PartitionKey::new("2025", "01", "15");
    seed_mixed_partition(&lake, &p, 1, 1).await;
    lake.seed_warehouse_rows(SUBJECT, 1).await;

    let orch = orchestrator(&store, &lake);
    let stream = store.subscribe().await.unwrap();
    let trigger = Trigger::new(orch).with_max_in_flight(2);
    let handle = tokio::spawn(async move { trigger.run(stream).await });

    // A PENDING insert must be ignored; the approval must fire.
    let id = RequestId::new("req-1");
    store
        .put(&ErasureRequest::new(
            id.clone(),
            SUBJECT,
            "dpo@example.org",
            Utc::now(),
        ))
        .await
        .unwrap();
    store
        .update_status(&id, Some(RequestStatus::Pending), StatusUpdate::approved())
        .await
        .unwrap();

    // Wait for the worker to drive the request terminal.
    let mut status = RequestStatus::Approved;
    for _ in 0..200 {
        status = store.get(&id).await.unwrap().unwrap().status;
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, RequestStatus::Completed);
    assert_eq!(lake.warehouse_rows(SUBJECT).await, 0);

    handle.abort();
}
