use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use lethe_aws::{
    default_chain, AthenaClient, AwsApi, DynamoDbClient, DynamoStreamsClient, GlueClient,
    RedshiftDataClient, S3Client,
};
use lethe_config::Settings;
use lethe_domain::{ErasureRequest, PartitionKey, RequestId, RequestStatus, SubjectHash};
use lethe_lake::{
    AthenaQueryEngine, GlueStagingCatalog, LakeRow, LocalLake, RedshiftVitalsWarehouse,
    S3CuratedStore,
};
use lethe_orchestrator::{Orchestrator, Trigger};
use lethe_store::{DynamoRequestStore, RequestStore, StatusUpdate};
use uuid::Uuid;

use crate::output;

/// Build the live store and orchestrator from the process environment.
/// Every remote client shares one signing core.
fn build(settings: &Settings) -> (Arc<dyn RequestStore>, Arc<Orchestrator>) {
    let creds = default_chain(&reqwest::Client::new());
    let api = AwsApi::new(&settings.region, creds);

    let store: Arc<dyn RequestStore> = Arc::new(DynamoRequestStore::new(
        DynamoDbClient::new(api.clone()),
        DynamoStreamsClient::new(api.clone()),
        &settings.requests_table,
    ));
    let engine = Arc::new(AthenaQueryEngine::new(
        AthenaClient::new(api.clone()),
        &settings.athena_workgroup,
        &settings.glue_database,
        &settings.glue_table,
        &settings.curated_bucket,
    ));
    let objects = Arc::new(S3CuratedStore::new(
        S3Client::new(api.clone()),
        &settings.curated_bucket,
    ));
    let warehouse = Arc::new(RedshiftVitalsWarehouse::new(
        RedshiftDataClient::new(api.clone()),
        &settings.redshift_workgroup,
        &settings.redshift_database,
    ));
    let catalog = Arc::new(GlueStagingCatalog::new(
        GlueClient::new(api),
        &settings.glue_database,
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        engine,
        objects,
        warehouse,
        catalog,
        &settings.environment_name,
    ));
    (store, orchestrator)
}

fn live() -> Result<(Arc<dyn RequestStore>, Arc<Orchestrator>)> {
    let settings = Settings::from_env().context("configuration")?;
    Ok(build(&settings))
}

// ── run ───────────────────────────────────────────────────────────────────────

pub async fn run(max_in_flight: usize) -> Result<()> {
    let (store, orchestrator) = live()?;
    let stream = store.subscribe().await.context("opening change stream")?;
    println!("Consuming change stream (max {max_in_flight} request(s) in flight). Ctrl-C to stop.");
    Trigger::new(orchestrator)
        .with_max_in_flight(max_in_flight)
        .run(stream)
        .await
        .context("change stream consumption ended")?;
    Ok(())
}

// ── process ───────────────────────────────────────────────────────────────────

pub async fn process(request_id: String) -> Result<()> {
    let (store, orchestrator) = live()?;
    let id = RequestId::new(&request_id);
    let Some(request) = store.get(&id).await? else {
        bail!("request {request_id} not found");
    };
    let outcome = orchestrator.process(&id, &request.patient_id_hash).await?;
    println!("{}", output::render_outcome(&outcome));
    Ok(())
}

// ── status / list ─────────────────────────────────────────────────────────────

pub async fn status(request_id: String) -> Result<()> {
    let (store, _) = live()?;
    let id = RequestId::new(&request_id);
    let Some(request) = store.get(&id).await? else {
        bail!("request {request_id} not found");
    };
    println!("{}", output::render_request(&request));
    Ok(())
}

pub async fn list(status: String) -> Result<()> {
    let parsed: RequestStatus = status
        .parse()
        .with_context(|| format!("unknown status '{status}'"))?;
    let (store, _) = live()?;
    let requests = store.list_by_status(parsed).await?;
    if requests.is_empty() {
        println!("No {parsed} requests.");
        return Ok(());
    }
    for request in &requests {
        println!("{}", output::render_request_line(request));
    }
    Ok(())
}

// ── submit / approve ──────────────────────────────────────────────────────────

pub async fn submit(patient_id_hash: String, requester: String) -> Result<()> {
    // Reject malformed hashes before they ever reach the log.
    let subject = SubjectHash::parse(patient_id_hash).context("invalid patient id hash")?;
    let (store, _) = live()?;

    let request = ErasureRequest::new(
        RequestId::new(Uuid::new_v4().to_string()),
        subject.as_str(),
        requester,
        Utc::now(),
    );
    store.put(&request).await?;
    println!("Submitted request {} (PENDING).", request.request_id);
    Ok(())
}

pub async fn approve(request_id: String) -> Result<()> {
    let (store, _) = live()?;
    let updated = store
        .update_status(
            &RequestId::new(&request_id),
            Some(RequestStatus::Pending),
            StatusUpdate::approved(),
        )
        .await?;
    println!("Request {} is now {}.", updated.request_id, updated.status);
    Ok(())
}

// ── demo ──────────────────────────────────────────────────────────────────────

/// A self-contained walkthrough: seed the simulated lake, submit and approve
/// a request, run the pipeline, then show the audit trail and verify the
/// subject is gone.
pub async fn demo() -> Result<()> {
    let subject = "7f".repeat(32);
    let bystander = "3c".repeat(32);

    let lake = LocalLake::new();
    let partitions = [
        PartitionKey::new("2025", "01", "15"),
        PartitionKey::new("2025", "01", "16"),
        PartitionKey::new("2025", "02", "01"),
    ];
    for (i, p) in partitions.iter().enumerate() {
        lake.seed_partition_object(
            p,
            "data-000.snappy.parquet",
            vec![
                LakeRow::new(subject.clone(), p.clone(), format!("vitals-{i}")),
                LakeRow::new(bystander.clone(), p.clone(), format!("vitals-{i}")),
            ],
        )
        .await;
    }
    lake.seed_warehouse_rows(&subject, 3).await;
    lake.seed_warehouse_rows(&bystander, 3).await;

    let store = Arc::new(lethe_store::InMemoryStore::new());
    let orchestrator = Orchestrator::new(
        store.clone(),
        Arc::new(lake.clone()),
        Arc::new(lake.clone()),
        Arc::new(lake.clone()),
        Arc::new(lake.clone()),
        "demo",
    );

    let request = ErasureRequest::new(
        RequestId::new(Uuid::new_v4().to_string()),
        subject.clone(),
        "demo",
        Utc::now(),
    );
    store.put(&request).await?;
    store
        .update_status(
            &request.request_id,
            Some(RequestStatus::Pending),
            StatusUpdate::approved(),
        )
        .await?;
    println!("Submitted and approved request {}.", request.request_id);

    let outcome = orchestrator
        .process(&request.request_id, &subject)
        .await?;
    println!("{}", output::render_outcome(&outcome));

    let stored = store
        .get(&request.request_id)
        .await?
        .context("request vanished")?;
    println!("{}", output::render_request(&stored));

    for p in &partitions {
        let remaining = lake.subject_rows_in_partition(p, &subject).await;
        let bystanders = lake.subject_rows_in_partition(p, &bystander).await;
        println!("{p}: subject rows {remaining}, bystander rows {bystanders}");
    }
    println!(
        "warehouse: subject rows {}, bystander rows {}",
        lake.warehouse_rows(&subject).await,
        lake.warehouse_rows(&bystander).await
    );
    Ok(())
}
