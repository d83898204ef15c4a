// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! End-to-end pipeline: export -> artifact -> import -> restore, driven
//! through the worker processors against the in-memory backend.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::watch;

use stockroom::application::services::{EntityService, ExportService};
use stockroom::infrastructure::backends::memory::MemoryBackend;
use stockroom::infrastructure::services::artifact::{Artifact, ARTIFACT_MIME};
use stockroom::infrastructure::services::blob::{BlobStore, MemoryBlobStore};
use stockroom::infrastructure::workers::export_worker::ExportProcessor;
use stockroom::infrastructure::workers::restore_worker::RestoreProcessor;
use stockroom::infrastructure::workers::{JobProcessor, Worker};
use stockroom_domain::entities::{
    Area, Commodity, CommodityFile, ExportType, File, FileType, JobStatus, Location, StepResult,
    Tenant, User,
};
use stockroom_domain::registries::{RegistryFactory, RegistrySet};
use stockroom_domain::{EntityId, RequestIdentity};

struct Fixture {
    factory: Arc<dyn RegistryFactory>,
    set: RegistrySet,
    service: RegistrySet,
    identity: RequestIdentity,
    blob: Arc<MemoryBlobStore>,
    entity_service: EntityService,
    commodity_id: EntityId,
    area_id: EntityId,
    location_id: EntityId,
    file_ids: Vec<EntityId>,
}

async fn fixture() -> Fixture {
    let factory: Arc<dyn RegistryFactory> = Arc::new(MemoryBackend::new());
    let service = factory.service_set();

    let tenant = service.tenants.create(Tenant::new("Acme", "acme")).await.unwrap();
    let mut user = User::new(tenant.id.clone(), "jane@example.com", "Jane");
    user.set_password("Passw0rd1").unwrap();
    let user = service.users.create(user).await.unwrap();
    let identity = RequestIdentity::user(tenant.id.clone(), user.id.clone());
    let set = factory.user_set(Some(identity.clone())).unwrap();

    let mut settings = set.settings.get().await.unwrap();
    settings.patch("system.main_currency", &json!("USD")).unwrap();
    set.settings.save(settings).await.unwrap();

    let blob = Arc::new(MemoryBlobStore::new());
    let entity_service = EntityService::new(set.clone(), blob.clone());

    let location = set
        .locations
        .create(Location::new(tenant.id.clone(), user.id.clone(), "Home"))
        .await
        .unwrap();
    let area = set
        .areas
        .create(Area::new(tenant.id.clone(), user.id.clone(), location.id.clone(), "Garage"))
        .await
        .unwrap();
    let commodity = entity_service
        .create_commodity(Commodity::new(
            tenant.id.clone(),
            user.id.clone(),
            area.id.clone(),
            "Drill",
        ))
        .await
        .unwrap();

    let mut file_ids = Vec::new();
    for (path, kind) in [
        ("drill/photo.jpg", FileType::Image),
        ("drill/manual.pdf", FileType::Manual),
        ("drill/invoice.pdf", FileType::Invoice),
    ] {
        let mut file = File::new(tenant.id.clone(), user.id.clone(), path, "application/octet-stream");
        file.file_type = kind;
        file.link_to("commodity", commodity.id.clone());
        let file = set.files.create(file).await.unwrap();
        blob.put(path, path.as_bytes()).await.unwrap();
        set.commodity_files
            .create(CommodityFile::new(
                tenant.id.clone(),
                user.id.clone(),
                commodity.id.clone(),
                file.id.clone(),
                kind,
            ))
            .await
            .unwrap();
        file_ids.push(file.id);
    }

    Fixture {
        factory,
        set,
        service,
        identity,
        blob,
        entity_service,
        commodity_id: commodity.id,
        area_id: area.id,
        location_id: location.id,
        file_ids,
    }
}

fn stop_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

async fn run_export(fixture: &Fixture) -> stockroom_domain::entities::Export {
    let export_service = ExportService::new(
        fixture.set.clone(),
        fixture.blob.clone(),
        fixture.identity.clone(),
    );
    let export = export_service
        .request_export(ExportType::FullDatabase, Vec::new(), true, "full backup")
        .await
        .unwrap();

    let processor = ExportProcessor::new(fixture.factory.clone(), fixture.blob.clone(), 2);
    let pending = processor.pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert!(processor.claim(&pending[0]).await.unwrap());
    let (_stop_tx, stop_rx) = stop_channel();
    processor.execute(&pending[0], stop_rx).await.unwrap();

    fixture.service.exports.get(&export.id).await.unwrap()
}

// --- Invariant 7: export round-trip ----------------------------------------

#[tokio::test]
async fn export_completes_and_artifact_round_trips() {
    let fixture = fixture().await;
    let export = run_export(&fixture).await;

    assert_eq!(export.status, JobStatus::Completed);
    assert!(export.completed_date.is_some());
    assert_eq!(export.stats.location_count, 1);
    assert_eq!(export.stats.area_count, 1);
    assert_eq!(export.stats.commodity_count, 1);
    assert_eq!(export.stats.image_count, 1);
    assert_eq!(export.stats.manual_count, 1);
    assert_eq!(export.stats.invoice_count, 1);
    assert_eq!(export.stats.binary_data_count, 3);
    assert!(export.stats.file_size > 0);

    // The artifact file row carries the XML MIME type.
    let artifact_file = fixture
        .service
        .files
        .get(export.file_id.as_ref().unwrap())
        .await
        .unwrap();
    assert_eq!(artifact_file.mime_type, ARTIFACT_MIME);

    // Parsing the written artifact reproduces the recorded stats.
    let bytes = fixture.blob.get(&artifact_file.path).await.unwrap();
    let parsed = Artifact::from_xml(&bytes).unwrap();
    let mut counts = parsed.counts();
    counts.file_size = bytes.len() as u64;
    assert_eq!(counts, export.stats);
}

// --- Import ------------------------------------------------------------------

#[tokio::test]
async fn import_records_metadata_without_touching_live_data() {
    let fixture = fixture().await;
    let export = run_export(&fixture).await;
    let artifact_file = fixture
        .service
        .files
        .get(export.file_id.as_ref().unwrap())
        .await
        .unwrap();
    let bytes = fixture.blob.get(&artifact_file.path).await.unwrap();

    let commodity_count_before = fixture.set.commodities.count().await.unwrap();

    let export_service = ExportService::new(
        fixture.set.clone(),
        fixture.blob.clone(),
        fixture.identity.clone(),
    );
    let imported = export_service.import_artifact(&bytes, "uploaded").await.unwrap();

    assert_eq!(imported.export_type, ExportType::Imported);
    assert_eq!(imported.status, JobStatus::Completed);
    assert_eq!(imported.stats.commodity_count, export.stats.commodity_count);
    assert!(imported.file_id.is_some());
    assert_eq!(
        fixture.set.commodities.count().await.unwrap(),
        commodity_count_before,
        "import must not touch live data"
    );

    let err = export_service.import_artifact(b"<garbage", "broken").await.unwrap_err();
    assert_eq!(err.category(), "bad_data_structure");
}

// --- Restore -----------------------------------------------------------------

#[tokio::test]
async fn restore_replays_artifact_idempotently() {
    let fixture = fixture().await;
    let export = run_export(&fixture).await;

    // Wipe the live sub-graph; the artifact survives in the blob store.
    fixture
        .entity_service
        .delete_commodity_recursive(&fixture.commodity_id)
        .await
        .unwrap();
    assert!(fixture.set.commodities.get(&fixture.commodity_id).await.is_err());

    let export_service = ExportService::new(
        fixture.set.clone(),
        fixture.blob.clone(),
        fixture.identity.clone(),
    );
    let operation = export_service.request_restore(&export.id).await.unwrap();

    let processor = RestoreProcessor::new(fixture.factory.clone(), fixture.blob.clone(), 2);
    let pending = processor.pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert!(processor.claim(&pending[0]).await.unwrap());
    let (_stop_tx, stop_rx) = stop_channel();
    processor.execute(&pending[0], stop_rx).await.unwrap();

    let finished = fixture.service.restores.get(&operation.id).await.unwrap();
    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.failed_count, 0);
    // Location and area still existed, so they are skipped; the commodity,
    // its three files, and three attachments are applied.
    assert_eq!(finished.skipped_count, 2);
    assert_eq!(finished.applied_count, 7);

    // The sub-graph is back under its original ids.
    let restored = fixture.set.commodities.get(&fixture.commodity_id).await.unwrap();
    assert_eq!(restored.name, "Drill");
    assert_eq!(restored.area_id, fixture.area_id);
    assert!(fixture.set.locations.get(&fixture.location_id).await.is_ok());
    for file_id in &fixture.file_ids {
        assert!(fixture.set.files.get(file_id).await.is_ok());
    }

    let steps = fixture.service.restores.steps(&operation.id).await.unwrap();
    assert_eq!(steps.len(), 9);
    assert!(steps.iter().any(|s| s.name.starts_with("location:") && s.result == StepResult::Skipped));
    assert!(steps.iter().any(|s| s.name.starts_with("commodity:") && s.result == StepResult::Applied));
}

// --- Worker drives the pipeline ---------------------------------------------

#[tokio::test]
async fn worker_picks_up_pending_exports() {
    let fixture = fixture().await;
    let export_service = ExportService::new(
        fixture.set.clone(),
        fixture.blob.clone(),
        fixture.identity.clone(),
    );
    let export = export_service
        .request_export(ExportType::Locations, Vec::new(), false, "locations only")
        .await
        .unwrap();

    let worker = Worker::new(
        ExportProcessor::new(fixture.factory.clone(), fixture.blob.clone(), 2),
        std::time::Duration::from_millis(10),
        2,
    );
    worker.start();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    worker.stop().await;
    assert!(!worker.is_running());

    let finished = fixture.service.exports.get(&export.id).await.unwrap();
    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.stats.location_count, 1);
    assert_eq!(finished.stats.commodity_count, 0);

    // The location export carries the areas as well.
    assert_eq!(finished.stats.area_count, 1);
}
