// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Backend conformance suite.
//!
//! Every scenario runs against the in-memory and the KV backend through the
//! same registry contracts; the SQL backend shares the contracts but needs
//! a live PostgreSQL instance, so its conformance run lives with the
//! deployment checks.

use std::sync::Arc;

use chrono::Duration;
use serde_json::json;
use tempfile::TempDir;

use stockroom::application::services::EntityService;
use stockroom::infrastructure::backends::kv::KvBackend;
use stockroom::infrastructure::backends::memory::MemoryBackend;
use stockroom::infrastructure::services::blob::{BlobStore, MemoryBlobStore};
use stockroom_domain::entities::{
    Area, Commodity, CommodityFile, Export, ExportType, File, FileType, JobKind, Location,
    ThumbnailJob, User,
};
use stockroom_domain::registries::{RegistryFactory, RegistrySet};
use stockroom_domain::{DomainError, EntityId, RequestIdentity};

struct Harness {
    name: &'static str,
    factory: Arc<dyn RegistryFactory>,
    // Keeps the KV database directory alive for the test's duration.
    _dir: Option<TempDir>,
}

fn backends() -> Vec<Harness> {
    let dir = tempfile::tempdir().unwrap();
    let kv = KvBackend::open(dir.path().join("contract.redb")).unwrap();
    vec![
        Harness {
            name: "memory",
            factory: Arc::new(MemoryBackend::new()),
            _dir: None,
        },
        Harness {
            name: "kv",
            factory: Arc::new(kv),
            _dir: Some(dir),
        },
    ]
}

struct Scope {
    set: RegistrySet,
    service: RegistrySet,
    identity: RequestIdentity,
}

async fn seed_user(factory: &Arc<dyn RegistryFactory>, slug: &str, email: &str) -> Scope {
    let service = factory.service_set();
    let tenant = service
        .tenants
        .create(stockroom_domain::entities::Tenant::new(format!("Tenant {slug}"), slug))
        .await
        .unwrap();
    let mut user = User::new(tenant.id.clone(), email, "Test User");
    user.set_password("Passw0rd1").unwrap();
    let user = service.users.create(user).await.unwrap();
    let identity = RequestIdentity::user(tenant.id, user.id);
    let set = factory.user_set(Some(identity.clone())).unwrap();
    Scope {
        set,
        service,
        identity,
    }
}

async fn set_main_currency(scope: &Scope) {
    let mut settings = scope.set.settings.get().await.unwrap();
    settings.patch("system.main_currency", &json!("USD")).unwrap();
    scope.set.settings.save(settings).await.unwrap();
}

// --- S1: area create and validate -----------------------------------------

#[tokio::test]
async fn area_create_validates_and_counts() {
    for harness in backends() {
        let scope = seed_user(&harness.factory, "s1", "s1@example.com").await;
        let (tenant, user) = scope.identity.require_user().unwrap();

        let location = scope
            .set
            .locations
            .create(Location::new(tenant.clone(), user.clone(), "Loc 1"))
            .await
            .unwrap();

        let invalid = Area::new(tenant.clone(), user.clone(), location.id.clone(), "");
        let err = scope.set.areas.create(invalid).await.unwrap_err();
        assert!(
            matches!(&err, DomainError::FieldRequired { field_name } if field_name == "Name"),
            "[{}] expected FieldRequired(Name), got {err:?}",
            harness.name
        );

        let area = scope
            .set
            .areas
            .create(Area::new(tenant.clone(), user.clone(), location.id.clone(), "A1"))
            .await
            .unwrap();
        assert!(!area.id.as_str().is_empty());
        assert_eq!(scope.set.areas.count().await.unwrap(), 1, "[{}]", harness.name);
    }
}

// --- Invariant 1: read-back equality ---------------------------------------

#[tokio::test]
async fn persisted_entities_read_back_equal() {
    for harness in backends() {
        let scope = seed_user(&harness.factory, "readback", "rb@example.com").await;
        set_main_currency(&scope).await;
        let (tenant, user) = scope.identity.require_user().unwrap();

        let location = scope
            .set
            .locations
            .create(Location::new(tenant.clone(), user.clone(), "Garage"))
            .await
            .unwrap();
        let area = scope
            .set
            .areas
            .create(Area::new(tenant.clone(), user.clone(), location.id.clone(), "Shelf"))
            .await
            .unwrap();

        let mut commodity = Commodity::new(tenant.clone(), user.clone(), area.id.clone(), "Drill");
        commodity.tags = vec!["tools".into(), "power".into()];
        commodity.serial_number = Some("SN-1234".into());
        let created = scope.set.commodities.create(commodity).await.unwrap();

        let fetched = scope.set.commodities.get(&created.id).await.unwrap();
        assert_eq!(fetched, created, "[{}] lossy round trip", harness.name);
    }
}

// --- Invariant 2: tenant isolation -----------------------------------------

#[tokio::test]
async fn cross_tenant_reads_return_nothing() {
    for harness in backends() {
        let alice = seed_user(&harness.factory, "alice", "alice@example.com").await;
        let bob = seed_user(&harness.factory, "bob", "bob@example.com").await;
        let (tenant, user) = alice.identity.require_user().unwrap();

        let location = alice
            .set
            .locations
            .create(Location::new(tenant.clone(), user.clone(), "Private"))
            .await
            .unwrap();

        assert!(bob.set.locations.list().await.unwrap().is_empty(), "[{}]", harness.name);
        let err = bob.set.locations.get(&location.id).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }), "[{}]", harness.name);
        // The service identity sees across tenants.
        assert_eq!(bob.service.locations.list().await.unwrap().len(), 1);
    }
}

// --- Invariant 3: soft delete views ----------------------------------------

#[tokio::test]
async fn export_soft_delete_views() {
    for harness in backends() {
        let scope = seed_user(&harness.factory, "soft", "soft@example.com").await;
        let (tenant, user) = scope.identity.require_user().unwrap();

        let export = scope
            .set
            .exports
            .create(Export::new(tenant.clone(), user.clone(), ExportType::Locations))
            .await
            .unwrap();

        scope.set.exports.delete(&export.id).await.unwrap();
        assert!(scope.set.exports.list().await.unwrap().is_empty());
        let deleted = scope.set.exports.list_deleted().await.unwrap();
        assert_eq!(deleted.len(), 1, "[{}]", harness.name);

        let err = scope.set.exports.get(&export.id).await.unwrap_err();
        assert!(matches!(err, DomainError::Deleted { .. }));
        assert!(err.is_not_found(), "deleted rows read as missing externally");

        scope.set.exports.hard_delete(&export.id).await.unwrap();
        let err = scope.set.exports.get(&export.id).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }), "[{}]", harness.name);
    }
}

// --- Invariant 4: parent-child delete discipline ---------------------------

#[tokio::test]
async fn delete_refuses_with_children_and_recursion_spares_siblings() {
    for harness in backends() {
        let scope = seed_user(&harness.factory, "cascade", "cascade@example.com").await;
        set_main_currency(&scope).await;
        let (tenant, user) = scope.identity.require_user().unwrap();
        let blob: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let entity_service = EntityService::new(scope.set.clone(), blob);

        let keep = scope
            .set
            .locations
            .create(Location::new(tenant.clone(), user.clone(), "Keep"))
            .await
            .unwrap();
        let keep_area = scope
            .set
            .areas
            .create(Area::new(tenant.clone(), user.clone(), keep.id.clone(), "Keep Area"))
            .await
            .unwrap();

        let doomed = scope
            .set
            .locations
            .create(Location::new(tenant.clone(), user.clone(), "Doomed"))
            .await
            .unwrap();
        let doomed_area = scope
            .set
            .areas
            .create(Area::new(tenant.clone(), user.clone(), doomed.id.clone(), "Doomed Area"))
            .await
            .unwrap();
        entity_service
            .create_commodity(Commodity::new(
                tenant.clone(),
                user.clone(),
                doomed_area.id.clone(),
                "Doomed Drill",
            ))
            .await
            .unwrap();

        let err = scope.set.locations.delete(&doomed.id).await.unwrap_err();
        assert!(matches!(err, DomainError::CannotDelete { .. }), "[{}]", harness.name);

        entity_service.delete_location_recursive(&doomed.id).await.unwrap();
        assert!(matches!(
            scope.set.locations.get(&doomed.id).await.unwrap_err(),
            DomainError::NotFound { .. }
        ));
        assert!(scope.set.areas.get(&doomed_area.id).await.is_err());
        // Sibling branch untouched.
        assert!(scope.set.locations.get(&keep.id).await.is_ok());
        assert!(scope.set.areas.get(&keep_area.id).await.is_ok());
    }
}

// --- S2 + Invariant 5: file deletion semantics -----------------------------

#[tokio::test]
async fn recursive_commodity_delete_removes_files() {
    for harness in backends() {
        let scope = seed_user(&harness.factory, "s2", "s2@example.com").await;
        set_main_currency(&scope).await;
        let (tenant, user) = scope.identity.require_user().unwrap();
        let blob = Arc::new(MemoryBlobStore::new());
        let entity_service = EntityService::new(scope.set.clone(), blob.clone());

        let location = scope
            .set
            .locations
            .create(Location::new(tenant.clone(), user.clone(), "Home"))
            .await
            .unwrap();
        let area = scope
            .set
            .areas
            .create(Area::new(tenant.clone(), user.clone(), location.id.clone(), "Office"))
            .await
            .unwrap();
        let commodity = entity_service
            .create_commodity(Commodity::new(
                tenant.clone(),
                user.clone(),
                area.id.clone(),
                "Laptop",
            ))
            .await
            .unwrap();

        let mut file_ids = Vec::new();
        for (path, kind) in [
            ("laptop/photo.jpg", FileType::Image),
            ("laptop/manual.pdf", FileType::Manual),
            ("laptop/invoice.pdf", FileType::Invoice),
        ] {
            let mut file = File::new(tenant.clone(), user.clone(), path, "application/octet-stream");
            file.file_type = kind;
            file.link_to("commodity", commodity.id.clone());
            let file = scope.set.files.create(file).await.unwrap();
            blob.put(path, b"bytes").await.unwrap();
            scope
                .set
                .commodity_files
                .create(CommodityFile::new(
                    tenant.clone(),
                    user.clone(),
                    commodity.id.clone(),
                    file.id.clone(),
                    kind,
                ))
                .await
                .unwrap();
            file_ids.push(file.id);
        }

        entity_service
            .delete_commodity_recursive(&commodity.id)
            .await
            .unwrap();

        assert!(scope.set.commodities.get(&commodity.id).await.is_err(), "[{}]", harness.name);
        for file_id in &file_ids {
            assert!(scope.set.files.get(file_id).await.is_err());
        }
        assert!(scope.set.areas.get(&area.id).await.is_ok());
        assert!(scope.set.locations.get(&location.id).await.is_ok());
    }
}

#[tokio::test]
async fn file_delete_nulls_export_reference() {
    for harness in backends() {
        let scope = seed_user(&harness.factory, "filenull", "fn@example.com").await;
        let (tenant, user) = scope.identity.require_user().unwrap();
        let blob = Arc::new(MemoryBlobStore::new());
        let entity_service = EntityService::new(scope.set.clone(), blob.clone());

        let file = scope
            .set
            .files
            .create(File::new(tenant.clone(), user.clone(), "exports/a.xml", "application/xml"))
            .await
            .unwrap();
        blob.put("exports/a.xml", b"<inventory/>").await.unwrap();

        let mut export = Export::new(tenant.clone(), user.clone(), ExportType::Locations);
        export.file_id = Some(file.id.clone());
        let export = scope.set.exports.create(export).await.unwrap();

        entity_service.delete_file(&file.id).await.unwrap();

        let reloaded = scope.set.exports.get(&export.id).await.unwrap();
        assert_eq!(reloaded.file_id, None, "[{}]", harness.name);
        assert!(scope.set.files.get(&file.id).await.is_err());
    }
}

// --- Invariant 6 + S4: main currency immutability --------------------------

#[tokio::test]
async fn main_currency_immutable_once_set() {
    for harness in backends() {
        let scope = seed_user(&harness.factory, "currency", "cur@example.com").await;

        let mut settings = scope.set.settings.get().await.unwrap();
        settings.patch("system.main_currency", &json!("USD")).unwrap();
        scope.set.settings.save(settings).await.unwrap();

        let mut settings = scope.set.settings.get().await.unwrap();
        let err = settings.patch("system.main_currency", &json!("EUR")).unwrap_err();
        assert!(matches!(err, DomainError::MainCurrencyAlreadySet), "[{}]", harness.name);

        // Setting the same value again is fine.
        let mut settings = scope.set.settings.get().await.unwrap();
        settings.patch("system.main_currency", &json!("USD")).unwrap();
        let saved = scope.set.settings.save(settings).await.unwrap();
        assert_eq!(saved.main_currency.as_deref(), Some("USD"));
    }
}

// --- Commodity creation requires main currency -----------------------------

#[tokio::test]
async fn commodity_create_requires_main_currency() {
    for harness in backends() {
        let scope = seed_user(&harness.factory, "nocur", "nocur@example.com").await;
        let (tenant, user) = scope.identity.require_user().unwrap();
        let entity_service = EntityService::new(scope.set.clone(), Arc::new(MemoryBlobStore::new()));

        let location = scope
            .set
            .locations
            .create(Location::new(tenant.clone(), user.clone(), "L"))
            .await
            .unwrap();
        let area = scope
            .set
            .areas
            .create(Area::new(tenant.clone(), user.clone(), location.id.clone(), "A"))
            .await
            .unwrap();

        let err = entity_service
            .create_commodity(Commodity::new(tenant.clone(), user.clone(), area.id.clone(), "C"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::MainCurrencyNotSet), "[{}]", harness.name);
    }
}

// --- Uniqueness -------------------------------------------------------------

#[tokio::test]
async fn owner_scoped_name_uniqueness() {
    for harness in backends() {
        let scope = seed_user(&harness.factory, "unique", "uniq@example.com").await;
        let (tenant, user) = scope.identity.require_user().unwrap();

        scope
            .set
            .locations
            .create(Location::new(tenant.clone(), user.clone(), "Garage"))
            .await
            .unwrap();
        let err = scope
            .set
            .locations
            .create(Location::new(tenant.clone(), user.clone(), "Garage"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::AlreadyExists { .. }), "[{}]", harness.name);

        // A different owner may reuse the name.
        let other = seed_user(&harness.factory, &format!("unique2-{}", harness.name), "uniq2@example.com").await;
        let (tenant2, user2) = other.identity.require_user().unwrap();
        assert!(other
            .set
            .locations
            .create(Location::new(tenant2.clone(), user2.clone(), "Garage"))
            .await
            .is_ok());
    }
}

// --- Slots ------------------------------------------------------------------

#[tokio::test]
async fn slots_enforce_per_user_limits() {
    for harness in backends() {
        let scope = seed_user(&harness.factory, "slots", "slots@example.com").await;
        let (_, user) = scope.identity.require_user().unwrap();
        let slots = &scope.service.slots;

        let first = slots
            .acquire(user, JobKind::Export, &EntityId::new(), 2, Duration::minutes(5))
            .await
            .unwrap();
        slots
            .acquire(user, JobKind::Export, &EntityId::new(), 2, Duration::minutes(5))
            .await
            .unwrap();
        let err = slots
            .acquire(user, JobKind::Export, &EntityId::new(), 2, Duration::minutes(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ConcurrencyLimitExceeded(_)), "[{}]", harness.name);

        // Another kind has its own budget.
        assert!(slots
            .acquire(user, JobKind::Restore, &EntityId::new(), 2, Duration::minutes(5))
            .await
            .is_ok());

        // Releasing frees capacity.
        slots.release(&first.id).await.unwrap();
        assert!(slots
            .acquire(user, JobKind::Export, &EntityId::new(), 2, Duration::minutes(5))
            .await
            .is_ok());
    }
}

// --- Thumbnails: one active job per file ------------------------------------

#[tokio::test]
async fn one_active_thumbnail_job_per_file() {
    for harness in backends() {
        let scope = seed_user(&harness.factory, "thumbs", "thumbs@example.com").await;
        let (tenant, user) = scope.identity.require_user().unwrap();

        let file = scope
            .set
            .files
            .create(File::new(tenant.clone(), user.clone(), "pic.jpg", "image/jpeg"))
            .await
            .unwrap();

        scope
            .set
            .thumbnails
            .create(ThumbnailJob::new(tenant.clone(), user.clone(), file.id.clone(), 256))
            .await
            .unwrap();
        let err = scope
            .set
            .thumbnails
            .create(ThumbnailJob::new(tenant.clone(), user.clone(), file.id.clone(), 512))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::AlreadyExists { .. }), "[{}]", harness.name);
    }
}

// --- User context required ---------------------------------------------------

#[tokio::test]
async fn user_set_requires_identity() {
    for harness in backends() {
        assert!(matches!(
            harness.factory.user_set(None),
            Err(DomainError::UserContextRequired)
        ));
        assert!(matches!(
            harness.factory.user_set(Some(RequestIdentity::service())),
            Err(DomainError::UserContextRequired)
        ));
    }
}
