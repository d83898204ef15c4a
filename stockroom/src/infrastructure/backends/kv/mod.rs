// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # KV Backend (redb)
//!
//! Embedded append-only key-value backend built on redb: ACID transactions,
//! single-writer/multi-reader concurrency, automatic crash recovery, no
//! external processes.

mod registries;
mod schema;
mod store;

pub use store::KvStore;

use std::path::Path;
use std::sync::Arc;

use stockroom_domain::registries::{RegistryFactory, RegistrySet};
use stockroom_domain::value_objects::{Capability, CapabilitySet};
use stockroom_domain::{DomainError, DomainResult, RequestIdentity};

use registries::{
    KvAreaRegistry, KvCommodityFileRegistry, KvCommodityRegistry, KvExportRegistry, KvFileRegistry,
    KvLocationRegistry, KvRestoreRegistry, KvSettingsRegistry, KvSlotRegistry, KvTenantRegistry,
    KvThumbnailRegistry, KvUserRegistry,
};

/// The embedded KV storage backend.
#[derive(Clone)]
pub struct KvBackend {
    store: KvStore,
}

impl KvBackend {
    /// Opens (or creates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> DomainResult<Self> {
        Ok(Self {
            store: KvStore::open(path)?,
        })
    }

    fn set(&self, scope: RequestIdentity) -> RegistrySet {
        let store = &self.store;
        RegistrySet {
            tenants: Arc::new(KvTenantRegistry::new(store.clone(), scope.clone())),
            users: Arc::new(KvUserRegistry::new(store.clone(), scope.clone())),
            locations: Arc::new(KvLocationRegistry::new(store.clone(), scope.clone())),
            areas: Arc::new(KvAreaRegistry::new(store.clone(), scope.clone())),
            commodities: Arc::new(KvCommodityRegistry::new(store.clone(), scope.clone())),
            files: Arc::new(KvFileRegistry::new(store.clone(), scope.clone())),
            commodity_files: Arc::new(KvCommodityFileRegistry::new(store.clone(), scope.clone())),
            exports: Arc::new(KvExportRegistry::new(store.clone(), scope.clone())),
            restores: Arc::new(KvRestoreRegistry::new(store.clone(), scope.clone())),
            settings: Arc::new(KvSettingsRegistry::new(store.clone(), scope.clone())),
            thumbnails: Arc::new(KvThumbnailRegistry::new(store.clone(), scope.clone())),
            slots: Arc::new(KvSlotRegistry::new(store.clone(), scope)),
        }
    }
}

impl RegistryFactory for KvBackend {
    fn capabilities(&self) -> CapabilitySet {
        // Named unique indexes are the only enhanced feature redb gives us
        // natively; search and bulk operations fall back in process.
        CapabilitySet::none().with(Capability::AdvancedIndexing)
    }

    fn user_set(&self, identity: Option<RequestIdentity>) -> DomainResult<RegistrySet> {
        let identity = identity.ok_or(DomainError::UserContextRequired)?;
        identity.require_user()?;
        Ok(self.set(identity))
    }

    fn service_set(&self) -> RegistrySet {
        self.set(RequestIdentity::service())
    }
}
