// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # In-Memory Backend
//!
//! Reference backend used for tests and development. Same contracts as the
//! KV and SQL backends, with uniqueness and FK checks enforced in code.

mod registries;
mod store;

pub use store::MemoryStore;

use std::sync::Arc;

use stockroom_domain::registries::{RegistryFactory, RegistrySet};
use stockroom_domain::value_objects::CapabilitySet;
use stockroom_domain::{DomainError, DomainResult, RequestIdentity};

use registries::{
    MemoryAreaRegistry, MemoryCommodityFileRegistry, MemoryCommodityRegistry, MemoryExportRegistry,
    MemoryFileRegistry, MemoryLocationRegistry, MemoryRestoreRegistry, MemorySettingsRegistry,
    MemorySlotRegistry, MemoryTenantRegistry, MemoryThumbnailRegistry, MemoryUserRegistry,
};

/// The in-memory storage backend.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    store: MemoryStore,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
        }
    }

    fn set(&self, scope: RequestIdentity) -> RegistrySet {
        let store = &self.store;
        RegistrySet {
            tenants: Arc::new(MemoryTenantRegistry::new(store.clone(), scope.clone())),
            users: Arc::new(MemoryUserRegistry::new(store.clone(), scope.clone())),
            locations: Arc::new(MemoryLocationRegistry::new(store.clone(), scope.clone())),
            areas: Arc::new(MemoryAreaRegistry::new(store.clone(), scope.clone())),
            commodities: Arc::new(MemoryCommodityRegistry::new(store.clone(), scope.clone())),
            files: Arc::new(MemoryFileRegistry::new(store.clone(), scope.clone())),
            commodity_files: Arc::new(MemoryCommodityFileRegistry::new(store.clone(), scope.clone())),
            exports: Arc::new(MemoryExportRegistry::new(store.clone(), scope.clone())),
            restores: Arc::new(MemoryRestoreRegistry::new(store.clone(), scope.clone())),
            settings: Arc::new(MemorySettingsRegistry::new(store.clone(), scope.clone())),
            thumbnails: Arc::new(MemoryThumbnailRegistry::new(store.clone(), scope.clone())),
            slots: Arc::new(MemorySlotRegistry::new(store.clone(), scope)),
        }
    }
}

impl RegistryFactory for MemoryBackend {
    fn capabilities(&self) -> CapabilitySet {
        // Everything is an in-process scan already; nothing to declare.
        CapabilitySet::none()
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

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_domain::EntityId;

    #[test]
    fn user_set_requires_identity() {
        let backend = MemoryBackend::new();
        assert!(matches!(
            backend.user_set(None),
            Err(DomainError::UserContextRequired)
        ));
        assert!(matches!(
            backend.user_set(Some(RequestIdentity::service())),
            Err(DomainError::UserContextRequired)
        ));
        assert!(backend
            .user_set(Some(RequestIdentity::user(EntityId::new(), EntityId::new())))
            .is_ok());
    }
}
