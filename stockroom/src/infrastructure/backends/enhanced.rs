// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Enhanced Query Wrapper
//!
//! Backends declare a [`CapabilitySet`]; this wrapper keeps the public API
//! identical across backends by substituting an in-process fallback
//! (load everything, filter here) wherever a native capability is missing,
//! and logging one degradation warning per capability per process.
//!
//! Dispatch happens in exactly one place per operation - a capability check
//! choosing native or fallback - never through chains of dynamic objects.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::warn;

use stockroom_domain::entities::File;
use stockroom_domain::registries::{
    FileRegistry, FileSearchQuery, ListPage, RegistryFactory, RegistrySet,
};
use stockroom_domain::value_objects::{Capability, CapabilitySet};
use stockroom_domain::{DomainResult, EntityId, RequestIdentity};

/// Records which degradations have already been reported.
#[derive(Default)]
struct DegradationLog {
    reported: Mutex<HashSet<Capability>>,
}

impl DegradationLog {
    fn warn_once(&self, capability: Capability) {
        let mut reported = self.reported.lock();
        if reported.insert(capability) {
            warn!(
                capability = %capability,
                "backend lacks native capability; falling back to in-process filtering"
            );
        }
    }
}

/// Factory wrapper that upgrades produced registry sets with fallbacks.
pub struct EnhancedFactory {
    inner: Arc<dyn RegistryFactory>,
    degradations: Arc<DegradationLog>,
}

impl EnhancedFactory {
    pub fn new(inner: Arc<dyn RegistryFactory>) -> Self {
        Self {
            inner,
            degradations: Arc::new(DegradationLog::default()),
        }
    }

    fn enhance(&self, mut set: RegistrySet) -> RegistrySet {
        set.files = Arc::new(EnhancedFileRegistry {
            inner: set.files.clone(),
            capabilities: self.inner.capabilities(),
            degradations: self.degradations.clone(),
        });
        set
    }
}

impl RegistryFactory for EnhancedFactory {
    fn capabilities(&self) -> CapabilitySet {
        // The wrapper makes every capability available one way or another.
        CapabilitySet::all()
    }

    fn user_set(&self, identity: Option<RequestIdentity>) -> DomainResult<RegistrySet> {
        Ok(self.enhance(self.inner.user_set(identity)?))
    }

    fn service_set(&self) -> RegistrySet {
        self.enhance(self.inner.service_set())
    }
}

/// File registry with capability-aware search dispatch.
struct EnhancedFileRegistry {
    inner: Arc<dyn FileRegistry>,
    capabilities: CapabilitySet,
    degradations: Arc<DegradationLog>,
}

#[async_trait]
impl FileRegistry for EnhancedFileRegistry {
    async fn create(&self, file: File) -> DomainResult<File> {
        self.inner.create(file).await
    }

    async fn get(&self, id: &EntityId) -> DomainResult<File> {
        self.inner.get(id).await
    }

    async fn list(&self) -> DomainResult<Vec<File>> {
        self.inner.list().await
    }

    async fn list_paginated(&self, offset: usize, limit: usize) -> DomainResult<ListPage<File>> {
        self.inner.list_paginated(offset, limit).await
    }

    async fn list_by_linked_entity(
        &self,
        entity_type: &str,
        entity_id: &EntityId,
    ) -> DomainResult<Vec<File>> {
        self.inner.list_by_linked_entity(entity_type, entity_id).await
    }

    async fn search(&self, query: &FileSearchQuery) -> DomainResult<Vec<File>> {
        if self.capabilities.contains(Capability::FullTextSearch) {
            return self.inner.search(query).await;
        }
        self.degradations.warn_once(Capability::FullTextSearch);
        let all = self.inner.list().await?;
        Ok(all.into_iter().filter(|f| query.matches(f)).collect())
    }

    async fn update(&self, file: File) -> DomainResult<File> {
        self.inner.update(file).await
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        self.inner.delete(id).await
    }

    async fn count(&self) -> DomainResult<usize> {
        self.inner.count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::backends::memory::MemoryBackend;
    use stockroom_domain::entities::FileType;

    #[tokio::test]
    async fn fallback_search_filters_in_process() {
        let backend = MemoryBackend::new();
        let factory = EnhancedFactory::new(Arc::new(backend));
        let identity = RequestIdentity::user(EntityId::new(), EntityId::new());
        let set = factory.user_set(Some(identity)).unwrap();

        let mut file = File::new(EntityId::new(), EntityId::new(), "docs/washer.pdf", "application/pdf");
        file.title = "Washer Manual".into();
        file.file_type = FileType::Manual;
        set.files.create(file).await.unwrap();

        let other = File::new(EntityId::new(), EntityId::new(), "pics/cat.jpg", "image/jpeg");
        set.files.create(other).await.unwrap();

        let hits = set
            .files
            .search(&FileSearchQuery {
                query: Some("washer".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Washer Manual");
    }

    #[test]
    fn wrapper_reports_full_capabilities() {
        let factory = EnhancedFactory::new(Arc::new(MemoryBackend::new()));
        assert!(factory.capabilities().contains(Capability::TrigramSimilarity));
    }
}
