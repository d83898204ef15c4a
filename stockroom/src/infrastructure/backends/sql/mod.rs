// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQL Backend (PostgreSQL)
//!
//! Relational backend over sqlx. One transaction per mutation; per-session
//! RLS identity variables set on the same connection as the queries; schema
//! and policies defined by the migration log under `migrations/`.

pub mod helpers;
mod registries;
pub mod session;

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use stockroom_domain::registries::{RegistryFactory, RegistrySet};
use stockroom_domain::value_objects::{Capability, CapabilitySet};
use stockroom_domain::{DomainError, DomainResult, RequestIdentity};

use registries::{
    SqlAreaRegistry, SqlCommodityFileRegistry, SqlCommodityRegistry, SqlExportRegistry,
    SqlFileRegistry, SqlLocationRegistry, SqlRestoreRegistry, SqlSettingsRegistry, SqlSlotRegistry,
    SqlTenantRegistry, SqlThumbnailRegistry, SqlUserRegistry,
};

/// The PostgreSQL storage backend.
#[derive(Clone)]
pub struct SqlBackend {
    pool: PgPool,
}

impl SqlBackend {
    /// Connects a pool to the given PostgreSQL URL.
    pub async fn connect(url: &str) -> DomainResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(url)
            .await
            .map_err(|e| DomainError::storage(format!("postgres connect: {e}")))?;
        Ok(Self { pool })
    }

    /// Wraps an existing pool (tests, admin tooling).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn set(&self, scope: RequestIdentity) -> RegistrySet {
        let pool = &self.pool;
        RegistrySet {
            tenants: Arc::new(SqlTenantRegistry::new(pool.clone(), scope.clone())),
            users: Arc::new(SqlUserRegistry::new(pool.clone(), scope.clone())),
            locations: Arc::new(SqlLocationRegistry::new(pool.clone(), scope.clone())),
            areas: Arc::new(SqlAreaRegistry::new(pool.clone(), scope.clone())),
            commodities: Arc::new(SqlCommodityRegistry::new(pool.clone(), scope.clone())),
            files: Arc::new(SqlFileRegistry::new(pool.clone(), scope.clone())),
            commodity_files: Arc::new(SqlCommodityFileRegistry::new(pool.clone(), scope.clone())),
            exports: Arc::new(SqlExportRegistry::new(pool.clone(), scope.clone())),
            restores: Arc::new(SqlRestoreRegistry::new(pool.clone(), scope.clone())),
            settings: Arc::new(SqlSettingsRegistry::new(pool.clone(), scope.clone())),
            thumbnails: Arc::new(SqlThumbnailRegistry::new(pool.clone(), scope.clone())),
            slots: Arc::new(SqlSlotRegistry::new(pool.clone(), scope)),
        }
    }
}

impl RegistryFactory for SqlBackend {
    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::none()
            .with(Capability::FullTextSearch)
            .with(Capability::JsonContainerQueries)
            .with(Capability::BulkUpsert)
            .with(Capability::AdvancedIndexing)
            .with(Capability::TrigramSimilarity)
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
