// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Storage Backends
//!
//! Three concrete implementations of the registry contracts plus the glue
//! that selects between them:
//!
//! - [`memory`] - ordered maps behind a mutex; the reference backend used by
//!   tests and development
//! - [`kv`] - embedded redb store: one table per entity family, secondary
//!   index tables, multimap parent-child tables, everything inside a single
//!   read or write transaction
//! - [`sql`] - PostgreSQL via sqlx: shared CRUD helpers, one transaction per
//!   mutation, per-session RLS identity variables
//! - [`enhanced`] - capability-aware wrapper that substitutes in-process
//!   fallbacks for features a backend lacks
//! - [`registration`] - process-wide scheme registry and DSN parsing
//!
//! All backends honour the same contracts; the conformance suite in
//! `tests/` runs the identical scenarios against each.

pub mod enhanced;
pub mod kv;
pub mod memory;
pub mod registration;
pub mod sql;

use chrono::{DateTime, Utc};
use stockroom_domain::entities::{
    Area, Commodity, CommodityFile, Export, File, Location, RestoreOperation, Settings, Tenant,
    ThumbnailJob, User,
};
use stockroom_domain::{DomainError, DomainResult, EntityId, RequestIdentity};

/// Uniform row access every backend needs: identity, owner scope, and
/// timestamp maintenance.
///
/// Tenants and users are system-level rows; their owner scope points at
/// themselves and their registries apply stricter visibility rules on top.
pub trait EntityRecord: Clone + Send + Sync + 'static {
    /// Entity family name used in error context and storage keys.
    const ENTITY: &'static str;

    fn id(&self) -> &EntityId;
    fn tenant_id(&self) -> &EntityId;
    fn user_id(&self) -> &EntityId;
    fn set_owner(&mut self, tenant_id: EntityId, user_id: EntityId);
    fn set_updated_at(&mut self, at: DateTime<Utc>);
}

/// True when the bound identity may observe this row.
pub(crate) fn scope_visible<T: EntityRecord>(scope: &RequestIdentity, row: &T) -> bool {
    scope.can_access(row.tenant_id(), row.user_id())
}

/// Stamps the bound owner scope onto a row about to be created. Service
/// writes keep the owner the row already carries.
pub(crate) fn stamp_owner<T: EntityRecord>(scope: &RequestIdentity, row: &mut T) {
    if let Ok((tenant, user)) = scope.require_user() {
        row.set_owner(tenant.clone(), user.clone());
    }
}

/// Pins an update's owner to the stored row and refreshes `updated_at`:
/// rows can never migrate across owners through an update.
pub(crate) fn pin_owner_for_update<T: EntityRecord>(existing: &T, incoming: &mut T) {
    incoming.set_owner(existing.tenant_id().clone(), existing.user_id().clone());
    incoming.set_updated_at(Utc::now());
}

/// Guards system-level operations behind the elevated service identity.
pub(crate) fn require_service(scope: &RequestIdentity, action: &str) -> DomainResult<()> {
    if scope.is_service() {
        return Ok(());
    }
    Err(DomainError::unauthorized(format!(
        "{action} requires the service identity"
    )))
}

macro_rules! impl_entity_record {
    ($ty:ty, $name:literal, tenant = $tenant:ident, user = $user:ident) => {
        impl EntityRecord for $ty {
            const ENTITY: &'static str = $name;

            fn id(&self) -> &EntityId {
                &self.id
            }

            fn tenant_id(&self) -> &EntityId {
                &self.$tenant
            }

            fn user_id(&self) -> &EntityId {
                &self.$user
            }

            fn set_owner(&mut self, tenant_id: EntityId, user_id: EntityId) {
                self.$tenant = tenant_id;
                self.$user = user_id;
            }

            fn set_updated_at(&mut self, at: DateTime<Utc>) {
                self.updated_at = at;
            }
        }
    };
}

impl_entity_record!(Location, "location", tenant = tenant_id, user = user_id);
impl_entity_record!(Area, "area", tenant = tenant_id, user = user_id);
impl_entity_record!(Commodity, "commodity", tenant = tenant_id, user = user_id);
impl_entity_record!(File, "file", tenant = tenant_id, user = user_id);
impl_entity_record!(CommodityFile, "commodity_file", tenant = tenant_id, user = user_id);
impl_entity_record!(Export, "export", tenant = tenant_id, user = user_id);
impl_entity_record!(RestoreOperation, "restore_operation", tenant = tenant_id, user = user_id);
impl_entity_record!(Settings, "settings", tenant = tenant_id, user = user_id);
impl_entity_record!(ThumbnailJob, "thumbnail_job", tenant = tenant_id, user = user_id);

// Tenants are system rows: their own id is their scope and registries refuse
// user-scoped writes, so owner stamping is a no-op.
impl EntityRecord for Tenant {
    const ENTITY: &'static str = "tenant";

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn tenant_id(&self) -> &EntityId {
        &self.id
    }

    fn user_id(&self) -> &EntityId {
        &self.id
    }

    fn set_owner(&mut self, _tenant_id: EntityId, _user_id: EntityId) {}

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}

// A user's owner scope is (its tenant, itself); stamping may move it into a
// tenant but never rewrites its identity.
impl EntityRecord for User {
    const ENTITY: &'static str = "user";

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn tenant_id(&self) -> &EntityId {
        &self.tenant_id
    }

    fn user_id(&self) -> &EntityId {
        &self.id
    }

    fn set_owner(&mut self, tenant_id: EntityId, _user_id: EntityId) {
        self.tenant_id = tenant_id;
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}
