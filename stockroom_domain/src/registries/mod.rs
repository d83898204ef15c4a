// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Registry Interface Family
//!
//! One interface per entity family, providing an abstraction layer between
//! the domain and the storage backends (SQL, KV, in-memory). All backends
//! honour the same contracts: referential integrity, soft delete, and
//! per-user isolation.
//!
//! ## Contract Summary
//!
//! - **Base CRUD**: `create`, `get`, `list`, `update`, `delete`, `count`.
//!   Returned values always carry a populated id and stored timestamps;
//!   inputs are validated before persistence; unknown ids fail with
//!   `NotFound`.
//! - **Scoping**: registries are identity-bound at construction. A set built
//!   for user U filters every read and stamps every write with U's scope; a
//!   service-scoped set (workers, migrations) sees all rows.
//! - **Relations**: parents expose child listings symmetric to the FK
//!   relation; `delete` on a parent with live children fails with
//!   `CannotDelete` - cascades go through the entity service.
//! - **Ordering**: `list` returns insertion order per owner; no secondary
//!   sort unless an enhanced query is used.
//!
//! ## Thread Safety
//!
//! Implementations must be `Send + Sync`; all methods are async because the
//! contracts are infrastructure ports.

mod files;
mod inventory;
mod jobs;
mod settings;
mod slots;
mod tenants;
mod users;

pub use files::{CommodityFileRegistry, FileRegistry, FileSearchQuery};
pub use inventory::{AreaRegistry, CommodityRegistry, LocationRegistry};
pub use jobs::{ExportRegistry, RestoreRegistry, ThumbnailRegistry};
pub use settings::SettingsRegistry;
pub use slots::SlotRegistry;
pub use tenants::TenantRegistry;
pub use users::UserRegistry;

use std::sync::Arc;

use crate::identity::RequestIdentity;
use crate::value_objects::CapabilitySet;
use crate::DomainResult;

/// One page of a paginated listing.
///
/// `total` is always the pre-slice count; `offset` is clamped to the total
/// so an out-of-range request yields an empty page rather than an error.
#[derive(Debug, Clone, PartialEq)]
pub struct ListPage<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

impl<T> ListPage<T> {
    /// Builds a page from a fully-loaded, insertion-ordered listing.
    pub fn slice(all: Vec<T>, offset: usize, limit: usize) -> Self {
        let total = all.len();
        let offset = offset.min(total);
        let end = (offset + limit).min(total);
        let items = all.into_iter().skip(offset).take(end - offset).collect();
        Self {
            items,
            total,
            offset,
            limit,
        }
    }
}

/// A bundle of identity-scoped registries, one per entity family.
///
/// Obtained from a [`RegistryFactory`]; every registry in the set shares the
/// same bound identity.
#[derive(Clone)]
pub struct RegistrySet {
    pub tenants: Arc<dyn TenantRegistry>,
    pub users: Arc<dyn UserRegistry>,
    pub locations: Arc<dyn LocationRegistry>,
    pub areas: Arc<dyn AreaRegistry>,
    pub commodities: Arc<dyn CommodityRegistry>,
    pub files: Arc<dyn FileRegistry>,
    pub commodity_files: Arc<dyn CommodityFileRegistry>,
    pub exports: Arc<dyn ExportRegistry>,
    pub restores: Arc<dyn RestoreRegistry>,
    pub settings: Arc<dyn SettingsRegistry>,
    pub thumbnails: Arc<dyn ThumbnailRegistry>,
    pub slots: Arc<dyn SlotRegistry>,
}

/// Factory yielding identity-bound registry sets for one backend.
///
/// Two flavours are produced: a user set, which requires an authenticated
/// user identity and errors with `UserContextRequired` without one, and a
/// service set bound to the elevated identity used only by workers and
/// migrations.
pub trait RegistryFactory: Send + Sync {
    /// Declared native capabilities of the underlying backend.
    fn capabilities(&self) -> CapabilitySet;

    /// Builds a registry set scoped to an authenticated user.
    fn user_set(&self, identity: Option<RequestIdentity>) -> DomainResult<RegistrySet>;

    /// Builds the elevated service-scoped registry set.
    fn service_set(&self) -> RegistrySet;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_slicing_clamps_offset_and_end() {
        let all: Vec<i32> = (0..10).collect();

        let page = ListPage::slice(all.clone(), 8, 5);
        assert_eq!(page.items, vec![8, 9]);
        assert_eq!(page.total, 10);

        let past_end = ListPage::slice(all.clone(), 50, 5);
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.offset, 10);
        assert_eq!(past_end.total, 10);

        let first = ListPage::slice(all, 0, 3);
        assert_eq!(first.items, vec![0, 1, 2]);
    }
}
