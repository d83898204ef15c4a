// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Tenant registry contract.

use async_trait::async_trait;

use crate::entities::Tenant;
use crate::value_objects::EntityId;
use crate::DomainResult;

/// Persistence contract for tenants.
///
/// Slug and domain uniqueness is system-wide; `delete` fails with
/// `CannotDelete` while the tenant still has users.
#[async_trait]
pub trait TenantRegistry: Send + Sync {
    async fn create(&self, tenant: Tenant) -> DomainResult<Tenant>;

    async fn get(&self, id: &EntityId) -> DomainResult<Tenant>;

    async fn get_by_slug(&self, slug: &str) -> DomainResult<Tenant>;

    async fn list(&self) -> DomainResult<Vec<Tenant>>;

    async fn update(&self, tenant: Tenant) -> DomainResult<Tenant>;

    async fn delete(&self, id: &EntityId) -> DomainResult<()>;

    async fn count(&self) -> DomainResult<usize>;
}
