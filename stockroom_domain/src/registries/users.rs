// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! User registry contract.

use async_trait::async_trait;

use crate::entities::User;
use crate::value_objects::EntityId;
use crate::DomainResult;

/// Persistence contract for users.
///
/// Email uniqueness is enforced within the tenant; lookups are scoped to the
/// bound identity's tenant unless the registry is service-scoped.
#[async_trait]
pub trait UserRegistry: Send + Sync {
    async fn create(&self, user: User) -> DomainResult<User>;

    async fn get(&self, id: &EntityId) -> DomainResult<User>;

    async fn get_by_email(&self, tenant_id: &EntityId, email: &str) -> DomainResult<User>;

    async fn list(&self) -> DomainResult<Vec<User>>;

    async fn update(&self, user: User) -> DomainResult<User>;

    async fn delete(&self, id: &EntityId) -> DomainResult<()>;

    async fn count(&self) -> DomainResult<usize>;
}
