// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Inventory Hierarchy Registries
//!
//! Location, Area, and Commodity form the user's physical hierarchy. Each
//! parent registry exposes its child listing symmetric to the FK relation;
//! `delete` refuses with `CannotDelete` while children exist. Recursive
//! deletion is orchestrated by the entity service, which holds both sides of
//! each relation as collaborators - registries carry no back-pointers to one
//! another.

use async_trait::async_trait;

use super::ListPage;
use crate::entities::{Area, Commodity, Location};
use crate::value_objects::EntityId;
use crate::DomainResult;

/// Persistence contract for locations.
#[async_trait]
pub trait LocationRegistry: Send + Sync {
    async fn create(&self, location: Location) -> DomainResult<Location>;

    async fn get(&self, id: &EntityId) -> DomainResult<Location>;

    async fn list(&self) -> DomainResult<Vec<Location>>;

    async fn update(&self, location: Location) -> DomainResult<Location>;

    /// Fails with `CannotDelete` while the location still has areas.
    async fn delete(&self, id: &EntityId) -> DomainResult<()>;

    async fn count(&self) -> DomainResult<usize>;

    /// Ids of the areas inside this location, in insertion order.
    async fn areas(&self, location_id: &EntityId) -> DomainResult<Vec<EntityId>>;
}

/// Persistence contract for areas.
#[async_trait]
pub trait AreaRegistry: Send + Sync {
    /// Validates that the referenced location exists before persisting.
    async fn create(&self, area: Area) -> DomainResult<Area>;

    async fn get(&self, id: &EntityId) -> DomainResult<Area>;

    async fn list(&self) -> DomainResult<Vec<Area>>;

    async fn update(&self, area: Area) -> DomainResult<Area>;

    /// Fails with `CannotDelete` while the area still has commodities.
    async fn delete(&self, id: &EntityId) -> DomainResult<()>;

    async fn count(&self) -> DomainResult<usize>;

    /// Ids of the commodities inside this area, in insertion order.
    async fn commodities(&self, area_id: &EntityId) -> DomainResult<Vec<EntityId>>;
}

/// Persistence contract for commodities.
#[async_trait]
pub trait CommodityRegistry: Send + Sync {
    /// Validates that the referenced area exists before persisting.
    /// Validation context (main currency) is applied by the caller.
    async fn create(&self, commodity: Commodity) -> DomainResult<Commodity>;

    async fn get(&self, id: &EntityId) -> DomainResult<Commodity>;

    async fn list(&self) -> DomainResult<Vec<Commodity>>;

    async fn list_paginated(&self, offset: usize, limit: usize) -> DomainResult<ListPage<Commodity>>;

    async fn update(&self, commodity: Commodity) -> DomainResult<Commodity>;

    /// Fails with `CannotDelete` while attachments (images, manuals,
    /// invoices) exist; recursive removal goes through the entity service.
    async fn delete(&self, id: &EntityId) -> DomainResult<()>;

    async fn count(&self) -> DomainResult<usize>;
}
