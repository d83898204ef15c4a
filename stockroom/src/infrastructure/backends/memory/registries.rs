// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # In-Memory Registry Implementations
//!
//! Reference implementations of every registry contract: uniqueness and
//! foreign-key checks happen in code rather than in schema, which makes this
//! backend the executable specification the KV and SQL backends are tested
//! against.
//!
//! Every registry holds the shared [`MemoryStore`] and the identity it was
//! bound to at factory time. Reads filter by that scope; writes stamp it.

use async_trait::async_trait;
use chrono::{Duration, Utc};

use stockroom_domain::entities::{
    Area, Commodity, CommodityFile, Export, File, FileType, JobKind, JobStatus, Location,
    OperationSlot, RestoreOperation, RestoreStep, Settings, Tenant, ThumbnailJob, User,
};
use stockroom_domain::registries::{
    AreaRegistry, CommodityFileRegistry, CommodityRegistry, ExportRegistry, FileRegistry,
    FileSearchQuery, ListPage, LocationRegistry, RestoreRegistry, SettingsRegistry, SlotRegistry,
    TenantRegistry, ThumbnailRegistry, UserRegistry,
};
use stockroom_domain::{DomainError, DomainResult, EntityId, RequestIdentity};

use super::super::{
    pin_owner_for_update as prepare_update, require_service, scope_visible as visible, stamp_owner,
};
use super::store::MemoryStore;

macro_rules! memory_registry {
    ($name:ident) => {
        pub struct $name {
            store: MemoryStore,
            scope: RequestIdentity,
        }

        impl $name {
            pub(crate) fn new(store: MemoryStore, scope: RequestIdentity) -> Self {
                Self { store, scope }
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Tenants
// ---------------------------------------------------------------------------

memory_registry!(MemoryTenantRegistry);

#[async_trait]
impl TenantRegistry for MemoryTenantRegistry {
    async fn create(&self, tenant: Tenant) -> DomainResult<Tenant> {
        require_service(&self.scope, "tenant creation")?;
        tenant.validate()?;
        let mut inner = self.store.lock();
        if inner.tenants.iter().any(|t| t.slug == tenant.slug) {
            return Err(DomainError::already_exists("tenant", format!("slug {}", tenant.slug)));
        }
        if let Some(domain) = &tenant.domain {
            if inner.tenants.iter().any(|t| t.domain.as_deref() == Some(domain)) {
                return Err(DomainError::already_exists("tenant", format!("domain {domain}")));
            }
        }
        inner.tenants.insert(tenant.clone())?;
        Ok(tenant)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<Tenant> {
        let inner = self.store.lock();
        inner
            .tenants
            .get(id)
            .filter(|t| self.scope.is_service() || self.scope.tenant_id() == Some(&t.id))
            .cloned()
            .ok_or_else(|| DomainError::not_found("tenant", id.as_str()))
    }

    async fn get_by_slug(&self, slug: &str) -> DomainResult<Tenant> {
        let inner = self.store.lock();
        let result = inner
            .tenants
            .iter()
            .find(|t| t.slug == slug)
            .filter(|t| self.scope.is_service() || self.scope.tenant_id() == Some(&t.id))
            .cloned()
            .ok_or_else(|| DomainError::not_found("tenant", slug));
        result
    }

    async fn list(&self) -> DomainResult<Vec<Tenant>> {
        let inner = self.store.lock();
        Ok(inner
            .tenants
            .iter()
            .filter(|t| self.scope.is_service() || self.scope.tenant_id() == Some(&t.id))
            .cloned()
            .collect())
    }

    async fn update(&self, tenant: Tenant) -> DomainResult<Tenant> {
        require_service(&self.scope, "tenant update")?;
        tenant.validate()?;
        let mut inner = self.store.lock();
        if inner.tenants.get(&tenant.id).is_none() {
            return Err(DomainError::not_found("tenant", tenant.id.as_str()));
        }
        if inner.tenants.iter().any(|t| t.slug == tenant.slug && t.id != tenant.id) {
            return Err(DomainError::already_exists("tenant", format!("slug {}", tenant.slug)));
        }
        let mut tenant = tenant;
        tenant.updated_at = Utc::now();
        inner.tenants.replace(tenant.clone())?;
        Ok(tenant)
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        require_service(&self.scope, "tenant deletion")?;
        let mut inner = self.store.lock();
        if inner.tenants.get(id).is_none() {
            return Err(DomainError::not_found("tenant", id.as_str()));
        }
        if inner.users.iter().any(|u| &u.tenant_id == id) {
            return Err(DomainError::cannot_delete("tenant", id.as_str(), "tenant has users"));
        }
        inner.tenants.remove(id);
        Ok(())
    }

    async fn count(&self) -> DomainResult<usize> {
        Ok(self.list().await?.len())
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

memory_registry!(MemoryUserRegistry);

#[async_trait]
impl UserRegistry for MemoryUserRegistry {
    async fn create(&self, user: User) -> DomainResult<User> {
        require_service(&self.scope, "user creation")?;
        user.validate()?;
        let mut inner = self.store.lock();
        if inner.tenants.get(&user.tenant_id).is_none() {
            return Err(DomainError::not_found("tenant", user.tenant_id.as_str()));
        }
        if inner
            .users
            .iter()
            .any(|u| u.tenant_id == user.tenant_id && u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(DomainError::already_exists("user", format!("email {}", user.email)));
        }
        inner.users.insert(user.clone())?;
        Ok(user)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<User> {
        let inner = self.store.lock();
        inner
            .users
            .get(id)
            .filter(|u| visible(&self.scope, *u))
            .cloned()
            .ok_or_else(|| DomainError::not_found("user", id.as_str()))
    }

    async fn get_by_email(&self, tenant_id: &EntityId, email: &str) -> DomainResult<User> {
        let inner = self.store.lock();
        let result = inner
            .users
            .iter()
            .find(|u| &u.tenant_id == tenant_id && u.email.eq_ignore_ascii_case(email))
            .filter(|u| visible(&self.scope, *u))
            .cloned()
            .ok_or_else(|| DomainError::not_found("user", email));
        result
    }

    async fn list(&self) -> DomainResult<Vec<User>> {
        let inner = self.store.lock();
        Ok(inner
            .users
            .iter()
            .filter(|u| visible(&self.scope, *u))
            .cloned()
            .collect())
    }

    async fn update(&self, user: User) -> DomainResult<User> {
        user.validate()?;
        let mut inner = self.store.lock();
        let existing = inner
            .users
            .get(&user.id)
            .filter(|u| visible(&self.scope, *u))
            .cloned()
            .ok_or_else(|| DomainError::not_found("user", user.id.as_str()))?;
        if inner
            .users
            .iter()
            .any(|u| u.tenant_id == existing.tenant_id && u.email.eq_ignore_ascii_case(&user.email) && u.id != user.id)
        {
            return Err(DomainError::already_exists("user", format!("email {}", user.email)));
        }
        let mut user = user;
        user.tenant_id = existing.tenant_id.clone();
        user.created_at = existing.created_at;
        // A blank hash on an update means "keep the stored password".
        if user.password_hash.is_empty() {
            user.password_hash = existing.password_hash.clone();
        }
        user.updated_at = Utc::now();
        inner.users.replace(user.clone())?;
        Ok(user)
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        require_service(&self.scope, "user deletion")?;
        let mut inner = self.store.lock();
        if inner.users.get(id).is_none() {
            return Err(DomainError::not_found("user", id.as_str()));
        }
        if inner.locations.iter().any(|l| &l.user_id == id) {
            return Err(DomainError::cannot_delete("user", id.as_str(), "user owns locations"));
        }
        if inner.files.iter().any(|f| &f.user_id == id) {
            return Err(DomainError::cannot_delete("user", id.as_str(), "user owns files"));
        }
        inner.users.remove(id);
        Ok(())
    }

    async fn count(&self) -> DomainResult<usize> {
        Ok(self.list().await?.len())
    }
}

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

memory_registry!(MemoryLocationRegistry);

#[async_trait]
impl LocationRegistry for MemoryLocationRegistry {
    async fn create(&self, location: Location) -> DomainResult<Location> {
        let mut location = location;
        stamp_owner(&self.scope, &mut location);
        location.validate()?;
        let mut inner = self.store.lock();
        if inner.locations.iter().any(|l| {
            l.tenant_id == location.tenant_id && l.user_id == location.user_id && l.name == location.name
        }) {
            return Err(DomainError::already_exists("location", format!("name {}", location.name)));
        }
        inner.locations.insert(location.clone())?;
        Ok(location)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<Location> {
        let inner = self.store.lock();
        inner
            .locations
            .get(id)
            .filter(|l| visible(&self.scope, *l))
            .cloned()
            .ok_or_else(|| DomainError::not_found("location", id.as_str()))
    }

    async fn list(&self) -> DomainResult<Vec<Location>> {
        let inner = self.store.lock();
        Ok(inner
            .locations
            .iter()
            .filter(|l| visible(&self.scope, *l))
            .cloned()
            .collect())
    }

    async fn update(&self, location: Location) -> DomainResult<Location> {
        location.validate()?;
        let mut inner = self.store.lock();
        let existing = inner
            .locations
            .get(&location.id)
            .filter(|l| visible(&self.scope, *l))
            .cloned()
            .ok_or_else(|| DomainError::not_found("location", location.id.as_str()))?;
        if inner.locations.iter().any(|l| {
            l.tenant_id == existing.tenant_id
                && l.user_id == existing.user_id
                && l.name == location.name
                && l.id != location.id
        }) {
            return Err(DomainError::already_exists("location", format!("name {}", location.name)));
        }
        let mut location = location;
        prepare_update(&existing, &mut location);
        location.created_at = existing.created_at;
        inner.locations.replace(location.clone())?;
        Ok(location)
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        let mut inner = self.store.lock();
        let Some(existing) = inner.locations.get(id).filter(|l| visible(&self.scope, *l)).cloned() else {
            return Err(DomainError::not_found("location", id.as_str()));
        };
        if inner.areas.iter().any(|a| a.location_id == existing.id) {
            return Err(DomainError::cannot_delete("location", id.as_str(), "location has areas"));
        }
        inner.locations.remove(id);
        Ok(())
    }

    async fn count(&self) -> DomainResult<usize> {
        Ok(self.list().await?.len())
    }

    async fn areas(&self, location_id: &EntityId) -> DomainResult<Vec<EntityId>> {
        let inner = self.store.lock();
        if inner
            .locations
            .get(location_id)
            .filter(|l| visible(&self.scope, *l))
            .is_none()
        {
            return Err(DomainError::not_found("location", location_id.as_str()));
        }
        Ok(inner
            .areas
            .iter()
            .filter(|a| &a.location_id == location_id)
            .map(|a| a.id.clone())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Areas
// ---------------------------------------------------------------------------

memory_registry!(MemoryAreaRegistry);

#[async_trait]
impl AreaRegistry for MemoryAreaRegistry {
    async fn create(&self, area: Area) -> DomainResult<Area> {
        let mut area = area;
        stamp_owner(&self.scope, &mut area);
        area.validate()?;
        let mut inner = self.store.lock();
        if inner
            .locations
            .get(&area.location_id)
            .filter(|l| visible(&self.scope, *l))
            .is_none()
        {
            return Err(DomainError::not_found("location", area.location_id.as_str()));
        }
        if inner
            .areas
            .iter()
            .any(|a| a.tenant_id == area.tenant_id && a.user_id == area.user_id && a.name == area.name)
        {
            return Err(DomainError::already_exists("area", format!("name {}", area.name)));
        }
        inner.areas.insert(area.clone())?;
        Ok(area)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<Area> {
        let inner = self.store.lock();
        inner
            .areas
            .get(id)
            .filter(|a| visible(&self.scope, *a))
            .cloned()
            .ok_or_else(|| DomainError::not_found("area", id.as_str()))
    }

    async fn list(&self) -> DomainResult<Vec<Area>> {
        let inner = self.store.lock();
        Ok(inner
            .areas
            .iter()
            .filter(|a| visible(&self.scope, *a))
            .cloned()
            .collect())
    }

    async fn update(&self, area: Area) -> DomainResult<Area> {
        area.validate()?;
        let mut inner = self.store.lock();
        let existing = inner
            .areas
            .get(&area.id)
            .filter(|a| visible(&self.scope, *a))
            .cloned()
            .ok_or_else(|| DomainError::not_found("area", area.id.as_str()))?;
        if inner.areas.iter().any(|a| {
            a.tenant_id == existing.tenant_id
                && a.user_id == existing.user_id
                && a.name == area.name
                && a.id != area.id
        }) {
            return Err(DomainError::already_exists("area", format!("name {}", area.name)));
        }
        if inner.locations.get(&area.location_id).is_none() {
            return Err(DomainError::not_found("location", area.location_id.as_str()));
        }
        let mut area = area;
        prepare_update(&existing, &mut area);
        area.created_at = existing.created_at;
        inner.areas.replace(area.clone())?;
        Ok(area)
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        let mut inner = self.store.lock();
        let Some(existing) = inner.areas.get(id).filter(|a| visible(&self.scope, *a)).cloned() else {
            return Err(DomainError::not_found("area", id.as_str()));
        };
        if inner.commodities.iter().any(|c| c.area_id == existing.id) {
            return Err(DomainError::cannot_delete("area", id.as_str(), "area has commodities"));
        }
        inner.areas.remove(id);
        Ok(())
    }

    async fn count(&self) -> DomainResult<usize> {
        Ok(self.list().await?.len())
    }

    async fn commodities(&self, area_id: &EntityId) -> DomainResult<Vec<EntityId>> {
        let inner = self.store.lock();
        if inner.areas.get(area_id).filter(|a| visible(&self.scope, *a)).is_none() {
            return Err(DomainError::not_found("area", area_id.as_str()));
        }
        Ok(inner
            .commodities
            .iter()
            .filter(|c| &c.area_id == area_id)
            .map(|c| c.id.clone())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Commodities
// ---------------------------------------------------------------------------

memory_registry!(MemoryCommodityRegistry);

#[async_trait]
impl CommodityRegistry for MemoryCommodityRegistry {
    async fn create(&self, commodity: Commodity) -> DomainResult<Commodity> {
        let mut commodity = commodity;
        stamp_owner(&self.scope, &mut commodity);
        let mut inner = self.store.lock();
        if inner
            .areas
            .get(&commodity.area_id)
            .filter(|a| visible(&self.scope, *a))
            .is_none()
        {
            return Err(DomainError::not_found("area", commodity.area_id.as_str()));
        }
        // Commodity names are unique per owner, case-sensitively.
        if inner.commodities.iter().any(|c| {
            c.tenant_id == commodity.tenant_id && c.user_id == commodity.user_id && c.name == commodity.name
        }) {
            return Err(DomainError::already_exists("commodity", format!("name {}", commodity.name)));
        }
        inner.commodities.insert(commodity.clone())?;
        Ok(commodity)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<Commodity> {
        let inner = self.store.lock();
        inner
            .commodities
            .get(id)
            .filter(|c| visible(&self.scope, *c))
            .cloned()
            .ok_or_else(|| DomainError::not_found("commodity", id.as_str()))
    }

    async fn list(&self) -> DomainResult<Vec<Commodity>> {
        let inner = self.store.lock();
        Ok(inner
            .commodities
            .iter()
            .filter(|c| visible(&self.scope, *c))
            .cloned()
            .collect())
    }

    async fn list_paginated(&self, offset: usize, limit: usize) -> DomainResult<ListPage<Commodity>> {
        Ok(ListPage::slice(self.list().await?, offset, limit))
    }

    async fn update(&self, commodity: Commodity) -> DomainResult<Commodity> {
        let mut inner = self.store.lock();
        let existing = inner
            .commodities
            .get(&commodity.id)
            .filter(|c| visible(&self.scope, *c))
            .cloned()
            .ok_or_else(|| DomainError::not_found("commodity", commodity.id.as_str()))?;
        if inner.commodities.iter().any(|c| {
            c.tenant_id == existing.tenant_id
                && c.user_id == existing.user_id
                && c.name == commodity.name
                && c.id != commodity.id
        }) {
            return Err(DomainError::already_exists("commodity", format!("name {}", commodity.name)));
        }
        if inner.areas.get(&commodity.area_id).is_none() {
            return Err(DomainError::not_found("area", commodity.area_id.as_str()));
        }
        let mut commodity = commodity;
        prepare_update(&existing, &mut commodity);
        commodity.created_at = existing.created_at;
        inner.commodities.replace(commodity.clone())?;
        Ok(commodity)
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        let mut inner = self.store.lock();
        let Some(existing) = inner.commodities.get(id).filter(|c| visible(&self.scope, *c)).cloned() else {
            return Err(DomainError::not_found("commodity", id.as_str()));
        };
        if inner.commodity_files.iter().any(|cf| cf.commodity_id == existing.id) {
            return Err(DomainError::cannot_delete(
                "commodity",
                id.as_str(),
                "commodity has attached files",
            ));
        }
        inner.commodities.remove(id);
        Ok(())
    }

    async fn count(&self) -> DomainResult<usize> {
        Ok(self.list().await?.len())
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

memory_registry!(MemoryFileRegistry);

#[async_trait]
impl FileRegistry for MemoryFileRegistry {
    async fn create(&self, file: File) -> DomainResult<File> {
        let mut file = file;
        stamp_owner(&self.scope, &mut file);
        file.validate()?;
        let mut inner = self.store.lock();
        inner.files.insert(file.clone())?;
        Ok(file)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<File> {
        let inner = self.store.lock();
        inner
            .files
            .get(id)
            .filter(|f| visible(&self.scope, *f))
            .cloned()
            .ok_or_else(|| DomainError::not_found("file", id.as_str()))
    }

    async fn list(&self) -> DomainResult<Vec<File>> {
        let inner = self.store.lock();
        Ok(inner
            .files
            .iter()
            .filter(|f| visible(&self.scope, *f))
            .cloned()
            .collect())
    }

    async fn list_paginated(&self, offset: usize, limit: usize) -> DomainResult<ListPage<File>> {
        Ok(ListPage::slice(self.list().await?, offset, limit))
    }

    async fn list_by_linked_entity(
        &self,
        entity_type: &str,
        entity_id: &EntityId,
    ) -> DomainResult<Vec<File>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|f| {
                f.linked_entity_type.as_deref() == Some(entity_type)
                    && f.linked_entity_id.as_ref() == Some(entity_id)
            })
            .collect())
    }

    async fn search(&self, query: &FileSearchQuery) -> DomainResult<Vec<File>> {
        Ok(self.list().await?.into_iter().filter(|f| query.matches(f)).collect())
    }

    async fn update(&self, file: File) -> DomainResult<File> {
        file.validate()?;
        let mut inner = self.store.lock();
        let existing = inner
            .files
            .get(&file.id)
            .filter(|f| visible(&self.scope, *f))
            .cloned()
            .ok_or_else(|| DomainError::not_found("file", file.id.as_str()))?;
        let mut file = file;
        prepare_update(&existing, &mut file);
        file.created_at = existing.created_at;
        inner.files.replace(file.clone())?;
        Ok(file)
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        let mut inner = self.store.lock();
        if inner.files.get(id).filter(|f| visible(&self.scope, *f)).is_none() {
            return Err(DomainError::not_found("file", id.as_str()));
        }
        inner.files.remove(id);
        Ok(())
    }

    async fn count(&self) -> DomainResult<usize> {
        Ok(self.list().await?.len())
    }
}

// ---------------------------------------------------------------------------
// Commodity files (images / manuals / invoices)
// ---------------------------------------------------------------------------

memory_registry!(MemoryCommodityFileRegistry);

#[async_trait]
impl CommodityFileRegistry for MemoryCommodityFileRegistry {
    async fn create(&self, link: CommodityFile) -> DomainResult<CommodityFile> {
        let mut link = link;
        stamp_owner(&self.scope, &mut link);
        link.validate()?;
        let mut inner = self.store.lock();
        if inner
            .commodities
            .get(&link.commodity_id)
            .filter(|c| visible(&self.scope, *c))
            .is_none()
        {
            return Err(DomainError::not_found("commodity", link.commodity_id.as_str()));
        }
        if inner.files.get(&link.file_id).is_none() {
            return Err(DomainError::not_found("file", link.file_id.as_str()));
        }
        inner.commodity_files.insert(link.clone())?;
        Ok(link)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<CommodityFile> {
        let inner = self.store.lock();
        inner
            .commodity_files
            .get(id)
            .filter(|cf| visible(&self.scope, *cf))
            .cloned()
            .ok_or_else(|| DomainError::not_found("commodity_file", id.as_str()))
    }

    async fn list_for_commodity(
        &self,
        commodity_id: &EntityId,
        kind: Option<FileType>,
    ) -> DomainResult<Vec<CommodityFile>> {
        let inner = self.store.lock();
        Ok(inner
            .commodity_files
            .iter()
            .filter(|cf| visible(&self.scope, *cf))
            .filter(|cf| &cf.commodity_id == commodity_id)
            .filter(|cf| kind.is_none_or(|k| cf.kind == k))
            .cloned()
            .collect())
    }

    async fn list_by_file(&self, file_id: &EntityId) -> DomainResult<Vec<CommodityFile>> {
        let inner = self.store.lock();
        Ok(inner
            .commodity_files
            .iter()
            .filter(|cf| visible(&self.scope, *cf))
            .filter(|cf| &cf.file_id == file_id)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        let mut inner = self.store.lock();
        if inner
            .commodity_files
            .get(id)
            .filter(|cf| visible(&self.scope, *cf))
            .is_none()
        {
            return Err(DomainError::not_found("commodity_file", id.as_str()));
        }
        inner.commodity_files.remove(id);
        Ok(())
    }

    async fn count(&self) -> DomainResult<usize> {
        let inner = self.store.lock();
        Ok(inner
            .commodity_files
            .iter()
            .filter(|cf| visible(&self.scope, *cf))
            .count())
    }
}

// ---------------------------------------------------------------------------
// Exports (soft-deletable)
// ---------------------------------------------------------------------------

memory_registry!(MemoryExportRegistry);

#[async_trait]
impl ExportRegistry for MemoryExportRegistry {
    async fn create(&self, export: Export) -> DomainResult<Export> {
        let mut export = export;
        stamp_owner(&self.scope, &mut export);
        export.validate()?;
        let mut inner = self.store.lock();
        inner.exports.insert(export.clone())?;
        Ok(export)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<Export> {
        let inner = self.store.lock();
        let row = inner
            .exports
            .get(id)
            .filter(|e| visible(&self.scope, *e))
            .cloned()
            .ok_or_else(|| DomainError::not_found("export", id.as_str()))?;
        if row.is_deleted() {
            return Err(DomainError::Deleted {
                entity: "export",
                id: id.as_str().to_string(),
            });
        }
        Ok(row)
    }

    async fn list(&self) -> DomainResult<Vec<Export>> {
        let inner = self.store.lock();
        Ok(inner
            .exports
            .iter()
            .filter(|e| visible(&self.scope, *e) && !e.is_deleted())
            .cloned()
            .collect())
    }

    async fn list_deleted(&self) -> DomainResult<Vec<Export>> {
        let inner = self.store.lock();
        Ok(inner
            .exports
            .iter()
            .filter(|e| visible(&self.scope, *e) && e.is_deleted())
            .cloned()
            .collect())
    }

    async fn list_pending(&self) -> DomainResult<Vec<Export>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|e| e.status == JobStatus::Pending)
            .collect())
    }

    async fn update(&self, export: Export) -> DomainResult<Export> {
        let mut inner = self.store.lock();
        let existing = inner
            .exports
            .get(&export.id)
            .filter(|e| visible(&self.scope, *e))
            .cloned()
            .ok_or_else(|| DomainError::not_found("export", export.id.as_str()))?;
        if existing.is_deleted() {
            return Err(DomainError::Deleted {
                entity: "export",
                id: export.id.as_str().to_string(),
            });
        }
        let mut export = export;
        prepare_update(&existing, &mut export);
        export.created_at = existing.created_at;
        export.deleted_at = existing.deleted_at;
        inner.exports.replace(export.clone())?;
        Ok(export)
    }

    async fn transition(&self, id: &EntityId, from: JobStatus, to: JobStatus) -> DomainResult<bool> {
        let scope = self.scope.clone();
        let mut inner = self.store.lock();
        let Some(row) = inner
            .exports
            .get_mut(id)
            .filter(|e| scope.can_access(&e.tenant_id, &e.user_id))
        else {
            return Err(DomainError::not_found("export", id.as_str()));
        };
        if row.is_deleted() || row.status != from || !from.can_transition_to(to) {
            return Ok(false);
        }
        row.status = to;
        row.updated_at = Utc::now();
        Ok(true)
    }

    async fn detach_file(&self, file_id: &EntityId) -> DomainResult<usize> {
        let mut inner = self.store.lock();
        let ids: Vec<EntityId> = inner
            .exports
            .iter()
            .filter(|e| visible(&self.scope, *e) && e.file_id.as_ref() == Some(file_id))
            .map(|e| e.id.clone())
            .collect();
        for id in &ids {
            if let Some(row) = inner.exports.get_mut(id) {
                row.file_id = None;
                row.updated_at = Utc::now();
            }
        }
        Ok(ids.len())
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        let scope = self.scope.clone();
        let mut inner = self.store.lock();
        match inner.exports.get_mut(id) {
            Some(row) if !scope.can_access(&row.tenant_id, &row.user_id) => {
                Err(DomainError::not_found("export", id.as_str()))
            }
            Some(row) if row.is_deleted() => Err(DomainError::Deleted {
                entity: "export",
                id: id.as_str().to_string(),
            }),
            Some(row) => {
                row.deleted_at = Some(Utc::now());
                row.updated_at = Utc::now();
                Ok(())
            }
            None => Err(DomainError::not_found("export", id.as_str())),
        }
    }

    async fn hard_delete(&self, id: &EntityId) -> DomainResult<()> {
        let mut inner = self.store.lock();
        if inner.exports.get(id).filter(|e| visible(&self.scope, *e)).is_none() {
            return Err(DomainError::not_found("export", id.as_str()));
        }
        inner.exports.remove(id);
        Ok(())
    }

    async fn count(&self) -> DomainResult<usize> {
        Ok(self.list().await?.len())
    }
}

// ---------------------------------------------------------------------------
// Restores
// ---------------------------------------------------------------------------

memory_registry!(MemoryRestoreRegistry);

#[async_trait]
impl RestoreRegistry for MemoryRestoreRegistry {
    async fn create(&self, operation: RestoreOperation) -> DomainResult<RestoreOperation> {
        let mut operation = operation;
        stamp_owner(&self.scope, &mut operation);
        operation.validate()?;
        let mut inner = self.store.lock();
        match inner.exports.get(&operation.export_id) {
            Some(e) if !e.is_deleted() => {}
            _ => return Err(DomainError::not_found("export", operation.export_id.as_str())),
        }
        inner.restores.insert(operation.clone())?;
        Ok(operation)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<RestoreOperation> {
        let inner = self.store.lock();
        inner
            .restores
            .get(id)
            .filter(|r| visible(&self.scope, *r))
            .cloned()
            .ok_or_else(|| DomainError::not_found("restore_operation", id.as_str()))
    }

    async fn list(&self) -> DomainResult<Vec<RestoreOperation>> {
        let inner = self.store.lock();
        Ok(inner
            .restores
            .iter()
            .filter(|r| visible(&self.scope, *r))
            .cloned()
            .collect())
    }

    async fn list_pending(&self) -> DomainResult<Vec<RestoreOperation>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|r| r.status == JobStatus::Pending)
            .collect())
    }

    async fn update(&self, operation: RestoreOperation) -> DomainResult<RestoreOperation> {
        let mut inner = self.store.lock();
        let existing = inner
            .restores
            .get(&operation.id)
            .filter(|r| visible(&self.scope, *r))
            .cloned()
            .ok_or_else(|| DomainError::not_found("restore_operation", operation.id.as_str()))?;
        let mut operation = operation;
        prepare_update(&existing, &mut operation);
        operation.created_at = existing.created_at;
        inner.restores.replace(operation.clone())?;
        Ok(operation)
    }

    async fn transition(&self, id: &EntityId, from: JobStatus, to: JobStatus) -> DomainResult<bool> {
        let scope = self.scope.clone();
        let mut inner = self.store.lock();
        let Some(row) = inner
            .restores
            .get_mut(id)
            .filter(|r| scope.can_access(&r.tenant_id, &r.user_id))
        else {
            return Err(DomainError::not_found("restore_operation", id.as_str()));
        };
        if row.status != from || !from.can_transition_to(to) {
            return Ok(false);
        }
        row.status = to;
        if to == JobStatus::InProgress {
            row.started_at = Some(Utc::now());
        }
        row.updated_at = Utc::now();
        Ok(true)
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        let mut inner = self.store.lock();
        if inner.restores.get(id).filter(|r| visible(&self.scope, *r)).is_none() {
            return Err(DomainError::not_found("restore_operation", id.as_str()));
        }
        inner.restores.remove(id);
        // Steps are strongly owned: they go with the operation.
        inner.restore_steps.retain(|s| &s.restore_operation_id != id);
        Ok(())
    }

    async fn count(&self) -> DomainResult<usize> {
        Ok(self.list().await?.len())
    }

    async fn add_step(&self, step: RestoreStep) -> DomainResult<RestoreStep> {
        let mut inner = self.store.lock();
        if inner.restores.get(&step.restore_operation_id).is_none() {
            return Err(DomainError::not_found(
                "restore_operation",
                step.restore_operation_id.as_str(),
            ));
        }
        inner.restore_steps.push(step.clone());
        Ok(step)
    }

    async fn steps(&self, operation_id: &EntityId) -> DomainResult<Vec<RestoreStep>> {
        let inner = self.store.lock();
        Ok(inner
            .restore_steps
            .iter()
            .filter(|s| &s.restore_operation_id == operation_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

memory_registry!(MemorySettingsRegistry);

#[async_trait]
impl SettingsRegistry for MemorySettingsRegistry {
    async fn get(&self) -> DomainResult<Settings> {
        let (tenant, user) = self.scope.require_user()?;
        let mut inner = self.store.lock();
        if let Some(existing) = inner
            .settings
            .iter()
            .find(|s| &s.tenant_id == tenant && &s.user_id == user)
        {
            return Ok(existing.clone());
        }
        let fresh = Settings::new(tenant.clone(), user.clone());
        inner.settings.insert(fresh.clone())?;
        Ok(fresh)
    }

    async fn save(&self, settings: Settings) -> DomainResult<Settings> {
        let current = self.get().await?;
        // Enforce main-currency immutability against the stored row even when
        // the caller mutated the entity directly.
        let mut incoming = settings;
        match (&current.main_currency, &incoming.main_currency) {
            (Some(stored), Some(new)) if stored != new => {
                return Err(DomainError::MainCurrencyAlreadySet)
            }
            (Some(stored), None) => incoming.main_currency = Some(stored.clone()),
            _ => {}
        }
        let mut inner = self.store.lock();
        incoming.id = current.id.clone();
        incoming.tenant_id = current.tenant_id.clone();
        incoming.user_id = current.user_id.clone();
        incoming.created_at = current.created_at;
        incoming.updated_at = Utc::now();
        inner.settings.replace(incoming.clone())?;
        Ok(incoming)
    }
}

// ---------------------------------------------------------------------------
// Thumbnails
// ---------------------------------------------------------------------------

memory_registry!(MemoryThumbnailRegistry);

#[async_trait]
impl ThumbnailRegistry for MemoryThumbnailRegistry {
    async fn create(&self, job: ThumbnailJob) -> DomainResult<ThumbnailJob> {
        let mut job = job;
        stamp_owner(&self.scope, &mut job);
        job.validate()?;
        let mut inner = self.store.lock();
        if inner.files.get(&job.file_id).is_none() {
            return Err(DomainError::not_found("file", job.file_id.as_str()));
        }
        if inner
            .thumbnails
            .iter()
            .any(|j| j.file_id == job.file_id && !j.status.is_terminal())
        {
            return Err(DomainError::already_exists(
                "thumbnail_job",
                format!("active job for file {}", job.file_id),
            ));
        }
        inner.thumbnails.insert(job.clone())?;
        Ok(job)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<ThumbnailJob> {
        let inner = self.store.lock();
        inner
            .thumbnails
            .get(id)
            .filter(|j| visible(&self.scope, *j))
            .cloned()
            .ok_or_else(|| DomainError::not_found("thumbnail_job", id.as_str()))
    }

    async fn find_by_file(&self, file_id: &EntityId) -> DomainResult<Option<ThumbnailJob>> {
        let inner = self.store.lock();
        let result = inner
            .thumbnails
            .iter()
            .filter(|j| visible(&self.scope, *j))
            .find(|j| &j.file_id == file_id)
            .cloned();
        Ok(result)
    }

    async fn list(&self) -> DomainResult<Vec<ThumbnailJob>> {
        let inner = self.store.lock();
        Ok(inner
            .thumbnails
            .iter()
            .filter(|j| visible(&self.scope, *j))
            .cloned()
            .collect())
    }

    async fn list_pending(&self) -> DomainResult<Vec<ThumbnailJob>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|j| j.status == JobStatus::Pending)
            .collect())
    }

    async fn update(&self, job: ThumbnailJob) -> DomainResult<ThumbnailJob> {
        let mut inner = self.store.lock();
        let existing = inner
            .thumbnails
            .get(&job.id)
            .filter(|j| visible(&self.scope, *j))
            .cloned()
            .ok_or_else(|| DomainError::not_found("thumbnail_job", job.id.as_str()))?;
        let mut job = job;
        prepare_update(&existing, &mut job);
        job.created_at = existing.created_at;
        inner.thumbnails.replace(job.clone())?;
        Ok(job)
    }

    async fn transition(&self, id: &EntityId, from: JobStatus, to: JobStatus) -> DomainResult<bool> {
        let scope = self.scope.clone();
        let mut inner = self.store.lock();
        let Some(row) = inner
            .thumbnails
            .get_mut(id)
            .filter(|j| scope.can_access(&j.tenant_id, &j.user_id))
        else {
            return Err(DomainError::not_found("thumbnail_job", id.as_str()));
        };
        if row.status != from || !from.can_transition_to(to) {
            return Ok(false);
        }
        row.status = to;
        row.updated_at = Utc::now();
        Ok(true)
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        let mut inner = self.store.lock();
        if inner.thumbnails.get(id).filter(|j| visible(&self.scope, *j)).is_none() {
            return Err(DomainError::not_found("thumbnail_job", id.as_str()));
        }
        inner.thumbnails.remove(id);
        Ok(())
    }

    async fn count(&self) -> DomainResult<usize> {
        Ok(self.list().await?.len())
    }
}

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

memory_registry!(MemorySlotRegistry);

#[async_trait]
impl SlotRegistry for MemorySlotRegistry {
    async fn acquire(
        &self,
        user_id: &EntityId,
        job_kind: JobKind,
        job_id: &EntityId,
        limit: usize,
        ttl: Duration,
    ) -> DomainResult<OperationSlot> {
        if let Ok((_, own_user)) = self.scope.require_user() {
            if own_user != user_id {
                return Err(DomainError::unauthorized("cannot acquire a slot for another user"));
            }
        }
        let now = Utc::now();
        let mut inner = self.store.lock();
        // Reclaim expired holders before counting.
        for slot in inner.slots.iter_mut() {
            if slot.status == stockroom_domain::entities::SlotStatus::Active && slot.expires_at <= now {
                slot.status = stockroom_domain::entities::SlotStatus::Expired;
            }
        }
        let live = inner
            .slots
            .iter()
            .filter(|s| &s.user_id == user_id && s.job_kind == job_kind && s.is_live(now))
            .count();
        if live >= limit {
            return Err(DomainError::ConcurrencyLimitExceeded(format!(
                "{live} live {} slots for user {user_id}",
                job_kind.as_str()
            )));
        }
        let tenant_id = self
            .scope
            .tenant_id()
            .cloned()
            .or_else(|| {
                inner
                    .users
                    .get(user_id)
                    .map(|u| u.tenant_id.clone())
            })
            .unwrap_or_else(EntityId::new);
        let slot = OperationSlot::new(tenant_id, user_id.clone(), job_kind, job_id.clone(), ttl);
        inner.slots.push(slot.clone());
        Ok(slot)
    }

    async fn release(&self, slot_id: &EntityId) -> DomainResult<()> {
        let mut inner = self.store.lock();
        match inner.slots.iter_mut().find(|s| &s.id == slot_id) {
            Some(slot) => {
                slot.release();
                Ok(())
            }
            None => Err(DomainError::not_found("operation_slot", slot_id.as_str())),
        }
    }

    async fn live_count(&self, user_id: &EntityId, job_kind: JobKind) -> DomainResult<usize> {
        let now = Utc::now();
        let inner = self.store.lock();
        Ok(inner
            .slots
            .iter()
            .filter(|s| &s.user_id == user_id && s.job_kind == job_kind && s.is_live(now))
            .count())
    }
}
