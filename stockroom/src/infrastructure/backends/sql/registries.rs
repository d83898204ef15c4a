// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQL Registry Implementations
//!
//! Registry contracts over PostgreSQL. Every operation runs inside a single
//! transaction that first applies the caller identity to the session
//! (`session::begin_scoped`), so the row-level security policies filter
//! rows server-side before any of this code sees them.
//!
//! Uniqueness lives in UNIQUE constraints (slug, domain, per-owner names,
//! per-tenant emails) and surfaces as `AlreadyExists` through the error
//! mapping; the parent-child graph is enforced by FK constraints plus
//! explicit child counts for the `CannotDelete` contract.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{PgPool, Row};

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

use super::super::{pin_owner_for_update, require_service, stamp_owner};
use super::helpers::{
    count_entities, count_entities_by_field, delete_entity_by_field, insert_entity, map_sql_err,
    scan_entities, scan_entities_by_field, scan_entity_by_field, update_entity_by_field, SqlEntity,
};
use super::session::begin_scoped;

macro_rules! impl_sql_entity {
    ($ty:ty, $table:literal, [$($col:literal),*], |$e:ident| [$($value:expr),*]) => {
        impl SqlEntity for $ty {
            const TABLE: &'static str = $table;

            fn field_columns() -> &'static [&'static str] {
                &[$($col),*]
            }

            fn field_values(&self) -> Vec<Option<String>> {
                let $e = self;
                vec![$($value),*]
            }

            fn created_at_rfc3339(&self) -> String {
                self.created_at.to_rfc3339()
            }
        }
    };
}

impl_sql_entity!(Tenant, "tenants", ["name", "slug", "domain"], |e| [
    Some(e.name.clone()),
    Some(e.slug.clone()),
    e.domain.clone()
]);
impl_sql_entity!(User, "users", ["email"], |e| [Some(e.email.to_lowercase())]);
impl_sql_entity!(Location, "locations", ["name"], |e| [Some(e.name.clone())]);
impl_sql_entity!(Area, "areas", ["name", "location_id"], |e| [
    Some(e.name.clone()),
    Some(e.location_id.as_str().to_string())
]);
impl_sql_entity!(Commodity, "commodities", ["name", "area_id"], |e| [
    Some(e.name.clone()),
    Some(e.area_id.as_str().to_string())
]);
impl_sql_entity!(File, "files", ["linked_entity_type", "linked_entity_id"], |e| [
    e.linked_entity_type.clone(),
    e.linked_entity_id.as_ref().map(|id| id.as_str().to_string())
]);
impl_sql_entity!(
    CommodityFile,
    "commodity_files",
    ["commodity_id", "file_id", "kind"],
    |e| [
        Some(e.commodity_id.as_str().to_string()),
        Some(e.file_id.as_str().to_string()),
        Some(e.kind.as_str().to_string())
    ]
);
impl_sql_entity!(Export, "exports", ["status", "file_id", "deleted_at"], |e| [
    Some(e.status.as_str().to_string()),
    e.file_id.as_ref().map(|id| id.as_str().to_string()),
    e.deleted_at.map(|at| at.to_rfc3339())
]);
impl_sql_entity!(
    RestoreOperation,
    "restore_operations",
    ["export_id", "status"],
    |e| [
        Some(e.export_id.as_str().to_string()),
        Some(e.status.as_str().to_string())
    ]
);
impl_sql_entity!(Settings, "settings", [], |_e| []);
impl_sql_entity!(ThumbnailJob, "thumbnail_jobs", ["file_id", "status"], |e| [
    Some(e.file_id.as_str().to_string()),
    Some(e.status.as_str().to_string())
]);

macro_rules! sql_registry {
    ($name:ident) => {
        pub struct $name {
            pool: PgPool,
            scope: RequestIdentity,
        }

        impl $name {
            pub(crate) fn new(pool: PgPool, scope: RequestIdentity) -> Self {
                Self { pool, scope }
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Tenants
// ---------------------------------------------------------------------------

sql_registry!(SqlTenantRegistry);

#[async_trait]
impl TenantRegistry for SqlTenantRegistry {
    async fn create(&self, tenant: Tenant) -> DomainResult<Tenant> {
        require_service(&self.scope, "tenant creation")?;
        tenant.validate()?;
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        insert_entity(&mut tx, &tenant).await?;
        tx.commit().await.map_err(|e| map_sql_err(e, "tenant"))?;
        Ok(tenant)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<Tenant> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        scan_entity_by_field::<Tenant>(&mut tx, "id", id.as_str())
            .await?
            .ok_or_else(|| DomainError::not_found("tenant", id.as_str()))
    }

    async fn get_by_slug(&self, slug: &str) -> DomainResult<Tenant> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        scan_entity_by_field::<Tenant>(&mut tx, "slug", slug)
            .await?
            .ok_or_else(|| DomainError::not_found("tenant", slug))
    }

    async fn list(&self) -> DomainResult<Vec<Tenant>> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        scan_entities::<Tenant>(&mut tx).await
    }

    async fn update(&self, tenant: Tenant) -> DomainResult<Tenant> {
        require_service(&self.scope, "tenant update")?;
        tenant.validate()?;
        let mut tenant = tenant;
        tenant.updated_at = Utc::now();
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let touched = update_entity_by_field(&mut tx, "id", tenant.id.as_str(), &tenant).await?;
        if touched == 0 {
            return Err(DomainError::not_found("tenant", tenant.id.as_str()));
        }
        tx.commit().await.map_err(|e| map_sql_err(e, "tenant"))?;
        Ok(tenant)
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        require_service(&self.scope, "tenant deletion")?;
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let users = count_entities_by_field::<User>(&mut tx, "tenant_id", id.as_str()).await?;
        if users > 0 {
            return Err(DomainError::cannot_delete("tenant", id.as_str(), "tenant has users"));
        }
        let removed = delete_entity_by_field::<Tenant>(&mut tx, "id", id.as_str()).await?;
        if removed == 0 {
            return Err(DomainError::not_found("tenant", id.as_str()));
        }
        tx.commit().await.map_err(|e| map_sql_err(e, "tenant"))
    }

    async fn count(&self) -> DomainResult<usize> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        count_entities::<Tenant>(&mut tx).await
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

sql_registry!(SqlUserRegistry);

#[async_trait]
impl UserRegistry for SqlUserRegistry {
    async fn create(&self, user: User) -> DomainResult<User> {
        require_service(&self.scope, "user creation")?;
        user.validate()?;
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        if scan_entity_by_field::<Tenant>(&mut tx, "id", user.tenant_id.as_str())
            .await?
            .is_none()
        {
            return Err(DomainError::not_found("tenant", user.tenant_id.as_str()));
        }
        insert_entity(&mut tx, &user).await?;
        tx.commit().await.map_err(|e| map_sql_err(e, "user"))?;
        Ok(user)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<User> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        scan_entity_by_field::<User>(&mut tx, "id", id.as_str())
            .await?
            .ok_or_else(|| DomainError::not_found("user", id.as_str()))
    }

    async fn get_by_email(&self, tenant_id: &EntityId, email: &str) -> DomainResult<User> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        scan_entities_by_field::<User>(&mut tx, "email", &email.to_lowercase())
            .await?
            .into_iter()
            .find(|u| &u.tenant_id == tenant_id)
            .ok_or_else(|| DomainError::not_found("user", email))
    }

    async fn list(&self) -> DomainResult<Vec<User>> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        scan_entities::<User>(&mut tx).await
    }

    async fn update(&self, user: User) -> DomainResult<User> {
        user.validate()?;
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let existing = scan_entity_by_field::<User>(&mut tx, "id", user.id.as_str())
            .await?
            .ok_or_else(|| DomainError::not_found("user", user.id.as_str()))?;
        let mut user = user;
        user.tenant_id = existing.tenant_id.clone();
        user.created_at = existing.created_at;
        if user.password_hash.is_empty() {
            user.password_hash = existing.password_hash.clone();
        }
        user.updated_at = Utc::now();
        update_entity_by_field(&mut tx, "id", existing.id.as_str(), &user).await?;
        tx.commit().await.map_err(|e| map_sql_err(e, "user"))?;
        Ok(user)
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        require_service(&self.scope, "user deletion")?;
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let owned = count_entities_by_field::<Location>(&mut tx, "user_id", id.as_str()).await?;
        if owned > 0 {
            return Err(DomainError::cannot_delete("user", id.as_str(), "user owns locations"));
        }
        let removed = delete_entity_by_field::<User>(&mut tx, "id", id.as_str()).await?;
        if removed == 0 {
            return Err(DomainError::not_found("user", id.as_str()));
        }
        tx.commit().await.map_err(|e| map_sql_err(e, "user"))
    }

    async fn count(&self) -> DomainResult<usize> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        count_entities::<User>(&mut tx).await
    }
}

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

sql_registry!(SqlLocationRegistry);

#[async_trait]
impl LocationRegistry for SqlLocationRegistry {
    async fn create(&self, location: Location) -> DomainResult<Location> {
        let mut location = location;
        stamp_owner(&self.scope, &mut location);
        location.validate()?;
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        insert_entity(&mut tx, &location).await?;
        tx.commit().await.map_err(|e| map_sql_err(e, "location"))?;
        Ok(location)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<Location> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        scan_entity_by_field::<Location>(&mut tx, "id", id.as_str())
            .await?
            .ok_or_else(|| DomainError::not_found("location", id.as_str()))
    }

    async fn list(&self) -> DomainResult<Vec<Location>> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        scan_entities::<Location>(&mut tx).await
    }

    async fn update(&self, location: Location) -> DomainResult<Location> {
        location.validate()?;
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let existing = scan_entity_by_field::<Location>(&mut tx, "id", location.id.as_str())
            .await?
            .ok_or_else(|| DomainError::not_found("location", location.id.as_str()))?;
        let mut location = location;
        pin_owner_for_update(&existing, &mut location);
        location.created_at = existing.created_at;
        update_entity_by_field(&mut tx, "id", existing.id.as_str(), &location).await?;
        tx.commit().await.map_err(|e| map_sql_err(e, "location"))?;
        Ok(location)
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let children = count_entities_by_field::<Area>(&mut tx, "location_id", id.as_str()).await?;
        if children > 0 {
            return Err(DomainError::cannot_delete("location", id.as_str(), "location has areas"));
        }
        let removed = delete_entity_by_field::<Location>(&mut tx, "id", id.as_str()).await?;
        if removed == 0 {
            return Err(DomainError::not_found("location", id.as_str()));
        }
        tx.commit().await.map_err(|e| map_sql_err(e, "location"))
    }

    async fn count(&self) -> DomainResult<usize> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        count_entities::<Location>(&mut tx).await
    }

    async fn areas(&self, location_id: &EntityId) -> DomainResult<Vec<EntityId>> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        if scan_entity_by_field::<Location>(&mut tx, "id", location_id.as_str())
            .await?
            .is_none()
        {
            return Err(DomainError::not_found("location", location_id.as_str()));
        }
        let areas = scan_entities_by_field::<Area>(&mut tx, "location_id", location_id.as_str()).await?;
        Ok(areas.into_iter().map(|a| a.id).collect())
    }
}

// ---------------------------------------------------------------------------
// Areas
// ---------------------------------------------------------------------------

sql_registry!(SqlAreaRegistry);

#[async_trait]
impl AreaRegistry for SqlAreaRegistry {
    async fn create(&self, area: Area) -> DomainResult<Area> {
        let mut area = area;
        stamp_owner(&self.scope, &mut area);
        area.validate()?;
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        if scan_entity_by_field::<Location>(&mut tx, "id", area.location_id.as_str())
            .await?
            .is_none()
        {
            return Err(DomainError::not_found("location", area.location_id.as_str()));
        }
        insert_entity(&mut tx, &area).await?;
        tx.commit().await.map_err(|e| map_sql_err(e, "area"))?;
        Ok(area)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<Area> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        scan_entity_by_field::<Area>(&mut tx, "id", id.as_str())
            .await?
            .ok_or_else(|| DomainError::not_found("area", id.as_str()))
    }

    async fn list(&self) -> DomainResult<Vec<Area>> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        scan_entities::<Area>(&mut tx).await
    }

    async fn update(&self, area: Area) -> DomainResult<Area> {
        area.validate()?;
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let existing = scan_entity_by_field::<Area>(&mut tx, "id", area.id.as_str())
            .await?
            .ok_or_else(|| DomainError::not_found("area", area.id.as_str()))?;
        if scan_entity_by_field::<Location>(&mut tx, "id", area.location_id.as_str())
            .await?
            .is_none()
        {
            return Err(DomainError::not_found("location", area.location_id.as_str()));
        }
        let mut area = area;
        pin_owner_for_update(&existing, &mut area);
        area.created_at = existing.created_at;
        update_entity_by_field(&mut tx, "id", existing.id.as_str(), &area).await?;
        tx.commit().await.map_err(|e| map_sql_err(e, "area"))?;
        Ok(area)
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let children = count_entities_by_field::<Commodity>(&mut tx, "area_id", id.as_str()).await?;
        if children > 0 {
            return Err(DomainError::cannot_delete("area", id.as_str(), "area has commodities"));
        }
        let removed = delete_entity_by_field::<Area>(&mut tx, "id", id.as_str()).await?;
        if removed == 0 {
            return Err(DomainError::not_found("area", id.as_str()));
        }
        tx.commit().await.map_err(|e| map_sql_err(e, "area"))
    }

    async fn count(&self) -> DomainResult<usize> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        count_entities::<Area>(&mut tx).await
    }

    async fn commodities(&self, area_id: &EntityId) -> DomainResult<Vec<EntityId>> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        if scan_entity_by_field::<Area>(&mut tx, "id", area_id.as_str())
            .await?
            .is_none()
        {
            return Err(DomainError::not_found("area", area_id.as_str()));
        }
        let rows = scan_entities_by_field::<Commodity>(&mut tx, "area_id", area_id.as_str()).await?;
        Ok(rows.into_iter().map(|c| c.id).collect())
    }
}

// ---------------------------------------------------------------------------
// Commodities
// ---------------------------------------------------------------------------

sql_registry!(SqlCommodityRegistry);

#[async_trait]
impl CommodityRegistry for SqlCommodityRegistry {
    async fn create(&self, commodity: Commodity) -> DomainResult<Commodity> {
        let mut commodity = commodity;
        stamp_owner(&self.scope, &mut commodity);
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        if scan_entity_by_field::<Area>(&mut tx, "id", commodity.area_id.as_str())
            .await?
            .is_none()
        {
            return Err(DomainError::not_found("area", commodity.area_id.as_str()));
        }
        insert_entity(&mut tx, &commodity).await?;
        tx.commit().await.map_err(|e| map_sql_err(e, "commodity"))?;
        Ok(commodity)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<Commodity> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        scan_entity_by_field::<Commodity>(&mut tx, "id", id.as_str())
            .await?
            .ok_or_else(|| DomainError::not_found("commodity", id.as_str()))
    }

    async fn list(&self) -> DomainResult<Vec<Commodity>> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        scan_entities::<Commodity>(&mut tx).await
    }

    async fn list_paginated(&self, offset: usize, limit: usize) -> DomainResult<ListPage<Commodity>> {
        Ok(ListPage::slice(self.list().await?, offset, limit))
    }

    async fn update(&self, commodity: Commodity) -> DomainResult<Commodity> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let existing = scan_entity_by_field::<Commodity>(&mut tx, "id", commodity.id.as_str())
            .await?
            .ok_or_else(|| DomainError::not_found("commodity", commodity.id.as_str()))?;
        if scan_entity_by_field::<Area>(&mut tx, "id", commodity.area_id.as_str())
            .await?
            .is_none()
        {
            return Err(DomainError::not_found("area", commodity.area_id.as_str()));
        }
        let mut commodity = commodity;
        pin_owner_for_update(&existing, &mut commodity);
        commodity.created_at = existing.created_at;
        update_entity_by_field(&mut tx, "id", existing.id.as_str(), &commodity).await?;
        tx.commit().await.map_err(|e| map_sql_err(e, "commodity"))?;
        Ok(commodity)
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let attachments =
            count_entities_by_field::<CommodityFile>(&mut tx, "commodity_id", id.as_str()).await?;
        if attachments > 0 {
            return Err(DomainError::cannot_delete(
                "commodity",
                id.as_str(),
                "commodity has attached files",
            ));
        }
        let removed = delete_entity_by_field::<Commodity>(&mut tx, "id", id.as_str()).await?;
        if removed == 0 {
            return Err(DomainError::not_found("commodity", id.as_str()));
        }
        tx.commit().await.map_err(|e| map_sql_err(e, "commodity"))
    }

    async fn count(&self) -> DomainResult<usize> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        count_entities::<Commodity>(&mut tx).await
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

sql_registry!(SqlFileRegistry);

#[async_trait]
impl FileRegistry for SqlFileRegistry {
    async fn create(&self, file: File) -> DomainResult<File> {
        let mut file = file;
        stamp_owner(&self.scope, &mut file);
        file.validate()?;
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        insert_entity(&mut tx, &file).await?;
        tx.commit().await.map_err(|e| map_sql_err(e, "file"))?;
        Ok(file)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<File> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        scan_entity_by_field::<File>(&mut tx, "id", id.as_str())
            .await?
            .ok_or_else(|| DomainError::not_found("file", id.as_str()))
    }

    async fn list(&self) -> DomainResult<Vec<File>> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        scan_entities::<File>(&mut tx).await
    }

    async fn list_paginated(&self, offset: usize, limit: usize) -> DomainResult<ListPage<File>> {
        Ok(ListPage::slice(self.list().await?, offset, limit))
    }

    async fn list_by_linked_entity(
        &self,
        entity_type: &str,
        entity_id: &EntityId,
    ) -> DomainResult<Vec<File>> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let rows = scan_entities_by_field::<File>(&mut tx, "linked_entity_id", entity_id.as_str()).await?;
        Ok(rows
            .into_iter()
            .filter(|f| f.linked_entity_type.as_deref() == Some(entity_type))
            .collect())
    }

    async fn search(&self, query: &FileSearchQuery) -> DomainResult<Vec<File>> {
        // The substring/tag/type matching rule is the domain's reference
        // rule; the enhanced wrapper decides whether this scan is acceptable
        // or a native capability should take over.
        Ok(self.list().await?.into_iter().filter(|f| query.matches(f)).collect())
    }

    async fn update(&self, file: File) -> DomainResult<File> {
        file.validate()?;
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let existing = scan_entity_by_field::<File>(&mut tx, "id", file.id.as_str())
            .await?
            .ok_or_else(|| DomainError::not_found("file", file.id.as_str()))?;
        let mut file = file;
        pin_owner_for_update(&existing, &mut file);
        file.created_at = existing.created_at;
        update_entity_by_field(&mut tx, "id", existing.id.as_str(), &file).await?;
        tx.commit().await.map_err(|e| map_sql_err(e, "file"))?;
        Ok(file)
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let removed = delete_entity_by_field::<File>(&mut tx, "id", id.as_str()).await?;
        if removed == 0 {
            return Err(DomainError::not_found("file", id.as_str()));
        }
        tx.commit().await.map_err(|e| map_sql_err(e, "file"))
    }

    async fn count(&self) -> DomainResult<usize> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        count_entities::<File>(&mut tx).await
    }
}

// ---------------------------------------------------------------------------
// Commodity files
// ---------------------------------------------------------------------------

sql_registry!(SqlCommodityFileRegistry);

#[async_trait]
impl CommodityFileRegistry for SqlCommodityFileRegistry {
    async fn create(&self, link: CommodityFile) -> DomainResult<CommodityFile> {
        let mut link = link;
        stamp_owner(&self.scope, &mut link);
        link.validate()?;
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        if scan_entity_by_field::<Commodity>(&mut tx, "id", link.commodity_id.as_str())
            .await?
            .is_none()
        {
            return Err(DomainError::not_found("commodity", link.commodity_id.as_str()));
        }
        if scan_entity_by_field::<File>(&mut tx, "id", link.file_id.as_str())
            .await?
            .is_none()
        {
            return Err(DomainError::not_found("file", link.file_id.as_str()));
        }
        insert_entity(&mut tx, &link).await?;
        tx.commit().await.map_err(|e| map_sql_err(e, "commodity_file"))?;
        Ok(link)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<CommodityFile> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        scan_entity_by_field::<CommodityFile>(&mut tx, "id", id.as_str())
            .await?
            .ok_or_else(|| DomainError::not_found("commodity_file", id.as_str()))
    }

    async fn list_for_commodity(
        &self,
        commodity_id: &EntityId,
        kind: Option<FileType>,
    ) -> DomainResult<Vec<CommodityFile>> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let rows =
            scan_entities_by_field::<CommodityFile>(&mut tx, "commodity_id", commodity_id.as_str())
                .await?;
        Ok(rows
            .into_iter()
            .filter(|cf| kind.is_none_or(|k| cf.kind == k))
            .collect())
    }

    async fn list_by_file(&self, file_id: &EntityId) -> DomainResult<Vec<CommodityFile>> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        scan_entities_by_field::<CommodityFile>(&mut tx, "file_id", file_id.as_str()).await
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let removed = delete_entity_by_field::<CommodityFile>(&mut tx, "id", id.as_str()).await?;
        if removed == 0 {
            return Err(DomainError::not_found("commodity_file", id.as_str()));
        }
        tx.commit().await.map_err(|e| map_sql_err(e, "commodity_file"))
    }

    async fn count(&self) -> DomainResult<usize> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        count_entities::<CommodityFile>(&mut tx).await
    }
}

// ---------------------------------------------------------------------------
// Exports
// ---------------------------------------------------------------------------

sql_registry!(SqlExportRegistry);

#[async_trait]
impl ExportRegistry for SqlExportRegistry {
    async fn create(&self, export: Export) -> DomainResult<Export> {
        let mut export = export;
        stamp_owner(&self.scope, &mut export);
        export.validate()?;
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        insert_entity(&mut tx, &export).await?;
        tx.commit().await.map_err(|e| map_sql_err(e, "export"))?;
        Ok(export)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<Export> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let row = scan_entity_by_field::<Export>(&mut tx, "id", id.as_str())
            .await?
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
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        Ok(scan_entities::<Export>(&mut tx)
            .await?
            .into_iter()
            .filter(|e| !e.is_deleted())
            .collect())
    }

    async fn list_deleted(&self) -> DomainResult<Vec<Export>> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        Ok(scan_entities::<Export>(&mut tx)
            .await?
            .into_iter()
            .filter(|e| e.is_deleted())
            .collect())
    }

    async fn list_pending(&self) -> DomainResult<Vec<Export>> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        Ok(scan_entities_by_field::<Export>(&mut tx, "status", JobStatus::Pending.as_str())
            .await?
            .into_iter()
            .filter(|e| !e.is_deleted())
            .collect())
    }

    async fn update(&self, export: Export) -> DomainResult<Export> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let existing = scan_entity_by_field::<Export>(&mut tx, "id", export.id.as_str())
            .await?
            .ok_or_else(|| DomainError::not_found("export", export.id.as_str()))?;
        if existing.is_deleted() {
            return Err(DomainError::Deleted {
                entity: "export",
                id: export.id.as_str().to_string(),
            });
        }
        let mut export = export;
        pin_owner_for_update(&existing, &mut export);
        export.created_at = existing.created_at;
        export.deleted_at = existing.deleted_at;
        update_entity_by_field(&mut tx, "id", existing.id.as_str(), &export).await?;
        tx.commit().await.map_err(|e| map_sql_err(e, "export"))?;
        Ok(export)
    }

    async fn transition(&self, id: &EntityId, from: JobStatus, to: JobStatus) -> DomainResult<bool> {
        if !from.can_transition_to(to) {
            return Ok(false);
        }
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        // CAS on the mirrored status column; the canonical copy in `data`
        // moves in the same statement.
        let result = sqlx::query(
            "UPDATE exports \
             SET status = $1, data = jsonb_set(data, '{status}', to_jsonb($1::text)), updated_at = $2 \
             WHERE id = $3 AND status = $4 AND deleted_at IS NULL",
        )
        .bind(to.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.as_str())
        .bind(from.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sql_err(e, "export"))?;
        tx.commit().await.map_err(|e| map_sql_err(e, "export"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn detach_file(&self, file_id: &EntityId) -> DomainResult<usize> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let result = sqlx::query(
            "UPDATE exports \
             SET file_id = NULL, data = jsonb_set(data, '{file_id}', 'null'), updated_at = $1 \
             WHERE file_id = $2",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(file_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sql_err(e, "export"))?;
        tx.commit().await.map_err(|e| map_sql_err(e, "export"))?;
        Ok(result.rows_affected() as usize)
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let existing = scan_entity_by_field::<Export>(&mut tx, "id", id.as_str())
            .await?
            .ok_or_else(|| DomainError::not_found("export", id.as_str()))?;
        if existing.is_deleted() {
            return Err(DomainError::Deleted {
                entity: "export",
                id: id.as_str().to_string(),
            });
        }
        let mut tombstoned = existing;
        tombstoned.deleted_at = Some(Utc::now());
        update_entity_by_field(&mut tx, "id", id.as_str(), &tombstoned).await?;
        tx.commit().await.map_err(|e| map_sql_err(e, "export"))
    }

    async fn hard_delete(&self, id: &EntityId) -> DomainResult<()> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let removed = delete_entity_by_field::<Export>(&mut tx, "id", id.as_str()).await?;
        if removed == 0 {
            return Err(DomainError::not_found("export", id.as_str()));
        }
        tx.commit().await.map_err(|e| map_sql_err(e, "export"))
    }

    async fn count(&self) -> DomainResult<usize> {
        Ok(self.list().await?.len())
    }
}

// ---------------------------------------------------------------------------
// Restores
// ---------------------------------------------------------------------------

sql_registry!(SqlRestoreRegistry);

#[async_trait]
impl RestoreRegistry for SqlRestoreRegistry {
    async fn create(&self, operation: RestoreOperation) -> DomainResult<RestoreOperation> {
        let mut operation = operation;
        stamp_owner(&self.scope, &mut operation);
        operation.validate()?;
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let export = scan_entity_by_field::<Export>(&mut tx, "id", operation.export_id.as_str())
            .await?
            .filter(|e| !e.is_deleted());
        if export.is_none() {
            return Err(DomainError::not_found("export", operation.export_id.as_str()));
        }
        insert_entity(&mut tx, &operation).await?;
        tx.commit().await.map_err(|e| map_sql_err(e, "restore_operation"))?;
        Ok(operation)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<RestoreOperation> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        scan_entity_by_field::<RestoreOperation>(&mut tx, "id", id.as_str())
            .await?
            .ok_or_else(|| DomainError::not_found("restore_operation", id.as_str()))
    }

    async fn list(&self) -> DomainResult<Vec<RestoreOperation>> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        scan_entities::<RestoreOperation>(&mut tx).await
    }

    async fn list_pending(&self) -> DomainResult<Vec<RestoreOperation>> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        scan_entities_by_field::<RestoreOperation>(&mut tx, "status", JobStatus::Pending.as_str()).await
    }

    async fn update(&self, operation: RestoreOperation) -> DomainResult<RestoreOperation> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let existing = scan_entity_by_field::<RestoreOperation>(&mut tx, "id", operation.id.as_str())
            .await?
            .ok_or_else(|| DomainError::not_found("restore_operation", operation.id.as_str()))?;
        let mut operation = operation;
        pin_owner_for_update(&existing, &mut operation);
        operation.created_at = existing.created_at;
        update_entity_by_field(&mut tx, "id", existing.id.as_str(), &operation).await?;
        tx.commit().await.map_err(|e| map_sql_err(e, "restore_operation"))?;
        Ok(operation)
    }

    async fn transition(&self, id: &EntityId, from: JobStatus, to: JobStatus) -> DomainResult<bool> {
        if !from.can_transition_to(to) {
            return Ok(false);
        }
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let now = Utc::now().to_rfc3339();
        let sql = if to == JobStatus::InProgress {
            "UPDATE restore_operations \
             SET status = $1, \
                 data = jsonb_set(jsonb_set(data, '{status}', to_jsonb($1::text)), '{started_at}', to_jsonb($2::text)), \
                 updated_at = $2 \
             WHERE id = $3 AND status = $4"
        } else {
            "UPDATE restore_operations \
             SET status = $1, data = jsonb_set(data, '{status}', to_jsonb($1::text)), updated_at = $2 \
             WHERE id = $3 AND status = $4"
        };
        let result = sqlx::query(sql)
            .bind(to.as_str())
            .bind(&now)
            .bind(id.as_str())
            .bind(from.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sql_err(e, "restore_operation"))?;
        tx.commit().await.map_err(|e| map_sql_err(e, "restore_operation"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        // Steps go with the operation via ON DELETE CASCADE.
        let removed = delete_entity_by_field::<RestoreOperation>(&mut tx, "id", id.as_str()).await?;
        if removed == 0 {
            return Err(DomainError::not_found("restore_operation", id.as_str()));
        }
        tx.commit().await.map_err(|e| map_sql_err(e, "restore_operation"))
    }

    async fn count(&self) -> DomainResult<usize> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        count_entities::<RestoreOperation>(&mut tx).await
    }

    async fn add_step(&self, step: RestoreStep) -> DomainResult<RestoreStep> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let data = serde_json::to_value(&step).map_err(|e| DomainError::serialization(e.to_string()))?;
        sqlx::query(
            "INSERT INTO restore_steps (id, tenant_id, user_id, restore_operation_id, data, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(step.id.as_str())
        .bind(step.tenant_id.as_str())
        .bind(step.user_id.as_str())
        .bind(step.restore_operation_id.as_str())
        .bind(data)
        .bind(step.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sql_err(e, "restore_step"))?;
        tx.commit().await.map_err(|e| map_sql_err(e, "restore_step"))?;
        Ok(step)
    }

    async fn steps(&self, operation_id: &EntityId) -> DomainResult<Vec<RestoreStep>> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let rows = sqlx::query("SELECT data FROM restore_steps WHERE restore_operation_id = $1 ORDER BY seq")
            .bind(operation_id.as_str())
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sql_err(e, "restore_step"))?;
        rows.iter()
            .map(|row| {
                let data: serde_json::Value = row
                    .try_get("data")
                    .map_err(|e| DomainError::storage(e.to_string()))?;
                serde_json::from_value(data).map_err(|e| DomainError::serialization(e.to_string()))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

sql_registry!(SqlSettingsRegistry);

#[async_trait]
impl SettingsRegistry for SqlSettingsRegistry {
    async fn get(&self) -> DomainResult<Settings> {
        let (tenant, user) = self.scope.require_user()?;
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        // RLS already narrows the scan to the bound (tenant, user).
        if let Some(existing) = scan_entities::<Settings>(&mut tx).await?.into_iter().next() {
            return Ok(existing);
        }
        let fresh = Settings::new(tenant.clone(), user.clone());
        insert_entity(&mut tx, &fresh).await?;
        tx.commit().await.map_err(|e| map_sql_err(e, "settings"))?;
        Ok(fresh)
    }

    async fn save(&self, settings: Settings) -> DomainResult<Settings> {
        let current = self.get().await?;
        let mut incoming = settings;
        match (&current.main_currency, &incoming.main_currency) {
            (Some(stored), Some(new)) if stored != new => {
                return Err(DomainError::MainCurrencyAlreadySet)
            }
            (Some(stored), None) => incoming.main_currency = Some(stored.clone()),
            _ => {}
        }
        incoming.id = current.id.clone();
        incoming.tenant_id = current.tenant_id.clone();
        incoming.user_id = current.user_id.clone();
        incoming.created_at = current.created_at;
        incoming.updated_at = Utc::now();
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        update_entity_by_field(&mut tx, "id", incoming.id.as_str(), &incoming).await?;
        tx.commit().await.map_err(|e| map_sql_err(e, "settings"))?;
        Ok(incoming)
    }
}

// ---------------------------------------------------------------------------
// Thumbnails
// ---------------------------------------------------------------------------

sql_registry!(SqlThumbnailRegistry);

#[async_trait]
impl ThumbnailRegistry for SqlThumbnailRegistry {
    async fn create(&self, job: ThumbnailJob) -> DomainResult<ThumbnailJob> {
        let mut job = job;
        stamp_owner(&self.scope, &mut job);
        job.validate()?;
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        if scan_entity_by_field::<File>(&mut tx, "id", job.file_id.as_str())
            .await?
            .is_none()
        {
            return Err(DomainError::not_found("file", job.file_id.as_str()));
        }
        let active = scan_entities_by_field::<ThumbnailJob>(&mut tx, "file_id", job.file_id.as_str())
            .await?
            .into_iter()
            .any(|j| !j.status.is_terminal());
        if active {
            return Err(DomainError::already_exists(
                "thumbnail_job",
                format!("active job for file {}", job.file_id),
            ));
        }
        insert_entity(&mut tx, &job).await?;
        tx.commit().await.map_err(|e| map_sql_err(e, "thumbnail_job"))?;
        Ok(job)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<ThumbnailJob> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        scan_entity_by_field::<ThumbnailJob>(&mut tx, "id", id.as_str())
            .await?
            .ok_or_else(|| DomainError::not_found("thumbnail_job", id.as_str()))
    }

    async fn find_by_file(&self, file_id: &EntityId) -> DomainResult<Option<ThumbnailJob>> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        Ok(scan_entities_by_field::<ThumbnailJob>(&mut tx, "file_id", file_id.as_str())
            .await?
            .into_iter()
            .next())
    }

    async fn list(&self) -> DomainResult<Vec<ThumbnailJob>> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        scan_entities::<ThumbnailJob>(&mut tx).await
    }

    async fn list_pending(&self) -> DomainResult<Vec<ThumbnailJob>> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        scan_entities_by_field::<ThumbnailJob>(&mut tx, "status", JobStatus::Pending.as_str()).await
    }

    async fn update(&self, job: ThumbnailJob) -> DomainResult<ThumbnailJob> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let existing = scan_entity_by_field::<ThumbnailJob>(&mut tx, "id", job.id.as_str())
            .await?
            .ok_or_else(|| DomainError::not_found("thumbnail_job", job.id.as_str()))?;
        let mut job = job;
        pin_owner_for_update(&existing, &mut job);
        job.created_at = existing.created_at;
        update_entity_by_field(&mut tx, "id", existing.id.as_str(), &job).await?;
        tx.commit().await.map_err(|e| map_sql_err(e, "thumbnail_job"))?;
        Ok(job)
    }

    async fn transition(&self, id: &EntityId, from: JobStatus, to: JobStatus) -> DomainResult<bool> {
        if !from.can_transition_to(to) {
            return Ok(false);
        }
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let result = sqlx::query(
            "UPDATE thumbnail_jobs \
             SET status = $1, data = jsonb_set(data, '{status}', to_jsonb($1::text)), updated_at = $2 \
             WHERE id = $3 AND status = $4",
        )
        .bind(to.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.as_str())
        .bind(from.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sql_err(e, "thumbnail_job"))?;
        tx.commit().await.map_err(|e| map_sql_err(e, "thumbnail_job"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let removed = delete_entity_by_field::<ThumbnailJob>(&mut tx, "id", id.as_str()).await?;
        if removed == 0 {
            return Err(DomainError::not_found("thumbnail_job", id.as_str()));
        }
        tx.commit().await.map_err(|e| map_sql_err(e, "thumbnail_job"))
    }

    async fn count(&self) -> DomainResult<usize> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        count_entities::<ThumbnailJob>(&mut tx).await
    }
}

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

sql_registry!(SqlSlotRegistry);

#[async_trait]
impl SlotRegistry for SqlSlotRegistry {
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
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;

        let rows = sqlx::query(
            "SELECT data FROM operation_slots \
             WHERE user_id = $1 AND job_kind = $2 AND status = 'active' FOR UPDATE",
        )
        .bind(user_id.as_str())
        .bind(job_kind.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sql_err(e, "operation_slot"))?;

        let mut live = 0usize;
        for row in &rows {
            let data: serde_json::Value = row
                .try_get("data")
                .map_err(|e| DomainError::storage(e.to_string()))?;
            let slot: OperationSlot =
                serde_json::from_value(data).map_err(|e| DomainError::serialization(e.to_string()))?;
            if slot.expires_at <= now {
                // Reclaim the expired holder inside the same transaction.
                sqlx::query(
                    "UPDATE operation_slots \
                     SET status = 'expired', data = jsonb_set(data, '{status}', '\"expired\"') \
                     WHERE id = $1",
                )
                .bind(slot.id.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sql_err(e, "operation_slot"))?;
            } else {
                live += 1;
            }
        }
        if live >= limit {
            return Err(DomainError::ConcurrencyLimitExceeded(format!(
                "{live} live {} slots for user {user_id}",
                job_kind.as_str()
            )));
        }

        let tenant_id = self.scope.tenant_id().cloned().unwrap_or_default();
        let slot = OperationSlot::new(tenant_id, user_id.clone(), job_kind, job_id.clone(), ttl);
        let data = serde_json::to_value(&slot).map_err(|e| DomainError::serialization(e.to_string()))?;
        sqlx::query(
            "INSERT INTO operation_slots (id, tenant_id, user_id, job_kind, status, data, acquired_at) \
             VALUES ($1, $2, $3, $4, 'active', $5, $6)",
        )
        .bind(slot.id.as_str())
        .bind(slot.tenant_id.as_str())
        .bind(slot.user_id.as_str())
        .bind(job_kind.as_str())
        .bind(data)
        .bind(slot.acquired_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sql_err(e, "operation_slot"))?;

        tx.commit().await.map_err(|e| map_sql_err(e, "operation_slot"))?;
        Ok(slot)
    }

    async fn release(&self, slot_id: &EntityId) -> DomainResult<()> {
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let result = sqlx::query(
            "UPDATE operation_slots \
             SET status = 'released', data = jsonb_set(data, '{status}', '\"released\"') \
             WHERE id = $1",
        )
        .bind(slot_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sql_err(e, "operation_slot"))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("operation_slot", slot_id.as_str()));
        }
        tx.commit().await.map_err(|e| map_sql_err(e, "operation_slot"))
    }

    async fn live_count(&self, user_id: &EntityId, job_kind: JobKind) -> DomainResult<usize> {
        let now = Utc::now();
        let mut tx = begin_scoped(&self.pool, &self.scope).await?;
        let rows = sqlx::query(
            "SELECT data FROM operation_slots WHERE user_id = $1 AND job_kind = $2 AND status = 'active'",
        )
        .bind(user_id.as_str())
        .bind(job_kind.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sql_err(e, "operation_slot"))?;
        let mut live = 0usize;
        for row in &rows {
            let data: serde_json::Value = row
                .try_get("data")
                .map_err(|e| DomainError::storage(e.to_string()))?;
            let slot: OperationSlot =
                serde_json::from_value(data).map_err(|e| DomainError::serialization(e.to_string()))?;
            if slot.is_live(now) {
                live += 1;
            }
        }
        Ok(live)
    }
}
