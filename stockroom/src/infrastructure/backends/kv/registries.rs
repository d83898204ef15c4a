// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # KV Registry Implementations
//!
//! Registry contracts over the redb store. Layout per family:
//!
//! - a top-level table keyed by id holding the bincode row
//! - named unique-index entries (`tenant-slug`, `user-email`,
//!   `location-name`, ...) claimed inside the same write transaction, so a
//!   violated index aborts the whole write with `AlreadyExists`
//! - parent-child relation buckets (`location/<id>/areas`, ...) that both
//!   serve child listings and guard deletes: a non-empty bucket refuses with
//!   `CannotDelete`
//!
//! Per-user isolation is applied after decoding, with the same scope rules
//! as the other backends.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use redb::ReadableTable;

use stockroom_domain::entities::{
    Area, Commodity, CommodityFile, Export, File, FileType, JobKind, JobStatus, Location,
    OperationSlot, RestoreOperation, RestoreStep, Settings, SlotStatus, Tenant, ThumbnailJob, User,
};
use stockroom_domain::registries::{
    AreaRegistry, CommodityFileRegistry, CommodityRegistry, ExportRegistry, FileRegistry,
    FileSearchQuery, ListPage, LocationRegistry, RestoreRegistry, SettingsRegistry, SlotRegistry,
    TenantRegistry, ThumbnailRegistry, UserRegistry,
};
use stockroom_domain::{DomainError, DomainResult, EntityId, RequestIdentity};

use super::super::{pin_owner_for_update, require_service, scope_visible, stamp_owner};
use super::schema::{
    children_key, index_key, AREAS_TABLE, COMMODITIES_TABLE, COMMODITY_FILES_TABLE, EXPORTS_TABLE,
    FILES_TABLE, INDEX_TABLE, LOCATIONS_TABLE, RESTORES_TABLE, RESTORE_STEPS_TABLE, SETTINGS_TABLE,
    SLOTS_TABLE, TENANTS_TABLE, THUMBNAILS_TABLE, USERS_TABLE,
};
use super::store::{
    child_add, child_remove, children_of, children_of_read, fetch_row, index_claim, index_get,
    index_release, insert_row, list_rows, remove_row, replace_row, storage_err, KvRow, KvStore,
};

macro_rules! kv_registry {
    ($name:ident) => {
        pub struct $name {
            store: KvStore,
            scope: RequestIdentity,
        }

        impl $name {
            pub(crate) fn new(store: KvStore, scope: RequestIdentity) -> Self {
                Self { store, scope }
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Tenants
// ---------------------------------------------------------------------------

kv_registry!(KvTenantRegistry);

impl KvTenantRegistry {
    fn tenant_visible(&self, tenant: &Tenant) -> bool {
        self.scope.is_service() || self.scope.tenant_id() == Some(&tenant.id)
    }
}

#[async_trait]
impl TenantRegistry for KvTenantRegistry {
    async fn create(&self, tenant: Tenant) -> DomainResult<Tenant> {
        require_service(&self.scope, "tenant creation")?;
        tenant.validate()?;
        self.store.write(|txn| {
            index_claim(txn, "tenant", &index_key("tenant-slug", &[&tenant.slug]), tenant.id.as_str())?;
            if let Some(domain) = &tenant.domain {
                index_claim(txn, "tenant", &index_key("tenant-domain", &[domain]), tenant.id.as_str())?;
            }
            let seq = KvStore::next_seq(txn)?;
            insert_row(txn, TENANTS_TABLE, "tenant", tenant.id.as_str(), seq, &tenant)
        })?;
        Ok(tenant)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<Tenant> {
        self.store.read(|txn| {
            let table = txn.open_table(TENANTS_TABLE).map_err(storage_err)?;
            fetch_row::<Tenant, _>(&table, id.as_str())?
                .map(|r| r.entity)
                .filter(|t| self.tenant_visible(t))
                .ok_or_else(|| DomainError::not_found("tenant", id.as_str()))
        })
    }

    async fn get_by_slug(&self, slug: &str) -> DomainResult<Tenant> {
        let id = self.store.read(|txn| {
            let index = txn.open_table(INDEX_TABLE).map_err(storage_err)?;
            index_get(&index, &index_key("tenant-slug", &[slug]))
        })?;
        match id {
            Some(id) => self.get(&EntityId::parse(id)?).await,
            None => Err(DomainError::not_found("tenant", slug)),
        }
    }

    async fn list(&self) -> DomainResult<Vec<Tenant>> {
        self.store.read(|txn| {
            let table = txn.open_table(TENANTS_TABLE).map_err(storage_err)?;
            Ok(list_rows::<Tenant, _>(&table)?
                .into_iter()
                .filter(|t| self.tenant_visible(t))
                .collect())
        })
    }

    async fn update(&self, tenant: Tenant) -> DomainResult<Tenant> {
        require_service(&self.scope, "tenant update")?;
        tenant.validate()?;
        let mut tenant = tenant;
        self.store.write(|txn| {
            let existing = {
                let table = txn.open_table(TENANTS_TABLE).map_err(storage_err)?;
                fetch_row::<Tenant, _>(&table, tenant.id.as_str())?
                    .ok_or_else(|| DomainError::not_found("tenant", tenant.id.as_str()))?
            };
            if existing.entity.slug != tenant.slug {
                index_release(txn, &index_key("tenant-slug", &[&existing.entity.slug]))?;
            }
            index_claim(txn, "tenant", &index_key("tenant-slug", &[&tenant.slug]), tenant.id.as_str())?;
            if existing.entity.domain != tenant.domain {
                if let Some(old) = &existing.entity.domain {
                    index_release(txn, &index_key("tenant-domain", &[old]))?;
                }
                if let Some(new) = &tenant.domain {
                    index_claim(txn, "tenant", &index_key("tenant-domain", &[new]), tenant.id.as_str())?;
                }
            }
            tenant.updated_at = Utc::now();
            replace_row(txn, TENANTS_TABLE, tenant.id.as_str(), existing.seq, &tenant)
        })?;
        Ok(tenant)
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        require_service(&self.scope, "tenant deletion")?;
        self.store.write(|txn| {
            let existing = {
                let table = txn.open_table(TENANTS_TABLE).map_err(storage_err)?;
                fetch_row::<Tenant, _>(&table, id.as_str())?
                    .ok_or_else(|| DomainError::not_found("tenant", id.as_str()))?
            };
            if !children_of(txn, &children_key("tenant", id.as_str(), "users"))?.is_empty() {
                return Err(DomainError::cannot_delete("tenant", id.as_str(), "tenant has users"));
            }
            index_release(txn, &index_key("tenant-slug", &[&existing.entity.slug]))?;
            if let Some(domain) = &existing.entity.domain {
                index_release(txn, &index_key("tenant-domain", &[domain]))?;
            }
            remove_row(txn, TENANTS_TABLE, id.as_str())?;
            Ok(())
        })
    }

    async fn count(&self) -> DomainResult<usize> {
        Ok(self.list().await?.len())
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

kv_registry!(KvUserRegistry);

#[async_trait]
impl UserRegistry for KvUserRegistry {
    async fn create(&self, user: User) -> DomainResult<User> {
        require_service(&self.scope, "user creation")?;
        user.validate()?;
        self.store.write(|txn| {
            {
                let tenants = txn.open_table(TENANTS_TABLE).map_err(storage_err)?;
                if fetch_row::<Tenant, _>(&tenants, user.tenant_id.as_str())?.is_none() {
                    return Err(DomainError::not_found("tenant", user.tenant_id.as_str()));
                }
            }
            let email_key = index_key(
                "user-email",
                &[user.tenant_id.as_str(), &user.email.to_lowercase()],
            );
            index_claim(txn, "user", &email_key, user.id.as_str())?;
            child_add(
                txn,
                &children_key("tenant", user.tenant_id.as_str(), "users"),
                user.id.as_str(),
            )?;
            let seq = KvStore::next_seq(txn)?;
            insert_row(txn, USERS_TABLE, "user", user.id.as_str(), seq, &user)
        })?;
        Ok(user)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<User> {
        self.store.read(|txn| {
            let table = txn.open_table(USERS_TABLE).map_err(storage_err)?;
            fetch_row::<User, _>(&table, id.as_str())?
                .map(|r| r.entity)
                .filter(|u| scope_visible(&self.scope, u))
                .ok_or_else(|| DomainError::not_found("user", id.as_str()))
        })
    }

    async fn get_by_email(&self, tenant_id: &EntityId, email: &str) -> DomainResult<User> {
        let id = self.store.read(|txn| {
            let index = txn.open_table(INDEX_TABLE).map_err(storage_err)?;
            index_get(
                &index,
                &index_key("user-email", &[tenant_id.as_str(), &email.to_lowercase()]),
            )
        })?;
        match id {
            Some(id) => self.get(&EntityId::parse(id)?).await,
            None => Err(DomainError::not_found("user", email)),
        }
    }

    async fn list(&self) -> DomainResult<Vec<User>> {
        self.store.read(|txn| {
            let table = txn.open_table(USERS_TABLE).map_err(storage_err)?;
            Ok(list_rows::<User, _>(&table)?
                .into_iter()
                .filter(|u| scope_visible(&self.scope, u))
                .collect())
        })
    }

    async fn update(&self, user: User) -> DomainResult<User> {
        user.validate()?;
        let mut user = user;
        self.store.write(|txn| {
            let existing = {
                let table = txn.open_table(USERS_TABLE).map_err(storage_err)?;
                fetch_row::<User, _>(&table, user.id.as_str())?
                    .filter(|r| scope_visible(&self.scope, &r.entity))
                    .ok_or_else(|| DomainError::not_found("user", user.id.as_str()))?
            };
            if !existing.entity.email.eq_ignore_ascii_case(&user.email) {
                index_release(
                    txn,
                    &index_key(
                        "user-email",
                        &[existing.entity.tenant_id.as_str(), &existing.entity.email.to_lowercase()],
                    ),
                )?;
            }
            user.tenant_id = existing.entity.tenant_id.clone();
            user.created_at = existing.entity.created_at;
            if user.password_hash.is_empty() {
                user.password_hash = existing.entity.password_hash.clone();
            }
            user.updated_at = Utc::now();
            index_claim(
                txn,
                "user",
                &index_key("user-email", &[user.tenant_id.as_str(), &user.email.to_lowercase()]),
                user.id.as_str(),
            )?;
            replace_row(txn, USERS_TABLE, user.id.as_str(), existing.seq, &user)
        })?;
        Ok(user)
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        require_service(&self.scope, "user deletion")?;
        self.store.write(|txn| {
            let existing = {
                let table = txn.open_table(USERS_TABLE).map_err(storage_err)?;
                fetch_row::<User, _>(&table, id.as_str())?
                    .ok_or_else(|| DomainError::not_found("user", id.as_str()))?
            };
            let owns_locations = {
                let locations = txn.open_table(LOCATIONS_TABLE).map_err(storage_err)?;
                list_rows::<Location, _>(&locations)?.iter().any(|l| &l.user_id == id)
            };
            if owns_locations {
                return Err(DomainError::cannot_delete("user", id.as_str(), "user owns locations"));
            }
            index_release(
                txn,
                &index_key(
                    "user-email",
                    &[existing.entity.tenant_id.as_str(), &existing.entity.email.to_lowercase()],
                ),
            )?;
            child_remove(
                txn,
                &children_key("tenant", existing.entity.tenant_id.as_str(), "users"),
                id.as_str(),
            )?;
            remove_row(txn, USERS_TABLE, id.as_str())?;
            Ok(())
        })
    }

    async fn count(&self) -> DomainResult<usize> {
        Ok(self.list().await?.len())
    }
}

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

kv_registry!(KvLocationRegistry);

#[async_trait]
impl LocationRegistry for KvLocationRegistry {
    async fn create(&self, location: Location) -> DomainResult<Location> {
        let mut location = location;
        stamp_owner(&self.scope, &mut location);
        location.validate()?;
        self.store.write(|txn| {
            index_claim(
                txn,
                "location",
                &index_key(
                    "location-name",
                    &[location.tenant_id.as_str(), location.user_id.as_str(), &location.name],
                ),
                location.id.as_str(),
            )?;
            let seq = KvStore::next_seq(txn)?;
            insert_row(txn, LOCATIONS_TABLE, "location", location.id.as_str(), seq, &location)
        })?;
        Ok(location)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<Location> {
        self.store.read(|txn| {
            let table = txn.open_table(LOCATIONS_TABLE).map_err(storage_err)?;
            fetch_row::<Location, _>(&table, id.as_str())?
                .map(|r| r.entity)
                .filter(|l| scope_visible(&self.scope, l))
                .ok_or_else(|| DomainError::not_found("location", id.as_str()))
        })
    }

    async fn list(&self) -> DomainResult<Vec<Location>> {
        self.store.read(|txn| {
            let table = txn.open_table(LOCATIONS_TABLE).map_err(storage_err)?;
            Ok(list_rows::<Location, _>(&table)?
                .into_iter()
                .filter(|l| scope_visible(&self.scope, l))
                .collect())
        })
    }

    async fn update(&self, location: Location) -> DomainResult<Location> {
        location.validate()?;
        let mut location = location;
        self.store.write(|txn| {
            let existing = {
                let table = txn.open_table(LOCATIONS_TABLE).map_err(storage_err)?;
                fetch_row::<Location, _>(&table, location.id.as_str())?
                    .filter(|r| scope_visible(&self.scope, &r.entity))
                    .ok_or_else(|| DomainError::not_found("location", location.id.as_str()))?
            };
            if existing.entity.name != location.name {
                index_release(
                    txn,
                    &index_key(
                        "location-name",
                        &[
                            existing.entity.tenant_id.as_str(),
                            existing.entity.user_id.as_str(),
                            &existing.entity.name,
                        ],
                    ),
                )?;
            }
            pin_owner_for_update(&existing.entity, &mut location);
            location.created_at = existing.entity.created_at;
            index_claim(
                txn,
                "location",
                &index_key(
                    "location-name",
                    &[location.tenant_id.as_str(), location.user_id.as_str(), &location.name],
                ),
                location.id.as_str(),
            )?;
            replace_row(txn, LOCATIONS_TABLE, location.id.as_str(), existing.seq, &location)
        })?;
        Ok(location)
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        self.store.write(|txn| {
            let existing = {
                let table = txn.open_table(LOCATIONS_TABLE).map_err(storage_err)?;
                fetch_row::<Location, _>(&table, id.as_str())?
                    .filter(|r| scope_visible(&self.scope, &r.entity))
                    .ok_or_else(|| DomainError::not_found("location", id.as_str()))?
            };
            if !children_of(txn, &children_key("location", id.as_str(), "areas"))?.is_empty() {
                return Err(DomainError::cannot_delete("location", id.as_str(), "location has areas"));
            }
            index_release(
                txn,
                &index_key(
                    "location-name",
                    &[
                        existing.entity.tenant_id.as_str(),
                        existing.entity.user_id.as_str(),
                        &existing.entity.name,
                    ],
                ),
            )?;
            remove_row(txn, LOCATIONS_TABLE, id.as_str())?;
            Ok(())
        })
    }

    async fn count(&self) -> DomainResult<usize> {
        Ok(self.list().await?.len())
    }

    async fn areas(&self, location_id: &EntityId) -> DomainResult<Vec<EntityId>> {
        self.get(location_id).await?;
        let ids = self
            .store
            .read(|txn| children_of_read(txn, &children_key("location", location_id.as_str(), "areas")))?;
        ids.into_iter().map(EntityId::parse).collect()
    }
}

// ---------------------------------------------------------------------------
// Areas
// ---------------------------------------------------------------------------

kv_registry!(KvAreaRegistry);

#[async_trait]
impl AreaRegistry for KvAreaRegistry {
    async fn create(&self, area: Area) -> DomainResult<Area> {
        let mut area = area;
        stamp_owner(&self.scope, &mut area);
        area.validate()?;
        self.store.write(|txn| {
            {
                let locations = txn.open_table(LOCATIONS_TABLE).map_err(storage_err)?;
                let parent = fetch_row::<Location, _>(&locations, area.location_id.as_str())?
                    .filter(|r| scope_visible(&self.scope, &r.entity));
                if parent.is_none() {
                    return Err(DomainError::not_found("location", area.location_id.as_str()));
                }
            }
            index_claim(
                txn,
                "area",
                &index_key(
                    "area-name",
                    &[area.tenant_id.as_str(), area.user_id.as_str(), &area.name],
                ),
                area.id.as_str(),
            )?;
            child_add(
                txn,
                &children_key("location", area.location_id.as_str(), "areas"),
                area.id.as_str(),
            )?;
            let seq = KvStore::next_seq(txn)?;
            insert_row(txn, AREAS_TABLE, "area", area.id.as_str(), seq, &area)
        })?;
        Ok(area)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<Area> {
        self.store.read(|txn| {
            let table = txn.open_table(AREAS_TABLE).map_err(storage_err)?;
            fetch_row::<Area, _>(&table, id.as_str())?
                .map(|r| r.entity)
                .filter(|a| scope_visible(&self.scope, a))
                .ok_or_else(|| DomainError::not_found("area", id.as_str()))
        })
    }

    async fn list(&self) -> DomainResult<Vec<Area>> {
        self.store.read(|txn| {
            let table = txn.open_table(AREAS_TABLE).map_err(storage_err)?;
            Ok(list_rows::<Area, _>(&table)?
                .into_iter()
                .filter(|a| scope_visible(&self.scope, a))
                .collect())
        })
    }

    async fn update(&self, area: Area) -> DomainResult<Area> {
        area.validate()?;
        let mut area = area;
        self.store.write(|txn| {
            let existing = {
                let table = txn.open_table(AREAS_TABLE).map_err(storage_err)?;
                fetch_row::<Area, _>(&table, area.id.as_str())?
                    .filter(|r| scope_visible(&self.scope, &r.entity))
                    .ok_or_else(|| DomainError::not_found("area", area.id.as_str()))?
            };
            {
                let locations = txn.open_table(LOCATIONS_TABLE).map_err(storage_err)?;
                if fetch_row::<Location, _>(&locations, area.location_id.as_str())?.is_none() {
                    return Err(DomainError::not_found("location", area.location_id.as_str()));
                }
            }
            if existing.entity.name != area.name {
                index_release(
                    txn,
                    &index_key(
                        "area-name",
                        &[
                            existing.entity.tenant_id.as_str(),
                            existing.entity.user_id.as_str(),
                            &existing.entity.name,
                        ],
                    ),
                )?;
            }
            if existing.entity.location_id != area.location_id {
                child_remove(
                    txn,
                    &children_key("location", existing.entity.location_id.as_str(), "areas"),
                    area.id.as_str(),
                )?;
                child_add(
                    txn,
                    &children_key("location", area.location_id.as_str(), "areas"),
                    area.id.as_str(),
                )?;
            }
            pin_owner_for_update(&existing.entity, &mut area);
            area.created_at = existing.entity.created_at;
            index_claim(
                txn,
                "area",
                &index_key(
                    "area-name",
                    &[area.tenant_id.as_str(), area.user_id.as_str(), &area.name],
                ),
                area.id.as_str(),
            )?;
            replace_row(txn, AREAS_TABLE, area.id.as_str(), existing.seq, &area)
        })?;
        Ok(area)
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        self.store.write(|txn| {
            let existing = {
                let table = txn.open_table(AREAS_TABLE).map_err(storage_err)?;
                fetch_row::<Area, _>(&table, id.as_str())?
                    .filter(|r| scope_visible(&self.scope, &r.entity))
                    .ok_or_else(|| DomainError::not_found("area", id.as_str()))?
            };
            if !children_of(txn, &children_key("area", id.as_str(), "commodities"))?.is_empty() {
                return Err(DomainError::cannot_delete("area", id.as_str(), "area has commodities"));
            }
            index_release(
                txn,
                &index_key(
                    "area-name",
                    &[
                        existing.entity.tenant_id.as_str(),
                        existing.entity.user_id.as_str(),
                        &existing.entity.name,
                    ],
                ),
            )?;
            child_remove(
                txn,
                &children_key("location", existing.entity.location_id.as_str(), "areas"),
                id.as_str(),
            )?;
            remove_row(txn, AREAS_TABLE, id.as_str())?;
            Ok(())
        })
    }

    async fn count(&self) -> DomainResult<usize> {
        Ok(self.list().await?.len())
    }

    async fn commodities(&self, area_id: &EntityId) -> DomainResult<Vec<EntityId>> {
        self.get(area_id).await?;
        let ids = self
            .store
            .read(|txn| children_of_read(txn, &children_key("area", area_id.as_str(), "commodities")))?;
        ids.into_iter().map(EntityId::parse).collect()
    }
}

// ---------------------------------------------------------------------------
// Commodities
// ---------------------------------------------------------------------------

kv_registry!(KvCommodityRegistry);

#[async_trait]
impl CommodityRegistry for KvCommodityRegistry {
    async fn create(&self, commodity: Commodity) -> DomainResult<Commodity> {
        let mut commodity = commodity;
        stamp_owner(&self.scope, &mut commodity);
        self.store.write(|txn| {
            {
                let areas = txn.open_table(AREAS_TABLE).map_err(storage_err)?;
                let parent = fetch_row::<Area, _>(&areas, commodity.area_id.as_str())?
                    .filter(|r| scope_visible(&self.scope, &r.entity));
                if parent.is_none() {
                    return Err(DomainError::not_found("area", commodity.area_id.as_str()));
                }
            }
            index_claim(
                txn,
                "commodity",
                &index_key(
                    "commodity-name",
                    &[commodity.tenant_id.as_str(), commodity.user_id.as_str(), &commodity.name],
                ),
                commodity.id.as_str(),
            )?;
            child_add(
                txn,
                &children_key("area", commodity.area_id.as_str(), "commodities"),
                commodity.id.as_str(),
            )?;
            let seq = KvStore::next_seq(txn)?;
            insert_row(txn, COMMODITIES_TABLE, "commodity", commodity.id.as_str(), seq, &commodity)
        })?;
        Ok(commodity)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<Commodity> {
        self.store.read(|txn| {
            let table = txn.open_table(COMMODITIES_TABLE).map_err(storage_err)?;
            fetch_row::<Commodity, _>(&table, id.as_str())?
                .map(|r| r.entity)
                .filter(|c| scope_visible(&self.scope, c))
                .ok_or_else(|| DomainError::not_found("commodity", id.as_str()))
        })
    }

    async fn list(&self) -> DomainResult<Vec<Commodity>> {
        self.store.read(|txn| {
            let table = txn.open_table(COMMODITIES_TABLE).map_err(storage_err)?;
            Ok(list_rows::<Commodity, _>(&table)?
                .into_iter()
                .filter(|c| scope_visible(&self.scope, c))
                .collect())
        })
    }

    async fn list_paginated(&self, offset: usize, limit: usize) -> DomainResult<ListPage<Commodity>> {
        Ok(ListPage::slice(self.list().await?, offset, limit))
    }

    async fn update(&self, commodity: Commodity) -> DomainResult<Commodity> {
        let mut commodity = commodity;
        self.store.write(|txn| {
            let existing = {
                let table = txn.open_table(COMMODITIES_TABLE).map_err(storage_err)?;
                fetch_row::<Commodity, _>(&table, commodity.id.as_str())?
                    .filter(|r| scope_visible(&self.scope, &r.entity))
                    .ok_or_else(|| DomainError::not_found("commodity", commodity.id.as_str()))?
            };
            {
                let areas = txn.open_table(AREAS_TABLE).map_err(storage_err)?;
                if fetch_row::<Area, _>(&areas, commodity.area_id.as_str())?.is_none() {
                    return Err(DomainError::not_found("area", commodity.area_id.as_str()));
                }
            }
            if existing.entity.name != commodity.name {
                index_release(
                    txn,
                    &index_key(
                        "commodity-name",
                        &[
                            existing.entity.tenant_id.as_str(),
                            existing.entity.user_id.as_str(),
                            &existing.entity.name,
                        ],
                    ),
                )?;
            }
            if existing.entity.area_id != commodity.area_id {
                child_remove(
                    txn,
                    &children_key("area", existing.entity.area_id.as_str(), "commodities"),
                    commodity.id.as_str(),
                )?;
                child_add(
                    txn,
                    &children_key("area", commodity.area_id.as_str(), "commodities"),
                    commodity.id.as_str(),
                )?;
            }
            pin_owner_for_update(&existing.entity, &mut commodity);
            commodity.created_at = existing.entity.created_at;
            index_claim(
                txn,
                "commodity",
                &index_key(
                    "commodity-name",
                    &[commodity.tenant_id.as_str(), commodity.user_id.as_str(), &commodity.name],
                ),
                commodity.id.as_str(),
            )?;
            replace_row(txn, COMMODITIES_TABLE, commodity.id.as_str(), existing.seq, &commodity)
        })?;
        Ok(commodity)
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        self.store.write(|txn| {
            let existing = {
                let table = txn.open_table(COMMODITIES_TABLE).map_err(storage_err)?;
                fetch_row::<Commodity, _>(&table, id.as_str())?
                    .filter(|r| scope_visible(&self.scope, &r.entity))
                    .ok_or_else(|| DomainError::not_found("commodity", id.as_str()))?
            };
            if !children_of(txn, &children_key("commodity", id.as_str(), "files"))?.is_empty() {
                return Err(DomainError::cannot_delete(
                    "commodity",
                    id.as_str(),
                    "commodity has attached files",
                ));
            }
            index_release(
                txn,
                &index_key(
                    "commodity-name",
                    &[
                        existing.entity.tenant_id.as_str(),
                        existing.entity.user_id.as_str(),
                        &existing.entity.name,
                    ],
                ),
            )?;
            child_remove(
                txn,
                &children_key("area", existing.entity.area_id.as_str(), "commodities"),
                id.as_str(),
            )?;
            remove_row(txn, COMMODITIES_TABLE, id.as_str())?;
            Ok(())
        })
    }

    async fn count(&self) -> DomainResult<usize> {
        Ok(self.list().await?.len())
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

kv_registry!(KvFileRegistry);

#[async_trait]
impl FileRegistry for KvFileRegistry {
    async fn create(&self, file: File) -> DomainResult<File> {
        let mut file = file;
        stamp_owner(&self.scope, &mut file);
        file.validate()?;
        self.store.write(|txn| {
            let seq = KvStore::next_seq(txn)?;
            insert_row(txn, FILES_TABLE, "file", file.id.as_str(), seq, &file)
        })?;
        Ok(file)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<File> {
        self.store.read(|txn| {
            let table = txn.open_table(FILES_TABLE).map_err(storage_err)?;
            fetch_row::<File, _>(&table, id.as_str())?
                .map(|r| r.entity)
                .filter(|f| scope_visible(&self.scope, f))
                .ok_or_else(|| DomainError::not_found("file", id.as_str()))
        })
    }

    async fn list(&self) -> DomainResult<Vec<File>> {
        self.store.read(|txn| {
            let table = txn.open_table(FILES_TABLE).map_err(storage_err)?;
            Ok(list_rows::<File, _>(&table)?
                .into_iter()
                .filter(|f| scope_visible(&self.scope, f))
                .collect())
        })
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
        let mut file = file;
        self.store.write(|txn| {
            let existing = {
                let table = txn.open_table(FILES_TABLE).map_err(storage_err)?;
                fetch_row::<File, _>(&table, file.id.as_str())?
                    .filter(|r| scope_visible(&self.scope, &r.entity))
                    .ok_or_else(|| DomainError::not_found("file", file.id.as_str()))?
            };
            pin_owner_for_update(&existing.entity, &mut file);
            file.created_at = existing.entity.created_at;
            replace_row(txn, FILES_TABLE, file.id.as_str(), existing.seq, &file)
        })?;
        Ok(file)
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        self.store.write(|txn| {
            let exists = {
                let table = txn.open_table(FILES_TABLE).map_err(storage_err)?;
                fetch_row::<File, _>(&table, id.as_str())?
                    .filter(|r| scope_visible(&self.scope, &r.entity))
                    .is_some()
            };
            if !exists {
                return Err(DomainError::not_found("file", id.as_str()));
            }
            remove_row(txn, FILES_TABLE, id.as_str())?;
            Ok(())
        })
    }

    async fn count(&self) -> DomainResult<usize> {
        Ok(self.list().await?.len())
    }
}

// ---------------------------------------------------------------------------
// Commodity files
// ---------------------------------------------------------------------------

kv_registry!(KvCommodityFileRegistry);

#[async_trait]
impl CommodityFileRegistry for KvCommodityFileRegistry {
    async fn create(&self, link: CommodityFile) -> DomainResult<CommodityFile> {
        let mut link = link;
        stamp_owner(&self.scope, &mut link);
        link.validate()?;
        self.store.write(|txn| {
            {
                let commodities = txn.open_table(COMMODITIES_TABLE).map_err(storage_err)?;
                let parent = fetch_row::<Commodity, _>(&commodities, link.commodity_id.as_str())?
                    .filter(|r| scope_visible(&self.scope, &r.entity));
                if parent.is_none() {
                    return Err(DomainError::not_found("commodity", link.commodity_id.as_str()));
                }
            }
            {
                let files = txn.open_table(FILES_TABLE).map_err(storage_err)?;
                if fetch_row::<File, _>(&files, link.file_id.as_str())?.is_none() {
                    return Err(DomainError::not_found("file", link.file_id.as_str()));
                }
            }
            child_add(
                txn,
                &children_key("commodity", link.commodity_id.as_str(), "files"),
                link.id.as_str(),
            )?;
            child_add(
                txn,
                &children_key("file", link.file_id.as_str(), "commodity_files"),
                link.id.as_str(),
            )?;
            let seq = KvStore::next_seq(txn)?;
            insert_row(txn, COMMODITY_FILES_TABLE, "commodity_file", link.id.as_str(), seq, &link)
        })?;
        Ok(link)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<CommodityFile> {
        self.store.read(|txn| {
            let table = txn.open_table(COMMODITY_FILES_TABLE).map_err(storage_err)?;
            fetch_row::<CommodityFile, _>(&table, id.as_str())?
                .map(|r| r.entity)
                .filter(|cf| scope_visible(&self.scope, cf))
                .ok_or_else(|| DomainError::not_found("commodity_file", id.as_str()))
        })
    }

    async fn list_for_commodity(
        &self,
        commodity_id: &EntityId,
        kind: Option<FileType>,
    ) -> DomainResult<Vec<CommodityFile>> {
        self.store.read(|txn| {
            let table = txn.open_table(COMMODITY_FILES_TABLE).map_err(storage_err)?;
            Ok(list_rows::<CommodityFile, _>(&table)?
                .into_iter()
                .filter(|cf| scope_visible(&self.scope, cf))
                .filter(|cf| &cf.commodity_id == commodity_id)
                .filter(|cf| kind.is_none_or(|k| cf.kind == k))
                .collect())
        })
    }

    async fn list_by_file(&self, file_id: &EntityId) -> DomainResult<Vec<CommodityFile>> {
        self.store.read(|txn| {
            let table = txn.open_table(COMMODITY_FILES_TABLE).map_err(storage_err)?;
            Ok(list_rows::<CommodityFile, _>(&table)?
                .into_iter()
                .filter(|cf| scope_visible(&self.scope, cf))
                .filter(|cf| &cf.file_id == file_id)
                .collect())
        })
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        self.store.write(|txn| {
            let existing = {
                let table = txn.open_table(COMMODITY_FILES_TABLE).map_err(storage_err)?;
                fetch_row::<CommodityFile, _>(&table, id.as_str())?
                    .filter(|r| scope_visible(&self.scope, &r.entity))
                    .ok_or_else(|| DomainError::not_found("commodity_file", id.as_str()))?
            };
            child_remove(
                txn,
                &children_key("commodity", existing.entity.commodity_id.as_str(), "files"),
                id.as_str(),
            )?;
            child_remove(
                txn,
                &children_key("file", existing.entity.file_id.as_str(), "commodity_files"),
                id.as_str(),
            )?;
            remove_row(txn, COMMODITY_FILES_TABLE, id.as_str())?;
            Ok(())
        })
    }

    async fn count(&self) -> DomainResult<usize> {
        self.store.read(|txn| {
            let table = txn.open_table(COMMODITY_FILES_TABLE).map_err(storage_err)?;
            Ok(list_rows::<CommodityFile, _>(&table)?
                .into_iter()
                .filter(|cf| scope_visible(&self.scope, cf))
                .count())
        })
    }
}

// ---------------------------------------------------------------------------
// Exports
// ---------------------------------------------------------------------------

kv_registry!(KvExportRegistry);

#[async_trait]
impl ExportRegistry for KvExportRegistry {
    async fn create(&self, export: Export) -> DomainResult<Export> {
        let mut export = export;
        stamp_owner(&self.scope, &mut export);
        export.validate()?;
        self.store.write(|txn| {
            let seq = KvStore::next_seq(txn)?;
            insert_row(txn, EXPORTS_TABLE, "export", export.id.as_str(), seq, &export)
        })?;
        Ok(export)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<Export> {
        let row = self.store.read(|txn| {
            let table = txn.open_table(EXPORTS_TABLE).map_err(storage_err)?;
            fetch_row::<Export, _>(&table, id.as_str())?
                .map(|r| r.entity)
                .filter(|e| scope_visible(&self.scope, e))
                .ok_or_else(|| DomainError::not_found("export", id.as_str()))
        })?;
        if row.is_deleted() {
            return Err(DomainError::Deleted {
                entity: "export",
                id: id.as_str().to_string(),
            });
        }
        Ok(row)
    }

    async fn list(&self) -> DomainResult<Vec<Export>> {
        self.store.read(|txn| {
            let table = txn.open_table(EXPORTS_TABLE).map_err(storage_err)?;
            Ok(list_rows::<Export, _>(&table)?
                .into_iter()
                .filter(|e| scope_visible(&self.scope, e) && !e.is_deleted())
                .collect())
        })
    }

    async fn list_deleted(&self) -> DomainResult<Vec<Export>> {
        self.store.read(|txn| {
            let table = txn.open_table(EXPORTS_TABLE).map_err(storage_err)?;
            Ok(list_rows::<Export, _>(&table)?
                .into_iter()
                .filter(|e| scope_visible(&self.scope, e) && e.is_deleted())
                .collect())
        })
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
        let mut export = export;
        self.store.write(|txn| {
            let existing = {
                let table = txn.open_table(EXPORTS_TABLE).map_err(storage_err)?;
                fetch_row::<Export, _>(&table, export.id.as_str())?
                    .filter(|r| scope_visible(&self.scope, &r.entity))
                    .ok_or_else(|| DomainError::not_found("export", export.id.as_str()))?
            };
            if existing.entity.is_deleted() {
                return Err(DomainError::Deleted {
                    entity: "export",
                    id: export.id.as_str().to_string(),
                });
            }
            pin_owner_for_update(&existing.entity, &mut export);
            export.created_at = existing.entity.created_at;
            export.deleted_at = existing.entity.deleted_at;
            replace_row(txn, EXPORTS_TABLE, export.id.as_str(), existing.seq, &export)
        })?;
        Ok(export)
    }

    async fn transition(&self, id: &EntityId, from: JobStatus, to: JobStatus) -> DomainResult<bool> {
        self.store.write(|txn| {
            let existing = {
                let table = txn.open_table(EXPORTS_TABLE).map_err(storage_err)?;
                fetch_row::<Export, _>(&table, id.as_str())?
                    .filter(|r| scope_visible(&self.scope, &r.entity))
                    .ok_or_else(|| DomainError::not_found("export", id.as_str()))?
            };
            let mut row = existing.entity;
            if row.is_deleted() || row.status != from || !from.can_transition_to(to) {
                return Ok(false);
            }
            row.status = to;
            row.updated_at = Utc::now();
            replace_row(txn, EXPORTS_TABLE, id.as_str(), existing.seq, &row)?;
            Ok(true)
        })
    }

    async fn detach_file(&self, file_id: &EntityId) -> DomainResult<usize> {
        self.store.write(|txn| {
            let mut rows: Vec<KvRow<Export>> = Vec::new();
            {
                let table = txn.open_table(EXPORTS_TABLE).map_err(storage_err)?;
                for item in table.iter().map_err(storage_err)? {
                    let (_, value) = item.map_err(storage_err)?;
                    rows.push(super::store::decode(value.value())?);
                }
            }
            let mut touched = 0usize;
            for mut row in rows {
                if scope_visible(&self.scope, &row.entity)
                    && row.entity.file_id.as_ref() == Some(file_id)
                {
                    row.entity.file_id = None;
                    row.entity.updated_at = Utc::now();
                    let id = row.entity.id.clone();
                    replace_row(txn, EXPORTS_TABLE, id.as_str(), row.seq, &row.entity)?;
                    touched += 1;
                }
            }
            Ok(touched)
        })
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        self.store.write(|txn| {
            let existing = {
                let table = txn.open_table(EXPORTS_TABLE).map_err(storage_err)?;
                fetch_row::<Export, _>(&table, id.as_str())?
                    .filter(|r| scope_visible(&self.scope, &r.entity))
                    .ok_or_else(|| DomainError::not_found("export", id.as_str()))?
            };
            let mut row = existing.entity;
            if row.is_deleted() {
                return Err(DomainError::Deleted {
                    entity: "export",
                    id: id.as_str().to_string(),
                });
            }
            row.deleted_at = Some(Utc::now());
            row.updated_at = Utc::now();
            replace_row(txn, EXPORTS_TABLE, id.as_str(), existing.seq, &row)
        })
    }

    async fn hard_delete(&self, id: &EntityId) -> DomainResult<()> {
        self.store.write(|txn| {
            let exists = {
                let table = txn.open_table(EXPORTS_TABLE).map_err(storage_err)?;
                fetch_row::<Export, _>(&table, id.as_str())?
                    .filter(|r| scope_visible(&self.scope, &r.entity))
                    .is_some()
            };
            if !exists {
                return Err(DomainError::not_found("export", id.as_str()));
            }
            remove_row(txn, EXPORTS_TABLE, id.as_str())?;
            Ok(())
        })
    }

    async fn count(&self) -> DomainResult<usize> {
        Ok(self.list().await?.len())
    }
}

// ---------------------------------------------------------------------------
// Restores
// ---------------------------------------------------------------------------

kv_registry!(KvRestoreRegistry);

#[async_trait]
impl RestoreRegistry for KvRestoreRegistry {
    async fn create(&self, operation: RestoreOperation) -> DomainResult<RestoreOperation> {
        let mut operation = operation;
        stamp_owner(&self.scope, &mut operation);
        operation.validate()?;
        self.store.write(|txn| {
            {
                let exports = txn.open_table(EXPORTS_TABLE).map_err(storage_err)?;
                let export = fetch_row::<Export, _>(&exports, operation.export_id.as_str())?
                    .filter(|r| !r.entity.is_deleted());
                if export.is_none() {
                    return Err(DomainError::not_found("export", operation.export_id.as_str()));
                }
            }
            let seq = KvStore::next_seq(txn)?;
            insert_row(txn, RESTORES_TABLE, "restore_operation", operation.id.as_str(), seq, &operation)
        })?;
        Ok(operation)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<RestoreOperation> {
        self.store.read(|txn| {
            let table = txn.open_table(RESTORES_TABLE).map_err(storage_err)?;
            fetch_row::<RestoreOperation, _>(&table, id.as_str())?
                .map(|r| r.entity)
                .filter(|r| scope_visible(&self.scope, r))
                .ok_or_else(|| DomainError::not_found("restore_operation", id.as_str()))
        })
    }

    async fn list(&self) -> DomainResult<Vec<RestoreOperation>> {
        self.store.read(|txn| {
            let table = txn.open_table(RESTORES_TABLE).map_err(storage_err)?;
            Ok(list_rows::<RestoreOperation, _>(&table)?
                .into_iter()
                .filter(|r| scope_visible(&self.scope, r))
                .collect())
        })
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
        let mut operation = operation;
        self.store.write(|txn| {
            let existing = {
                let table = txn.open_table(RESTORES_TABLE).map_err(storage_err)?;
                fetch_row::<RestoreOperation, _>(&table, operation.id.as_str())?
                    .filter(|r| scope_visible(&self.scope, &r.entity))
                    .ok_or_else(|| DomainError::not_found("restore_operation", operation.id.as_str()))?
            };
            pin_owner_for_update(&existing.entity, &mut operation);
            operation.created_at = existing.entity.created_at;
            replace_row(txn, RESTORES_TABLE, operation.id.as_str(), existing.seq, &operation)
        })?;
        Ok(operation)
    }

    async fn transition(&self, id: &EntityId, from: JobStatus, to: JobStatus) -> DomainResult<bool> {
        self.store.write(|txn| {
            let existing = {
                let table = txn.open_table(RESTORES_TABLE).map_err(storage_err)?;
                fetch_row::<RestoreOperation, _>(&table, id.as_str())?
                    .filter(|r| scope_visible(&self.scope, &r.entity))
                    .ok_or_else(|| DomainError::not_found("restore_operation", id.as_str()))?
            };
            let mut row = existing.entity;
            if row.status != from || !from.can_transition_to(to) {
                return Ok(false);
            }
            row.status = to;
            if to == JobStatus::InProgress {
                row.started_at = Some(Utc::now());
            }
            row.updated_at = Utc::now();
            replace_row(txn, RESTORES_TABLE, id.as_str(), existing.seq, &row)?;
            Ok(true)
        })
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        self.store.write(|txn| {
            let exists = {
                let table = txn.open_table(RESTORES_TABLE).map_err(storage_err)?;
                fetch_row::<RestoreOperation, _>(&table, id.as_str())?
                    .filter(|r| scope_visible(&self.scope, &r.entity))
                    .is_some()
            };
            if !exists {
                return Err(DomainError::not_found("restore_operation", id.as_str()));
            }
            // Steps are strongly owned: remove the bucket and every step row.
            let bucket = children_key("restore_operation", id.as_str(), "steps");
            for step_id in children_of(txn, &bucket)? {
                remove_row(txn, RESTORE_STEPS_TABLE, &step_id)?;
                child_remove(txn, &bucket, &step_id)?;
            }
            remove_row(txn, RESTORES_TABLE, id.as_str())?;
            Ok(())
        })
    }

    async fn count(&self) -> DomainResult<usize> {
        Ok(self.list().await?.len())
    }

    async fn add_step(&self, step: RestoreStep) -> DomainResult<RestoreStep> {
        self.store.write(|txn| {
            {
                let table = txn.open_table(RESTORES_TABLE).map_err(storage_err)?;
                if fetch_row::<RestoreOperation, _>(&table, step.restore_operation_id.as_str())?.is_none() {
                    return Err(DomainError::not_found(
                        "restore_operation",
                        step.restore_operation_id.as_str(),
                    ));
                }
            }
            child_add(
                txn,
                &children_key("restore_operation", step.restore_operation_id.as_str(), "steps"),
                step.id.as_str(),
            )?;
            let seq = KvStore::next_seq(txn)?;
            insert_row(txn, RESTORE_STEPS_TABLE, "restore_step", step.id.as_str(), seq, &step)
        })?;
        Ok(step)
    }

    async fn steps(&self, operation_id: &EntityId) -> DomainResult<Vec<RestoreStep>> {
        self.store.read(|txn| {
            let table = txn.open_table(RESTORE_STEPS_TABLE).map_err(storage_err)?;
            Ok(list_rows::<RestoreStep, _>(&table)?
                .into_iter()
                .filter(|s| &s.restore_operation_id == operation_id)
                .collect())
        })
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

kv_registry!(KvSettingsRegistry);

#[async_trait]
impl SettingsRegistry for KvSettingsRegistry {
    async fn get(&self) -> DomainResult<Settings> {
        let (tenant, user) = self.scope.require_user()?;
        let owner_key = index_key("settings-owner", &[tenant.as_str(), user.as_str()]);
        let existing_id = self.store.read(|txn| {
            let index = txn.open_table(INDEX_TABLE).map_err(storage_err)?;
            index_get(&index, &owner_key)
        })?;
        if let Some(id) = existing_id {
            return self.store.read(|txn| {
                let table = txn.open_table(SETTINGS_TABLE).map_err(storage_err)?;
                fetch_row::<Settings, _>(&table, &id)?
                    .map(|r| r.entity)
                    .ok_or_else(|| DomainError::not_found("settings", id.as_str()))
            });
        }
        let fresh = Settings::new(tenant.clone(), user.clone());
        self.store.write(|txn| {
            index_claim(txn, "settings", &owner_key, fresh.id.as_str())?;
            let seq = KvStore::next_seq(txn)?;
            insert_row(txn, SETTINGS_TABLE, "settings", fresh.id.as_str(), seq, &fresh)
        })?;
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
        self.store.write(|txn| {
            let existing = {
                let table = txn.open_table(SETTINGS_TABLE).map_err(storage_err)?;
                fetch_row::<Settings, _>(&table, incoming.id.as_str())?
                    .ok_or_else(|| DomainError::not_found("settings", incoming.id.as_str()))?
            };
            replace_row(txn, SETTINGS_TABLE, incoming.id.as_str(), existing.seq, &incoming)
        })?;
        Ok(incoming)
    }
}

// ---------------------------------------------------------------------------
// Thumbnails
// ---------------------------------------------------------------------------

kv_registry!(KvThumbnailRegistry);

#[async_trait]
impl ThumbnailRegistry for KvThumbnailRegistry {
    async fn create(&self, job: ThumbnailJob) -> DomainResult<ThumbnailJob> {
        let mut job = job;
        stamp_owner(&self.scope, &mut job);
        job.validate()?;
        self.store.write(|txn| {
            {
                let files = txn.open_table(FILES_TABLE).map_err(storage_err)?;
                if fetch_row::<File, _>(&files, job.file_id.as_str())?.is_none() {
                    return Err(DomainError::not_found("file", job.file_id.as_str()));
                }
            }
            {
                let table = txn.open_table(THUMBNAILS_TABLE).map_err(storage_err)?;
                let active_exists = list_rows::<ThumbnailJob, _>(&table)?
                    .iter()
                    .any(|j| j.file_id == job.file_id && !j.status.is_terminal());
                if active_exists {
                    return Err(DomainError::already_exists(
                        "thumbnail_job",
                        format!("active job for file {}", job.file_id),
                    ));
                }
            }
            let seq = KvStore::next_seq(txn)?;
            insert_row(txn, THUMBNAILS_TABLE, "thumbnail_job", job.id.as_str(), seq, &job)
        })?;
        Ok(job)
    }

    async fn get(&self, id: &EntityId) -> DomainResult<ThumbnailJob> {
        self.store.read(|txn| {
            let table = txn.open_table(THUMBNAILS_TABLE).map_err(storage_err)?;
            fetch_row::<ThumbnailJob, _>(&table, id.as_str())?
                .map(|r| r.entity)
                .filter(|j| scope_visible(&self.scope, j))
                .ok_or_else(|| DomainError::not_found("thumbnail_job", id.as_str()))
        })
    }

    async fn find_by_file(&self, file_id: &EntityId) -> DomainResult<Option<ThumbnailJob>> {
        Ok(self.list().await?.into_iter().find(|j| &j.file_id == file_id))
    }

    async fn list(&self) -> DomainResult<Vec<ThumbnailJob>> {
        self.store.read(|txn| {
            let table = txn.open_table(THUMBNAILS_TABLE).map_err(storage_err)?;
            Ok(list_rows::<ThumbnailJob, _>(&table)?
                .into_iter()
                .filter(|j| scope_visible(&self.scope, j))
                .collect())
        })
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
        let mut job = job;
        self.store.write(|txn| {
            let existing = {
                let table = txn.open_table(THUMBNAILS_TABLE).map_err(storage_err)?;
                fetch_row::<ThumbnailJob, _>(&table, job.id.as_str())?
                    .filter(|r| scope_visible(&self.scope, &r.entity))
                    .ok_or_else(|| DomainError::not_found("thumbnail_job", job.id.as_str()))?
            };
            pin_owner_for_update(&existing.entity, &mut job);
            job.created_at = existing.entity.created_at;
            replace_row(txn, THUMBNAILS_TABLE, job.id.as_str(), existing.seq, &job)
        })?;
        Ok(job)
    }

    async fn transition(&self, id: &EntityId, from: JobStatus, to: JobStatus) -> DomainResult<bool> {
        self.store.write(|txn| {
            let existing = {
                let table = txn.open_table(THUMBNAILS_TABLE).map_err(storage_err)?;
                fetch_row::<ThumbnailJob, _>(&table, id.as_str())?
                    .filter(|r| scope_visible(&self.scope, &r.entity))
                    .ok_or_else(|| DomainError::not_found("thumbnail_job", id.as_str()))?
            };
            let mut row = existing.entity;
            if row.status != from || !from.can_transition_to(to) {
                return Ok(false);
            }
            row.status = to;
            row.updated_at = Utc::now();
            replace_row(txn, THUMBNAILS_TABLE, id.as_str(), existing.seq, &row)?;
            Ok(true)
        })
    }

    async fn delete(&self, id: &EntityId) -> DomainResult<()> {
        self.store.write(|txn| {
            let exists = {
                let table = txn.open_table(THUMBNAILS_TABLE).map_err(storage_err)?;
                fetch_row::<ThumbnailJob, _>(&table, id.as_str())?
                    .filter(|r| scope_visible(&self.scope, &r.entity))
                    .is_some()
            };
            if !exists {
                return Err(DomainError::not_found("thumbnail_job", id.as_str()));
            }
            remove_row(txn, THUMBNAILS_TABLE, id.as_str())?;
            Ok(())
        })
    }

    async fn count(&self) -> DomainResult<usize> {
        Ok(self.list().await?.len())
    }
}

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

kv_registry!(KvSlotRegistry);

#[async_trait]
impl SlotRegistry for KvSlotRegistry {
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
        let tenant_hint = self.scope.tenant_id().cloned();
        self.store.write(|txn| {
            let mut slots: Vec<KvRow<OperationSlot>> = Vec::new();
            {
                let table = txn.open_table(SLOTS_TABLE).map_err(storage_err)?;
                for item in table.iter().map_err(storage_err)? {
                    let (_, value) = item.map_err(storage_err)?;
                    slots.push(super::store::decode(value.value())?);
                }
            }
            // Reclaim expired holders before counting.
            let mut live = 0usize;
            for row in slots.iter_mut() {
                let slot = &mut row.entity;
                if slot.status == SlotStatus::Active && slot.expires_at <= now {
                    slot.status = SlotStatus::Expired;
                    replace_row(txn, SLOTS_TABLE, slot.id.as_str(), row.seq, slot)?;
                    continue;
                }
                if &slot.user_id == user_id && slot.job_kind == job_kind && slot.is_live(now) {
                    live += 1;
                }
            }
            if live >= limit {
                return Err(DomainError::ConcurrencyLimitExceeded(format!(
                    "{live} live {} slots for user {user_id}",
                    job_kind.as_str()
                )));
            }
            let tenant_id = tenant_hint.clone().unwrap_or_else(|| {
                slots
                    .iter()
                    .find(|r| &r.entity.user_id == user_id)
                    .map(|r| r.entity.tenant_id.clone())
                    .unwrap_or_default()
            });
            let slot = OperationSlot::new(tenant_id, user_id.clone(), job_kind, job_id.clone(), ttl);
            let seq = KvStore::next_seq(txn)?;
            insert_row(txn, SLOTS_TABLE, "operation_slot", slot.id.as_str(), seq, &slot)?;
            Ok(slot)
        })
    }

    async fn release(&self, slot_id: &EntityId) -> DomainResult<()> {
        self.store.write(|txn| {
            let existing = {
                let table = txn.open_table(SLOTS_TABLE).map_err(storage_err)?;
                fetch_row::<OperationSlot, _>(&table, slot_id.as_str())?
                    .ok_or_else(|| DomainError::not_found("operation_slot", slot_id.as_str()))?
            };
            let mut slot = existing.entity;
            slot.release();
            replace_row(txn, SLOTS_TABLE, slot_id.as_str(), existing.seq, &slot)
        })
    }

    async fn live_count(&self, user_id: &EntityId, job_kind: JobKind) -> DomainResult<usize> {
        let now = Utc::now();
        self.store.read(|txn| {
            let table = txn.open_table(SLOTS_TABLE).map_err(storage_err)?;
            Ok(list_rows::<OperationSlot, _>(&table)?
                .iter()
                .filter(|s| &s.user_id == user_id && s.job_kind == job_kind && s.is_live(now))
                .count())
        })
    }
}
