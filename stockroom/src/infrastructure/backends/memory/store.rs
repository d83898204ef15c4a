// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # In-Memory Store
//!
//! Ordered maps for every entity family behind a single mutex. Each table
//! keeps a `HashMap` for lookup plus an insertion-order vector so listings
//! match the contract: insertion order per owner, no secondary sort.
//!
//! The mutex is held only for the duration of one synchronous operation;
//! registry methods never await while holding it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use stockroom_domain::entities::{
    Area, Commodity, CommodityFile, Export, File, Location, OperationSlot, RestoreOperation,
    RestoreStep, Settings, Tenant, ThumbnailJob, User,
};
use stockroom_domain::{DomainError, DomainResult, EntityId};

use super::super::EntityRecord;

/// One entity family: id-keyed rows plus insertion order.
pub(crate) struct Table<T: EntityRecord> {
    rows: HashMap<String, T>,
    order: Vec<String>,
}

impl<T: EntityRecord> Table<T> {
    fn new() -> Self {
        Self {
            rows: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn insert(&mut self, row: T) -> DomainResult<()> {
        let key = row.id().as_str().to_string();
        if self.rows.contains_key(&key) {
            return Err(DomainError::already_exists(T::ENTITY, format!("id {key}")));
        }
        self.order.push(key.clone());
        self.rows.insert(key, row);
        Ok(())
    }

    pub fn get(&self, id: &EntityId) -> Option<&T> {
        self.rows.get(id.as_str())
    }

    pub fn get_mut(&mut self, id: &EntityId) -> Option<&mut T> {
        self.rows.get_mut(id.as_str())
    }

    /// Replaces an existing row, failing with `NotFound` for unknown ids.
    pub fn replace(&mut self, row: T) -> DomainResult<()> {
        let key = row.id().as_str().to_string();
        match self.rows.get_mut(&key) {
            Some(slot) => {
                *slot = row;
                Ok(())
            }
            None => Err(DomainError::not_found(T::ENTITY, key)),
        }
    }

    pub fn remove(&mut self, id: &EntityId) -> Option<T> {
        let removed = self.rows.remove(id.as_str());
        if removed.is_some() {
            self.order.retain(|k| k != id.as_str());
        }
        removed
    }

    /// Rows in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(|k| self.rows.get(k))
    }
}

/// All tables of the in-memory backend.
pub(crate) struct StoreInner {
    pub tenants: Table<Tenant>,
    pub users: Table<User>,
    pub locations: Table<Location>,
    pub areas: Table<Area>,
    pub commodities: Table<Commodity>,
    pub files: Table<File>,
    pub commodity_files: Table<CommodityFile>,
    pub exports: Table<Export>,
    pub restores: Table<RestoreOperation>,
    pub settings: Table<Settings>,
    pub thumbnails: Table<ThumbnailJob>,
    /// Append-only step log; filtered by operation id on read.
    pub restore_steps: Vec<RestoreStep>,
    /// Slots are few and short-lived; a scan is fine.
    pub slots: Vec<OperationSlot>,
}

impl StoreInner {
    fn new() -> Self {
        Self {
            tenants: Table::new(),
            users: Table::new(),
            locations: Table::new(),
            areas: Table::new(),
            commodities: Table::new(),
            files: Table::new(),
            commodity_files: Table::new(),
            exports: Table::new(),
            restores: Table::new(),
            settings: Table::new(),
            thumbnails: Table::new(),
            restore_steps: Vec::new(),
            slots: Vec::new(),
        }
    }
}

/// Shared handle to the in-memory backend state.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner::new())),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_preserves_insertion_order() {
        let mut table = Table::<Location>::new();
        let tenant = EntityId::new();
        let user = EntityId::new();
        let names = ["first", "second", "third"];
        for name in names {
            table
                .insert(Location::new(tenant.clone(), user.clone(), name))
                .unwrap();
        }
        let listed: Vec<&str> = table.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(listed, names);
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut table = Table::<Location>::new();
        let location = Location::new(EntityId::new(), EntityId::new(), "one");
        table.insert(location.clone()).unwrap();
        assert!(matches!(
            table.insert(location),
            Err(DomainError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn remove_drops_from_order() {
        let mut table = Table::<Location>::new();
        let a = Location::new(EntityId::new(), EntityId::new(), "a");
        let b = Location::new(EntityId::new(), EntityId::new(), "b");
        let a_id = a.id.clone();
        table.insert(a).unwrap();
        table.insert(b).unwrap();

        assert!(table.remove(&a_id).is_some());
        assert_eq!(table.iter().count(), 1);
        assert!(table.remove(&a_id).is_none());
    }
}
