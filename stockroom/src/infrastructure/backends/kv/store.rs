// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # redb Store Wrapper
//!
//! Owns the redb database handle and provides the row codec shared by every
//! KV registry: bincode payloads wrapped with an insertion sequence number
//! so listings can be returned in insertion order even though redb sorts by
//! key.
//!
//! Every operation runs inside a single read or write transaction. Writes
//! commit on success and abort wholesale on error, which is what gives the
//! KV backend its transactional contract.

use std::path::Path;
use std::sync::Arc;

use redb::{
    Database, ReadTransaction, ReadableMultimapTable, ReadableTable, TableDefinition,
    WriteTransaction,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use stockroom_domain::{DomainError, DomainResult};

use super::schema::{
    AREAS_TABLE, CHILDREN_TABLE, COMMODITIES_TABLE, COMMODITY_FILES_TABLE, EXPORTS_TABLE,
    FILES_TABLE, INDEX_TABLE, LOCATIONS_TABLE, META_NEXT_SEQ, META_SCHEMA_VERSION, META_TABLE,
    RESTORES_TABLE, RESTORE_STEPS_TABLE, SCHEMA_VERSION, SETTINGS_TABLE, SLOTS_TABLE,
    TENANTS_TABLE, THUMBNAILS_TABLE, USERS_TABLE,
};

pub(crate) fn storage_err(e: impl std::fmt::Display) -> DomainError {
    DomainError::storage(e.to_string())
}

/// Stored row envelope: entity payload plus insertion sequence.
#[derive(Serialize, Deserialize)]
pub(crate) struct KvRow<T> {
    pub seq: u64,
    pub entity: T,
}

pub(crate) fn encode<T: Serialize>(row: &KvRow<T>) -> DomainResult<Vec<u8>> {
    bincode::serialize(row).map_err(|e| DomainError::serialization(e.to_string()))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> DomainResult<KvRow<T>> {
    bincode::deserialize(bytes).map_err(|e| DomainError::serialization(e.to_string()))
}

/// Shared handle to the embedded KV database.
#[derive(Clone)]
pub struct KvStore {
    db: Arc<Database>,
}

impl KvStore {
    /// Opens or creates the database file and initialises the schema.
    pub fn open(path: impl AsRef<Path>) -> DomainResult<Self> {
        let db = Database::create(path.as_ref()).map_err(storage_err)?;
        let store = Self { db: Arc::new(db) };
        store.initialize()?;
        debug!(path = %path.as_ref().display(), "kv store opened");
        Ok(store)
    }

    /// Creates all tables and stamps/validates the schema version.
    fn initialize(&self) -> DomainResult<()> {
        let txn = self.db.begin_write().map_err(storage_err)?;
        {
            let mut meta = txn.open_table(META_TABLE).map_err(storage_err)?;
            let existing_version = match meta.get(META_SCHEMA_VERSION).map_err(storage_err)? {
                Some(raw) => {
                    let mut buf = [0u8; 4];
                    let bytes = raw.value();
                    if bytes.len() != 4 {
                        return Err(DomainError::storage("corrupt schema version"));
                    }
                    buf.copy_from_slice(bytes);
                    Some(u32::from_be_bytes(buf))
                }
                None => None,
            };
            match existing_version {
                Some(version) => {
                    if version != SCHEMA_VERSION {
                        return Err(DomainError::invalid_config(format!(
                            "kv schema version mismatch: file has {version}, expected {SCHEMA_VERSION}"
                        )));
                    }
                }
                None => {
                    meta.insert(META_SCHEMA_VERSION, SCHEMA_VERSION.to_be_bytes().as_slice())
                        .map_err(storage_err)?;
                }
            }

            txn.open_table(TENANTS_TABLE).map_err(storage_err)?;
            txn.open_table(USERS_TABLE).map_err(storage_err)?;
            txn.open_table(LOCATIONS_TABLE).map_err(storage_err)?;
            txn.open_table(AREAS_TABLE).map_err(storage_err)?;
            txn.open_table(COMMODITIES_TABLE).map_err(storage_err)?;
            txn.open_table(FILES_TABLE).map_err(storage_err)?;
            txn.open_table(COMMODITY_FILES_TABLE).map_err(storage_err)?;
            txn.open_table(EXPORTS_TABLE).map_err(storage_err)?;
            txn.open_table(RESTORES_TABLE).map_err(storage_err)?;
            txn.open_table(RESTORE_STEPS_TABLE).map_err(storage_err)?;
            txn.open_table(SETTINGS_TABLE).map_err(storage_err)?;
            txn.open_table(THUMBNAILS_TABLE).map_err(storage_err)?;
            txn.open_table(SLOTS_TABLE).map_err(storage_err)?;
            txn.open_table(INDEX_TABLE).map_err(storage_err)?;
            txn.open_multimap_table(CHILDREN_TABLE).map_err(storage_err)?;
        }
        txn.commit().map_err(storage_err)
    }

    /// Runs `f` inside a read transaction.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&ReadTransaction) -> DomainResult<R>) -> DomainResult<R> {
        let txn = self.db.begin_read().map_err(storage_err)?;
        f(&txn)
    }

    /// Runs `f` inside a write transaction; commits on Ok, aborts on Err.
    pub(crate) fn write<R>(&self, f: impl FnOnce(&WriteTransaction) -> DomainResult<R>) -> DomainResult<R> {
        let txn = self.db.begin_write().map_err(storage_err)?;
        match f(&txn) {
            Ok(value) => {
                txn.commit().map_err(storage_err)?;
                Ok(value)
            }
            Err(err) => {
                txn.abort().map_err(storage_err)?;
                Err(err)
            }
        }
    }

    /// Allocates the next insertion sequence number.
    pub(crate) fn next_seq(txn: &WriteTransaction) -> DomainResult<u64> {
        let mut meta = txn.open_table(META_TABLE).map_err(storage_err)?;
        let current = match meta.get(META_NEXT_SEQ).map_err(storage_err)? {
            Some(raw) => {
                let mut buf = [0u8; 8];
                let bytes = raw.value();
                if bytes.len() != 8 {
                    return Err(DomainError::storage("corrupt sequence counter"));
                }
                buf.copy_from_slice(bytes);
                u64::from_be_bytes(buf)
            }
            None => 0,
        };
        meta.insert(META_NEXT_SEQ, (current + 1).to_be_bytes().as_slice())
            .map_err(storage_err)?;
        Ok(current)
    }
}

/// Fetches one row (with its sequence) from a family table.
pub(crate) fn fetch_row<T, Tbl>(table: &Tbl, id: &str) -> DomainResult<Option<KvRow<T>>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(id).map_err(storage_err)? {
        Some(guard) => Ok(Some(decode(guard.value())?)),
        None => Ok(None),
    }
}

/// Loads every row of a family table in insertion order.
pub(crate) fn list_rows<T, Tbl>(table: &Tbl) -> DomainResult<Vec<T>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    let mut rows: Vec<KvRow<T>> = Vec::new();
    for item in table.iter().map_err(storage_err)? {
        let (_, value) = item.map_err(storage_err)?;
        rows.push(decode(value.value())?);
    }
    rows.sort_by_key(|r| r.seq);
    Ok(rows.into_iter().map(|r| r.entity).collect())
}

/// Inserts a fresh row; an existing key is an `AlreadyExists` for `entity`.
pub(crate) fn insert_row<T: Serialize>(
    txn: &WriteTransaction,
    def: TableDefinition<'static, &'static str, &'static [u8]>,
    entity_name: &'static str,
    id: &str,
    seq: u64,
    entity: &T,
) -> DomainResult<()> {
    let mut table = txn.open_table(def).map_err(storage_err)?;
    if table.get(id).map_err(storage_err)?.is_some() {
        return Err(DomainError::already_exists(entity_name, format!("id {id}")));
    }
    let payload = encode(&KvRow { seq, entity })?;
    table.insert(id, payload.as_slice()).map_err(storage_err)?;
    Ok(())
}

/// Overwrites an existing row, preserving its insertion sequence.
pub(crate) fn replace_row<T: Serialize>(
    txn: &WriteTransaction,
    def: TableDefinition<'static, &'static str, &'static [u8]>,
    id: &str,
    seq: u64,
    entity: &T,
) -> DomainResult<()> {
    let mut table = txn.open_table(def).map_err(storage_err)?;
    let payload = encode(&KvRow { seq, entity })?;
    table.insert(id, payload.as_slice()).map_err(storage_err)?;
    Ok(())
}

/// Removes a row; returns whether it existed.
pub(crate) fn remove_row(
    txn: &WriteTransaction,
    def: TableDefinition<'static, &'static str, &'static [u8]>,
    id: &str,
) -> DomainResult<bool> {
    let mut table = txn.open_table(def).map_err(storage_err)?;
    let removed = table.remove(id).map_err(storage_err)?.is_some();
    Ok(removed)
}

/// Claims a unique-index key for `id`; a taken key is `AlreadyExists`.
pub(crate) fn index_claim(
    txn: &WriteTransaction,
    entity_name: &'static str,
    key: &str,
    id: &str,
) -> DomainResult<()> {
    let mut index = txn.open_table(INDEX_TABLE).map_err(storage_err)?;
    if let Some(existing) = index.get(key).map_err(storage_err)? {
        if existing.value() != id {
            return Err(DomainError::already_exists(entity_name, key.to_string()));
        }
    }
    index.insert(key, id).map_err(storage_err)?;
    Ok(())
}

/// Releases a unique-index key.
pub(crate) fn index_release(txn: &WriteTransaction, key: &str) -> DomainResult<()> {
    let mut index = txn.open_table(INDEX_TABLE).map_err(storage_err)?;
    index.remove(key).map_err(storage_err)?;
    Ok(())
}

/// Looks up a unique-index key.
pub(crate) fn index_get<Tbl>(table: &Tbl, key: &str) -> DomainResult<Option<String>>
where
    Tbl: ReadableTable<&'static str, &'static str>,
{
    Ok(table.get(key).map_err(storage_err)?.map(|g| g.value().to_string()))
}

/// Adds a child id to a parent's relation bucket.
pub(crate) fn child_add(txn: &WriteTransaction, bucket: &str, child_id: &str) -> DomainResult<()> {
    let mut children = txn.open_multimap_table(CHILDREN_TABLE).map_err(storage_err)?;
    children.insert(bucket, child_id).map_err(storage_err)?;
    Ok(())
}

/// Removes a child id from a parent's relation bucket.
pub(crate) fn child_remove(txn: &WriteTransaction, bucket: &str, child_id: &str) -> DomainResult<()> {
    let mut children = txn.open_multimap_table(CHILDREN_TABLE).map_err(storage_err)?;
    children.remove(bucket, child_id).map_err(storage_err)?;
    Ok(())
}

/// Lists a parent's relation bucket inside a write transaction.
pub(crate) fn children_of(txn: &WriteTransaction, bucket: &str) -> DomainResult<Vec<String>> {
    let children = txn.open_multimap_table(CHILDREN_TABLE).map_err(storage_err)?;
    let mut ids = Vec::new();
    for item in children.get(bucket).map_err(storage_err)? {
        ids.push(item.map_err(storage_err)?.value().to_string());
    }
    Ok(ids)
}

/// Lists a parent's relation bucket inside a read transaction.
pub(crate) fn children_of_read(txn: &ReadTransaction, bucket: &str) -> DomainResult<Vec<String>> {
    let children = txn.open_multimap_table(CHILDREN_TABLE).map_err(storage_err)?;
    let mut ids = Vec::new();
    for item in children.get(bucket).map_err(storage_err)? {
        ids.push(item.map_err(storage_err)?.value().to_string());
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_domain::entities::Location;
    use stockroom_domain::EntityId;

    #[test]
    fn open_insert_list_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(dir.path().join("data.redb")).unwrap();

        let tenant = EntityId::new();
        let user = EntityId::new();
        let names = ["one", "two", "three"];
        for name in names {
            let location = Location::new(tenant.clone(), user.clone(), name);
            store
                .write(|txn| {
                    let seq = KvStore::next_seq(txn)?;
                    insert_row(txn, LOCATIONS_TABLE, "location", location.id.as_str(), seq, &location)
                })
                .unwrap();
        }

        let listed: Vec<Location> = store
            .read(|txn| {
                let table = txn.open_table(LOCATIONS_TABLE).map_err(storage_err)?;
                list_rows(&table)
            })
            .unwrap();
        let listed_names: Vec<&str> = listed.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(listed_names, names);
    }

    #[test]
    fn reopen_preserves_schema_and_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.redb");

        let location = Location::new(EntityId::new(), EntityId::new(), "kept");
        {
            let store = KvStore::open(&path).unwrap();
            store
                .write(|txn| {
                    let seq = KvStore::next_seq(txn)?;
                    insert_row(txn, LOCATIONS_TABLE, "location", location.id.as_str(), seq, &location)
                })
                .unwrap();
        }

        let store = KvStore::open(&path).unwrap();
        let found: Option<KvRow<Location>> = store
            .read(|txn| {
                let table = txn.open_table(LOCATIONS_TABLE).map_err(storage_err)?;
                fetch_row(&table, location.id.as_str())
            })
            .unwrap();
        assert_eq!(found.unwrap().entity.name, "kept");
    }

    #[test]
    fn failed_write_aborts_whole_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(dir.path().join("data.redb")).unwrap();
        let location = Location::new(EntityId::new(), EntityId::new(), "ghost");

        let result: DomainResult<()> = store.write(|txn| {
            let seq = KvStore::next_seq(txn)?;
            insert_row(txn, LOCATIONS_TABLE, "location", location.id.as_str(), seq, &location)?;
            Err(DomainError::internal("boom"))
        });
        assert!(result.is_err());

        let found: Option<KvRow<Location>> = store
            .read(|txn| {
                let table = txn.open_table(LOCATIONS_TABLE).map_err(storage_err)?;
                fetch_row(&table, location.id.as_str())
            })
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn index_claim_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(dir.path().join("data.redb")).unwrap();

        store
            .write(|txn| index_claim(txn, "location", "location-name/t/u/Garage", "id-1"))
            .unwrap();
        // Same id may re-claim (idempotent on update paths).
        store
            .write(|txn| index_claim(txn, "location", "location-name/t/u/Garage", "id-1"))
            .unwrap();
        let conflict = store.write(|txn| index_claim(txn, "location", "location-name/t/u/Garage", "id-2"));
        assert!(matches!(conflict, Err(DomainError::AlreadyExists { .. })));
    }
}
