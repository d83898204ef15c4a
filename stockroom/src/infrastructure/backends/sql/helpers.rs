// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Shared SQL Helpers
//!
//! Generic CRUD over an [`SqlEntity`]: every family table carries the same
//! standard columns plus declared mirror columns the queries filter on.
//!
//! ```sql
//! CREATE TABLE <family> (
//!     seq        BIGSERIAL,        -- insertion order for listings
//!     id         TEXT PRIMARY KEY,
//!     tenant_id  TEXT NOT NULL,
//!     user_id    TEXT NOT NULL,
//!     <mirror columns TEXT>,       -- FK targets, statuses, names
//!     data       JSONB NOT NULL,   -- canonical serialized entity
//!     created_at TEXT NOT NULL,    -- RFC3339 UTC
//!     updated_at TEXT NOT NULL
//! );
//! ```
//!
//! The canonical entity value lives in `data`; mirror columns exist for
//! constraints (UNIQUE, FK) and for indexed filtering, and are derived from
//! the entity by its [`SqlEntity::field_values`] implementation - a stable,
//! declared column list rather than runtime reflection.
//!
//! Queries interpolate only `SqlEntity` constants (table and column names)
//! and bind every runtime value, so the format!-built SQL stays injection
//! safe.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row, Transaction};

use stockroom_domain::{DomainError, DomainResult};

use super::super::EntityRecord;

/// Entities storable through the shared helpers.
pub trait SqlEntity: EntityRecord + Serialize + DeserializeOwned {
    /// Table name in the service schema.
    const TABLE: &'static str;

    /// Mirror columns beyond the standard set, in declaration order.
    fn field_columns() -> &'static [&'static str] {
        &[]
    }

    /// Values for [`Self::field_columns`], one per column.
    fn field_values(&self) -> Vec<Option<String>> {
        Vec::new()
    }

    fn created_at_rfc3339(&self) -> String;
}

/// Maps an sqlx error onto the domain vocabulary.
pub fn map_sql_err(err: sqlx::Error, entity: &'static str) -> DomainError {
    if let sqlx::Error::Database(db) = &err {
        if let Some(code) = db.code() {
            // 23505 unique_violation, 23503 foreign_key_violation
            if code == "23505" {
                return DomainError::already_exists(entity, db.message().to_string());
            }
            if code == "23503" {
                return DomainError::cannot_delete(entity, "", db.message().to_string());
            }
        }
    }
    DomainError::storage(format!("{entity}: {err}"))
}

fn decode_row<T: SqlEntity>(row: &PgRow) -> DomainResult<T> {
    let data: serde_json::Value = row
        .try_get("data")
        .map_err(|e| DomainError::storage(format!("{}: {e}", T::TABLE)))?;
    serde_json::from_value(data).map_err(|e| DomainError::serialization(e.to_string()))
}

fn standard_columns<T: SqlEntity>() -> String {
    let mut columns = vec!["id", "tenant_id", "user_id"];
    columns.extend_from_slice(T::field_columns());
    columns.extend_from_slice(&["data", "created_at", "updated_at"]);
    columns.join(", ")
}

/// Inserts one entity row.
pub async fn insert_entity<T: SqlEntity>(
    tx: &mut Transaction<'_, Postgres>,
    entity: &T,
) -> DomainResult<()> {
    let columns = standard_columns::<T>();
    let placeholders: Vec<String> = (1..=(6 + T::field_columns().len()))
        .map(|i| format!("${i}"))
        .collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        T::TABLE,
        columns,
        placeholders.join(", ")
    );

    let data = serde_json::to_value(entity).map_err(|e| DomainError::serialization(e.to_string()))?;
    let mut query = sqlx::query(&sql)
        .bind(entity.id().as_str())
        .bind(entity.tenant_id().as_str())
        .bind(entity.user_id().as_str());
    for value in entity.field_values() {
        query = query.bind(value);
    }
    query = query
        .bind(data)
        .bind(entity.created_at_rfc3339())
        .bind(chrono::Utc::now().to_rfc3339());

    query
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sql_err(e, T::ENTITY))?;
    Ok(())
}

/// Fetches at most one entity where `field = value`.
pub async fn scan_entity_by_field<T: SqlEntity>(
    tx: &mut Transaction<'_, Postgres>,
    field: &'static str,
    value: &str,
) -> DomainResult<Option<T>> {
    let sql = format!("SELECT data FROM {} WHERE {} = $1 LIMIT 1", T::TABLE, field);
    let row = sqlx::query(&sql)
        .bind(value)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sql_err(e, T::ENTITY))?;
    row.as_ref().map(decode_row::<T>).transpose()
}

/// Lists every visible entity in insertion order.
pub async fn scan_entities<T: SqlEntity>(
    tx: &mut Transaction<'_, Postgres>,
) -> DomainResult<Vec<T>> {
    let sql = format!("SELECT data FROM {} ORDER BY seq", T::TABLE);
    let rows = sqlx::query(&sql)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sql_err(e, T::ENTITY))?;
    rows.iter().map(decode_row::<T>).collect()
}

/// Lists entities where `field = value`, in insertion order.
pub async fn scan_entities_by_field<T: SqlEntity>(
    tx: &mut Transaction<'_, Postgres>,
    field: &'static str,
    value: &str,
) -> DomainResult<Vec<T>> {
    let sql = format!("SELECT data FROM {} WHERE {} = $1 ORDER BY seq", T::TABLE, field);
    let rows = sqlx::query(&sql)
        .bind(value)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sql_err(e, T::ENTITY))?;
    rows.iter().map(decode_row::<T>).collect()
}

/// Rewrites the row where `field = value` with the entity's current state.
/// Returns the number of rows touched (zero means not found / not visible).
pub async fn update_entity_by_field<T: SqlEntity>(
    tx: &mut Transaction<'_, Postgres>,
    field: &'static str,
    value: &str,
    entity: &T,
) -> DomainResult<u64> {
    let mut sets = vec![
        "tenant_id = $1".to_string(),
        "user_id = $2".to_string(),
        "data = $3".to_string(),
        "updated_at = $4".to_string(),
    ];
    let mut next = 5;
    for column in T::field_columns() {
        sets.push(format!("{column} = ${next}"));
        next += 1;
    }
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ${}",
        T::TABLE,
        sets.join(", "),
        field,
        next
    );

    let data = serde_json::to_value(entity).map_err(|e| DomainError::serialization(e.to_string()))?;
    let mut query = sqlx::query(&sql)
        .bind(entity.tenant_id().as_str())
        .bind(entity.user_id().as_str())
        .bind(data)
        .bind(chrono::Utc::now().to_rfc3339());
    for field_value in entity.field_values() {
        query = query.bind(field_value);
    }
    query = query.bind(value);

    let result = query
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sql_err(e, T::ENTITY))?;
    Ok(result.rows_affected())
}

/// Deletes rows where `field = value`; returns the number removed.
pub async fn delete_entity_by_field<T: SqlEntity>(
    tx: &mut Transaction<'_, Postgres>,
    field: &'static str,
    value: &str,
) -> DomainResult<u64> {
    let sql = format!("DELETE FROM {} WHERE {} = $1", T::TABLE, field);
    let result = sqlx::query(&sql)
        .bind(value)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sql_err(e, T::ENTITY))?;
    Ok(result.rows_affected())
}

/// Counts visible rows of the family.
pub async fn count_entities<T: SqlEntity>(tx: &mut Transaction<'_, Postgres>) -> DomainResult<usize> {
    let sql = format!("SELECT COUNT(*) AS count FROM {}", T::TABLE);
    let row = sqlx::query(&sql)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sql_err(e, T::ENTITY))?;
    let count: i64 = row
        .try_get("count")
        .map_err(|e| DomainError::storage(e.to_string()))?;
    Ok(count as usize)
}

/// Counts rows where `field = value`.
pub async fn count_entities_by_field<T: SqlEntity>(
    tx: &mut Transaction<'_, Postgres>,
    field: &'static str,
    value: &str,
) -> DomainResult<usize> {
    let sql = format!("SELECT COUNT(*) AS count FROM {} WHERE {} = $1", T::TABLE, field);
    let row = sqlx::query(&sql)
        .bind(value)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sql_err(e, T::ENTITY))?;
    let count: i64 = row
        .try_get("count")
        .map_err(|e| DomainError::storage(e.to_string()))?;
    Ok(count as usize)
}
