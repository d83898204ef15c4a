// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! PostgreSQL introspector.
//!
//! Column types are normalised towards the declared style (`character
//! varying(255)` -> `VARCHAR(255)`) so the diff compares likes with likes;
//! enum columns surface their `udt_name` and values so the diff can apply
//! its udt-based comparison rule.

use std::collections::{BTreeMap, HashSet};

use sqlx::{PgPool, Row};

use stockroom_domain::{DomainError, DomainResult};

use super::super::model::{EnumDef, Field, Index, Schema, Table};

fn err(e: sqlx::Error) -> DomainError {
    DomainError::storage(format!("introspection: {e}"))
}

fn normalize_type(data_type: &str, max_length: Option<i32>) -> String {
    match data_type {
        "character varying" => match max_length {
            Some(n) => format!("VARCHAR({n})"),
            None => "VARCHAR".to_string(),
        },
        "character" => match max_length {
            Some(n) => format!("CHAR({n})"),
            None => "CHAR".to_string(),
        },
        "timestamp with time zone" => "TIMESTAMPTZ".to_string(),
        "timestamp without time zone" => "TIMESTAMP".to_string(),
        other => other.to_uppercase(),
    }
}

/// Reads the `public` schema into the shared model.
pub async fn introspect_postgres(pool: &PgPool) -> DomainResult<Schema> {
    // Enum types first so columns can resolve their values.
    let enum_rows = sqlx::query(
        "SELECT t.typname AS name, e.enumlabel AS value \
         FROM pg_type t JOIN pg_enum e ON t.oid = e.enumtypid \
         ORDER BY t.typname, e.enumsortorder",
    )
    .fetch_all(pool)
    .await
    .map_err(err)?;

    let mut enums: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for row in &enum_rows {
        let name: String = row.try_get("name").map_err(err)?;
        let value: String = row.try_get("value").map_err(err)?;
        enums.entry(name).or_default().push(value);
    }

    // Primary-key membership per (table, column).
    let pk_rows = sqlx::query(
        "SELECT kcu.table_name AS table_name, kcu.column_name AS column_name \
         FROM information_schema.table_constraints tc \
         JOIN information_schema.key_column_usage kcu \
           ON tc.constraint_name = kcu.constraint_name \
          AND tc.table_schema = kcu.table_schema \
         WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = 'public'",
    )
    .fetch_all(pool)
    .await
    .map_err(err)?;
    let mut primary: HashSet<(String, String)> = HashSet::new();
    for row in &pk_rows {
        primary.insert((
            row.try_get("table_name").map_err(err)?,
            row.try_get("column_name").map_err(err)?,
        ));
    }

    let table_rows = sqlx::query(
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
         ORDER BY table_name",
    )
    .fetch_all(pool)
    .await
    .map_err(err)?;

    let mut tables = Vec::new();
    for table_row in &table_rows {
        let table_name: String = table_row.try_get("table_name").map_err(err)?;
        let column_rows = sqlx::query(
            "SELECT column_name, data_type, udt_name, is_nullable, column_default, \
                    character_maximum_length \
             FROM information_schema.columns \
             WHERE table_schema = 'public' AND table_name = $1 \
             ORDER BY ordinal_position",
        )
        .bind(&table_name)
        .fetch_all(pool)
        .await
        .map_err(err)?;

        let mut fields = Vec::new();
        for row in &column_rows {
            let column_name: String = row.try_get("column_name").map_err(err)?;
            let data_type: String = row.try_get("data_type").map_err(err)?;
            let udt_name: String = row.try_get("udt_name").map_err(err)?;
            let is_nullable: String = row.try_get("is_nullable").map_err(err)?;
            let column_default: Option<String> = row.try_get("column_default").map_err(err)?;
            let max_length: Option<i32> = row.try_get("character_maximum_length").map_err(err)?;

            let is_enum_column = data_type == "USER-DEFINED" && enums.contains_key(&udt_name);
            fields.push(Field {
                name: column_name.clone(),
                field_type: normalize_type(&data_type, max_length),
                nullable: is_nullable == "YES",
                primary: primary.contains(&(table_name.clone(), column_name)),
                unique: false,
                default_value: column_default,
                foreign: None,
                enum_values: if is_enum_column {
                    enums.get(&udt_name).cloned().unwrap_or_default()
                } else {
                    Vec::new()
                },
                udt_name: is_enum_column.then_some(udt_name),
                overrides: BTreeMap::new(),
            });
        }
        tables.push(Table {
            name: table_name,
            fields,
            ..Default::default()
        });
    }

    let index_rows = sqlx::query(
        "SELECT c.relname AS index_name, t.relname AS table_name, \
                ix.indisunique AS is_unique, ix.indisprimary AS is_primary \
         FROM pg_class c \
         JOIN pg_index ix ON c.oid = ix.indexrelid \
         JOIN pg_class t ON t.oid = ix.indrelid \
         JOIN pg_namespace n ON n.oid = c.relnamespace \
         WHERE n.nspname = 'public' \
         ORDER BY c.relname",
    )
    .fetch_all(pool)
    .await
    .map_err(err)?;

    let mut indexes = Vec::new();
    for row in &index_rows {
        indexes.push(Index {
            name: row.try_get("index_name").map_err(err)?,
            table: row.try_get("table_name").map_err(err)?,
            columns: Vec::new(),
            unique: row.try_get("is_unique").map_err(err)?,
            primary: row.try_get("is_primary").map_err(err)?,
        });
    }

    Ok(Schema {
        tables,
        enums: enums
            .into_iter()
            .map(|(name, values)| EnumDef { name, values })
            .collect(),
        indexes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_normalisation_matches_declared_style() {
        assert_eq!(normalize_type("character varying", Some(255)), "VARCHAR(255)");
        assert_eq!(normalize_type("text", None), "TEXT");
        assert_eq!(normalize_type("timestamp with time zone", None), "TIMESTAMPTZ");
        assert_eq!(normalize_type("boolean", None), "BOOLEAN");
    }
}
