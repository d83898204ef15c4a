// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! MySQL / MariaDB introspector (both speak the MySQL wire protocol).
//!
//! MySQL has no named enum types: `ENUM(...)` columns are decomposed into
//! per-column pseudo-enums named `<table>_<column>` so the diff's udt-based
//! comparison applies uniformly across dialects.

use std::collections::BTreeMap;

use sqlx::{MySqlPool, Row};

use stockroom_domain::{DomainError, DomainResult};

use super::super::model::{EnumDef, Field, Index, Schema, Table};

fn err(e: sqlx::Error) -> DomainError {
    DomainError::storage(format!("introspection: {e}"))
}

/// Parses `enum('a','b')` column types into their values.
fn parse_enum_values(column_type: &str) -> Option<Vec<String>> {
    let body = column_type
        .strip_prefix("enum(")
        .or_else(|| column_type.strip_prefix("ENUM("))?
        .strip_suffix(')')?;
    let mut values = Vec::new();
    for part in body.split(',') {
        let trimmed = part.trim();
        let unquoted = trimmed.strip_prefix('\'')?.strip_suffix('\'')?;
        values.push(unquoted.replace("''", "'"));
    }
    Some(values)
}

/// Reads the connected database into the shared model.
pub async fn introspect_mysql(pool: &MySqlPool) -> DomainResult<Schema> {
    let table_rows = sqlx::query(
        "SELECT table_name AS table_name, engine AS engine, table_comment AS table_comment \
         FROM information_schema.tables \
         WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' \
         ORDER BY table_name",
    )
    .fetch_all(pool)
    .await
    .map_err(err)?;

    let mut tables = Vec::new();
    let mut enums = Vec::new();
    for table_row in &table_rows {
        let table_name: String = table_row.try_get("table_name").map_err(err)?;
        let engine: Option<String> = table_row.try_get("engine").map_err(err)?;
        let comment: Option<String> = table_row.try_get("table_comment").map_err(err)?;

        let column_rows = sqlx::query(
            "SELECT column_name AS column_name, data_type AS data_type, \
                    column_type AS column_type, is_nullable AS is_nullable, \
                    column_default AS column_default, column_key AS column_key \
             FROM information_schema.columns \
             WHERE table_schema = DATABASE() AND table_name = ? \
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
            let column_type: String = row.try_get("column_type").map_err(err)?;
            let is_nullable: String = row.try_get("is_nullable").map_err(err)?;
            let column_default: Option<String> = row.try_get("column_default").map_err(err)?;
            let column_key: String = row.try_get("column_key").map_err(err)?;

            let enum_values = parse_enum_values(&column_type);
            let udt_name = enum_values
                .as_ref()
                .map(|_| format!("{table_name}_{column_name}"));
            if let (Some(values), Some(name)) = (&enum_values, &udt_name) {
                enums.push(EnumDef {
                    name: name.clone(),
                    values: values.clone(),
                });
            }

            fields.push(Field {
                name: column_name,
                field_type: if enum_values.is_some() {
                    column_type.clone()
                } else {
                    data_type.to_uppercase()
                },
                nullable: is_nullable == "YES",
                primary: column_key == "PRI",
                unique: column_key == "UNI",
                default_value: column_default,
                foreign: None,
                enum_values: enum_values.unwrap_or_default(),
                udt_name,
                overrides: BTreeMap::new(),
            });
        }

        tables.push(Table {
            name: table_name,
            comment: comment.filter(|c| !c.is_empty()),
            engine,
            embedded_def: false,
            fields,
            embeds: Vec::new(),
        });
    }

    let index_rows = sqlx::query(
        "SELECT DISTINCT index_name AS index_name, table_name AS table_name, \
                non_unique AS non_unique \
         FROM information_schema.statistics \
         WHERE table_schema = DATABASE() \
         ORDER BY index_name",
    )
    .fetch_all(pool)
    .await
    .map_err(err)?;

    let mut indexes = Vec::new();
    for row in &index_rows {
        let name: String = row.try_get("index_name").map_err(err)?;
        let non_unique: i64 = row.try_get("non_unique").map_err(err)?;
        indexes.push(Index {
            primary: name == "PRIMARY",
            unique: non_unique == 0,
            name,
            table: row.try_get("table_name").map_err(err)?,
            columns: Vec::new(),
        });
    }

    Ok(Schema {
        tables,
        enums,
        indexes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_column_types_parse() {
        assert_eq!(
            parse_enum_values("enum('active','inactive')"),
            Some(vec!["active".to_string(), "inactive".to_string()])
        );
        assert_eq!(parse_enum_values("varchar(255)"), None);
        assert_eq!(
            parse_enum_values("enum('it''s')"),
            Some(vec!["it's".to_string()])
        );
    }
}
