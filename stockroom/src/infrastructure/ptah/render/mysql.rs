// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! MySQL / MariaDB DDL renderer.
//!
//! Enums render inline as `ENUM('a', 'b')` column types; there are no named
//! enum types, so enum changes become `ALTER TABLE ... MODIFY` on every
//! column referencing the enum. Engine and comment clauses attach to the
//! table. On MariaDB, JSON columns render as `LONGTEXT` (its JSON alias)
//! unless an explicit override says otherwise.

use super::super::diff::SchemaDiff;
use super::super::model::{Dialect, Field, Schema, Table};
use super::render_default;

fn column_type(field: &Field, dialect: Dialect) -> String {
    let values = field.effective_enum_values();
    if field.udt_name.is_some() && !values.is_empty() {
        let quoted: Vec<String> = values
            .iter()
            .map(|v| format!("'{}'", v.replace('\'', "''")))
            .collect();
        return format!("ENUM({})", quoted.join(", "));
    }
    let declared = field.type_for(dialect);
    if dialect == Dialect::Mariadb
        && !field.overrides.contains_key(&Dialect::Mariadb)
        && (declared.eq_ignore_ascii_case("JSONB") || declared.eq_ignore_ascii_case("JSON"))
    {
        return "LONGTEXT".to_string();
    }
    if dialect == Dialect::Mysql
        && !field.overrides.contains_key(&Dialect::Mysql)
        && declared.eq_ignore_ascii_case("JSONB")
    {
        return "JSON".to_string();
    }
    declared.to_string()
}

fn column_def(field: &Field, dialect: Dialect) -> String {
    let mut def = format!("{} {}", field.name, column_type(field, dialect));
    if field.primary {
        def.push_str(" PRIMARY KEY");
    } else if !field.nullable {
        def.push_str(" NOT NULL");
    }
    if field.unique && !field.primary {
        def.push_str(" UNIQUE");
    }
    if let Some(default) = field.normalized_default() {
        def.push_str(&format!(" DEFAULT {}", render_default(default)));
    }
    if let Some(fk) = &field.foreign {
        def.push_str(&format!(" REFERENCES {}({})", fk.table, fk.column));
        if let Some(on_delete) = &fk.on_delete {
            def.push_str(&format!(" ON DELETE {on_delete}"));
        }
    }
    def
}

fn create_table(table: &Table, dialect: Dialect) -> String {
    let columns: Vec<String> = table
        .fields
        .iter()
        .map(|f| format!("    {}", column_def(f, dialect)))
        .collect();
    let mut tail = String::new();
    if let Some(engine) = &table.engine {
        tail.push_str(&format!(" ENGINE={engine}"));
    }
    if let Some(comment) = &table.comment {
        tail.push_str(&format!(" COMMENT='{}'", comment.replace('\'', "''")));
    }
    format!("CREATE TABLE {} (\n{}\n){};", table.name, columns.join(",\n"), tail)
}

fn create_index(index: &super::super::model::Index) -> String {
    format!(
        "CREATE {}INDEX {} ON {} ({});",
        if index.unique { "UNIQUE " } else { "" },
        index.name,
        index.table,
        index.columns.join(", ")
    )
}

/// Renders CREATE statements for the full schema.
pub fn render_create_schema(schema: &Schema, dialect: Dialect) -> Vec<String> {
    let mut statements = Vec::new();
    for table in schema.tables.iter().filter(|t| !t.embedded_def) {
        statements.push(create_table(table, dialect));
    }
    for index in &schema.indexes {
        statements.push(create_index(index));
    }
    statements
}

/// Renders migration statements for a diff.
pub fn render_diff(diff: &SchemaDiff, logical: &Schema, dialect: Dialect) -> Vec<String> {
    let mut statements = Vec::new();

    for table_name in &diff.tables_added {
        if let Some(table) = logical.table(table_name) {
            statements.push(create_table(table, dialect));
        }
    }
    for table_diff in &diff.tables_modified {
        let Some(table) = logical.table(&table_diff.table_name) else {
            continue;
        };
        for column in &table_diff.columns_added {
            if let Some(field) = table.field(column) {
                statements.push(format!(
                    "ALTER TABLE {} ADD COLUMN {};",
                    table.name,
                    column_def(field, dialect)
                ));
            }
        }
        for column in &table_diff.columns_removed {
            statements.push(format!("ALTER TABLE {} DROP COLUMN {};", table.name, column));
        }
        for column_diff in &table_diff.columns_modified {
            if let Some(field) = table.field(&column_diff.column_name) {
                statements.push(format!(
                    "ALTER TABLE {} MODIFY {};",
                    table.name,
                    column_def(field, dialect)
                ));
            }
        }
    }
    for table_name in &diff.tables_removed {
        statements.push(format!(
            "-- WARNING: table {table_name} exists in the database but not in the declarations"
        ));
        statements.push(format!("DROP TABLE IF EXISTS {table_name};"));
    }

    // Inline enums: a value change rewrites every column referencing the
    // enum; removed values only warn.
    for enum_diff in &diff.enums_modified {
        for table in logical.tables.iter().filter(|t| !t.embedded_def) {
            for field in &table.fields {
                if field.udt_name.as_deref() == Some(enum_diff.enum_name.as_str()) {
                    statements.push(format!(
                        "ALTER TABLE {} MODIFY {};",
                        table.name,
                        column_def(field, dialect)
                    ));
                }
            }
        }
        for value in &enum_diff.values_removed {
            statements.push(format!(
                "-- WARNING: enum {} no longer declares value '{}'; existing rows keep it until rewritten",
                enum_diff.enum_name, value
            ));
        }
    }

    for index_name in &diff.indexes_added {
        if let Some(index) = logical.indexes.iter().find(|i| &i.name == index_name) {
            statements.push(create_index(index));
        }
    }
    for index_name in &diff.indexes_removed {
        if let Some(index) = logical.indexes.iter().find(|i| &i.name == index_name) {
            statements.push(format!("DROP INDEX {} ON {};", index.name, index.table));
        } else {
            statements.push(format!("-- WARNING: index {index_name} has no declared table; drop it manually"));
        }
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ptah::model::Field;

    #[test]
    fn boolean_with_all_empty_enum_renders_boolean() {
        let field = Field {
            name: "flag".into(),
            field_type: "BOOLEAN".into(),
            enum_values: vec!["".into()],
            udt_name: Some("flag_enum".into()),
            nullable: true,
            ..Default::default()
        };
        assert_eq!(column_type(&field, Dialect::Mysql), "BOOLEAN");
    }

    #[test]
    fn sparse_enum_values_render_compacted() {
        let field = Field {
            name: "status".into(),
            field_type: "TEXT".into(),
            enum_values: vec!["".into(), "active".into(), "".into(), "inactive".into(), "".into()],
            udt_name: Some("status_enum".into()),
            nullable: true,
            ..Default::default()
        };
        assert_eq!(column_type(&field, Dialect::Mysql), "ENUM('active', 'inactive')");
    }

    #[test]
    fn engine_and_comment_clauses_attach() {
        let table = Table {
            name: "users".into(),
            engine: Some("InnoDB".into()),
            comment: Some("User accounts".into()),
            fields: vec![Field {
                name: "id".into(),
                field_type: "VARCHAR(36)".into(),
                primary: true,
                ..Default::default()
            }],
            ..Default::default()
        };
        let sql = create_table(&table, Dialect::Mysql);
        assert!(sql.ends_with(") ENGINE=InnoDB COMMENT='User accounts';"));
    }

    #[test]
    fn mariadb_maps_json_to_longtext() {
        let field = Field {
            name: "meta".into(),
            field_type: "JSONB".into(),
            nullable: true,
            ..Default::default()
        };
        assert_eq!(column_type(&field, Dialect::Mysql), "JSON");
        assert_eq!(column_type(&field, Dialect::Mariadb), "LONGTEXT");
    }
}
