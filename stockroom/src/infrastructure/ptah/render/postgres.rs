// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! PostgreSQL DDL renderer: named enum types (`CREATE TYPE ... AS ENUM`,
//! `ALTER TYPE ... ADD VALUE`), table comments via `COMMENT ON`.

use super::super::diff::SchemaDiff;
use super::super::model::{Dialect, Field, Schema, Table};
use super::render_default;

fn column_type(field: &Field) -> String {
    match &field.udt_name {
        Some(udt) if field.is_enum() => udt.clone(),
        _ => field.type_for(Dialect::Postgres).to_string(),
    }
}

fn column_def(field: &Field) -> String {
    let mut def = format!("{} {}", field.name, column_type(field));
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

fn create_table(table: &Table) -> Vec<String> {
    let columns: Vec<String> = table.fields.iter().map(|f| format!("    {}", column_def(f))).collect();
    let mut statements = vec![format!("CREATE TABLE {} (\n{}\n);", table.name, columns.join(",\n"))];
    if let Some(comment) = &table.comment {
        statements.push(format!(
            "COMMENT ON TABLE {} IS '{}';",
            table.name,
            comment.replace('\'', "''")
        ));
    }
    statements
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

/// Renders CREATE statements for the full schema: enums first, then tables,
/// then indexes.
pub fn render_create_schema(schema: &Schema) -> Vec<String> {
    let mut statements = Vec::new();
    for enum_def in &schema.enums {
        let values: Vec<String> = enum_def
            .values
            .iter()
            .filter(|v| !v.is_empty())
            .map(|v| format!("'{}'", v.replace('\'', "''")))
            .collect();
        statements.push(format!(
            "CREATE TYPE {} AS ENUM ({});",
            enum_def.name,
            values.join(", ")
        ));
    }
    for table in schema.tables.iter().filter(|t| !t.embedded_def) {
        statements.extend(create_table(table));
    }
    for index in &schema.indexes {
        statements.push(create_index(index));
    }
    statements
}

/// Renders migration statements for a diff.
pub fn render_diff(diff: &SchemaDiff, logical: &Schema) -> Vec<String> {
    let mut statements = Vec::new();

    for enum_name in &diff.enums_added {
        if let Some(enum_def) = logical.enum_def(enum_name) {
            let values: Vec<String> = enum_def
                .values
                .iter()
                .filter(|v| !v.is_empty())
                .map(|v| format!("'{}'", v.replace('\'', "''")))
                .collect();
            statements.push(format!("CREATE TYPE {enum_name} AS ENUM ({});", values.join(", ")));
        }
    }
    for enum_diff in &diff.enums_modified {
        for value in &enum_diff.values_added {
            statements.push(format!(
                "ALTER TYPE {} ADD VALUE '{}';",
                enum_diff.enum_name,
                value.replace('\'', "''")
            ));
        }
        for value in &enum_diff.values_removed {
            statements.push(format!(
                "-- WARNING: enum {} no longer declares value '{}'; PostgreSQL cannot drop enum values in place",
                enum_diff.enum_name, value
            ));
        }
    }
    for enum_name in &diff.enums_removed {
        statements.push(format!(
            "-- WARNING: enum {enum_name} exists in the database but not in the declarations"
        ));
    }

    for table_name in &diff.tables_added {
        if let Some(table) = logical.table(table_name) {
            statements.extend(create_table(table));
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
                    column_def(field)
                ));
            }
        }
        for column in &table_diff.columns_removed {
            statements.push(format!(
                "ALTER TABLE {} DROP COLUMN IF EXISTS {};",
                table.name, column
            ));
        }
        for column_diff in &table_diff.columns_modified {
            let Some(field) = table.field(&column_diff.column_name) else {
                continue;
            };
            for kind in column_diff.changes.keys() {
                match kind.as_str() {
                    "type" => statements.push(format!(
                        "ALTER TABLE {} ALTER COLUMN {} TYPE {};",
                        table.name,
                        field.name,
                        column_type(field)
                    )),
                    "nullable" => {
                        let clause = if field.nullable && !field.primary {
                            "DROP NOT NULL"
                        } else {
                            "SET NOT NULL"
                        };
                        statements.push(format!(
                            "ALTER TABLE {} ALTER COLUMN {} {clause};",
                            table.name, field.name
                        ));
                    }
                    "default" => match field.normalized_default() {
                        Some(default) => statements.push(format!(
                            "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {};",
                            table.name,
                            field.name,
                            render_default(default)
                        )),
                        None => statements.push(format!(
                            "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT;",
                            table.name, field.name
                        )),
                    },
                    _ => {}
                }
            }
        }
    }
    for table_name in &diff.tables_removed {
        statements.push(format!(
            "-- WARNING: table {table_name} exists in the database but not in the declarations"
        ));
        statements.push(format!("DROP TABLE IF EXISTS {table_name};"));
    }

    for index_name in &diff.indexes_added {
        if let Some(index) = logical.indexes.iter().find(|i| &i.name == index_name) {
            statements.push(create_index(index));
        }
    }
    for index_name in &diff.indexes_removed {
        statements.push(format!("DROP INDEX IF EXISTS {index_name};"));
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ptah::annotation::parse_annotations;
    use crate::infrastructure::ptah::diff::compare_schemas;

    const SOURCE: &str = r#"
// ptah:enum name=user_status values=active,inactive
// ptah:table name=users comment="User accounts"
// ptah:field name=id type=TEXT primary
// ptah:field name=status type=TEXT enum=user_status default=active
// ptah:field name=tenant_id type=TEXT not_null foreign=tenants.id on_delete=CASCADE
// ptah:index name=idx_users_status table=users columns=status
"#;

    #[test]
    fn create_schema_emits_enum_table_index() {
        let schema = parse_annotations(SOURCE).unwrap().expand_embedded();
        let statements = render_create_schema(&schema);

        assert_eq!(
            statements[0],
            "CREATE TYPE user_status AS ENUM ('active', 'inactive');"
        );
        let table = &statements[1];
        assert!(table.starts_with("CREATE TABLE users ("));
        assert!(table.contains("id TEXT PRIMARY KEY"));
        assert!(table.contains("status user_status DEFAULT 'active'"));
        assert!(table.contains("tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE"));
        assert!(statements.iter().any(|s| s == "CREATE INDEX idx_users_status ON users (status);"));
    }

    #[test]
    fn diff_renders_add_value_and_warnings() {
        let logical = parse_annotations(SOURCE).unwrap().expand_embedded();
        let mut physical = logical.clone();
        physical.enums[0].values = vec!["active".into(), "retired".into()];
        physical.tables.push(crate::infrastructure::ptah::model::Table {
            name: "leftovers".into(),
            ..Default::default()
        });

        let diff = compare_schemas(&logical, &physical);
        let statements = render_diff(&diff, &logical);

        assert!(statements.contains(&"ALTER TYPE user_status ADD VALUE 'inactive';".to_string()));
        assert!(statements
            .iter()
            .any(|s| s.starts_with("-- WARNING: enum user_status no longer declares value 'retired'")));
        assert!(statements
            .iter()
            .any(|s| s.starts_with("-- WARNING: table leftovers")));
        assert!(statements.contains(&"DROP TABLE IF EXISTS leftovers;".to_string()));
    }
}
