// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Schema Diff Engine
//!
//! Compares a logical schema (annotation-derived, embedded groups already
//! expanded) with a physical schema (introspected) by name.
//!
//! Rules that must never produce false diffs:
//!
//! - Primary-key columns are always NOT NULL, whatever the declaration says.
//! - Enum-typed columns compare on the enum's `udt_name`, never the raw
//!   data type.
//! - An empty literal default equals a null default.
//! - Enum value lists containing only empty strings are "no enum": the
//!   declared type is compared as-is.
//! - Primary-key indexes are excluded from index diffing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::model::{Field, Schema, Table};

/// Per-column changes: change kind -> `"old -> new"`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnDiff {
    pub column_name: String,
    pub changes: BTreeMap<String, String>,
}

/// Changes within one table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableDiff {
    pub table_name: String,
    pub columns_added: Vec<String>,
    pub columns_removed: Vec<String>,
    pub columns_modified: Vec<ColumnDiff>,
}

/// Changes within one enum type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnumDiff {
    pub enum_name: String,
    pub values_added: Vec<String>,
    pub values_removed: Vec<String>,
}

/// The full structural difference between two schemas.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchemaDiff {
    pub tables_added: Vec<String>,
    pub tables_removed: Vec<String>,
    pub tables_modified: Vec<TableDiff>,
    pub enums_added: Vec<String>,
    pub enums_removed: Vec<String>,
    pub enums_modified: Vec<EnumDiff>,
    pub indexes_added: Vec<String>,
    pub indexes_removed: Vec<String>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.tables_added.is_empty()
            && self.tables_removed.is_empty()
            && self.tables_modified.is_empty()
            && self.enums_added.is_empty()
            && self.enums_removed.is_empty()
            && self.enums_modified.is_empty()
            && self.indexes_added.is_empty()
            && self.indexes_removed.is_empty()
    }
}

fn effective_nullable(field: &Field) -> bool {
    field.nullable && !field.primary
}

fn compare_columns(logical: &Field, physical: &Field) -> Option<ColumnDiff> {
    let mut changes = BTreeMap::new();

    if logical.is_enum() {
        let logical_udt = logical.udt_name.as_deref().unwrap_or_default();
        let physical_udt = physical.udt_name.as_deref().unwrap_or_default();
        if !logical_udt.eq_ignore_ascii_case(physical_udt) {
            changes.insert("type".to_string(), format!("{physical_udt} -> {logical_udt}"));
        }
    } else {
        let logical_type = &logical.field_type;
        let physical_type = &physical.field_type;
        if !logical_type.eq_ignore_ascii_case(physical_type) {
            changes.insert("type".to_string(), format!("{physical_type} -> {logical_type}"));
        }
    }

    let logical_nullable = effective_nullable(logical);
    let physical_nullable = effective_nullable(physical);
    if logical_nullable != physical_nullable {
        changes.insert(
            "nullable".to_string(),
            format!("{physical_nullable} -> {logical_nullable}"),
        );
    }

    let logical_default = logical.normalized_default();
    let physical_default = physical.normalized_default();
    if logical_default != physical_default {
        changes.insert(
            "default".to_string(),
            format!(
                "{} -> {}",
                physical_default.unwrap_or("<null>"),
                logical_default.unwrap_or("<null>")
            ),
        );
    }

    if changes.is_empty() {
        None
    } else {
        Some(ColumnDiff {
            column_name: logical.name.clone(),
            changes,
        })
    }
}

fn compare_tables(logical: &Table, physical: &Table) -> Option<TableDiff> {
    let mut diff = TableDiff {
        table_name: logical.name.clone(),
        ..Default::default()
    };

    for field in &logical.fields {
        match physical.field(&field.name) {
            None => diff.columns_added.push(field.name.clone()),
            Some(existing) => {
                if let Some(column_diff) = compare_columns(field, existing) {
                    diff.columns_modified.push(column_diff);
                }
            }
        }
    }
    for field in &physical.fields {
        if logical.field(&field.name).is_none() {
            diff.columns_removed.push(field.name.clone());
        }
    }

    if diff.columns_added.is_empty() && diff.columns_removed.is_empty() && diff.columns_modified.is_empty()
    {
        None
    } else {
        Some(diff)
    }
}

/// Computes the structural difference `physical -> logical`.
///
/// Both sides must be embedded-expanded; the annotation side should go
/// through [`Schema::expand_embedded`] first.
pub fn compare_schemas(logical: &Schema, physical: &Schema) -> SchemaDiff {
    let mut diff = SchemaDiff::default();

    for table in &logical.tables {
        match physical.table(&table.name) {
            None => diff.tables_added.push(table.name.clone()),
            Some(existing) => {
                if let Some(table_diff) = compare_tables(table, existing) {
                    diff.tables_modified.push(table_diff);
                }
            }
        }
    }
    for table in &physical.tables {
        if logical.table(&table.name).is_none() {
            diff.tables_removed.push(table.name.clone());
        }
    }

    for logical_enum in &logical.enums {
        match physical.enum_def(&logical_enum.name) {
            None => diff.enums_added.push(logical_enum.name.clone()),
            Some(existing) => {
                let values_added: Vec<String> = logical_enum
                    .values
                    .iter()
                    .filter(|v| !existing.values.contains(v))
                    .cloned()
                    .collect();
                let values_removed: Vec<String> = existing
                    .values
                    .iter()
                    .filter(|v| !logical_enum.values.contains(v))
                    .cloned()
                    .collect();
                if !values_added.is_empty() || !values_removed.is_empty() {
                    diff.enums_modified.push(EnumDiff {
                        enum_name: logical_enum.name.clone(),
                        values_added,
                        values_removed,
                    });
                }
            }
        }
    }
    for physical_enum in &physical.enums {
        if logical.enum_def(&physical_enum.name).is_none() {
            diff.enums_removed.push(physical_enum.name.clone());
        }
    }

    let logical_indexes: Vec<_> = logical.indexes.iter().filter(|i| !i.primary).collect();
    let physical_indexes: Vec<_> = physical.indexes.iter().filter(|i| !i.primary).collect();
    for index in &logical_indexes {
        if !physical_indexes.iter().any(|p| p.name == index.name) {
            diff.indexes_added.push(index.name.clone());
        }
    }
    for index in &physical_indexes {
        if !logical_indexes.iter().any(|l| l.name == index.name) {
            diff.indexes_removed.push(index.name.clone());
        }
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ptah::model::{EnumDef, Index};

    fn schema() -> Schema {
        Schema {
            tables: vec![Table {
                name: "users".into(),
                fields: vec![
                    Field {
                        name: "id".into(),
                        field_type: "TEXT".into(),
                        primary: true,
                        ..Default::default()
                    },
                    Field {
                        name: "status".into(),
                        field_type: "TEXT".into(),
                        enum_values: vec!["active".into(), "inactive".into()],
                        udt_name: Some("user_status".into()),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }],
            enums: vec![EnumDef {
                name: "user_status".into(),
                values: vec!["active".into(), "inactive".into()],
            }],
            indexes: vec![Index {
                name: "idx_users_status".into(),
                table: "users".into(),
                columns: vec!["status".into()],
                unique: false,
                primary: false,
            }],
        }
    }

    #[test]
    fn identical_schemas_diff_empty() {
        let s = schema();
        assert!(compare_schemas(&s, &s).is_empty());
    }

    #[test]
    fn primary_key_nullability_never_diffs() {
        let logical = {
            let mut s = schema();
            // Declared nullable, but primary keys are NOT NULL regardless.
            s.tables[0].fields[0].nullable = true;
            s
        };
        let physical = {
            let mut s = schema();
            s.tables[0].fields[0].nullable = false;
            s
        };
        assert!(compare_schemas(&logical, &physical).is_empty());
    }

    #[test]
    fn enum_columns_compare_on_udt_name() {
        let logical = schema();
        let physical = {
            let mut s = schema();
            // Physical data_type for an enum column is the udt, often
            // reported differently; only udt_name may matter.
            s.tables[0].fields[1].field_type = "USER-DEFINED".into();
            s
        };
        assert!(compare_schemas(&logical, &physical).is_empty());

        let renamed = {
            let mut s = physical.clone();
            s.tables[0].fields[1].udt_name = Some("other_enum".into());
            s
        };
        let diff = compare_schemas(&logical, &renamed);
        assert_eq!(diff.tables_modified.len(), 1);
        assert!(diff.tables_modified[0].columns_modified[0]
            .changes
            .contains_key("type"));
    }

    #[test]
    fn empty_default_equals_null_default() {
        let logical = {
            let mut s = schema();
            s.tables[0].fields[1].default_value = Some("''".into());
            s
        };
        let physical = schema();
        assert!(compare_schemas(&logical, &physical).is_empty());
    }

    #[test]
    fn all_empty_enum_values_compare_as_plain_type() {
        let mut logical = schema();
        logical.tables[0].fields[1].enum_values = vec!["".into()];
        logical.tables[0].fields[1].field_type = "BOOLEAN".into();

        let mut physical = schema();
        physical.tables[0].fields[1].enum_values = Vec::new();
        physical.tables[0].fields[1].udt_name = None;
        physical.tables[0].fields[1].field_type = "boolean".into();

        assert!(compare_schemas(&logical, &physical).is_empty());
    }

    #[test]
    fn added_and_removed_parts_reported() {
        let logical = schema();
        let mut physical = schema();
        physical.tables[0].fields.pop(); // status missing physically
        physical.indexes.clear();
        physical.enums.clear();
        physical.tables.push(Table {
            name: "orphans".into(),
            ..Default::default()
        });

        let diff = compare_schemas(&logical, &physical);
        assert_eq!(diff.tables_modified[0].columns_added, vec!["status"]);
        assert_eq!(diff.tables_removed, vec!["orphans"]);
        assert_eq!(diff.enums_added, vec!["user_status"]);
        assert_eq!(diff.indexes_added, vec!["idx_users_status"]);
    }

    #[test]
    fn enum_value_changes_reported() {
        let logical = schema();
        let mut physical = schema();
        physical.enums[0].values = vec!["active".into(), "retired".into()];

        let diff = compare_schemas(&logical, &physical);
        assert_eq!(diff.enums_modified.len(), 1);
        assert_eq!(diff.enums_modified[0].values_added, vec!["inactive"]);
        assert_eq!(diff.enums_modified[0].values_removed, vec!["retired"]);
    }

    #[test]
    fn primary_key_indexes_excluded() {
        let logical = schema();
        let mut physical = schema();
        physical.indexes.push(Index {
            name: "users_pkey".into(),
            table: "users".into(),
            columns: vec!["id".into()],
            unique: true,
            primary: true,
        });
        assert!(compare_schemas(&logical, &physical).is_empty());
    }
}
