// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Logical Schema Model
//!
//! The shape shared by the annotation parser (logical side) and the
//! database introspectors (physical side). The diff engine compares two
//! values of [`Schema`] by name, so both sides normalise into this one
//! model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// SQL dialect a renderer or introspector targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    Postgres,
    Mysql,
    Mariadb,
}

impl Dialect {
    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Mysql => "mysql",
            Dialect::Mariadb => "mariadb",
        }
    }
}

/// How an embedded field group lands in its owning table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedMode {
    /// Fields copied into the table as-is.
    Inline,
    /// Fields copied with a column-name prefix.
    InlinePrefix,
    /// The whole group becomes one JSON column.
    Json,
    /// The group lives in its own related table; nothing is added here.
    Relation,
    /// The group is ignored entirely.
    Skip,
}

/// A foreign-key declaration on a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    pub on_delete: Option<String>,
}

/// An embedded-group use site inside a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedUse {
    /// Name of the embedded definition (a table marked `embedded`).
    pub def: String,
    pub mode: EmbedMode,
    /// Column-name prefix for `InlinePrefix`; JSON column name for `Json`.
    pub prefix: Option<String>,
}

/// One column of a table (logical or physical).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    /// Declared base type, e.g. `TEXT`, `VARCHAR(255)`, `BOOLEAN`.
    pub field_type: String,
    pub nullable: bool,
    pub primary: bool,
    pub unique: bool,
    pub default_value: Option<String>,
    pub foreign: Option<ForeignKey>,
    /// Declared enum values. Values that are all empty strings mean "no
    /// enum": the declared type is used as-is.
    pub enum_values: Vec<String>,
    /// Name of the enum type (logical: the `enum=` reference; physical: the
    /// column's `udt_name`). Enum-typed columns compare on this, never on
    /// the raw data type.
    pub udt_name: Option<String>,
    /// Per-dialect type overrides, e.g. `mysql -> JSON`.
    pub overrides: BTreeMap<Dialect, String>,
}

impl Field {
    /// Declared enum values with empty entries dropped; an all-empty list
    /// collapses to "no enum".
    pub fn effective_enum_values(&self) -> Vec<&str> {
        self.enum_values
            .iter()
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .collect()
    }

    /// True when the field is genuinely enum-typed.
    pub fn is_enum(&self) -> bool {
        self.udt_name.is_some() && !self.effective_enum_values().is_empty()
    }

    /// The type to render for a dialect, honouring overrides.
    pub fn type_for(&self, dialect: Dialect) -> &str {
        self.overrides
            .get(&dialect)
            .map(String::as_str)
            .unwrap_or(self.field_type.as_str())
    }

    /// Default value normalised for comparison: an empty literal equals a
    /// null default.
    pub fn normalized_default(&self) -> Option<&str> {
        self.default_value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty() && *v != "''" && *v != "\"\"")
    }
}

/// One table (logical or physical).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub comment: Option<String>,
    /// Storage engine clause (MySQL/MariaDB only).
    pub engine: Option<String>,
    /// True for embedded-group definitions; dropped during expansion.
    pub embedded_def: bool,
    pub fields: Vec<Field>,
    pub embeds: Vec<EmbeddedUse>,
}

impl Table {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A named enum type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDef {
    pub name: String,
    pub values: Vec<String>,
}

/// A secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
    /// Primary-key indexes are excluded from diffing.
    pub primary: bool,
}

/// A full schema: tables, global enums, secondary indexes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    pub tables: Vec<Table>,
    pub enums: Vec<EnumDef>,
    pub indexes: Vec<Index>,
}

impl Schema {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn enum_def(&self, name: &str) -> Option<&EnumDef> {
        self.enums.iter().find(|e| e.name == name)
    }

    /// Expands embedded groups into their owning tables and drops the
    /// definitions. Must run before diffing: the physical side never has
    /// embedded groups.
    pub fn expand_embedded(&self) -> Schema {
        let defs: BTreeMap<&str, &Table> = self
            .tables
            .iter()
            .filter(|t| t.embedded_def)
            .map(|t| (t.name.as_str(), t))
            .collect();

        let mut expanded = Schema {
            tables: Vec::new(),
            enums: self.enums.clone(),
            indexes: self.indexes.clone(),
        };

        for table in self.tables.iter().filter(|t| !t.embedded_def) {
            let mut out = table.clone();
            out.embeds.clear();
            for embed in &table.embeds {
                let Some(def) = defs.get(embed.def.as_str()) else {
                    continue;
                };
                match embed.mode {
                    EmbedMode::Inline => out.fields.extend(def.fields.iter().cloned()),
                    EmbedMode::InlinePrefix => {
                        let prefix = embed.prefix.as_deref().unwrap_or(&embed.def);
                        for field in &def.fields {
                            let mut field = field.clone();
                            field.name = format!("{prefix}{}", field.name);
                            out.fields.push(field);
                        }
                    }
                    EmbedMode::Json => {
                        let name = embed.prefix.clone().unwrap_or_else(|| embed.def.clone());
                        out.fields.push(Field {
                            name,
                            field_type: "JSONB".to_string(),
                            nullable: true,
                            ..Default::default()
                        });
                    }
                    EmbedMode::Relation | EmbedMode::Skip => {}
                }
            }
            expanded.tables.push(out);
        }
        expanded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedded_schema() -> Schema {
        Schema {
            tables: vec![
                Table {
                    name: "timestamps".into(),
                    embedded_def: true,
                    fields: vec![
                        Field {
                            name: "created_at".into(),
                            field_type: "TEXT".into(),
                            ..Default::default()
                        },
                        Field {
                            name: "updated_at".into(),
                            field_type: "TEXT".into(),
                            ..Default::default()
                        },
                    ],
                    ..Default::default()
                },
                Table {
                    name: "users".into(),
                    fields: vec![Field {
                        name: "id".into(),
                        field_type: "TEXT".into(),
                        primary: true,
                        ..Default::default()
                    }],
                    embeds: vec![EmbeddedUse {
                        def: "timestamps".into(),
                        mode: EmbedMode::Inline,
                        prefix: None,
                    }],
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn inline_embedding_copies_fields() {
        let expanded = embedded_schema().expand_embedded();
        assert_eq!(expanded.tables.len(), 1);
        let users = expanded.table("users").unwrap();
        assert!(users.field("created_at").is_some());
        assert!(users.field("updated_at").is_some());
    }

    #[test]
    fn prefix_embedding_renames_fields() {
        let mut schema = embedded_schema();
        schema.tables[1].embeds[0] = EmbeddedUse {
            def: "timestamps".into(),
            mode: EmbedMode::InlinePrefix,
            prefix: Some("audit_".into()),
        };
        let expanded = schema.expand_embedded();
        let users = expanded.table("users").unwrap();
        assert!(users.field("audit_created_at").is_some());
        assert!(users.field("created_at").is_none());
    }

    #[test]
    fn json_embedding_collapses_to_one_column() {
        let mut schema = embedded_schema();
        schema.tables[1].embeds[0] = EmbeddedUse {
            def: "timestamps".into(),
            mode: EmbedMode::Json,
            prefix: Some("audit".into()),
        };
        let expanded = schema.expand_embedded();
        let users = expanded.table("users").unwrap();
        let audit = users.field("audit").unwrap();
        assert_eq!(audit.field_type, "JSONB");
    }

    #[test]
    fn all_empty_enum_values_mean_no_enum() {
        let field = Field {
            name: "flag".into(),
            field_type: "BOOLEAN".into(),
            enum_values: vec!["".into()],
            udt_name: Some("flag_enum".into()),
            ..Default::default()
        };
        assert!(field.effective_enum_values().is_empty());
        assert!(!field.is_enum());
    }

    #[test]
    fn empty_literal_default_equals_null() {
        let field = Field {
            name: "note".into(),
            field_type: "TEXT".into(),
            default_value: Some("''".into()),
            ..Default::default()
        };
        assert_eq!(field.normalized_default(), None);
    }
}
