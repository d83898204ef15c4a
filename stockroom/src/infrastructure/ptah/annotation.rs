// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Annotation Parser
//!
//! Parses comment directives into the logical schema. Directives live in
//! entity source files as ordinary line comments:
//!
//! ```text
//! // ptah:table name=users comment="User accounts"
//! // ptah:field name=id type=TEXT primary
//! // ptah:field name=email type=VARCHAR(255) not_null unique
//! // ptah:field name=status type=TEXT enum=user_status default=active
//! // ptah:field name=tenant_id type=TEXT not_null foreign=tenants.id on_delete=CASCADE
//! // ptah:field name=meta type=JSONB mysql_type=JSON mariadb_type=LONGTEXT
//! // ptah:embedded def=timestamps mode=inline
//! // ptah:index name=idx_users_email table=users columns=tenant_id,email unique
//! // ptah:enum name=user_status values=active,inactive
//! ```
//!
//! `field` and `embedded` directives attach to the most recent `table`;
//! `index` and `enum` are global. A table directive carrying the `embedded`
//! flag declares an embedded group definition rather than a real table.

use std::collections::BTreeMap;

use stockroom_domain::{DomainError, DomainResult};

use super::model::{
    Dialect, EmbedMode, EmbeddedUse, EnumDef, Field, ForeignKey, Index, Schema, Table,
};

const DIRECTIVE_PREFIX: &str = "ptah:";

/// Parsed `key=value` attributes plus bare flags of one directive line.
#[derive(Debug, Default)]
struct Attrs {
    values: BTreeMap<String, String>,
    flags: Vec<String>,
}

impl Attrs {
    fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn require(&self, key: &str, directive: &str, line_no: usize) -> DomainResult<String> {
        self.get(key).map(str::to_owned).ok_or_else(|| {
            DomainError::bad_data(format!("line {line_no}: {directive} directive needs {key}="))
        })
    }

    fn flag(&self, name: &str) -> bool {
        self.flags.iter().any(|f| f == name)
    }

    fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| v.split(',').map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// Tokenizes one directive body into attributes and flags.
///
/// Values may be double-quoted to carry spaces; quoting is required for
/// values containing whitespace and optional otherwise.
fn parse_attrs(body: &str, line_no: usize) -> DomainResult<Attrs> {
    let mut attrs = Attrs::default();
    let mut rest = body.trim();
    while !rest.is_empty() {
        let token_end = match rest.find(|c: char| c == '=' || c.is_whitespace()) {
            Some(i) => i,
            None => {
                attrs.flags.push(rest.to_string());
                break;
            }
        };
        let key = &rest[..token_end];
        if rest.as_bytes()[token_end] != b'=' {
            attrs.flags.push(key.to_string());
            rest = rest[token_end..].trim_start();
            continue;
        }
        let after = &rest[token_end + 1..];
        let (value, remainder) = if let Some(quoted) = after.strip_prefix('"') {
            let close = quoted
                .find('"')
                .ok_or_else(|| DomainError::bad_data(format!("line {line_no}: unterminated quote")))?;
            (&quoted[..close], &quoted[close + 1..])
        } else {
            let end = after.find(char::is_whitespace).unwrap_or(after.len());
            (&after[..end], &after[end..])
        };
        attrs.values.insert(key.to_string(), value.to_string());
        rest = remainder.trim_start();
    }
    Ok(attrs)
}

fn parse_embed_mode(value: &str, line_no: usize) -> DomainResult<EmbedMode> {
    match value {
        "inline" => Ok(EmbedMode::Inline),
        "inline_prefix" | "prefix" => Ok(EmbedMode::InlinePrefix),
        "json" => Ok(EmbedMode::Json),
        "relation" => Ok(EmbedMode::Relation),
        "skip" => Ok(EmbedMode::Skip),
        other => Err(DomainError::bad_data(format!(
            "line {line_no}: unknown embedded mode {other}"
        ))),
    }
}

/// Parses one annotated source text into a logical schema fragment.
pub fn parse_annotations(source: &str) -> DomainResult<Schema> {
    let mut schema = Schema::default();
    let mut current_table: Option<Table> = None;

    for (idx, raw_line) in source.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim_start();
        let Some(comment) = line.strip_prefix("//") else {
            continue;
        };
        let Some(body) = comment.trim_start().strip_prefix(DIRECTIVE_PREFIX) else {
            continue;
        };
        let (directive, args) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
        let attrs = parse_attrs(args, line_no)?;

        match directive {
            "table" => {
                if let Some(table) = current_table.take() {
                    schema.tables.push(table);
                }
                current_table = Some(Table {
                    name: attrs.require("name", "table", line_no)?,
                    comment: attrs.get("comment").map(str::to_owned),
                    engine: attrs.get("engine").map(str::to_owned),
                    embedded_def: attrs.flag("embedded"),
                    fields: Vec::new(),
                    embeds: Vec::new(),
                });
            }
            "field" => {
                let table = current_table
                    .as_mut()
                    .ok_or_else(|| DomainError::bad_data(format!("line {line_no}: field outside table")))?;
                let enum_name = attrs.get("enum").map(str::to_owned);
                let mut overrides = BTreeMap::new();
                if let Some(t) = attrs.get("postgres_type") {
                    overrides.insert(Dialect::Postgres, t.to_string());
                }
                if let Some(t) = attrs.get("mysql_type") {
                    overrides.insert(Dialect::Mysql, t.to_string());
                }
                if let Some(t) = attrs.get("mariadb_type") {
                    overrides.insert(Dialect::Mariadb, t.to_string());
                }
                let foreign = match attrs.get("foreign") {
                    Some(target) => {
                        let (f_table, f_column) = target.split_once('.').ok_or_else(|| {
                            DomainError::bad_data(format!(
                                "line {line_no}: foreign= must be table.column"
                            ))
                        })?;
                        Some(ForeignKey {
                            table: f_table.to_string(),
                            column: f_column.to_string(),
                            on_delete: attrs.get("on_delete").map(str::to_owned),
                        })
                    }
                    None => None,
                };
                let primary = attrs.flag("primary");
                table.fields.push(Field {
                    name: attrs.require("name", "field", line_no)?,
                    field_type: attrs.require("type", "field", line_no)?,
                    nullable: !attrs.flag("not_null") && !primary,
                    primary,
                    unique: attrs.flag("unique"),
                    default_value: attrs.get("default").map(str::to_owned),
                    foreign,
                    enum_values: Vec::new(),
                    udt_name: enum_name,
                    overrides,
                });
            }
            "embedded" => {
                let table = current_table.as_mut().ok_or_else(|| {
                    DomainError::bad_data(format!("line {line_no}: embedded outside table"))
                })?;
                table.embeds.push(EmbeddedUse {
                    def: attrs.require("def", "embedded", line_no)?,
                    mode: parse_embed_mode(
                        attrs.get("mode").unwrap_or("inline"),
                        line_no,
                    )?,
                    prefix: attrs.get("prefix").map(str::to_owned),
                });
            }
            "index" => {
                schema.indexes.push(Index {
                    name: attrs.require("name", "index", line_no)?,
                    table: attrs.require("table", "index", line_no)?,
                    columns: attrs.list("columns"),
                    unique: attrs.flag("unique"),
                    primary: false,
                });
            }
            "enum" => {
                schema.enums.push(EnumDef {
                    name: attrs.require("name", "enum", line_no)?,
                    values: attrs.list("values"),
                });
            }
            other => {
                return Err(DomainError::bad_data(format!(
                    "line {line_no}: unknown directive ptah:{other}"
                )))
            }
        }
    }
    if let Some(table) = current_table.take() {
        schema.tables.push(table);
    }

    // Resolve declared enum values onto the fields that reference them.
    for table in &mut schema.tables {
        for field in &mut table.fields {
            if let Some(enum_name) = field.udt_name.clone() {
                if let Some(def) = schema.enums.iter().find(|e| e.name == enum_name) {
                    field.enum_values = def.values.clone();
                }
            }
        }
    }
    Ok(schema)
}

/// Parses and merges several annotated sources.
pub fn parse_sources<'a>(sources: impl IntoIterator<Item = &'a str>) -> DomainResult<Schema> {
    let mut merged = Schema::default();
    for source in sources {
        let fragment = parse_annotations(source)?;
        merged.tables.extend(fragment.tables);
        merged.enums.extend(fragment.enums);
        merged.indexes.extend(fragment.indexes);
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
// ptah:enum name=user_status values=active,inactive
// ptah:table name=timestamps embedded
// ptah:field name=created_at type=TEXT not_null
// ptah:field name=updated_at type=TEXT not_null
// ptah:table name=users comment="User accounts"
// ptah:field name=id type=TEXT primary
// ptah:field name=email type=VARCHAR(255) not_null unique
// ptah:field name=status type=TEXT enum=user_status default=active
// ptah:field name=tenant_id type=TEXT not_null foreign=tenants.id on_delete=CASCADE
// ptah:embedded def=timestamps mode=inline
// ptah:index name=idx_users_email table=users columns=tenant_id,email unique
"#;

    #[test]
    fn parses_tables_fields_and_globals() {
        let schema = parse_annotations(SAMPLE).unwrap();
        assert_eq!(schema.tables.len(), 2);
        assert_eq!(schema.enums.len(), 1);
        assert_eq!(schema.indexes.len(), 1);

        let users = schema.table("users").unwrap();
        assert_eq!(users.comment.as_deref(), Some("User accounts"));
        assert_eq!(users.fields.len(), 4);

        let id = users.field("id").unwrap();
        assert!(id.primary);
        assert!(!id.nullable);

        let email = users.field("email").unwrap();
        assert!(email.unique);
        assert!(!email.nullable);
        assert_eq!(email.field_type, "VARCHAR(255)");

        let status = users.field("status").unwrap();
        assert_eq!(status.udt_name.as_deref(), Some("user_status"));
        assert_eq!(status.enum_values, vec!["active", "inactive"]);
        assert_eq!(status.default_value.as_deref(), Some("active"));

        let tenant = users.field("tenant_id").unwrap();
        let fk = tenant.foreign.as_ref().unwrap();
        assert_eq!(fk.table, "tenants");
        assert_eq!(fk.column, "id");
        assert_eq!(fk.on_delete.as_deref(), Some("CASCADE"));
    }

    #[test]
    fn embedded_definition_expands() {
        let schema = parse_annotations(SAMPLE).unwrap().expand_embedded();
        assert_eq!(schema.tables.len(), 1);
        let users = schema.table("users").unwrap();
        assert!(users.field("created_at").is_some());
        assert!(users.field("updated_at").is_some());
    }

    #[test]
    fn field_outside_table_rejected() {
        let err = parse_annotations("// ptah:field name=x type=TEXT").unwrap_err();
        assert!(matches!(err, DomainError::BadDataStructure(_)));
    }

    #[test]
    fn unknown_directive_rejected() {
        assert!(parse_annotations("// ptah:view name=x").is_err());
    }

    #[test]
    fn quoted_values_carry_spaces() {
        let schema = parse_annotations(
            "// ptah:table name=t comment=\"multi word comment\"\n// ptah:field name=id type=TEXT primary",
        )
        .unwrap();
        assert_eq!(schema.tables[0].comment.as_deref(), Some("multi word comment"));
    }

    #[test]
    fn dialect_overrides_parsed() {
        let schema = parse_annotations(
            "// ptah:table name=t\n// ptah:field name=meta type=JSONB mysql_type=JSON mariadb_type=LONGTEXT",
        )
        .unwrap();
        let field = schema.tables[0].field("meta").unwrap();
        assert_eq!(field.type_for(Dialect::Postgres), "JSONB");
        assert_eq!(field.type_for(Dialect::Mysql), "JSON");
        assert_eq!(field.type_for(Dialect::Mariadb), "LONGTEXT");
    }
}
