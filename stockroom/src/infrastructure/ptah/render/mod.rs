// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # DDL Renderers
//!
//! Per-dialect SQL generation from the logical schema and from a computed
//! diff. Destructive output is limited: removed enum values render as
//! warnings only, and table drops render as a warning comment followed by
//! an `IF EXISTS` drop.

pub mod mysql;
pub mod postgres;

use super::diff::SchemaDiff;
use super::model::{Dialect, Schema};

/// Renders CREATE statements for a whole schema.
pub fn render_create_schema(schema: &Schema, dialect: Dialect) -> Vec<String> {
    match dialect {
        Dialect::Postgres => postgres::render_create_schema(schema),
        Dialect::Mysql | Dialect::Mariadb => mysql::render_create_schema(schema, dialect),
    }
}

/// Renders migration statements for a diff against the logical schema.
pub fn render_diff(diff: &SchemaDiff, logical: &Schema, dialect: Dialect) -> Vec<String> {
    match dialect {
        Dialect::Postgres => postgres::render_diff(diff, logical),
        Dialect::Mysql | Dialect::Mariadb => mysql::render_diff(diff, logical, dialect),
    }
}

/// Quotes a default literal unless it is numeric, boolean, or a function
/// call the dialect evaluates.
pub(crate) fn render_default(value: &str) -> String {
    let bare = value.parse::<f64>().is_ok()
        || value.eq_ignore_ascii_case("true")
        || value.eq_ignore_ascii_case("false")
        || value.eq_ignore_ascii_case("null")
        || value.contains('(');
    if bare {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_quote_only_literals() {
        assert_eq!(render_default("active"), "'active'");
        assert_eq!(render_default("0"), "0");
        assert_eq!(render_default("true"), "true");
        assert_eq!(render_default("now()"), "now()");
        assert_eq!(render_default("o'clock"), "'o''clock'");
    }
}
