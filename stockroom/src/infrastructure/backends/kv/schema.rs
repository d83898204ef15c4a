// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # KV Schema Definitions
//!
//! Table layout for the redb storage engine. All table definitions are
//! compile-time constants so every transaction sees the same schema.
//!
//! # Table Layout
//!
//! ```text
//! <family> tables (tenants, users, ...):
//!   Key:   &str   - entity id
//!   Value: &[u8]  - bincode KvRow { seq, entity }
//!
//! META_TABLE:
//!   "schema_version" -> version bytes
//!   "next_seq"       -> u64 big-endian insertion counter
//!
//! INDEX_TABLE (named unique indexes):
//!   Key:   &str  - "<index-name>/<index-key>"
//!   Value: &str  - entity id
//!
//! CHILDREN_TABLE (parent-child relation buckets, multimap):
//!   Key:   &str  - "<parent-family>/<parent-id>/<child-bucket>"
//!   Value: &str  - child entity id
//! ```
//!
//! Insertion order is preserved by the `seq` stamped into every row; id keys
//! themselves are random and carry no order.

use redb::{MultimapTableDefinition, TableDefinition};

/// Current schema version; the store refuses to open a mismatched file.
pub const SCHEMA_VERSION: u32 = 1;

/// Store-level metadata (schema version, insertion counter).
pub const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

pub const TENANTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tenants");
pub const USERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
pub const LOCATIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("locations");
pub const AREAS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("areas");
pub const COMMODITIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("commodities");
pub const FILES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("files");
pub const COMMODITY_FILES_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("commodity_files");
pub const EXPORTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("exports");
pub const RESTORES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("restore_operations");
pub const RESTORE_STEPS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("restore_steps");
pub const SETTINGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("settings");
pub const THUMBNAILS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("thumbnail_jobs");
pub const SLOTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("operation_slots");

/// Named unique indexes: `<index-name>/<key>` -> id.
pub const INDEX_TABLE: TableDefinition<&str, &str> = TableDefinition::new("unique_index");

/// Parent-child relation buckets: `<family>/<parent-id>/<bucket>` -> child id.
pub const CHILDREN_TABLE: MultimapTableDefinition<&str, &str> =
    MultimapTableDefinition::new("children");

/// Metadata key holding the schema version.
pub const META_SCHEMA_VERSION: &str = "schema_version";

/// Metadata key holding the next insertion sequence number.
pub const META_NEXT_SEQ: &str = "next_seq";

/// Builds a composite key for the named unique index.
///
/// Parts are joined with `\x1f` (unit separator) so user-supplied values
/// containing `/` cannot collide with the bucket structure.
pub fn index_key(index_name: &str, parts: &[&str]) -> String {
    let mut key = String::from(index_name);
    for part in parts {
        key.push('/');
        key.push_str(&part.replace('\x1f', " ").replace('/', "\x1f"));
    }
    key
}

/// Builds a children-bucket key for a parent row.
pub fn children_key(parent_family: &str, parent_id: &str, child_bucket: &str) -> String {
    format!("{parent_family}/{parent_id}/{child_bucket}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_keys_are_namespaced() {
        let a = index_key("location-name", &["t1", "u1", "Garage"]);
        let b = index_key("location-name", &["t1", "u1", "Shed"]);
        assert_ne!(a, b);
        assert!(a.starts_with("location-name/"));
    }

    #[test]
    fn slash_in_value_cannot_escape_bucket() {
        let tricky = index_key("location-name", &["t1", "u1/extra", "name"]);
        let plain = index_key("location-name", &["t1", "u1", "extra/name"]);
        assert_ne!(tricky, plain);
    }

    #[test]
    fn children_key_shape() {
        assert_eq!(children_key("location", "l1", "areas"), "location/l1/areas");
    }
}
