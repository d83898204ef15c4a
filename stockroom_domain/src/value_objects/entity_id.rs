// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Entity Identifier Value Object
//!
//! Every persisted entity is identified by an opaque, globally unique string.
//! Freshly created entities default to a random UUID, but identifiers that
//! arrive from outside (export artifacts, earlier deployments) are accepted
//! as-is - the only structural requirement is non-emptiness.
//!
//! ## Design Notes
//!
//! - **Opaque**: callers never parse structure out of an id
//! - **String form**: uniform representation across JSON, SQL, and KV keys
//! - **Immutable**: ids never change after creation
//!
//! ## Cross-Backend Mapping
//!
//! - **SQL**: `TEXT` primary-key column
//! - **KV**: bucket key bytes
//! - **JSON/XML**: plain string attribute

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;
use uuid::Uuid;

use crate::DomainError;

/// Opaque globally-unique entity identifier.
///
/// Defaults to a random UUID on creation; preserves any non-empty string on
/// parse so externally minted ids round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an existing identifier, rejecting empty strings.
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::field_required("id"));
        }
        Ok(Self(value))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique_and_non_empty() {
        let a = EntityId::new();
        let b = EntityId::new();
        assert_ne!(a, b);
        assert!(!a.as_str().is_empty());
    }

    #[test]
    fn parse_rejects_empty() {
        assert!(EntityId::parse("").is_err());
        assert!(EntityId::parse("   ").is_err());
    }

    #[test]
    fn parse_preserves_external_ids() {
        let id = EntityId::parse("legacy-0042").unwrap();
        assert_eq!(id.as_str(), "legacy-0042");
    }

    #[test]
    fn serde_round_trips_as_plain_string() {
        let id = EntityId::parse("abc").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc\"");
        let back: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
