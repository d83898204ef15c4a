// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Backend Capability Set
//!
//! Storage backends declare which enhanced query features they support
//! natively. The enhanced wrapper consults the declared set and substitutes
//! an in-process fallback for any missing capability, keeping a single public
//! API across backends.
//!
//! Capabilities are a value type, not a trait hierarchy: dispatch happens at
//! one point in the wrapper, never through chains of dynamic objects.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One enhanced query feature a backend may support natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    FullTextSearch,
    JsonContainerQueries,
    BulkUpsert,
    AdvancedIndexing,
    TrigramSimilarity,
}

impl Capability {
    const ALL: [Capability; 5] = [
        Capability::FullTextSearch,
        Capability::JsonContainerQueries,
        Capability::BulkUpsert,
        Capability::AdvancedIndexing,
        Capability::TrigramSimilarity,
    ];

    fn bit(self) -> u8 {
        match self {
            Capability::FullTextSearch => 1 << 0,
            Capability::JsonContainerQueries => 1 << 1,
            Capability::BulkUpsert => 1 << 2,
            Capability::AdvancedIndexing => 1 << 3,
            Capability::TrigramSimilarity => 1 << 4,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::FullTextSearch => "full_text_search",
            Capability::JsonContainerQueries => "json_container_queries",
            Capability::BulkUpsert => "bulk_upsert",
            Capability::AdvancedIndexing => "advanced_indexing",
            Capability::TrigramSimilarity => "trigram_similarity",
        };
        f.write_str(name)
    }
}

/// Declared feature support of one storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    /// The empty capability set (everything falls back in-process).
    pub const fn none() -> Self {
        Self(0)
    }

    /// The full capability set.
    pub fn all() -> Self {
        Capability::ALL.iter().fold(Self::none(), |set, c| set.with(*c))
    }

    /// Returns a copy of the set with `capability` added.
    pub const fn with(self, capability: Capability) -> Self {
        // const-compatible duplicate of Capability::bit
        let bit = match capability {
            Capability::FullTextSearch => 1 << 0,
            Capability::JsonContainerQueries => 1 << 1,
            Capability::BulkUpsert => 1 << 2,
            Capability::AdvancedIndexing => 1 << 3,
            Capability::TrigramSimilarity => 1 << 4,
        };
        Self(self.0 | bit)
    }

    /// True when the backend supports `capability` natively.
    pub fn contains(&self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    /// Iterates the capabilities present in the set.
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.contains(*c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_contains_nothing() {
        let set = CapabilitySet::none();
        assert!(!set.contains(Capability::FullTextSearch));
        assert_eq!(set.iter().count(), 0);
    }

    #[test]
    fn with_adds_capabilities() {
        let set = CapabilitySet::none()
            .with(Capability::FullTextSearch)
            .with(Capability::BulkUpsert);
        assert!(set.contains(Capability::FullTextSearch));
        assert!(set.contains(Capability::BulkUpsert));
        assert!(!set.contains(Capability::TrigramSimilarity));
    }

    #[test]
    fn all_contains_every_capability() {
        let set = CapabilitySet::all();
        assert_eq!(set.iter().count(), 5);
    }
}
