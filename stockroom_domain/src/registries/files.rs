// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # File Registries
//!
//! [`FileRegistry`] stores file metadata with substring search over title,
//! description, and paths (case-insensitive), AND-ed tag filtering, and an
//! equality type filter. [`CommodityFileRegistry`] stores the relation rows
//! behind images, manuals, and invoices.

use async_trait::async_trait;

use super::ListPage;
use crate::entities::{CommodityFile, File, FileType};
use crate::value_objects::EntityId;
use crate::DomainResult;

/// Search parameters for file listings.
///
/// All present filters are AND-ed: the substring query must match one of
/// {title, description, path, original_path} case-insensitively, every
/// requested tag must be present, and the type must match exactly.
#[derive(Debug, Clone, Default)]
pub struct FileSearchQuery {
    pub query: Option<String>,
    pub tags: Vec<String>,
    pub file_type: Option<FileType>,
}

impl FileSearchQuery {
    /// True when `file` satisfies every present filter.
    ///
    /// This is the reference matching rule; backends without native search
    /// capabilities apply it in process via the enhanced wrapper.
    pub fn matches(&self, file: &File) -> bool {
        if let Some(q) = &self.query {
            let q = q.to_lowercase();
            let hit = file.title.to_lowercase().contains(&q)
                || file.description.to_lowercase().contains(&q)
                || file.path.to_lowercase().contains(&q)
                || file.original_path.to_lowercase().contains(&q);
            if !hit {
                return false;
            }
        }
        if !self.tags.iter().all(|t| file.tags.contains(t)) {
            return false;
        }
        if let Some(ft) = self.file_type {
            if file.file_type != ft {
                return false;
            }
        }
        true
    }
}

/// Persistence contract for file metadata.
#[async_trait]
pub trait FileRegistry: Send + Sync {
    async fn create(&self, file: File) -> DomainResult<File>;

    async fn get(&self, id: &EntityId) -> DomainResult<File>;

    async fn list(&self) -> DomainResult<Vec<File>>;

    async fn list_paginated(&self, offset: usize, limit: usize) -> DomainResult<ListPage<File>>;

    /// Files weakly linked to an entity (`linked_entity_type` + id equality).
    async fn list_by_linked_entity(
        &self,
        entity_type: &str,
        entity_id: &EntityId,
    ) -> DomainResult<Vec<File>>;

    async fn search(&self, query: &FileSearchQuery) -> DomainResult<Vec<File>>;

    async fn update(&self, file: File) -> DomainResult<File>;

    /// Removes the metadata row only; blob bytes and dependent rows are the
    /// entity service's responsibility.
    async fn delete(&self, id: &EntityId) -> DomainResult<()>;

    async fn count(&self) -> DomainResult<usize>;
}

/// Persistence contract for commodity attachments (images/manuals/invoices).
#[async_trait]
pub trait CommodityFileRegistry: Send + Sync {
    /// Validates that the referenced commodity exists before persisting.
    async fn create(&self, link: CommodityFile) -> DomainResult<CommodityFile>;

    async fn get(&self, id: &EntityId) -> DomainResult<CommodityFile>;

    /// Attachments of one commodity, optionally narrowed to one kind.
    async fn list_for_commodity(
        &self,
        commodity_id: &EntityId,
        kind: Option<FileType>,
    ) -> DomainResult<Vec<CommodityFile>>;

    /// Attachment rows that reference a file, across commodities.
    async fn list_by_file(&self, file_id: &EntityId) -> DomainResult<Vec<CommodityFile>>;

    async fn delete(&self, id: &EntityId) -> DomainResult<()>;

    async fn count(&self) -> DomainResult<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::File;

    fn file() -> File {
        let mut f = File::new(EntityId::new(), EntityId::new(), "docs/Manual.PDF", "application/pdf");
        f.title = "Washer Manual".into();
        f.description = "Front loader".into();
        f.tags = vec!["appliance".into(), "manual".into()];
        f.file_type = FileType::Manual;
        f
    }

    #[test]
    fn query_matches_case_insensitively_across_fields() {
        let f = file();
        let q = FileSearchQuery {
            query: Some("manual.pdf".into()),
            ..Default::default()
        };
        assert!(q.matches(&f));

        let q = FileSearchQuery {
            query: Some("WASHER".into()),
            ..Default::default()
        };
        assert!(q.matches(&f));
    }

    #[test]
    fn all_tags_must_match() {
        let f = file();
        let q = FileSearchQuery {
            tags: vec!["appliance".into(), "manual".into()],
            ..Default::default()
        };
        assert!(q.matches(&f));

        let q = FileSearchQuery {
            tags: vec!["appliance".into(), "missing".into()],
            ..Default::default()
        };
        assert!(!q.matches(&f));
    }

    #[test]
    fn filters_are_anded() {
        let f = file();
        let q = FileSearchQuery {
            query: Some("washer".into()),
            tags: vec!["manual".into()],
            file_type: Some(FileType::Invoice),
        };
        assert!(!q.matches(&f));
    }
}
