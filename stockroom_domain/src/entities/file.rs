// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # File Entities
//!
//! [`File`] describes stored bytes (a blob reference) plus searchable
//! metadata and an optional weak linkage to any entity in the graph.
//! [`CommodityFile`] is the relation row behind images, manuals, and
//! invoices: a commodity-scoped reference to a file, discriminated by
//! [`FileType`].
//!
//! Ownership semantics: files own their bytes; images/manuals/invoices and
//! exports reference them weakly. Deleting a file cascades the commodity
//! file rows and nulls `Export.file_id` - that orchestration lives in the
//! entity service, not here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation;
use crate::value_objects::EntityId;
use crate::DomainError;

/// Kind of file, used both for type filtering in search and as the
/// discriminator on commodity file relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Image,
    Manual,
    Invoice,
    Other,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Image => "image",
            FileType::Manual => "manual",
            FileType::Invoice => "invoice",
            FileType::Other => "other",
        }
    }
}

/// Stored-file metadata and blob reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub id: EntityId,
    pub tenant_id: EntityId,
    pub user_id: EntityId,
    pub path: String,
    pub original_path: String,
    pub ext: String,
    pub mime_type: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub linked_entity_type: Option<String>,
    pub linked_entity_id: Option<EntityId>,
    pub linked_entity_meta: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl File {
    pub fn new(
        tenant_id: EntityId,
        user_id: EntityId,
        path: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let path = path.into();
        Self {
            id: EntityId::new(),
            tenant_id,
            user_id,
            original_path: path.clone(),
            path,
            ext: String::new(),
            mime_type: mime_type.into(),
            title: String::new(),
            description: String::new(),
            tags: Vec::new(),
            file_type: FileType::Other,
            linked_entity_type: None,
            linked_entity_id: None,
            linked_entity_meta: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Links this file to an entity in the graph.
    pub fn link_to(&mut self, entity_type: impl Into<String>, entity_id: EntityId) {
        self.linked_entity_type = Some(entity_type.into());
        self.linked_entity_id = Some(entity_id);
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        validation::require(&self.path, "Path")?;
        validation::require(&self.mime_type, "MIMEType")
    }
}

/// Relation row attaching a file to a commodity as image/manual/invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommodityFile {
    pub id: EntityId,
    pub tenant_id: EntityId,
    pub user_id: EntityId,
    pub commodity_id: EntityId,
    pub file_id: EntityId,
    pub kind: FileType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommodityFile {
    pub fn new(
        tenant_id: EntityId,
        user_id: EntityId,
        commodity_id: EntityId,
        file_id: EntityId,
        kind: FileType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            tenant_id,
            user_id,
            commodity_id,
            file_id,
            kind,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        validation::require(self.commodity_id.as_str(), "CommodityID")?;
        validation::require(self.file_id.as_str(), "FileID")?;
        if self.kind == FileType::Other {
            return Err(DomainError::validation(
                "Kind",
                "commodity files must be image, manual, or invoice",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_requires_path_and_mime() {
        let mut f = File::new(EntityId::new(), EntityId::new(), "a/b.pdf", "application/pdf");
        assert!(f.validate().is_ok());
        f.mime_type = String::new();
        assert!(f.validate().is_err());
    }

    #[test]
    fn commodity_file_rejects_other_kind() {
        let cf = CommodityFile::new(
            EntityId::new(),
            EntityId::new(),
            EntityId::new(),
            EntityId::new(),
            FileType::Other,
        );
        assert!(cf.validate().is_err());
    }
}
