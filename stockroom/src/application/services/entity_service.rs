// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Entity Service
//!
//! Cross-registry orchestration: recursive deletes, file-deletion cascades,
//! and the context-aware validation glue. Cascade logic lives here and only
//! here - registries hold no references to one another, which is what keeps
//! the Location/Area relation acyclic at the type level.
//!
//! ## Cascade Semantics
//!
//! - `delete_location_recursive`: areas, their commodities, their files,
//!   then the location. Sibling branches are untouched.
//! - `delete_commodity_recursive`: attachment links, the files they
//!   reference (blob bytes included), files weakly linked to the commodity,
//!   then the commodity row.
//! - `delete_file`: attachment rows referencing the file are removed,
//!   every export pointing at it gets `file_id = null`, the blob is
//!   deleted, then the metadata row.
//! - Exports: `delete_export` tombstones; `hard_delete_export` removes the
//!   artifact file and erases the row.

use std::sync::Arc;

use tracing::debug;

use stockroom_domain::entities::Commodity;
use stockroom_domain::registries::RegistrySet;
use stockroom_domain::validation::ValidationContext;
use stockroom_domain::{DomainError, DomainResult, EntityId};

use crate::infrastructure::services::blob::BlobStore;

/// Orchestrates operations that span multiple registries.
pub struct EntityService {
    set: RegistrySet,
    blob: Arc<dyn BlobStore>,
}

impl EntityService {
    pub fn new(set: RegistrySet, blob: Arc<dyn BlobStore>) -> Self {
        Self { set, blob }
    }

    /// Loads the validation context (main currency) from Settings.
    pub async fn validation_context(&self) -> DomainResult<ValidationContext> {
        let settings = self.set.settings.get().await?;
        Ok(ValidationContext {
            main_currency: settings.main_currency,
        })
    }

    /// Creates a commodity after context-aware validation: the main
    /// currency must be configured before any commodity exists.
    pub async fn create_commodity(&self, commodity: Commodity) -> DomainResult<Commodity> {
        let ctx = self.validation_context().await?;
        commodity.validate(&ctx)?;
        self.set.commodities.create(commodity).await
    }

    /// Deletes a file everywhere it is referenced, then the file itself.
    pub async fn delete_file(&self, file_id: &EntityId) -> DomainResult<()> {
        let file = self.set.files.get(file_id).await?;

        for link in self.set.commodity_files.list_by_file(file_id).await? {
            self.set.commodity_files.delete(&link.id).await?;
        }

        let detached = self.set.exports.detach_file(file_id).await?;
        if detached > 0 {
            debug!(file = %file_id, exports = detached, "detached file from exports");
        }

        // Blob removal is best-effort: a missing blob must not strand the
        // metadata row.
        if let Err(e) = self.blob.delete(&file.path).await {
            if !e.is_not_found() {
                return Err(e);
            }
        }

        self.set.files.delete(file_id).await
    }

    /// Deletes a commodity, its attachments, and its files.
    pub async fn delete_commodity_recursive(&self, commodity_id: &EntityId) -> DomainResult<()> {
        self.set.commodities.get(commodity_id).await?;

        for link in self
            .set
            .commodity_files
            .list_for_commodity(commodity_id, None)
            .await?
        {
            self.set.commodity_files.delete(&link.id).await?;
            match self.delete_file(&link.file_id).await {
                Ok(()) => {}
                // Another attachment of the same file may already have
                // removed it within this cascade.
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        for file in self
            .set
            .files
            .list_by_linked_entity("commodity", commodity_id)
            .await?
        {
            match self.delete_file(&file.id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        self.set.commodities.delete(commodity_id).await
    }

    /// Deletes an area and everything inside it.
    pub async fn delete_area_recursive(&self, area_id: &EntityId) -> DomainResult<()> {
        for commodity_id in self.set.areas.commodities(area_id).await? {
            self.delete_commodity_recursive(&commodity_id).await?;
        }
        self.set.areas.delete(area_id).await
    }

    /// Deletes a location and everything inside it; sibling locations are
    /// untouched.
    pub async fn delete_location_recursive(&self, location_id: &EntityId) -> DomainResult<()> {
        for area_id in self.set.locations.areas(location_id).await? {
            self.delete_area_recursive(&area_id).await?;
        }
        self.set.locations.delete(location_id).await
    }

    /// Soft-deletes an export: the row leaves live views but stays
    /// reachable through the deleted listing.
    pub async fn delete_export(&self, export_id: &EntityId) -> DomainResult<()> {
        self.set.exports.delete(export_id).await
    }

    /// Erases a soft-deleted (or live) export together with its artifact.
    pub async fn hard_delete_export(&self, export_id: &EntityId) -> DomainResult<()> {
        let export = match self.set.exports.get(export_id).await {
            Ok(export) => Some(export),
            Err(DomainError::Deleted { .. }) => self
                .set
                .exports
                .list_deleted()
                .await?
                .into_iter()
                .find(|e| &e.id == export_id),
            Err(e) => return Err(e),
        };
        let export = export.ok_or_else(|| DomainError::not_found("export", export_id.as_str()))?;

        if let Some(file_id) = &export.file_id {
            match self.delete_file(file_id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        self.set.exports.hard_delete(export_id).await
    }
}
