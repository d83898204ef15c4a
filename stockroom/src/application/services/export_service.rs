// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Export / Import / Restore Requests
//!
//! The request side of the pipeline: creating Pending export jobs for the
//! worker, ingesting an uploaded artifact as an `imported` export record
//! (metadata and a linked file only - no live-data changes), and binding a
//! restore operation to an export.

use std::sync::Arc;

use tracing::info;

use stockroom_domain::entities::{
    Export, ExportType, File, JobStatus, RestoreOperation, SelectedItem,
};
use stockroom_domain::registries::RegistrySet;
use stockroom_domain::{DomainResult, EntityId, RequestIdentity};

use crate::infrastructure::services::artifact::{Artifact, ARTIFACT_MIME};
use crate::infrastructure::services::blob::BlobStore;

/// User-facing export, import, and restore requests.
pub struct ExportService {
    set: RegistrySet,
    blob: Arc<dyn BlobStore>,
    identity: RequestIdentity,
}

impl ExportService {
    pub fn new(set: RegistrySet, blob: Arc<dyn BlobStore>, identity: RequestIdentity) -> Self {
        Self { set, blob, identity }
    }

    fn owner(&self) -> DomainResult<(EntityId, EntityId)> {
        let (tenant, user) = self.identity.require_user()?;
        Ok((tenant.clone(), user.clone()))
    }

    /// Creates a Pending export job for the worker to pick up.
    pub async fn request_export(
        &self,
        export_type: ExportType,
        selected_items: Vec<SelectedItem>,
        include_file_data: bool,
        description: impl Into<String>,
    ) -> DomainResult<Export> {
        let (tenant, user) = self.owner()?;
        let mut export = Export::new(tenant, user, export_type);
        export.selected_items = selected_items;
        export.include_file_data = include_file_data;
        export.description = description.into();
        self.set.exports.create(export).await
    }

    /// Ingests a previously exported artifact: validates it, stores the
    /// bytes, and records an `imported` export whose stats come from the
    /// artifact. The live graph is not touched - restoring is a separate,
    /// explicit operation.
    pub async fn import_artifact(
        &self,
        bytes: &[u8],
        description: impl Into<String>,
    ) -> DomainResult<Export> {
        let (tenant, user) = self.owner()?;

        let mut export = Export::new(tenant.clone(), user.clone(), ExportType::Imported);
        export.description = description.into();
        let mut export = self.set.exports.create(export).await?;

        let claimed = self
            .set
            .exports
            .transition(&export.id, JobStatus::Pending, JobStatus::InProgress)
            .await?;
        if !claimed {
            return Err(stockroom_domain::DomainError::internal(
                "freshly created import was claimed elsewhere",
            ));
        }

        match Artifact::from_xml(bytes) {
            Ok(artifact) => {
                let key = format!("imports/{}.xml", export.id);
                self.blob.put(&key, bytes).await?;

                let mut file = File::new(tenant, user, key, ARTIFACT_MIME);
                file.ext = "xml".to_string();
                file.title = format!("Imported export {}", export.id);
                file.link_to("export", export.id.clone());
                let file = self.set.files.create(file).await?;

                let mut stats = artifact.counts();
                stats.file_size = bytes.len() as u64;
                export = self.set.exports.get(&export.id).await?;
                export.include_file_data = stats.binary_data_count > 0;
                export.complete(file.id.clone(), stats);
                let export = self.set.exports.update(export).await?;
                info!(export = %export.id, "artifact imported");
                Ok(export)
            }
            Err(parse_err) => {
                export = self.set.exports.get(&export.id).await?;
                export.fail(&parse_err);
                self.set.exports.update(export).await?;
                Err(parse_err)
            }
        }
    }

    /// Creates a Pending restore operation bound to an export.
    pub async fn request_restore(&self, export_id: &EntityId) -> DomainResult<RestoreOperation> {
        let (tenant, user) = self.owner()?;
        let export = self.set.exports.get(export_id).await?;
        let operation = RestoreOperation::new(tenant, user, export.id);
        self.set.restores.create(operation).await
    }
}
