// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Export Worker
//!
//! Consumes pending exports: builds the selected sub-graph through a
//! registry set scoped to the export's owner, streams the artifact to the
//! blob store, writes the `File` row, and completes the export with counts
//! and sizes. A claim is the pair (per-user slot, CAS transition); losing
//! either leaves the job Pending for a later tick.
//!
//! Cancellation is cooperative: the stop signal is observed between build
//! phases, the half-written blob is discarded, and the export is marked
//! Failed with the cancellation reason.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use stockroom_domain::entities::{
    Export, ExportType, File, FileType, JobKind, JobStatus, SelectedItemKind,
};
use stockroom_domain::registries::{RegistryFactory, RegistrySet};
use stockroom_domain::{DomainError, DomainResult, EntityId, RequestIdentity};

use super::super::services::artifact::{
    Artifact, ArtifactArea, ArtifactCommodity, ArtifactFile, ArtifactLocation, ArtifactRef,
    ARTIFACT_MIME,
};
use super::super::services::blob::BlobStore;
use super::{check_stop, JobProcessor};

/// Blob key of an export artifact.
pub fn artifact_key(export_id: &EntityId) -> String {
    format!("exports/{export_id}.xml")
}

/// Processor for the export worker kind.
pub struct ExportProcessor {
    factory: Arc<dyn RegistryFactory>,
    service: RegistrySet,
    blob: Arc<dyn BlobStore>,
    slot_limit: usize,
    slot_ttl: ChronoDuration,
    active_slots: Mutex<HashMap<String, EntityId>>,
}

impl ExportProcessor {
    pub fn new(factory: Arc<dyn RegistryFactory>, blob: Arc<dyn BlobStore>, slot_limit: usize) -> Self {
        let service = factory.service_set();
        Self {
            factory,
            service,
            blob,
            slot_limit,
            slot_ttl: ChronoDuration::minutes(30),
            active_slots: Mutex::new(HashMap::new()),
        }
    }

    fn owner_set(&self, export: &Export) -> DomainResult<RegistrySet> {
        self.factory.user_set(Some(RequestIdentity::user(
            export.tenant_id.clone(),
            export.user_id.clone(),
        )))
    }

    async fn release_slot(&self, job_id: &EntityId) {
        let slot_id = self.active_slots.lock().remove(job_id.as_str());
        if let Some(slot_id) = slot_id {
            if let Err(e) = self.service.slots.release(&slot_id).await {
                debug!(slot = %slot_id, error = %e, "slot release failed");
            }
        }
    }

    /// Collects commodities (with attachments) and their referenced files
    /// into the artifact.
    async fn push_commodities(
        &self,
        set: &RegistrySet,
        artifact: &mut Artifact,
        ids: &[EntityId],
        include_file_data: bool,
    ) -> DomainResult<()> {
        let mut file_ids: BTreeSet<String> = BTreeSet::new();
        for id in ids {
            let commodity = set.commodities.get(id).await?;
            let mut entry = ArtifactCommodity {
                id: commodity.id.as_str().to_string(),
                area_id: commodity.area_id.as_str().to_string(),
                name: commodity.name.clone(),
                short_name: commodity.short_name.clone(),
                ..Default::default()
            };
            for link in set.commodity_files.list_for_commodity(id, None).await? {
                let reference = ArtifactRef {
                    id: link.id.as_str().to_string(),
                    file_id: link.file_id.as_str().to_string(),
                };
                file_ids.insert(link.file_id.as_str().to_string());
                match link.kind {
                    FileType::Image => entry.images.push(reference),
                    FileType::Manual => entry.manuals.push(reference),
                    FileType::Invoice => entry.invoices.push(reference),
                    FileType::Other => {}
                }
            }
            artifact.commodities.push(entry);
        }

        for file_id in file_ids {
            let file = set.files.get(&EntityId::parse(&file_id)?).await?;
            let data = if include_file_data {
                Some(self.blob.get(&file.path).await?)
            } else {
                None
            };
            artifact.files.push(ArtifactFile {
                id: file.id.as_str().to_string(),
                path: file.path,
                ext: file.ext,
                mime_type: file.mime_type,
                data,
            });
        }
        Ok(())
    }

    /// Builds the artifact for one export request.
    async fn build_artifact(&self, set: &RegistrySet, export: &Export) -> DomainResult<Artifact> {
        let mut artifact = Artifact::new(export.export_type);
        match export.export_type {
            ExportType::FullDatabase => {
                for location in set.locations.list().await? {
                    artifact.locations.push(ArtifactLocation {
                        id: location.id.as_str().to_string(),
                        name: location.name,
                    });
                }
                for area in set.areas.list().await? {
                    artifact.areas.push(ArtifactArea {
                        id: area.id.as_str().to_string(),
                        location_id: area.location_id.as_str().to_string(),
                        name: area.name,
                    });
                }
                let ids: Vec<EntityId> =
                    set.commodities.list().await?.into_iter().map(|c| c.id).collect();
                self.push_commodities(set, &mut artifact, &ids, export.include_file_data)
                    .await?;
            }
            ExportType::Locations => {
                for location in set.locations.list().await? {
                    artifact.locations.push(ArtifactLocation {
                        id: location.id.as_str().to_string(),
                        name: location.name,
                    });
                }
                for area in set.areas.list().await? {
                    artifact.areas.push(ArtifactArea {
                        id: area.id.as_str().to_string(),
                        location_id: area.location_id.as_str().to_string(),
                        name: area.name,
                    });
                }
            }
            ExportType::Commodities => {
                let ids: Vec<EntityId> =
                    set.commodities.list().await?.into_iter().map(|c| c.id).collect();
                self.push_commodities(set, &mut artifact, &ids, export.include_file_data)
                    .await?;
            }
            ExportType::SelectedItems => {
                let mut commodity_ids: Vec<EntityId> = Vec::new();
                for item in &export.selected_items {
                    match item.kind {
                        SelectedItemKind::Location => {
                            let location = set.locations.get(&item.id).await?;
                            artifact.locations.push(ArtifactLocation {
                                id: location.id.as_str().to_string(),
                                name: location.name,
                            });
                            for area_id in set.locations.areas(&item.id).await? {
                                let area = set.areas.get(&area_id).await?;
                                artifact.areas.push(ArtifactArea {
                                    id: area.id.as_str().to_string(),
                                    location_id: area.location_id.as_str().to_string(),
                                    name: area.name,
                                });
                                commodity_ids.extend(set.areas.commodities(&area_id).await?);
                            }
                        }
                        SelectedItemKind::Area => {
                            let area = set.areas.get(&item.id).await?;
                            artifact.areas.push(ArtifactArea {
                                id: area.id.as_str().to_string(),
                                location_id: area.location_id.as_str().to_string(),
                                name: area.name,
                            });
                            commodity_ids.extend(set.areas.commodities(&item.id).await?);
                        }
                        SelectedItemKind::Commodity => commodity_ids.push(item.id.clone()),
                    }
                }
                self.push_commodities(set, &mut artifact, &commodity_ids, export.include_file_data)
                    .await?;
            }
            ExportType::Imported => {
                return Err(DomainError::validation(
                    "Type",
                    "imported exports carry an uploaded artifact and are never rebuilt",
                ))
            }
        }
        Ok(artifact)
    }
}

#[async_trait]
impl JobProcessor for ExportProcessor {
    type Job = Export;

    fn kind(&self) -> JobKind {
        JobKind::Export
    }

    fn job_id(&self, job: &Self::Job) -> EntityId {
        job.id.clone()
    }

    async fn pending(&self) -> DomainResult<Vec<Export>> {
        self.service.exports.list_pending().await
    }

    async fn claim(&self, job: &Export) -> DomainResult<bool> {
        let slot = match self
            .service
            .slots
            .acquire(&job.user_id, JobKind::Export, &job.id, self.slot_limit, self.slot_ttl)
            .await
        {
            Ok(slot) => slot,
            Err(DomainError::ConcurrencyLimitExceeded(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        let claimed = self
            .service
            .exports
            .transition(&job.id, JobStatus::Pending, JobStatus::InProgress)
            .await?;
        if claimed {
            self.active_slots
                .lock()
                .insert(job.id.as_str().to_string(), slot.id);
        } else {
            self.service.slots.release(&slot.id).await?;
        }
        Ok(claimed)
    }

    async fn execute(&self, job: &Export, stop: watch::Receiver<bool>) -> DomainResult<()> {
        let result = async {
            check_stop(&stop)?;
            let owner_set = self.owner_set(job)?;
            let artifact = self.build_artifact(&owner_set, job).await?;

            check_stop(&stop)?;
            let bytes = artifact.to_xml()?;
            let key = artifact_key(&job.id);
            self.blob.put(&key, &bytes).await?;

            // Cancellation after this point must not lose the blob: the
            // remaining writes are the commit.
            let mut file = File::new(job.tenant_id.clone(), job.user_id.clone(), key, ARTIFACT_MIME);
            file.ext = "xml".to_string();
            file.title = format!("Export {}", job.id);
            file.link_to("export", job.id.clone());
            let file = self.service.files.create(file).await?;

            let mut stats = artifact.counts();
            stats.file_size = bytes.len() as u64;

            let mut export = self.service.exports.get(&job.id).await?;
            export.complete(file.id.clone(), stats);
            self.service.exports.update(export).await?;
            Ok(())
        }
        .await;

        if result.is_err() {
            // Discard the half-written blob; failure bookkeeping happens in
            // `fail`.
            let _ = self.blob.delete(&artifact_key(&job.id)).await;
        } else {
            self.release_slot(&job.id).await;
        }
        result
    }

    async fn fail(&self, job: &Export, error: &DomainError) -> DomainResult<()> {
        self.release_slot(&job.id).await;
        let mut export = self.service.exports.get(&job.id).await?;
        export.fail(error);
        self.service.exports.update(export).await?;
        Ok(())
    }
}
