// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Restore Worker
//!
//! Replays an export artifact into the live graph. The worker walks the
//! artifact in dependency order (locations, areas, commodities, files,
//! attachments) and persists one [`RestoreStep`] per logical unit as it
//! goes, so a crash mid-restore leaves a durable step log behind.
//!
//! Idempotence: a unit that already exists records as `skipped`, and on a
//! re-run every step already logged as applied is skipped by name, so
//! replaying a failed operation never duplicates rows.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use stockroom_domain::entities::{
    Area, Commodity, CommodityFile, File, FileType, JobKind, JobStatus, Location, RestoreOperation,
    RestoreStep, StepResult,
};
use stockroom_domain::registries::{RegistryFactory, RegistrySet};
use stockroom_domain::{DomainError, DomainResult, EntityId, RequestIdentity};

use super::super::services::artifact::Artifact;
use super::super::services::blob::BlobStore;
use super::{check_stop, JobProcessor};

/// Processor for the restore worker kind.
pub struct RestoreProcessor {
    factory: Arc<dyn RegistryFactory>,
    service: RegistrySet,
    blob: Arc<dyn BlobStore>,
    slot_limit: usize,
    slot_ttl: ChronoDuration,
    active_slots: Mutex<HashMap<String, EntityId>>,
}

impl RestoreProcessor {
    pub fn new(factory: Arc<dyn RegistryFactory>, blob: Arc<dyn BlobStore>, slot_limit: usize) -> Self {
        let service = factory.service_set();
        Self {
            factory,
            service,
            blob,
            slot_limit,
            slot_ttl: ChronoDuration::hours(1),
            active_slots: Mutex::new(HashMap::new()),
        }
    }

    async fn release_slot(&self, job_id: &EntityId) {
        let slot_id = self.active_slots.lock().remove(job_id.as_str());
        if let Some(slot_id) = slot_id {
            if let Err(e) = self.service.slots.release(&slot_id).await {
                debug!(slot = %slot_id, error = %e, "slot release failed");
            }
        }
    }

    /// Applies one unit, classifying the outcome and appending to the step
    /// log. `AlreadyExists` reads as skipped; any other error is a failed
    /// step, not a failed operation.
    async fn apply_step<F>(
        &self,
        operation: &mut RestoreOperation,
        applied_before: &HashSet<String>,
        name: String,
        apply: F,
    ) -> DomainResult<()>
    where
        F: std::future::Future<Output = DomainResult<()>>,
    {
        let (result, reason) = if applied_before.contains(&name) {
            (StepResult::Skipped, Some("applied by a previous run".to_string()))
        } else {
            match apply.await {
                Ok(()) => (StepResult::Applied, None),
                Err(DomainError::AlreadyExists { .. }) => {
                    (StepResult::Skipped, Some("already present".to_string()))
                }
                Err(e) => (StepResult::Failed, Some(format!("{}: {e}", e.category()))),
            }
        };
        operation.record_step(result);
        self.service
            .restores
            .add_step(RestoreStep::new(operation, name, result, reason))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl JobProcessor for RestoreProcessor {
    type Job = RestoreOperation;

    fn kind(&self) -> JobKind {
        JobKind::Restore
    }

    fn job_id(&self, job: &Self::Job) -> EntityId {
        job.id.clone()
    }

    async fn pending(&self) -> DomainResult<Vec<RestoreOperation>> {
        self.service.restores.list_pending().await
    }

    async fn claim(&self, job: &RestoreOperation) -> DomainResult<bool> {
        let slot = match self
            .service
            .slots
            .acquire(&job.user_id, JobKind::Restore, &job.id, self.slot_limit, self.slot_ttl)
            .await
        {
            Ok(slot) => slot,
            Err(DomainError::ConcurrencyLimitExceeded(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        let claimed = self
            .service
            .restores
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

    async fn execute(&self, job: &RestoreOperation, stop: watch::Receiver<bool>) -> DomainResult<()> {
        let export = self.service.exports.get(&job.export_id).await?;
        let file_id = export
            .file_id
            .clone()
            .ok_or_else(|| DomainError::bad_data("export has no artifact file"))?;
        let artifact_file = self.service.files.get(&file_id).await?;
        let bytes = self.blob.get(&artifact_file.path).await?;
        let artifact = Artifact::from_xml(&bytes)?;

        let owner = RequestIdentity::user(job.tenant_id.clone(), job.user_id.clone());
        let set: RegistrySet = self.factory.user_set(Some(owner))?;

        let applied_before: HashSet<String> = self
            .service
            .restores
            .steps(&job.id)
            .await?
            .into_iter()
            .filter(|s| s.result == StepResult::Applied)
            .map(|s| s.name)
            .collect();

        let mut operation = self.service.restores.get(&job.id).await?;
        operation.applied_count = 0;
        operation.skipped_count = 0;
        operation.failed_count = 0;

        for entry in &artifact.locations {
            check_stop(&stop)?;
            let location = Location {
                id: EntityId::parse(&entry.id)?,
                tenant_id: job.tenant_id.clone(),
                user_id: job.user_id.clone(),
                name: entry.name.clone(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            self.apply_step(
                &mut operation,
                &applied_before,
                format!("location:{}", entry.id),
                async { set.locations.create(location).await.map(|_| ()) },
            )
            .await?;
        }

        for entry in &artifact.areas {
            check_stop(&stop)?;
            let area = Area {
                id: EntityId::parse(&entry.id)?,
                tenant_id: job.tenant_id.clone(),
                user_id: job.user_id.clone(),
                location_id: EntityId::parse(&entry.location_id)?,
                name: entry.name.clone(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            self.apply_step(
                &mut operation,
                &applied_before,
                format!("area:{}", entry.id),
                async { set.areas.create(area).await.map(|_| ()) },
            )
            .await?;
        }

        for entry in &artifact.commodities {
            check_stop(&stop)?;
            let mut commodity = Commodity::new(
                job.tenant_id.clone(),
                job.user_id.clone(),
                EntityId::parse(&entry.area_id)?,
                entry.name.clone(),
            );
            commodity.id = EntityId::parse(&entry.id)?;
            if !entry.short_name.is_empty() {
                commodity.short_name = entry.short_name.clone();
            }
            self.apply_step(
                &mut operation,
                &applied_before,
                format!("commodity:{}", entry.id),
                async { set.commodities.create(commodity).await.map(|_| ()) },
            )
            .await?;
        }

        for entry in &artifact.files {
            check_stop(&stop)?;
            let mut file = File::new(
                job.tenant_id.clone(),
                job.user_id.clone(),
                entry.path.clone(),
                entry.mime_type.clone(),
            );
            file.id = EntityId::parse(&entry.id)?;
            file.ext = entry.ext.clone();
            let payload = entry.data.clone();
            let blob = self.blob.clone();
            let path = entry.path.clone();
            let files = set.files.clone();
            self.apply_step(
                &mut operation,
                &applied_before,
                format!("file:{}", entry.id),
                async move {
                    if let Some(data) = payload {
                        blob.put(&path, &data).await?;
                    }
                    files.create(file).await.map(|_| ())
                },
            )
            .await?;
        }

        for commodity in &artifact.commodities {
            for (kind, refs) in [
                (FileType::Image, &commodity.images),
                (FileType::Manual, &commodity.manuals),
                (FileType::Invoice, &commodity.invoices),
            ] {
                for reference in refs {
                    check_stop(&stop)?;
                    let link = CommodityFile {
                        id: EntityId::parse(&reference.id)?,
                        tenant_id: job.tenant_id.clone(),
                        user_id: job.user_id.clone(),
                        commodity_id: EntityId::parse(&commodity.id)?,
                        file_id: EntityId::parse(&reference.file_id)?,
                        kind,
                        created_at: Utc::now(),
                        updated_at: Utc::now(),
                    };
                    self.apply_step(
                        &mut operation,
                        &applied_before,
                        format!("attachment:{}", reference.id),
                        async { set.commodity_files.create(link).await.map(|_| ()) },
                    )
                    .await?;
                }
            }
        }

        operation.finish();
        self.service.restores.update(operation).await?;
        self.release_slot(&job.id).await;
        Ok(())
    }

    async fn fail(&self, job: &RestoreOperation, error: &DomainError) -> DomainResult<()> {
        self.release_slot(&job.id).await;
        let mut operation = self.service.restores.get(&job.id).await?;
        operation.status = JobStatus::Failed;
        operation.error_message = Some(format!("{}: {error}", error.category()));
        operation.completed_at = Some(Utc::now());
        self.service.restores.update(operation).await?;
        Ok(())
    }
}
