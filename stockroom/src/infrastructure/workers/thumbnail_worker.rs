// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Thumbnail Worker
//!
//! Renders thumbnails for files, one active job per file, respecting
//! per-user concurrency slots. Failed attempts requeue the job until the
//! policy maximum, after which it stays Failed.
//!
//! The actual pixel work lives behind [`ThumbnailRenderer`]; image codecs
//! are a driver concern like blob storage, so the port ships with a no-op
//! renderer for wiring and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use stockroom_domain::entities::{JobKind, JobStatus, ThumbnailJob};
use stockroom_domain::registries::{RegistryFactory, RegistrySet};
use stockroom_domain::{DomainError, DomainResult, EntityId};

use super::super::services::blob::BlobStore;
use super::{check_stop, JobProcessor};

/// Default retry budget for thumbnail jobs.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Port for the actual image scaling.
pub trait ThumbnailRenderer: Send + Sync {
    fn render(&self, bytes: &[u8], size: u32) -> DomainResult<Vec<u8>>;
}

/// Renderer that passes bytes through unchanged; used by tests and by
/// deployments that delegate scaling to an external service.
pub struct NoopRenderer;

impl ThumbnailRenderer for NoopRenderer {
    fn render(&self, bytes: &[u8], _size: u32) -> DomainResult<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// Blob key of a rendered thumbnail.
pub fn thumbnail_key(file_id: &EntityId, size: u32) -> String {
    format!("thumbnails/{file_id}_{size}")
}

/// Processor for the thumbnail worker kind.
pub struct ThumbnailProcessor {
    service: RegistrySet,
    blob: Arc<dyn BlobStore>,
    renderer: Arc<dyn ThumbnailRenderer>,
    slot_limit: usize,
    slot_ttl: ChronoDuration,
    max_attempts: u32,
    active_slots: Mutex<HashMap<String, EntityId>>,
}

impl ThumbnailProcessor {
    pub fn new(
        factory: Arc<dyn RegistryFactory>,
        blob: Arc<dyn BlobStore>,
        renderer: Arc<dyn ThumbnailRenderer>,
        slot_limit: usize,
    ) -> Self {
        Self {
            service: factory.service_set(),
            blob,
            renderer,
            slot_limit,
            slot_ttl: ChronoDuration::minutes(10),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
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
}

#[async_trait]
impl JobProcessor for ThumbnailProcessor {
    type Job = ThumbnailJob;

    fn kind(&self) -> JobKind {
        JobKind::Thumbnail
    }

    fn job_id(&self, job: &Self::Job) -> EntityId {
        job.id.clone()
    }

    async fn pending(&self) -> DomainResult<Vec<ThumbnailJob>> {
        self.service.thumbnails.list_pending().await
    }

    async fn claim(&self, job: &ThumbnailJob) -> DomainResult<bool> {
        let slot = match self
            .service
            .slots
            .acquire(&job.user_id, JobKind::Thumbnail, &job.id, self.slot_limit, self.slot_ttl)
            .await
        {
            Ok(slot) => slot,
            Err(DomainError::ConcurrencyLimitExceeded(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        let claimed = self
            .service
            .thumbnails
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

    async fn execute(&self, job: &ThumbnailJob, stop: watch::Receiver<bool>) -> DomainResult<()> {
        check_stop(&stop)?;
        let file = self.service.files.get(&job.file_id).await?;
        let source = self.blob.get(&file.path).await?;

        check_stop(&stop)?;
        let rendered = self.renderer.render(&source, job.size)?;
        self.blob.put(&thumbnail_key(&file.id, job.size), &rendered).await?;

        let mut current = self.service.thumbnails.get(&job.id).await?;
        current.status = JobStatus::Completed;
        current.error_message = None;
        self.service.thumbnails.update(current).await?;
        self.release_slot(&job.id).await;
        Ok(())
    }

    async fn fail(&self, job: &ThumbnailJob, error: &DomainError) -> DomainResult<()> {
        self.release_slot(&job.id).await;
        let mut current = self.service.thumbnails.get(&job.id).await?;
        current.record_failure(error, self.max_attempts);
        self.service.thumbnails.update(current).await?;
        Ok(())
    }
}
