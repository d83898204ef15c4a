// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Background-Job Registries
//!
//! Exports, restore operations, and thumbnail jobs share one worker
//! discipline: workers list pending rows through a service-scoped registry
//! and claim each with a compare-and-swap status transition, so a job is
//! executed by at most one task even with several workers polling.
//!
//! Exports are the soft-deletable family: `delete` tombstones the row out of
//! live views, `list_deleted` exposes the tombstones, and `hard_delete`
//! erases the row for good.

use async_trait::async_trait;

use crate::entities::{Export, JobStatus, RestoreOperation, RestoreStep, ThumbnailJob};
use crate::value_objects::EntityId;
use crate::DomainResult;

/// Persistence contract for exports.
#[async_trait]
pub trait ExportRegistry: Send + Sync {
    async fn create(&self, export: Export) -> DomainResult<Export>;

    /// Live-only view: a soft-deleted row surfaces as `Deleted`.
    async fn get(&self, id: &EntityId) -> DomainResult<Export>;

    /// Live rows in insertion order.
    async fn list(&self) -> DomainResult<Vec<Export>>;

    /// Soft-deleted rows in deletion order.
    async fn list_deleted(&self) -> DomainResult<Vec<Export>>;

    /// Pending jobs in repository order (worker pickup, service scope).
    async fn list_pending(&self) -> DomainResult<Vec<Export>>;

    async fn update(&self, export: Export) -> DomainResult<Export>;

    /// Compare-and-swap status transition keyed on the current status.
    /// Returns `false` when another task won the claim.
    async fn transition(&self, id: &EntityId, from: JobStatus, to: JobStatus) -> DomainResult<bool>;

    /// Nulls `file_id` on every export (live or tombstoned) referencing the
    /// file; returns the number of rows touched. Mirrors the relational
    /// `ON DELETE SET NULL` semantics for the other backends.
    async fn detach_file(&self, file_id: &EntityId) -> DomainResult<usize>;

    /// Soft delete: sets `deleted_at` and hides the row from live views.
    async fn delete(&self, id: &EntityId) -> DomainResult<()>;

    /// Erases the row entirely; the artifact blob is the entity service's
    /// responsibility.
    async fn hard_delete(&self, id: &EntityId) -> DomainResult<()>;

    async fn count(&self) -> DomainResult<usize>;
}

/// Persistence contract for restore operations and their step logs.
///
/// Steps are strongly owned: deleting an operation deletes its steps.
#[async_trait]
pub trait RestoreRegistry: Send + Sync {
    /// Validates that the referenced export exists before persisting.
    async fn create(&self, operation: RestoreOperation) -> DomainResult<RestoreOperation>;

    async fn get(&self, id: &EntityId) -> DomainResult<RestoreOperation>;

    async fn list(&self) -> DomainResult<Vec<RestoreOperation>>;

    async fn list_pending(&self) -> DomainResult<Vec<RestoreOperation>>;

    async fn update(&self, operation: RestoreOperation) -> DomainResult<RestoreOperation>;

    async fn transition(&self, id: &EntityId, from: JobStatus, to: JobStatus) -> DomainResult<bool>;

    async fn delete(&self, id: &EntityId) -> DomainResult<()>;

    async fn count(&self) -> DomainResult<usize>;

    /// Appends one entry to the operation's step log.
    async fn add_step(&self, step: RestoreStep) -> DomainResult<RestoreStep>;

    /// The operation's step log in insertion order.
    async fn steps(&self, operation_id: &EntityId) -> DomainResult<Vec<RestoreStep>>;
}

/// Persistence contract for thumbnail jobs.
#[async_trait]
pub trait ThumbnailRegistry: Send + Sync {
    /// Fails with `AlreadyExists` when the file already has a non-terminal
    /// job: at most one active job per file.
    async fn create(&self, job: ThumbnailJob) -> DomainResult<ThumbnailJob>;

    async fn get(&self, id: &EntityId) -> DomainResult<ThumbnailJob>;

    async fn find_by_file(&self, file_id: &EntityId) -> DomainResult<Option<ThumbnailJob>>;

    async fn list(&self) -> DomainResult<Vec<ThumbnailJob>>;

    async fn list_pending(&self) -> DomainResult<Vec<ThumbnailJob>>;

    async fn update(&self, job: ThumbnailJob) -> DomainResult<ThumbnailJob>;

    async fn transition(&self, id: &EntityId, from: JobStatus, to: JobStatus) -> DomainResult<bool>;

    async fn delete(&self, id: &EntityId) -> DomainResult<()>;

    async fn count(&self) -> DomainResult<usize>;
}
