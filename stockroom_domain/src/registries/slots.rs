// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Concurrency-slot registry contract.

use async_trait::async_trait;
use chrono::Duration;

use crate::entities::{JobKind, OperationSlot};
use crate::value_objects::EntityId;
use crate::DomainResult;

/// Persistence contract for per-user concurrency slots.
///
/// Slots enforce fairness across users on top of the worker-wide semaphore:
/// at most `limit` live slots per (user, job kind). Expired slots are
/// reclaimed during acquisition so crashed holders free capacity on their
/// own.
#[async_trait]
pub trait SlotRegistry: Send + Sync {
    /// Acquires a slot for the bound user or fails with
    /// `ConcurrencyLimitExceeded` when `limit` live slots already exist.
    async fn acquire(
        &self,
        user_id: &EntityId,
        job_kind: JobKind,
        job_id: &EntityId,
        limit: usize,
        ttl: Duration,
    ) -> DomainResult<OperationSlot>;

    /// Releases a held slot; releasing an unknown slot is a `NotFound`.
    async fn release(&self, slot_id: &EntityId) -> DomainResult<()>;

    /// Live slots currently held by (user, kind).
    async fn live_count(&self, user_id: &EntityId, job_kind: JobKind) -> DomainResult<usize>;
}
