// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Operation Slots
//!
//! A slot is a bounded resource ticket held by a background job for a
//! (user, job kind) pair. Slots enforce per-user fairness on top of the
//! worker-wide semaphore: at most N live slots per user and kind, with a
//! monotonic expiry so crashed holders free capacity on their own.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::EntityId;
use crate::DomainError;

/// The worker kind a slot throttles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Export,
    Import,
    Restore,
    Thumbnail,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Export => "export",
            JobKind::Import => "import",
            JobKind::Restore => "restore",
            JobKind::Thumbnail => "thumbnail",
        }
    }
}

/// Lifecycle state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Active,
    Released,
    Expired,
}

/// A per-user concurrency ticket for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSlot {
    pub id: EntityId,
    pub tenant_id: EntityId,
    pub user_id: EntityId,
    pub job_kind: JobKind,
    pub job_id: EntityId,
    pub status: SlotStatus,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OperationSlot {
    pub fn new(
        tenant_id: EntityId,
        user_id: EntityId,
        job_kind: JobKind,
        job_id: EntityId,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            tenant_id,
            user_id,
            job_kind,
            job_id,
            status: SlotStatus::Active,
            acquired_at: now,
            expires_at: now + ttl,
        }
    }

    /// True when the slot still counts against the user's limit.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == SlotStatus::Active && self.expires_at > now
    }

    pub fn release(&mut self) {
        self.status = SlotStatus::Released;
    }

    /// Extends the expiry; the deadline only ever moves forward.
    pub fn extend(&mut self, ttl: Duration) -> Result<(), DomainError> {
        let candidate = Utc::now() + ttl;
        if candidate <= self.expires_at {
            return Err(DomainError::validation("ExpiresAt", "expiry must be monotonic"));
        }
        self.expires_at = candidate;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_until_released_or_expired() {
        let mut slot = OperationSlot::new(
            EntityId::new(),
            EntityId::new(),
            JobKind::Export,
            EntityId::new(),
            Duration::minutes(5),
        );
        let now = Utc::now();
        assert!(slot.is_live(now));

        slot.release();
        assert!(!slot.is_live(now));
    }

    #[test]
    fn expired_slot_not_live() {
        let slot = OperationSlot::new(
            EntityId::new(),
            EntityId::new(),
            JobKind::Thumbnail,
            EntityId::new(),
            Duration::minutes(5),
        );
        let later = Utc::now() + Duration::minutes(10);
        assert!(!slot.is_live(later));
    }

    #[test]
    fn expiry_is_monotonic() {
        let mut slot = OperationSlot::new(
            EntityId::new(),
            EntityId::new(),
            JobKind::Restore,
            EntityId::new(),
            Duration::minutes(10),
        );
        assert!(slot.extend(Duration::minutes(5)).is_err());
        assert!(slot.extend(Duration::minutes(20)).is_ok());
    }
}
