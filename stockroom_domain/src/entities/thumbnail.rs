// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Thumbnail generation job for one file.
//!
//! At most one active job exists per file. Failed runs increment `attempts`
//! until the worker's policy maximum, after which the job stays Failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::JobStatus;
use crate::value_objects::EntityId;
use crate::DomainError;

/// A pending or finished thumbnail rendering job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailJob {
    pub id: EntityId,
    pub tenant_id: EntityId,
    pub user_id: EntityId,
    pub file_id: EntityId,
    pub status: JobStatus,
    /// Target edge length in pixels.
    pub size: u32,
    pub attempts: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ThumbnailJob {
    pub fn new(tenant_id: EntityId, user_id: EntityId, file_id: EntityId, size: u32) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            tenant_id,
            user_id,
            file_id,
            status: JobStatus::Pending,
            size,
            attempts: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Records one failed attempt; requeues while under `max_attempts`.
    pub fn record_failure(&mut self, error: &DomainError, max_attempts: u32) {
        self.attempts += 1;
        self.error_message = Some(format!("{}: {}", error.category(), error));
        self.status = if self.attempts >= max_attempts {
            JobStatus::Failed
        } else {
            JobStatus::Pending
        };
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.file_id.as_str().is_empty() {
            return Err(DomainError::field_required("FileID"));
        }
        if self.size == 0 {
            return Err(DomainError::validation("Size", "must be a positive pixel size"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_requeues_until_policy_maximum() {
        let mut job = ThumbnailJob::new(EntityId::new(), EntityId::new(), EntityId::new(), 256);
        let err = DomainError::storage("blob unavailable");

        job.record_failure(&err, 3);
        assert_eq!(job.status, JobStatus::Pending);
        job.record_failure(&err, 3);
        assert_eq!(job.status, JobStatus::Pending);
        job.record_failure(&err, 3);
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 3);
    }
}
