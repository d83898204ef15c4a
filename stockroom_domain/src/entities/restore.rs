// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Restore Entities
//!
//! A restore replays an export artifact into the live graph. The operation
//! row tracks the overall state machine; one [`RestoreStep`] is persisted
//! per logical unit (location, area, commodity, file payload) with its
//! outcome, forming a durable step log.
//!
//! Re-running a failed operation is idempotent per step: steps that already
//! applied are recorded as skipped on the second pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::JobStatus;
use crate::value_objects::EntityId;
use crate::DomainError;

/// Outcome of one restore step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepResult {
    Applied,
    Skipped,
    Failed,
}

/// A multi-step ingestion of an export back into the live graph.
/// Strongly owns its steps: deleting the operation deletes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreOperation {
    pub id: EntityId,
    pub tenant_id: EntityId,
    pub user_id: EntityId,
    pub export_id: EntityId,
    pub status: JobStatus,
    pub applied_count: u32,
    pub skipped_count: u32,
    pub failed_count: u32,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RestoreOperation {
    pub fn new(tenant_id: EntityId, user_id: EntityId, export_id: EntityId) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            tenant_id,
            user_id,
            export_id,
            status: JobStatus::Pending,
            applied_count: 0,
            skipped_count: 0,
            failed_count: 0,
            error_message: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Tallies one step outcome into the operation counters.
    pub fn record_step(&mut self, result: StepResult) {
        match result {
            StepResult::Applied => self.applied_count += 1,
            StepResult::Skipped => self.skipped_count += 1,
            StepResult::Failed => self.failed_count += 1,
        }
    }

    /// Finishes the operation: Completed only when no step failed.
    pub fn finish(&mut self) {
        if self.failed_count == 0 {
            self.status = JobStatus::Completed;
        } else {
            self.status = JobStatus::Failed;
            self.error_message = Some(format!(
                "{} of {} steps failed",
                self.failed_count,
                self.applied_count + self.skipped_count + self.failed_count
            ));
        }
        self.completed_at = Some(Utc::now());
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.export_id.as_str().is_empty() {
            return Err(DomainError::field_required("ExportID"));
        }
        Ok(())
    }
}

/// One durable entry in the restore step log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreStep {
    pub id: EntityId,
    pub tenant_id: EntityId,
    pub user_id: EntityId,
    pub restore_operation_id: EntityId,
    /// Stable logical-unit name, e.g. `location:kitchen` - re-runs match on it.
    pub name: String,
    pub result: StepResult,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RestoreStep {
    pub fn new(
        operation: &RestoreOperation,
        name: impl Into<String>,
        result: StepResult,
        reason: Option<String>,
    ) -> Self {
        Self {
            id: EntityId::new(),
            tenant_id: operation.tenant_id.clone(),
            user_id: operation.user_id.clone(),
            restore_operation_id: operation.id.clone(),
            name: name.into(),
            result,
            reason,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operation() -> RestoreOperation {
        RestoreOperation::new(EntityId::new(), EntityId::new(), EntityId::new())
    }

    #[test]
    fn finish_completes_without_failures() {
        let mut op = operation();
        op.record_step(StepResult::Applied);
        op.record_step(StepResult::Skipped);
        op.finish();
        assert_eq!(op.status, JobStatus::Completed);
        assert!(op.error_message.is_none());
    }

    #[test]
    fn finish_fails_with_any_failed_step() {
        let mut op = operation();
        op.record_step(StepResult::Applied);
        op.record_step(StepResult::Failed);
        op.finish();
        assert_eq!(op.status, JobStatus::Failed);
        assert_eq!(op.error_message.as_deref(), Some("1 of 2 steps failed"));
    }
}
