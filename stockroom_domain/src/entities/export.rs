// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Export Entity
//!
//! An export serialises a selected sub-graph (and optionally the binary
//! payloads of its files) into an XML artifact stored as a blob. The entity
//! records what was requested, the job state machine, the resulting artifact
//! reference, and the statistics the artifact parser re-validates.
//!
//! Exports are soft-deletable: `Delete` sets `deleted_at` and removes the
//! row from live lists while keeping it reachable through the deleted-list
//! view; a later hard-delete erases the row and its blob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::JobStatus;
use crate::value_objects::EntityId;
use crate::DomainError;

/// What an export covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportType {
    FullDatabase,
    Commodities,
    Locations,
    SelectedItems,
    Imported,
}

impl ExportType {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportType::FullDatabase => "full_database",
            ExportType::Commodities => "commodities",
            ExportType::Locations => "locations",
            ExportType::SelectedItems => "selected_items",
            ExportType::Imported => "imported",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "full_database" => Ok(Self::FullDatabase),
            "commodities" => Ok(Self::Commodities),
            "locations" => Ok(Self::Locations),
            "selected_items" => Ok(Self::SelectedItems),
            "imported" => Ok(Self::Imported),
            other => Err(DomainError::validation("Type", format!("unknown export type: {other}"))),
        }
    }
}

/// Kind of entity addressed by a selected-items export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectedItemKind {
    Location,
    Area,
    Commodity,
}

/// One root of the sub-graph a selected-items export covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedItem {
    pub kind: SelectedItemKind,
    pub id: EntityId,
}

/// Counts and sizes recorded by the export writer and re-validated by the
/// artifact parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExportStats {
    pub location_count: u32,
    pub area_count: u32,
    pub commodity_count: u32,
    pub image_count: u32,
    pub invoice_count: u32,
    pub manual_count: u32,
    pub binary_data_count: u32,
    pub file_size: u64,
}

/// A long-running export job and its resulting artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Export {
    pub id: EntityId,
    pub tenant_id: EntityId,
    pub user_id: EntityId,
    #[serde(rename = "type")]
    pub export_type: ExportType,
    pub status: JobStatus,
    pub description: String,
    pub selected_items: Vec<SelectedItem>,
    pub include_file_data: bool,
    /// Weak reference to the artifact file; nulled when the file is deleted.
    pub file_id: Option<EntityId>,
    pub stats: ExportStats,
    pub error_message: Option<String>,
    pub created_date: DateTime<Utc>,
    pub completed_date: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Export {
    pub fn new(tenant_id: EntityId, user_id: EntityId, export_type: ExportType) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            tenant_id,
            user_id,
            export_type,
            status: JobStatus::Pending,
            description: String::new(),
            selected_items: Vec::new(),
            include_file_data: false,
            file_id: None,
            stats: ExportStats::default(),
            error_message: None,
            created_date: now,
            completed_date: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Records a successful run: artifact reference, stats, terminal state.
    pub fn complete(&mut self, file_id: EntityId, stats: ExportStats) {
        self.status = JobStatus::Completed;
        self.file_id = Some(file_id);
        self.stats = stats;
        self.error_message = None;
        self.completed_date = Some(Utc::now());
    }

    /// Records a failed run with the error kind and message.
    pub fn fail(&mut self, error: &DomainError) {
        self.status = JobStatus::Failed;
        self.error_message = Some(format!("{}: {}", error.category(), error));
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.export_type == ExportType::SelectedItems && self.selected_items.is_empty() {
            return Err(DomainError::field_required("SelectedItems"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selected_items_export_requires_items() {
        let export = Export::new(EntityId::new(), EntityId::new(), ExportType::SelectedItems);
        assert!(export.validate().is_err());

        let full = Export::new(EntityId::new(), EntityId::new(), ExportType::FullDatabase);
        assert!(full.validate().is_ok());
    }

    #[test]
    fn complete_records_artifact_and_stats() {
        let mut export = Export::new(EntityId::new(), EntityId::new(), ExportType::Locations);
        let file_id = EntityId::new();
        let stats = ExportStats {
            location_count: 2,
            ..Default::default()
        };
        export.complete(file_id.clone(), stats);
        assert_eq!(export.status, JobStatus::Completed);
        assert_eq!(export.file_id, Some(file_id));
        assert_eq!(export.stats.location_count, 2);
        assert!(export.completed_date.is_some());
    }

    #[test]
    fn export_type_round_trips() {
        for t in [
            ExportType::FullDatabase,
            ExportType::Commodities,
            ExportType::Locations,
            ExportType::SelectedItems,
            ExportType::Imported,
        ] {
            assert_eq!(ExportType::parse(t.as_str()).unwrap(), t);
        }
        assert!(ExportType::parse("bogus").is_err());
    }
}
