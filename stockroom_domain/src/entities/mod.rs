// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Entity Model
//!
//! Typed records for the hierarchical entity graph:
//!
//! ```text
//! Tenant ── Users ── Locations ── Areas ── Commodities ── Images/Manuals/Invoices
//!                                                          (weak refs to Files)
//! Files, Exports, RestoreOperations/Steps, Settings, ThumbnailJobs, OperationSlots
//! ```
//!
//! Every entity carries an opaque id, its owning (tenant, user) scope, and
//! created/updated timestamps. Validation lives on the entities themselves;
//! registries call `validate` before persisting.

mod area;
mod commodity;
mod export;
mod file;
mod location;
mod restore;
mod settings;
mod slot;
mod status;
mod tenant;
mod thumbnail;
mod user;

pub use area::Area;
pub use commodity::{Commodity, CommodityStatus, CommodityType};
pub use export::{Export, ExportStats, ExportType, SelectedItem, SelectedItemKind};
pub use file::{CommodityFile, File, FileType};
pub use location::Location;
pub use restore::{RestoreOperation, RestoreStep, StepResult};
pub use settings::Settings;
pub use slot::{JobKind, OperationSlot, SlotStatus};
pub use status::JobStatus;
pub use tenant::{Tenant, TenantStatus};
pub use thumbnail::ThumbnailJob;
pub use user::{User, UserRole};
