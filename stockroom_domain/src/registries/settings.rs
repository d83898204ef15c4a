// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Settings registry contract.

use async_trait::async_trait;

use crate::entities::Settings;
use crate::DomainResult;

/// Persistence contract for the per-user settings singleton.
///
/// `get` materialises a default row on first access so callers never handle
/// a missing-settings case; `save` enforces main-currency immutability
/// against the stored row even if the caller bypassed `Settings::patch`.
#[async_trait]
pub trait SettingsRegistry: Send + Sync {
    async fn get(&self) -> DomainResult<Settings>;

    async fn save(&self, settings: Settings) -> DomainResult<Settings>;
}
