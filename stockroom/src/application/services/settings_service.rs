// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Settings service: dotted-key patches with the main-currency invariant
//! enforced twice - on the entity patch and again by the registry against
//! the stored row.

use serde_json::Value;

use stockroom_domain::entities::Settings;
use stockroom_domain::registries::RegistrySet;
use stockroom_domain::DomainResult;

/// Per-user settings operations.
pub struct SettingsService {
    set: RegistrySet,
}

impl SettingsService {
    pub fn new(set: RegistrySet) -> Self {
        Self { set }
    }

    pub async fn get(&self) -> DomainResult<Settings> {
        self.set.settings.get().await
    }

    /// Applies one dotted-key patch (`system.main_currency`,
    /// `uiconfig.theme`, ...) and persists the result.
    pub async fn patch(&self, key: &str, value: &Value) -> DomainResult<Settings> {
        let mut settings = self.set.settings.get().await?;
        settings.patch(key, value)?;
        self.set.settings.save(settings).await
    }

    /// Current main currency, if configured.
    pub async fn main_currency(&self) -> DomainResult<Option<String>> {
        Ok(self.set.settings.get().await?.main_currency)
    }
}
