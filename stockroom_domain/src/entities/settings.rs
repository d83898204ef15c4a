// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Settings Entity
//!
//! Per-user system settings, one row per (tenant, user). The main currency
//! is a process-wide invariant: once set to a non-null value it can never be
//! changed to a different one, because every stored converted price is
//! denominated in it. Setting the same value again is idempotent.
//!
//! Settings are patched by dotted key (`system.main_currency`,
//! `uiconfig.theme`, ...) so the handler layer can map JSON:API patch
//! operations straight through.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation;
use crate::value_objects::EntityId;
use crate::DomainError;

/// Per-user configuration of the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub id: EntityId,
    pub tenant_id: EntityId,
    pub user_id: EntityId,
    pub main_currency: Option<String>,
    pub theme: Option<String>,
    pub show_debug_info: bool,
    pub default_date_format: Option<String>,
    pub default_page_size: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Settings {
    pub fn new(tenant_id: EntityId, user_id: EntityId) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            tenant_id,
            user_id,
            main_currency: None,
            theme: None,
            show_debug_info: false,
            default_date_format: None,
            default_page_size: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the main currency, honouring its immutability invariant.
    pub fn set_main_currency(&mut self, currency: &str) -> Result<(), DomainError> {
        validation::validate_currency(currency)?;
        match &self.main_currency {
            Some(existing) if existing == currency => Ok(()),
            Some(_) => Err(DomainError::MainCurrencyAlreadySet),
            None => {
                self.main_currency = Some(currency.to_string());
                Ok(())
            }
        }
    }

    /// Applies one dotted-key patch operation.
    pub fn patch(&mut self, key: &str, value: &serde_json::Value) -> Result<(), DomainError> {
        let as_string = |field: &str| -> Result<String, DomainError> {
            value
                .as_str()
                .map(str::to_owned)
                .ok_or_else(|| DomainError::validation(field, "expected a string value"))
        };
        match key {
            "system.main_currency" => {
                let currency = as_string("MainCurrency")?;
                self.set_main_currency(&currency)?;
            }
            "uiconfig.theme" => self.theme = Some(as_string("Theme")?),
            "uiconfig.show_debug_info" => {
                self.show_debug_info = value
                    .as_bool()
                    .ok_or_else(|| DomainError::validation("ShowDebugInfo", "expected a boolean value"))?;
            }
            "uiconfig.default_date_format" => {
                self.default_date_format = Some(as_string("DefaultDateFormat")?)
            }
            "uiconfig.default_page_size" => {
                let size = value
                    .as_u64()
                    .ok_or_else(|| DomainError::validation("DefaultPageSize", "expected a positive integer"))?;
                self.default_page_size = Some(size as u32);
            }
            other => {
                return Err(DomainError::validation(
                    "SettingName",
                    format!("unknown setting: {other}"),
                ))
            }
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings() -> Settings {
        Settings::new(EntityId::new(), EntityId::new())
    }

    #[test]
    fn main_currency_immutable_once_set() {
        let mut s = settings();
        s.patch("system.main_currency", &json!("USD")).unwrap();
        assert_eq!(s.main_currency.as_deref(), Some("USD"));

        let err = s.patch("system.main_currency", &json!("EUR")).unwrap_err();
        assert!(matches!(err, DomainError::MainCurrencyAlreadySet));
        assert_eq!(s.main_currency.as_deref(), Some("USD"));
    }

    #[test]
    fn same_main_currency_is_idempotent() {
        let mut s = settings();
        s.set_main_currency("USD").unwrap();
        assert!(s.set_main_currency("USD").is_ok());
    }

    #[test]
    fn unknown_key_rejected() {
        let mut s = settings();
        assert!(s.patch("system.bogus", &json!("x")).is_err());
    }

    #[test]
    fn ui_settings_patch() {
        let mut s = settings();
        s.patch("uiconfig.theme", &json!("dark")).unwrap();
        s.patch("uiconfig.show_debug_info", &json!(true)).unwrap();
        s.patch("uiconfig.default_page_size", &json!(25)).unwrap();
        assert_eq!(s.theme.as_deref(), Some("dark"));
        assert!(s.show_debug_info);
        assert_eq!(s.default_page_size, Some(25));
    }
}
