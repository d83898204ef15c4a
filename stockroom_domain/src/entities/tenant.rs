// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Tenant entity - the root of every ownership chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation;
use crate::value_objects::EntityId;
use crate::DomainError;

/// Operational status of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Suspended,
    Inactive,
}

/// A tenant exclusively owns its users and, transitively, everything those
/// users create. The slug is unique across the system; the optional domain,
/// when present, is unique as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: EntityId,
    pub name: String,
    pub slug: String,
    pub domain: Option<String>,
    pub status: TenantStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn new(name: impl Into<String>, slug: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            name: name.into(),
            slug: slug.into(),
            domain: None,
            status: TenantStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        validation::require(&self.name, "Name")?;
        validation::validate_slug(&self.slug)?;
        if let Some(domain) = &self.domain {
            validation::require(domain, "Domain")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_tenant_passes() {
        let tenant = Tenant::new("Acme Home", "acme-home");
        assert!(tenant.validate().is_ok());
    }

    #[test]
    fn empty_slug_rejected() {
        let mut tenant = Tenant::new("Acme", "acme");
        tenant.slug = String::new();
        assert!(tenant.validate().is_err());
    }
}
