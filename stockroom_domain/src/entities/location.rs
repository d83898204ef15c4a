// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Location entity - top of the user's physical hierarchy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation;
use crate::value_objects::EntityId;
use crate::DomainError;

/// A physical place (home, office, storage unit) owned by one user.
/// Locations contain areas; the name is unique within the owner scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: EntityId,
    pub tenant_id: EntityId,
    pub user_id: EntityId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Location {
    pub fn new(tenant_id: EntityId, user_id: EntityId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            tenant_id,
            user_id,
            name: name.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        validation::require(&self.name, "Name")
    }
}
