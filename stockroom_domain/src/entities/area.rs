// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Area entity - a subdivision of a location.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation;
use crate::value_objects::EntityId;
use crate::DomainError;

/// A named subdivision of a location (a room, a shelf, a box).
/// The referenced location must exist; the name is unique within the owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Area {
    pub id: EntityId,
    pub tenant_id: EntityId,
    pub user_id: EntityId,
    pub location_id: EntityId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Area {
    pub fn new(
        tenant_id: EntityId,
        user_id: EntityId,
        location_id: EntityId,
        name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            tenant_id,
            user_id,
            location_id,
            name: name.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        validation::require(&self.name, "Name")?;
        validation::require(self.location_id.as_str(), "LocationID")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DomainError;

    #[test]
    fn empty_name_reports_field() {
        let area = Area::new(EntityId::new(), EntityId::new(), EntityId::new(), "");
        assert!(matches!(
            area.validate(),
            Err(DomainError::FieldRequired { field_name }) if field_name == "Name"
        ));
    }
}
