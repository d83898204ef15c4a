// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # User Entity
//!
//! A user belongs to exactly one tenant and exclusively owns the transitive
//! closure of locations, areas, and commodities they create.
//!
//! The password never leaves this module in clear text: `set_password`
//! enforces the password policy and stores an argon2 hash; `verify_password`
//! checks a candidate against the stored hash. The hash field is skipped
//! during serde serialization so API payloads and export artifacts can never
//! leak it.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation;
use crate::value_objects::EntityId;
use crate::DomainError;

/// Authorization role of a user within its tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    User,
}

/// An authenticated account inside one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: EntityId,
    pub tenant_id: EntityId,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(tenant_id: EntityId, email: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            tenant_id,
            email: email.into(),
            name: name.into(),
            role: UserRole::User,
            password_hash: String::new(),
            is_active: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Validates the password policy and stores an argon2 hash.
    pub fn set_password(&mut self, password: &str) -> Result<(), DomainError> {
        validation::validate_password(password)?;
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| DomainError::internal(format!("password hashing failed: {e}")))?;
        self.password_hash = hash.to_string();
        Ok(())
    }

    /// Checks a candidate password against the stored hash.
    pub fn verify_password(&self, candidate: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(&self.password_hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok()
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        validation::validate_email(&self.email)?;
        validation::require(&self.name, "Name")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User::new(EntityId::new(), "jane@example.com", "Jane")
    }

    #[test]
    fn password_round_trip() {
        let mut u = user();
        u.set_password("Sup3rSecret").unwrap();
        assert!(u.verify_password("Sup3rSecret"));
        assert!(!u.verify_password("wrong"));
    }

    #[test]
    fn weak_password_rejected_before_hashing() {
        let mut u = user();
        assert!(u.set_password("weak").is_err());
        assert!(u.password_hash.is_empty());
    }

    #[test]
    fn password_hash_never_serialized() {
        let mut u = user();
        u.set_password("Sup3rSecret").unwrap();
        let json = serde_json::to_value(&u).unwrap();
        assert!(json.get("password_hash").is_none());
    }

    #[test]
    fn invalid_email_rejected() {
        let mut u = user();
        u.email = "nope".into();
        assert!(u.validate().is_err());
    }
}
