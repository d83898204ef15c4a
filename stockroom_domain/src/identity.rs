// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Request Identity
//!
//! The caller identity carried by every operation. Handlers bind the
//! authenticated (tenant, user) pair; background workers and the migrator
//! bind the elevated service identity.
//!
//! Identity is an immutable value passed at registry-construction time, not
//! an ambient context: a registry set built for user A can never observe
//! user B's rows, and an operation that reaches a user-aware registry
//! without identity fails with `UserContextRequired` before any storage is
//! touched.

use serde::{Deserialize, Serialize};

use crate::value_objects::EntityId;
use crate::DomainError;

/// Who is performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    /// An authenticated end user inside one tenant.
    User,
    /// The elevated service identity used by workers and migrations.
    Service,
}

/// Immutable per-operation caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestIdentity {
    kind: IdentityKind,
    tenant_id: Option<EntityId>,
    user_id: Option<EntityId>,
}

impl RequestIdentity {
    /// Creates an identity for an authenticated user within a tenant.
    pub fn user(tenant_id: EntityId, user_id: EntityId) -> Self {
        Self {
            kind: IdentityKind::User,
            tenant_id: Some(tenant_id),
            user_id: Some(user_id),
        }
    }

    /// Creates the elevated service identity.
    ///
    /// Service operations see rows across tenants and users; only workers
    /// and admin tooling may hold this value.
    pub fn service() -> Self {
        Self {
            kind: IdentityKind::Service,
            tenant_id: None,
            user_id: None,
        }
    }

    pub fn kind(&self) -> &IdentityKind {
        &self.kind
    }

    pub fn tenant_id(&self) -> Option<&EntityId> {
        self.tenant_id.as_ref()
    }

    pub fn user_id(&self) -> Option<&EntityId> {
        self.user_id.as_ref()
    }

    /// True for the elevated service identity.
    pub fn is_service(&self) -> bool {
        self.kind == IdentityKind::Service
    }

    /// Returns the (tenant, user) pair or fails with `UserContextRequired`.
    pub fn require_user(&self) -> Result<(&EntityId, &EntityId), DomainError> {
        match (&self.tenant_id, &self.user_id) {
            (Some(t), Some(u)) if self.kind == IdentityKind::User => Ok((t, u)),
            _ => Err(DomainError::UserContextRequired),
        }
    }

    /// True when this identity may observe a row owned by (tenant, user).
    ///
    /// The service identity observes everything; a user identity observes
    /// only its own scope.
    pub fn can_access(&self, tenant_id: &EntityId, user_id: &EntityId) -> bool {
        match self.kind {
            IdentityKind::Service => true,
            IdentityKind::User => {
                self.tenant_id.as_ref() == Some(tenant_id) && self.user_id.as_ref() == Some(user_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_identity_requires_both_ids() {
        let identity = RequestIdentity::user(EntityId::parse("t1").unwrap(), EntityId::parse("u1").unwrap());
        let (t, u) = identity.require_user().unwrap();
        assert_eq!(t.as_str(), "t1");
        assert_eq!(u.as_str(), "u1");
    }

    #[test]
    fn service_identity_has_no_user() {
        let identity = RequestIdentity::service();
        assert!(identity.is_service());
        assert!(matches!(
            identity.require_user(),
            Err(DomainError::UserContextRequired)
        ));
    }

    #[test]
    fn cross_tenant_access_denied_for_users() {
        let identity = RequestIdentity::user(EntityId::parse("t1").unwrap(), EntityId::parse("u1").unwrap());
        let other_tenant = EntityId::parse("t2").unwrap();
        let user = EntityId::parse("u1").unwrap();
        assert!(!identity.can_access(&other_tenant, &user));
        assert!(RequestIdentity::service().can_access(&other_tenant, &user));
    }
}
