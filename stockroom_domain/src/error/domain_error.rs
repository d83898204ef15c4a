// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! This module provides the single error type shared by every layer of the
//! Stockroom core. Errors are organized around domain failure kinds rather
//! than storage vocabulary: a unique-constraint violation surfaces as
//! [`DomainError::AlreadyExists`] no matter whether it was detected by a SQL
//! constraint, a KV index bucket, or an in-memory map.
//!
//! ## Error Categories
//!
//! ### Lookup and Integrity
//! - **NotFound**: no row matches the requested identifier
//! - **AlreadyExists**: a unique constraint (name, slug, email, domain) holds
//! - **CannotDelete**: the parent still has live children and the caller did
//!   not request recursion
//! - **Deleted**: a soft-deleted row was reached through a live-only view
//!
//! ### Validation and Configuration
//! - **FieldRequired**: a required field is missing; carries the field name
//! - **Validation**: a field is present but malformed
//! - **InvalidConfig**: DSN or capability mismatch at wiring time
//! - **BadDataStructure**: an external artifact is malformed or internally
//!   inconsistent
//! - **MainCurrencyNotSet** / **MainCurrencyAlreadySet**: settings invariants
//!
//! ### Access and Resources
//! - **UserContextRequired**: a user-aware registry was reached without an
//!   authenticated identity
//! - **Unauthorized**: a signed URL or elevated operation failed its check
//! - **ResourceLimitExceeded** / **ConcurrencyLimitExceeded**: a slot refused
//!
//! ### Ambient Infrastructure
//! - **Storage**, **Serialization**, **Io**, **Cancelled**, **Internal**
//!
//! ## Propagation Policy
//!
//! Backends wrap storage failures into a domain kind with entity context;
//! services surface domain kinds unchanged; workers never panic on a job
//! failure - they record the kind and message, transition the job to Failed,
//! and continue.

use thiserror::Error;

/// Domain-level errors for the Stockroom core.
///
/// Each variant represents one failure kind from the error design; message
/// payloads carry the context a caller needs to act (entity type, id, field
/// name). The enum is `Clone` so workers can both persist and log a failure.
#[derive(Error, Debug, Clone)]
pub enum DomainError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} already exists: {detail}")]
    AlreadyExists { entity: &'static str, detail: String },

    #[error("field is required: {field_name}")]
    FieldRequired { field_name: String },

    #[error("validation failed for {field_name}: {reason}")]
    Validation { field_name: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot delete {entity} {id}: {detail}")]
    CannotDelete {
        entity: &'static str,
        id: String,
        detail: String,
    },

    #[error("bad data structure: {0}")]
    BadDataStructure(String),

    #[error("main currency is not set")]
    MainCurrencyNotSet,

    #[error("main currency is already set and cannot be changed")]
    MainCurrencyAlreadySet,

    #[error("operation requires an authenticated user context")]
    UserContextRequired,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),

    #[error("concurrency limit exceeded: {0}")]
    ConcurrencyLimitExceeded(String),

    #[error("{entity} {id} has been deleted")]
    Deleted { entity: &'static str, id: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    /// Creates a `NotFound` error for an entity family and id.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Creates an `AlreadyExists` error carrying the violated uniqueness.
    pub fn already_exists(entity: &'static str, detail: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity,
            detail: detail.into(),
        }
    }

    /// Creates a `FieldRequired` error for the named field.
    pub fn field_required(field_name: impl Into<String>) -> Self {
        Self::FieldRequired {
            field_name: field_name.into(),
        }
    }

    /// Creates a `Validation` error for the named field.
    pub fn validation(field_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field_name: field_name.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidConfig` error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Creates a `CannotDelete` error for a parent with live children.
    pub fn cannot_delete(entity: &'static str, id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::CannotDelete {
            entity,
            id: id.into(),
            detail: detail.into(),
        }
    }

    /// Creates a `BadDataStructure` error for a malformed artifact.
    pub fn bad_data(msg: impl Into<String>) -> Self {
        Self::BadDataStructure(msg.into())
    }

    /// Creates an `Unauthorized` error.
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Creates a `Storage` error wrapping a backend failure.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Creates a `Serialization` error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Creates a `Cancelled` error with the cancellation reason.
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled(reason.into())
    }

    /// Creates an `Internal` error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True when the error should read as "no such row" to external callers.
    ///
    /// Soft-deleted rows reached through a live-only view are reported as
    /// missing rather than leaking their tombstone state.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Deleted { .. })
    }

    /// True when a retry might succeed without operator intervention.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Io(_) | Self::ConcurrencyLimitExceeded(_) | Self::ResourceLimitExceeded(_)
        )
    }

    /// Gets the error category used in logs and job failure records.
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::AlreadyExists { .. } => "already_exists",
            Self::FieldRequired { .. } => "field_required",
            Self::Validation { .. } => "validation",
            Self::InvalidConfig(_) => "invalid_config",
            Self::CannotDelete { .. } => "cannot_delete",
            Self::BadDataStructure(_) => "bad_data_structure",
            Self::MainCurrencyNotSet => "main_currency_not_set",
            Self::MainCurrencyAlreadySet => "main_currency_already_set",
            Self::UserContextRequired => "user_context_required",
            Self::Unauthorized(_) => "unauthorized",
            Self::ResourceLimitExceeded(_) => "resource_limit_exceeded",
            Self::ConcurrencyLimitExceeded(_) => "concurrency_limit_exceeded",
            Self::Deleted { .. } => "deleted",
            Self::Storage(_) => "storage",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
            Self::Cancelled(_) => "cancelled",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_formats_entity_and_id() {
        let err = DomainError::not_found("commodity", "c-1");
        assert_eq!(err.to_string(), "commodity not found: c-1");
        assert_eq!(err.category(), "not_found");
    }

    #[test]
    fn deleted_reads_as_not_found_externally() {
        let err = DomainError::Deleted {
            entity: "export",
            id: "e-1".into(),
        };
        assert!(err.is_not_found());
    }

    #[test]
    fn field_required_carries_field_name() {
        let err = DomainError::field_required("Name");
        match err {
            DomainError::FieldRequired { field_name } => assert_eq!(field_name, "Name"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
