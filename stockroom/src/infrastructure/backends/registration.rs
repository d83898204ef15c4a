// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Backend Registration & DSN Wiring
//!
//! Backends are selected by the scheme of a DSN (`memory://`, `kv://<path>`,
//! `sql://<postgres-url>`). Registration happens once at startup into a
//! process-wide map; registering the same scheme twice is an idempotent
//! no-op, and teardown empties the map so a test process can re-register.
//! Unknown schemes fail with `InvalidConfig`.
//!
//! Every opened backend is wrapped with the [`EnhancedFactory`] so callers
//! always see the full query surface.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::info;

use stockroom_domain::registries::RegistryFactory;
use stockroom_domain::{DomainError, DomainResult};

use super::enhanced::EnhancedFactory;
use super::kv::KvBackend;
use super::memory::MemoryBackend;
use super::sql::SqlBackend;

/// A parsed backend DSN: `<scheme>://<host-or-path>[?params]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDsn {
    pub scheme: String,
    pub rest: String,
    pub raw: String,
}

impl BackendDsn {
    /// Splits a DSN into scheme and remainder.
    pub fn parse(dsn: &str) -> DomainResult<Self> {
        let (scheme, rest) = dsn
            .split_once("://")
            .ok_or_else(|| DomainError::invalid_config(format!("DSN has no scheme: {dsn}")))?;
        if scheme.is_empty() {
            return Err(DomainError::invalid_config(format!("DSN has an empty scheme: {dsn}")));
        }
        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            rest: rest.to_string(),
            raw: dsn.to_string(),
        })
    }
}

type Constructor =
    Arc<dyn Fn(BackendDsn) -> BoxFuture<'static, DomainResult<Arc<dyn RegistryFactory>>> + Send + Sync>;

static SCHEMES: Lazy<RwLock<HashMap<String, Constructor>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Registers a backend constructor for a scheme.
///
/// Idempotent: re-registering an existing scheme keeps the first
/// registration and returns `false`.
pub fn register_backend(scheme: &str, constructor: Constructor) -> bool {
    let mut schemes = SCHEMES.write();
    if schemes.contains_key(scheme) {
        return false;
    }
    schemes.insert(scheme.to_string(), constructor);
    true
}

/// Registers the built-in schemes: `memory`, `kv`, `sql`.
pub fn register_default_backends() {
    register_backend(
        "memory",
        Arc::new(|_dsn| Box::pin(async { Ok(Arc::new(MemoryBackend::new()) as Arc<dyn RegistryFactory>) })),
    );
    register_backend(
        "kv",
        Arc::new(|dsn| {
            Box::pin(async move {
                if dsn.rest.is_empty() {
                    return Err(DomainError::invalid_config("kv DSN needs a database path"));
                }
                Ok(Arc::new(KvBackend::open(&dsn.rest)?) as Arc<dyn RegistryFactory>)
            })
        }),
    );
    register_backend(
        "sql",
        Arc::new(|dsn| {
            Box::pin(async move {
                // The relational backend speaks PostgreSQL; hand sqlx the
                // DSN with its native scheme.
                let url = format!("postgres://{}", dsn.rest);
                Ok(Arc::new(SqlBackend::connect(&url).await?) as Arc<dyn RegistryFactory>)
            })
        }),
    );
}

/// Opens the backend selected by `dsn`, wrapped with the enhanced fallback.
pub async fn open_backend(dsn: &str) -> DomainResult<Arc<dyn RegistryFactory>> {
    let parsed = BackendDsn::parse(dsn)?;
    let constructor = {
        let schemes = SCHEMES.read();
        schemes.get(&parsed.scheme).cloned()
    }
    .ok_or_else(|| DomainError::invalid_config(format!("unknown backend scheme: {}", parsed.scheme)))?;

    info!(scheme = %parsed.scheme, "opening storage backend");
    let backend = constructor(parsed).await?;
    Ok(Arc::new(EnhancedFactory::new(backend)))
}

/// Empties the scheme registry.
///
/// Returns the combined teardown error; constructors hold no resources of
/// their own today, so this only reports an empty-registry teardown.
pub fn teardown_backends() -> DomainResult<()> {
    let mut schemes = SCHEMES.write();
    if schemes.is_empty() {
        return Err(DomainError::invalid_config("no backends registered"));
    }
    schemes.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dsn_parse_shapes() {
        let dsn = BackendDsn::parse("kv:///var/lib/stockroom/data.redb").unwrap();
        assert_eq!(dsn.scheme, "kv");
        assert_eq!(dsn.rest, "/var/lib/stockroom/data.redb");

        assert!(BackendDsn::parse("no-scheme").is_err());
        assert!(BackendDsn::parse("://rest").is_err());

        let upper = BackendDsn::parse("MEMORY://").unwrap();
        assert_eq!(upper.scheme, "memory");
    }

    #[tokio::test]
    async fn unknown_scheme_is_invalid_config() {
        register_default_backends();
        let err = match open_backend("carrier-pigeon://coop").await {
            Ok(_) => panic!("expected an error for an unknown scheme"),
            Err(err) => err,
        };
        assert!(matches!(err, DomainError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn memory_scheme_opens() {
        register_default_backends();
        let backend = open_backend("memory://").await.unwrap();
        assert!(backend.user_set(None).is_err());
    }

    #[test]
    fn registration_is_idempotent() {
        register_default_backends();
        let replaced = register_backend(
            "memory",
            Arc::new(|_dsn| {
                Box::pin(async { Ok(Arc::new(MemoryBackend::new()) as Arc<dyn RegistryFactory>) })
            }),
        );
        assert!(!replaced);
    }
}
