// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Blob Store Port
//!
//! Contract consumed by the export writer and thumbnail pipeline. Production
//! drivers (S3 and friends) are external collaborators; this module ships
//! the port plus a memory store for tests and a filesystem store for
//! single-node deployments.
//!
//! Concurrency contract: readers may overlap freely; a writer holds its key
//! exclusively until the write commits. The filesystem store implements the
//! commit with a temp-file rename so a crashed writer never leaves a
//! half-written blob under the final key.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use stockroom_domain::{DomainError, DomainResult};

/// Storage contract for binary payloads, keyed by opaque string.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> DomainResult<()>;

    async fn get(&self, key: &str) -> DomainResult<Vec<u8>>;

    async fn delete(&self, key: &str) -> DomainResult<()>;

    async fn exists(&self, key: &str) -> DomainResult<bool>;
}

/// In-memory blob store for tests and development.
#[derive(Default, Clone)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> DomainResult<()> {
        self.blobs.lock().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> DomainResult<Vec<u8>> {
        self.blobs
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| DomainError::not_found("blob", key))
    }

    async fn delete(&self, key: &str) -> DomainResult<()> {
        self.blobs
            .lock()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| DomainError::not_found("blob", key))
    }

    async fn exists(&self, key: &str) -> DomainResult<bool> {
        Ok(self.blobs.lock().contains_key(key))
    }
}

/// Filesystem blob store rooted at one directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> DomainResult<PathBuf> {
        // Keys are opaque but must stay inside the root.
        if key.is_empty() || key.contains("..") || Path::new(key).is_absolute() {
            return Err(DomainError::validation("BlobKey", "key escapes the blob root"));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> DomainResult<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp-write");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> DomainResult<Vec<u8>> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DomainError::not_found("blob", key))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> DomainResult<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DomainError::not_found("blob", key))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> DomainResult<bool> {
        Ok(tokio::fs::try_exists(self.resolve(key)?).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryBlobStore::new();
        store.put("a/b", b"payload").await.unwrap();
        assert!(store.exists("a/b").await.unwrap());
        assert_eq!(store.get("a/b").await.unwrap(), b"payload");
        store.delete("a/b").await.unwrap();
        assert!(matches!(
            store.get("a/b").await,
            Err(DomainError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn fs_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        store.put("exports/x.xml", b"<inventory/>").await.unwrap();
        assert_eq!(store.get("exports/x.xml").await.unwrap(), b"<inventory/>");
        store.delete("exports/x.xml").await.unwrap();
        assert!(!store.exists("exports/x.xml").await.unwrap());
    }

    #[tokio::test]
    async fn fs_store_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(store.put("../escape", b"x").await.is_err());
        assert!(store.put("/absolute", b"x").await.is_err());
    }
}
