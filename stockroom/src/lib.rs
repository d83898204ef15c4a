// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stockroom
//!
//! Multi-tenant personal-inventory service core. This crate carries the
//! application services and all infrastructure:
//!
//! - **Storage backends** implementing the domain registry contracts:
//!   in-memory (reference), KV (embedded redb), and SQL (PostgreSQL), plus
//!   the capability-aware enhanced wrapper and scheme-based registration.
//! - **Worker pipeline** for exports, restores, and thumbnails: polling
//!   coordinator, weighted semaphore, crash-safe CAS claims, cooperative
//!   cancellation.
//! - **Export artifact codec** (XML with optional embedded payloads) and
//!   the import/restore orchestration built on it.
//! - **Ptah**, the schema differ/migrator: annotation parser, database
//!   introspectors, structural diff, dialect DDL renderers, and the
//!   versioned up/down migration runner.
//!
//! The HTTP surface, CLI command dispatch, and blob-storage drivers are
//! external collaborators; this crate exposes the contracts they consume.

pub mod application;
pub mod infrastructure;
