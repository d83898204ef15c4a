// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stockroom Bootstrap Layer
//!
//! Process-level plumbing with no domain knowledge: exit codes, logging
//! initialisation, the validated immutable application configuration, and
//! graceful-shutdown coordination.
//!
//! The bootstrap phase runs before any backend is opened and after every
//! worker has stopped; nothing in here touches storage.

pub mod config;
pub mod exit_code;
pub mod logger;
pub mod shutdown;

pub use config::{AppConfig, AppConfigBuilder, LogLevel};
pub use exit_code::ExitCode;
pub use shutdown::{CancellationToken, ShutdownCoordinator};
