// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Logging Initialisation
//!
//! Installs the global tracing subscriber for the process. Called exactly
//! once at startup; later calls are ignored so tests that share a process
//! can initialise freely.

use tracing_subscriber::EnvFilter;

use crate::config::LogLevel;

/// Initialises the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured level when present, which keeps the
/// operator escape hatch available without any config plumbing.
pub fn init_tracing(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string().to_lowercase()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_initialisation_is_harmless() {
        init_tracing(LogLevel::Debug);
        init_tracing(LogLevel::Info);
    }
}
