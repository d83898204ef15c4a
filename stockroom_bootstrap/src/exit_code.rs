// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Exit Code Management
//!
//! Standardized Unix exit codes following BSD `sysexits.h` conventions.
//!
//! CLI collaborators observe: 0 for success, 1 for general failure, and the
//! 64-78 range for specific conditions (usage errors, malformed data,
//! unreadable input, configuration problems).

use std::fmt;

/// Exit codes following Unix conventions (BSD sysexits.h).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful termination (0)
    #[default]
    Success = 0,

    /// General error (1)
    Error = 1,

    /// Command line usage error (64): invalid, missing, or unknown arguments
    UsageError = 64,

    /// Data format error (65): malformed artifact or migration file
    DataError = 65,

    /// Cannot open input (66): file not found or unreadable
    NoInput = 66,

    /// Service unavailable (69): backend not reachable
    Unavailable = 69,

    /// Internal software error (70)
    SoftwareError = 70,

    /// Configuration error (78): bad DSN or settings
    ConfigError = 78,
}

impl ExitCode {
    /// Converts to the raw process exit status.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Terminates the process with this exit code.
    pub fn exit(self) -> ! {
        std::process::exit(self.as_i32())
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExitCode::Success => "success",
            ExitCode::Error => "error",
            ExitCode::UsageError => "usage error",
            ExitCode::DataError => "data error",
            ExitCode::NoInput => "no input",
            ExitCode::Unavailable => "unavailable",
            ExitCode::SoftwareError => "software error",
            ExitCode::ConfigError => "configuration error",
        };
        write!(f, "{} ({})", name, self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_sysexits() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::Error.as_i32(), 1);
        assert_eq!(ExitCode::UsageError.as_i32(), 64);
        assert_eq!(ExitCode::ConfigError.as_i32(), 78);
    }

    #[test]
    fn default_is_success() {
        assert_eq!(ExitCode::default(), ExitCode::Success);
    }
}
