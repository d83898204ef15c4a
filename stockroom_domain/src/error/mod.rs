// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain error system.

mod domain_error;

pub use domain_error::DomainError;
