// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Infrastructure layer: storage backends, workers, artifact codec, signed
//! URLs, blob store port, and the Ptah schema differ/migrator.

pub mod backends;
pub mod ptah;
pub mod services;
pub mod workers;
