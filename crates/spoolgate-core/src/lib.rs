// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spoolgate core: types, configuration and error definitions shared by the
// protocol crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::ClientConfig;
pub use error::{Result, SpoolgateError};
pub use types::*;
