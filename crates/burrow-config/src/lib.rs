// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod env;
mod loader;
mod profile;
mod routine;
mod schema;

pub use env::resolve_credentials;
pub use loader::{load, save, Paths};
pub use profile::Profile;
pub use routine::{load_routines, ReportConfig, Routine, SourceConfig, SynthesisConfig};
pub use schema::*;
