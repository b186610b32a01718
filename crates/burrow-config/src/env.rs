// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Credential resolution against the process environment.
//!
//! Credential fields may carry `${VAR}` / `$VAR` references. Resolution
//! happens on a working copy built once per run; the [`crate::Config`] that
//! is loaded from and saved to disk always keeps the reference text, so
//! resolved secrets never touch persistent storage.

use crate::{Config, ProviderKind};

fn expand(value: &str) -> String {
    // Unknown variables are left as-is, so a missing $VAR stays a literal
    // reference and still counts as a present credential for validation.
    shellexpand::env_with_context_no_errors(value, |var: &str| std::env::var(var).ok()).into_owned()
}

fn expand_opt(value: &mut Option<String>) {
    if let Some(v) = value {
        *v = expand(v);
    }
}

/// Build a working copy of `config` with every credential field expanded
/// against the process environment. The input is untouched.
pub fn resolve_credentials(config: &Config) -> Config {
    let mut resolved = config.clone();
    for svc in &mut resolved.services {
        expand_opt(&mut svc.auth.key);
        expand_opt(&mut svc.auth.token);
        expand_opt(&mut svc.auth.value);
    }
    for provider in &mut resolved.llm.providers {
        if provider.kind != ProviderKind::Passthrough {
            expand_opt(&mut provider.api_key);
        }
    }
    resolved
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
