// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use burrow_config::PrivacyClass;

/// One-shot completion contract implemented by every LLM backend. Also
/// consumed directly by the interactive `ask` layer.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Configured provider name, for status display and error messages.
    fn name(&self) -> &str;

    /// Whether completions are computed on this host or shipped to a
    /// third party. Controls attribution stripping in synthesis.
    fn privacy(&self) -> PrivacyClass;

    async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String>;
}

/// The no-model provider: echoes the user prompt. Keeps `ask`-style flows
/// working in configurations with no LLM at all.
pub struct PassthroughProvider;

#[async_trait]
impl Provider for PassthroughProvider {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn privacy(&self) -> PrivacyClass {
        PrivacyClass::Local
    }

    async fn complete(&self, _system: &str, user: &str) -> anyhow::Result<String> {
        Ok(user.to_string())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
