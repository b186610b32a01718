// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use async_trait::async_trait;
use burrow_config::{Config, PrivacyClass, ProviderKind};
use tracing::debug;

use crate::{HttpProvider, Provider};

/// One successful source's contribution to a report.
#[derive(Debug, Clone)]
pub struct CollectedSection {
    /// Section heading: the source's `context_label` or `service/tool`.
    pub label: String,
    pub service: String,
    pub tool: String,
    /// The service endpoint, used to scrub hosts from remote prompts.
    pub endpoint: String,
    /// Raw result bytes rendered as text.
    pub data: String,
}

/// Everything the synthesis step may see from a run's fan-out. Only
/// successful sources appear as sections; `queried` counts all of them.
#[derive(Debug, Clone, Default)]
pub struct Collected {
    pub sections: Vec<CollectedSection>,
    pub queried: usize,
}

impl Collected {
    /// The collected-results blob in declaration order, as handed to an
    /// LLM: one `## <label>` section per successful source.
    pub fn prose(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            out.push_str(&format!("## {}\n\n{}\n\n", section.label, section.data));
        }
        out
    }

    /// Like [`Collected::prose`], but with every service name and endpoint
    /// host replaced by a neutral `Source <n>` marker, so a remote model
    /// never learns which services the user queries.
    pub fn anonymized_prose(&self) -> String {
        let mut out = String::new();
        for (i, section) in self.sections.iter().enumerate() {
            let marker = format!("Source {}", i + 1);
            let mut data = section.data.replace(&section.service, &marker);
            if !section.endpoint.is_empty() {
                data = data.replace(&section.endpoint, &marker);
                if let Some(host) = url_host(&section.endpoint) {
                    data = data.replace(&host, &marker);
                }
            }
            out.push_str(&format!("## {marker}\n\n{data}\n\n"));
        }
        out
    }
}

fn url_host(endpoint: &str) -> Option<String> {
    let rest = endpoint.split("://").nth(1)?;
    let host = rest.split(['/', ':', '?']).next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// The executor's only coupling to LLMs.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(
        &self,
        system: &str,
        collected: &Collected,
        title: &str,
    ) -> anyhow::Result<String>;
}

/// Deterministic, model-free report renderer.
pub struct PassthroughSynthesizer;

#[async_trait]
impl Synthesizer for PassthroughSynthesizer {
    async fn synthesize(
        &self,
        _system: &str,
        collected: &Collected,
        title: &str,
    ) -> anyhow::Result<String> {
        let mut out = String::new();
        out.push_str(&format!("# {title}\n\n"));
        out.push_str(&format!("**Sources queried:** {}\n", collected.queried));
        out.push_str(&format!("**Successful:** {}\n\n", collected.sections.len()));
        for section in &collected.sections {
            out.push_str(&format!("## {}\n\n", section.label));
            out.push_str(&pretty(&section.data));
            out.push_str("\n\n");
        }
        Ok(out)
    }
}

/// JSON input is pretty-printed; anything else passes through raw.
fn pretty(data: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(data) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| data.to_string()),
        Err(_) => data.to_string(),
    }
}

/// LLM-backed synthesis. When the provider is remote and stripping is on,
/// the prompt is anonymized before it leaves the host.
pub struct LlmSynthesizer {
    provider: Arc<dyn Provider>,
    strip_attribution_for_remote: bool,
}

impl LlmSynthesizer {
    pub fn new(provider: Arc<dyn Provider>, strip_attribution_for_remote: bool) -> Self {
        Self {
            provider,
            strip_attribution_for_remote,
        }
    }

    fn must_strip(&self) -> bool {
        self.strip_attribution_for_remote && self.provider.privacy() == PrivacyClass::Remote
    }
}

#[async_trait]
impl Synthesizer for LlmSynthesizer {
    async fn synthesize(
        &self,
        system: &str,
        collected: &Collected,
        title: &str,
    ) -> anyhow::Result<String> {
        let user = if self.must_strip() {
            collected.anonymized_prose()
        } else {
            collected.prose()
        };
        debug!(
            provider = %self.provider.name(),
            stripped = self.must_strip(),
            sections = collected.sections.len(),
            title,
            "synthesizing report"
        );
        self.provider.complete(system, &user).await
    }
}

/// Resolve a routine's `llm` field into a synthesizer.
///
/// Empty, `none`, and `passthrough` select the deterministic renderer. Any
/// other name must match a configured provider; an unknown name is a fatal
/// configuration error. `config` must be the credential-resolved working
/// copy so HTTP providers see usable keys.
pub fn build_synthesizer(llm: &str, config: &Config) -> anyhow::Result<Arc<dyn Synthesizer>> {
    let name = llm.trim();
    if name.is_empty() || name.eq_ignore_ascii_case("none") || name.eq_ignore_ascii_case("passthrough")
    {
        return Ok(Arc::new(PassthroughSynthesizer));
    }
    let provider_cfg = config
        .provider(name)
        .ok_or_else(|| anyhow::anyhow!("routine references unknown llm provider {name:?}"))?;
    if provider_cfg.kind == ProviderKind::Passthrough {
        return Ok(Arc::new(PassthroughSynthesizer));
    }
    let provider = Arc::new(HttpProvider::from_config(provider_cfg)?);
    Ok(Arc::new(LlmSynthesizer::new(
        provider,
        config.privacy.strip_attribution_for_remote,
    )))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
