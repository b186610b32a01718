// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Shared HTTP driver for every backend that speaks the
//! `/v1/chat/completions` wire format.
//!
//! ollama, llama.cpp's server, and OpenRouter all accept the same JSON
//! body, so one driver configured per provider covers all three. Requests
//! are non-streaming: synthesis wants one markdown document, not tokens.

use anyhow::Context;
use async_trait::async_trait;
use burrow_config::{PrivacyClass, ProviderConfig, ProviderKind};
use serde_json::{json, Value};
use tracing::debug;

use crate::Provider;

pub struct HttpProvider {
    name: String,
    kind: ProviderKind,
    model: String,
    api_key: Option<String>,
    chat_url: String,
    privacy: PrivacyClass,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl HttpProvider {
    /// Build from a credential-resolved provider config.
    pub fn from_config(cfg: &ProviderConfig) -> anyhow::Result<Self> {
        if cfg.kind == ProviderKind::Passthrough {
            anyhow::bail!("provider {:?}: passthrough has no HTTP driver", cfg.name);
        }
        let endpoint = cfg
            .endpoint
            .as_deref()
            .with_context(|| format!("provider {:?} has no endpoint", cfg.name))?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.effective_timeout()))
            .build()?;
        Ok(Self {
            name: cfg.name.clone(),
            kind: cfg.kind,
            model: cfg.model.clone().unwrap_or_default(),
            api_key: cfg.api_key.clone().filter(|k| !k.trim().is_empty()),
            chat_url: chat_url(endpoint),
            privacy: cfg.privacy,
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            client,
        })
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }
}

/// Derive the chat completions URL from a configured endpoint, tolerating
/// bases given with or without the `/v1` suffix.
fn chat_url(endpoint: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    if base.ends_with("/v1") {
        format!("{base}/chat/completions")
    } else {
        format!("{base}/v1/chat/completions")
    }
}

#[async_trait]
impl Provider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn privacy(&self) -> PrivacyClass {
        self.privacy
    }

    async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String> {
        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "stream": false,
        });
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(m) = self.max_tokens {
            body["max_tokens"] = json!(m);
        }

        debug!(provider = %self.name, model = %self.model, "completion request");

        let mut request = self.client.post(&self.chat_url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("provider {:?}: request failed", self.name))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let snippet: String = text.chars().take(512).collect();
            anyhow::bail!("provider {:?}: HTTP {}: {snippet}", self.name, status.as_u16());
        }

        let parsed: Value = serde_json::from_str(&text)
            .with_context(|| format!("provider {:?}: invalid response JSON", self.name))?;
        let content = parsed["choices"][0]["message"]["content"]
            .as_str()
            .with_context(|| format!("provider {:?}: response has no message content", self.name))?;
        Ok(content.to_string())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cfg(name: &str, kind: ProviderKind, endpoint: &str, key: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            name: name.into(),
            kind,
            endpoint: Some(endpoint.into()),
            api_key: key.map(Into::into),
            model: Some("test-model".into()),
            privacy: if kind == ProviderKind::Openrouter {
                PrivacyClass::Remote
            } else {
                PrivacyClass::Local
            },
            timeout_seconds: Some(5),
            context_window: None,
            temperature: Some(0.2),
            max_tokens: Some(1024),
        }
    }

    #[test]
    fn chat_url_tolerates_v1_suffix() {
        assert_eq!(
            chat_url("http://localhost:11434"),
            "http://localhost:11434/v1/chat/completions"
        );
        assert_eq!(
            chat_url("https://openrouter.ai/api/v1"),
            "https://openrouter.ai/api/v1/chat/completions"
        );
        assert_eq!(
            chat_url("http://127.0.0.1:8080/v1/"),
            "http://127.0.0.1:8080/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn completion_round_trip_with_bearer_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer or-key"))
            .and(body_partial_json(json!({"model": "test-model", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "# Synthesized\n\ndone"}}]
            })))
            .mount(&server)
            .await;

        let provider =
            HttpProvider::from_config(&cfg("cloud", ProviderKind::Openrouter, &server.uri(), Some("or-key")))
                .unwrap();
        let out = provider.complete("be brief", "data here").await.unwrap();
        assert_eq!(out, "# Synthesized\n\ndone");
        assert_eq!(provider.privacy(), PrivacyClass::Remote);
    }

    #[tokio::test]
    async fn local_provider_sends_no_auth_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "ok"}}]
            })))
            .mount(&server)
            .await;

        let provider =
            HttpProvider::from_config(&cfg("local", ProviderKind::Ollama, &server.uri(), None)).unwrap();
        provider.complete("s", "u").await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn error_status_fails_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let provider =
            HttpProvider::from_config(&cfg("cloud", ProviderKind::Openrouter, &server.uri(), Some("k")))
                .unwrap();
        let err = provider.complete("s", "u").await.unwrap_err();
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("slow down"));
    }

    #[tokio::test]
    async fn malformed_response_fails_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
            .mount(&server)
            .await;

        let provider =
            HttpProvider::from_config(&cfg("local", ProviderKind::Llamacpp, &server.uri(), None)).unwrap();
        assert!(provider.complete("s", "u").await.is_err());
    }

    #[test]
    fn passthrough_has_no_http_driver() {
        let mut c = cfg("p", ProviderKind::Passthrough, "http://x", None);
        c.kind = ProviderKind::Passthrough;
        assert!(HttpProvider::from_config(&c).is_err());
    }
}
