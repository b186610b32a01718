// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Service adapters: the collection half of the pipeline.
//!
//! Every external source Burrow queries — REST APIs, RSS/Atom feeds, MCP
//! servers — implements the single [`Service`] contract. Each adapter owns
//! its own HTTP transport with its per-service proxy pinned at construction,
//! so no two services ever share a connection pool, and the privacy layer
//! hardens every request on its way out.
//!
//! Error discipline: `Err` from [`Service::execute`] means a programmer or
//! configuration error (unknown tool, unbuildable URL). Transport failures,
//! non-2xx statuses, and malformed payloads are *data*, reported in
//! [`ServiceResult::error`] so a flaky source never aborts a run.

mod auth;
mod cache;
mod mcp;
mod registry;
mod rest;
mod rss;
mod spec_fetch;

pub use cache::{fingerprint, CachedService};
pub use mcp::McpService;
pub use registry::Registry;
pub use rest::RestService;
pub use rss::RssService;
pub use spec_fetch::{fetch_spec, SPEC_MAX_BYTES, SPEC_TIMEOUT};

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use burrow_config::{parse_proxy_value, PrivacyConfig, ServiceConfig, ServiceKind};
use burrow_privacy::{build_client, PrivacyHttp, PrivacyPolicy};
use chrono::{DateTime, Utc};

/// Hard cap on any response body the adapters will read.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
/// How much of an error body is kept in `ServiceResult::error`.
pub const ERROR_SNIPPET_BYTES: usize = 4 * 1024;
/// Default per-request timeout for adapters.
pub const ADAPTER_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of one `(service, tool, params)` fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceResult {
    pub service: String,
    pub tool: String,
    pub url: String,
    pub data: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    /// Transport / remote / parse failure. Empty data with no error is a
    /// legitimate (cacheable) result.
    pub error: Option<String>,
}

impl ServiceResult {
    pub fn ok(service: &str, tool: &str, url: &str, data: Vec<u8>) -> Self {
        Self {
            service: service.to_string(),
            tool: tool.to_string(),
            url: url.to_string(),
            data,
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn failed(service: &str, tool: &str, url: &str, error: impl Into<String>) -> Self {
        Self {
            service: service.to_string(),
            tool: tool.to_string(),
            url: url.to_string(),
            data: Vec::new(),
            timestamp: Utc::now(),
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.as_deref().map_or(true, str::is_empty)
    }
}

/// The adapter contract. Stable seam for new source types.
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(
        &self,
        tool: &str,
        params: &BTreeMap<String, String>,
    ) -> anyhow::Result<ServiceResult>;
}

/// Build the adapter for one configured service: isolated client with its
/// resolved proxy, privacy policy, auth working copy, and — when
/// `cache_ttl_seconds > 0` — the TTL cache decorator.
///
/// `cfg` must already be the credential-resolved working copy.
pub fn build_service(
    cfg: &ServiceConfig,
    privacy: &PrivacyConfig,
    cache_root: &Path,
) -> anyhow::Result<Arc<dyn Service>> {
    let proxy = parse_proxy_value(privacy.proxy_for(&cfg.name))
        .map_err(|e| anyhow::anyhow!("service {:?}: {e}", cfg.name))?;
    let client = build_client(proxy.as_deref(), ADAPTER_TIMEOUT)?;
    let policy = PrivacyPolicy::new(
        privacy.strip_referrers,
        privacy.randomize_user_agent,
        privacy.minimize_requests,
    );
    let http = PrivacyHttp::new(client, policy);

    let inner: Arc<dyn Service> = match cfg.kind {
        ServiceKind::Rest => Arc::new(RestService::new(cfg, http)?),
        ServiceKind::Rss => Arc::new(RssService::new(cfg, http)?),
        ServiceKind::Mcp => Arc::new(McpService::new(cfg, http)?),
    };

    if cfg.cache_ttl_seconds > 0 {
        Ok(Arc::new(CachedService::new(
            inner,
            cache_root.to_path_buf(),
            Duration::from_secs(cfg.cache_ttl_seconds),
        )))
    } else {
        Ok(inner)
    }
}

/// Read a response body, enforcing `cap` bytes.
pub(crate) async fn read_capped(
    mut response: reqwest::Response,
    cap: usize,
) -> reqwest::Result<Vec<u8>> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let remaining = cap.saturating_sub(body.len());
        if remaining == 0 {
            break;
        }
        let take = remaining.min(chunk.len());
        body.extend_from_slice(&chunk[..take]);
    }
    Ok(body)
}

/// "HTTP <code>" plus an optional truncated body snippet.
pub(crate) fn http_error(status: reqwest::StatusCode, body: &[u8]) -> String {
    let snippet_len = body.len().min(ERROR_SNIPPET_BYTES);
    let snippet = String::from_utf8_lossy(&body[..snippet_len]);
    let snippet = snippet.trim();
    if snippet.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {}", status.as_u16(), snippet)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
