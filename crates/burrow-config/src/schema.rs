// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Configuration error, one variant per validation rule.
///
/// Every variant names the offending entity so the CLI can surface
/// "which service / which tool" without a stack trace.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("service has no name")]
    UnnamedService,
    #[error("duplicate service name {0:?}")]
    DuplicateService(String),
    #[error("service {0:?}: invalid endpoint {1:?}")]
    InvalidEndpoint(String, String),
    #[error("service {service:?}: auth method {method:?} requires a non-empty {field:?}")]
    MissingCredential {
        service: String,
        method: String,
        field: &'static str,
    },
    #[error("service {service:?}, tool {tool:?}: path must start with '/'")]
    RelativeToolPath { service: String, tool: String },
    #[error("service {service:?}, tool {tool:?}: path placeholder {{{placeholder}}} has no matching path param")]
    UnboundPlaceholder {
        service: String,
        tool: String,
        placeholder: String,
    },
    #[error("service {service:?}, tool {tool:?}: path param {param:?} maps to no {{placeholder}} in the path")]
    DanglingPathParam {
        service: String,
        tool: String,
        param: String,
    },
    #[error("llm provider has no name")]
    UnnamedProvider,
    #[error("duplicate llm provider name {0:?}")]
    DuplicateProvider(String),
    #[error("llm provider {0:?}: type {1:?} requires an endpoint")]
    ProviderMissingEndpoint(String, String),
    #[error("privacy route references unknown service {0:?}")]
    RouteUnknownService(String),
    #[error("duplicate privacy route for service {0:?}")]
    DuplicateRoute(String),
    #[error("invalid proxy value {0:?}: {1}")]
    InvalidProxy(String, String),
    #[error("rendering.wrap_width must be 0 (auto) or at least 20, got {0}")]
    WrapWidthOutOfRange(u16),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub privacy: PrivacyConfig,
    /// System application handoff (viewer, editor). Consumed by the outer
    /// CLI layers only; the core validates shape and nothing else.
    #[serde(default)]
    pub apps: AppsConfig,
    /// Terminal rendering preferences. Consumed by the report viewer.
    #[serde(default)]
    pub rendering: RenderingConfig,
    /// Context ledger retention hints. Consumed by external tooling.
    #[serde(default)]
    pub context: ContextConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Rest,
    Mcp,
    Rss,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceKind::Rest => write!(f, "rest"),
            ServiceKind::Mcp => write!(f, "mcp"),
            ServiceKind::Rss => write!(f, "rss"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ServiceKind,
    pub endpoint: String,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Optional URL of a machine-readable API description. Fetched with a
    /// short timeout and a 1 MiB cap by the configuration wizard; the core
    /// only validates that it parses as a URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<String>,
    #[serde(default)]
    pub tools: Vec<ToolConfig>,
    /// Result cache TTL. 0 disables caching for this service.
    #[serde(default)]
    pub cache_ttl_seconds: u64,
    /// Per-fetch item limit for feed-shaped services. 0 means the adapter
    /// default (20).
    #[serde(default)]
    pub max_items: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    ApiKey,
    ApiKeyHeader,
    Bearer,
    UserAgent,
    #[default]
    None,
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::ApiKey => write!(f, "api_key"),
            AuthMethod::ApiKeyHeader => write!(f, "api_key_header"),
            AuthMethod::Bearer => write!(f, "bearer"),
            AuthMethod::UserAgent => write!(f, "user_agent"),
            AuthMethod::None => write!(f, "none"),
        }
    }
}

/// Per-service authentication.
///
/// Credential fields (`key`, `token`, `value`) may contain `${VAR}` / `$VAR`
/// environment references. They are resolved on a short-lived working copy
/// at run time ([`crate::resolve_credentials`]); the stored form always
/// keeps the reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub method: AuthMethod,
    /// API key for `api_key` / `api_key_header`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Query-param or header name the key is sent under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_param: Option<String>,
    /// Bearer token for `bearer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Literal User-Agent for `user_agent`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    #[default]
    Query,
    Path,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamConfig {
    pub name: String,
    /// Free-form type hint ("string", "date", …). Not interpreted by the
    /// core; the wizard uses it for prompting.
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Wire name the value is sent under. Defaults to `name`.
    #[serde(default)]
    pub maps_to: String,
    #[serde(default, rename = "in")]
    pub location: ParamLocation,
}

impl ParamConfig {
    /// Wire key for this param: `maps_to` when set, else `name`.
    pub fn wire_name(&self) -> &str {
        if self.maps_to.is_empty() {
            &self.name
        } else {
            &self.maps_to
        }
    }
}

fn default_method() -> String {
    "GET".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: String,
    #[serde(default = "default_method")]
    pub method: String,
    /// Path template appended to the service endpoint. Must start with '/'.
    /// `{placeholder}` tokens are substituted from `in: path` params.
    pub path: String,
    /// Name of the param whose raw value becomes the request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub params: Vec<ParamConfig>,
}

impl ToolConfig {
    /// `{placeholder}` names appearing in the path template.
    pub fn path_placeholders(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut rest = self.path.as_str();
        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}') else {
                break;
            };
            out.push(rest[open + 1..open + close].to_string());
            rest = &rest[open + close + 1..];
        }
        out
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    Openrouter,
    Llamacpp,
    Passthrough,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Ollama => write!(f, "ollama"),
            ProviderKind::Openrouter => write!(f, "openrouter"),
            ProviderKind::Llamacpp => write!(f, "llamacpp"),
            ProviderKind::Passthrough => write!(f, "passthrough"),
        }
    }
}

/// Where a provider's completions are computed, which controls whether
/// source attribution is stripped from prompts before they leave the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyClass {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// May hold a `${VAR}` reference; resolved per run, never saved resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub privacy: PrivacyClass,
    /// Request timeout override in seconds. Defaults: local 300, remote 120.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ProviderConfig {
    /// Effective request timeout in seconds.
    pub fn effective_timeout(&self) -> u64 {
        self.timeout_seconds.unwrap_or(match self.privacy {
            PrivacyClass::Local => 300,
            PrivacyClass::Remote => 120,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyRoute {
    pub service: String,
    pub proxy: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyConfig {
    /// Replace service names and endpoint hosts with neutral labels in
    /// prompts sent to `privacy: remote` providers.
    #[serde(default = "default_true")]
    pub strip_attribution_for_remote: bool,
    /// Proxy for services without an explicit route. Empty / "none" /
    /// "direct" = no proxy; "tor" = socks5h://127.0.0.1:9050; otherwise a
    /// proxy URL (http, https, socks5, socks5h).
    #[serde(default)]
    pub default_proxy: String,
    #[serde(default)]
    pub routes: Vec<ProxyRoute>,
    #[serde(default = "default_true")]
    pub minimize_requests: bool,
    #[serde(default = "default_true")]
    pub strip_referrers: bool,
    #[serde(default = "default_true")]
    pub randomize_user_agent: bool,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            strip_attribution_for_remote: true,
            default_proxy: String::new(),
            routes: Vec::new(),
            minimize_requests: true,
            strip_referrers: true,
            randomize_user_agent: true,
        }
    }
}

impl PrivacyConfig {
    /// Proxy value for a named service: its route if one exists, else the
    /// default. The returned string still uses the config grammar
    /// ("", "none", "tor", URL) — callers parse it at client-build time.
    pub fn proxy_for(&self, service: &str) -> &str {
        self.routes
            .iter()
            .find(|r| r.service == service)
            .map(|r| r.proxy.as_str())
            .unwrap_or(&self.default_proxy)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    Rich,
    Plain,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderingConfig {
    #[serde(default)]
    pub mode: RenderMode,
    /// Wrap width for the terminal viewer. 0 = auto.
    #[serde(default)]
    pub wrap_width: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// 0 = unlimited.
    #[serde(default)]
    pub max_entries_per_type: u64,
    /// 0 = keep forever.
    #[serde(default)]
    pub max_age_days: u64,
}

/// True when a credential field passes validation: non-empty text, where an
/// unresolved `${VAR}` reference counts as literal non-empty text.
fn credential_present(v: &Option<String>) -> bool {
    v.as_deref().is_some_and(|s| !s.trim().is_empty())
}

impl Config {
    /// Validate the whole document. Called after load and before save;
    /// the first violated rule is returned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for svc in &self.services {
            if svc.name.trim().is_empty() {
                return Err(ConfigError::UnnamedService);
            }
            if !names.insert(svc.name.as_str()) {
                return Err(ConfigError::DuplicateService(svc.name.clone()));
            }
            if let Err(e) = url::Url::parse(&svc.endpoint) {
                return Err(ConfigError::InvalidEndpoint(svc.name.clone(), e.to_string()));
            }
            if let Some(spec) = &svc.spec {
                if let Err(e) = url::Url::parse(spec) {
                    return Err(ConfigError::InvalidEndpoint(svc.name.clone(), e.to_string()));
                }
            }
            validate_auth(&svc.name, &svc.auth)?;
            for tool in &svc.tools {
                validate_tool(&svc.name, tool)?;
            }
        }

        let mut providers = HashSet::new();
        for p in &self.llm.providers {
            if p.name.trim().is_empty() {
                return Err(ConfigError::UnnamedProvider);
            }
            if !providers.insert(p.name.as_str()) {
                return Err(ConfigError::DuplicateProvider(p.name.clone()));
            }
            // Passthrough needs no endpoint; the HTTP-backed kinds do.
            if p.kind != ProviderKind::Passthrough
                && p.endpoint.as_deref().unwrap_or("").trim().is_empty()
            {
                return Err(ConfigError::ProviderMissingEndpoint(
                    p.name.clone(),
                    p.kind.to_string(),
                ));
            }
        }

        parse_proxy_value(&self.privacy.default_proxy)
            .map_err(|e| ConfigError::InvalidProxy(self.privacy.default_proxy.clone(), e))?;
        let mut routed = HashSet::new();
        for route in &self.privacy.routes {
            if !names.contains(route.service.as_str()) {
                return Err(ConfigError::RouteUnknownService(route.service.clone()));
            }
            if !routed.insert(route.service.as_str()) {
                return Err(ConfigError::DuplicateRoute(route.service.clone()));
            }
            parse_proxy_value(&route.proxy)
                .map_err(|e| ConfigError::InvalidProxy(route.proxy.clone(), e))?;
        }

        if self.rendering.wrap_width != 0 && self.rendering.wrap_width < 20 {
            return Err(ConfigError::WrapWidthOutOfRange(self.rendering.wrap_width));
        }
        Ok(())
    }

    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.llm.providers.iter().find(|p| p.name == name)
    }
}

fn validate_auth(service: &str, auth: &AuthConfig) -> Result<(), ConfigError> {
    let missing = |field: &'static str| ConfigError::MissingCredential {
        service: service.to_string(),
        method: auth.method.to_string(),
        field,
    };
    match auth.method {
        AuthMethod::ApiKey | AuthMethod::ApiKeyHeader => {
            if !credential_present(&auth.key) {
                return Err(missing("key"));
            }
        }
        AuthMethod::Bearer => {
            if !credential_present(&auth.token) {
                return Err(missing("token"));
            }
        }
        AuthMethod::UserAgent => {
            if !credential_present(&auth.value) {
                return Err(missing("value"));
            }
        }
        AuthMethod::None => {}
    }
    Ok(())
}

fn validate_tool(service: &str, tool: &ToolConfig) -> Result<(), ConfigError> {
    if !tool.path.starts_with('/') {
        return Err(ConfigError::RelativeToolPath {
            service: service.to_string(),
            tool: tool.name.clone(),
        });
    }
    let placeholders = tool.path_placeholders();
    let path_params: Vec<&str> = tool
        .params
        .iter()
        .filter(|p| p.location == ParamLocation::Path)
        .map(|p| p.wire_name())
        .collect();
    for ph in &placeholders {
        if !path_params.iter().any(|p| p == ph) {
            return Err(ConfigError::UnboundPlaceholder {
                service: service.to_string(),
                tool: tool.name.clone(),
                placeholder: ph.clone(),
            });
        }
    }
    for p in &path_params {
        if !placeholders.iter().any(|ph| ph == p) {
            return Err(ConfigError::DanglingPathParam {
                service: service.to_string(),
                tool: tool.name.clone(),
                param: p.to_string(),
            });
        }
    }
    Ok(())
}

/// Parse a proxy value from the config grammar into an optional proxy URL.
///
/// Returns `Ok(None)` for direct connections (empty, "none", "direct"),
/// `Ok(Some(url))` for "tor" (expanded to the local SOCKS daemon) or an
/// explicit proxy URL with an http/https/socks5/socks5h scheme and a host.
pub fn parse_proxy_value(value: &str) -> Result<Option<String>, String> {
    let v = value.trim();
    if v.is_empty() || v.eq_ignore_ascii_case("none") || v.eq_ignore_ascii_case("direct") {
        return Ok(None);
    }
    if v.eq_ignore_ascii_case("tor") {
        return Ok(Some("socks5h://127.0.0.1:9050".to_string()));
    }
    let parsed = url::Url::parse(v).map_err(|e| e.to_string())?;
    match parsed.scheme() {
        "http" | "https" | "socks5" | "socks5h" => {}
        other => return Err(format!("unsupported proxy scheme {other:?}")),
    }
    if parsed.host_str().unwrap_or("").is_empty() {
        return Err("proxy URL has no host".to_string());
    }
    Ok(Some(parsed.to_string()))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
