// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! MCP adapter: JSON-RPC 2.0 over HTTP POST.
//!
//! Tools are discovered, not configured: the first execution performs the
//! `initialize` / `tools/list` handshake and memoizes the outcome — success
//! *or* failure — so a dead server is asked exactly once per run. A
//! `Mcp-Session-Id` issued by the server is captured and echoed on every
//! later request. Request ids increase monotonically per client.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use burrow_config::{AuthConfig, ServiceConfig};
use burrow_privacy::PrivacyHttp;
use reqwest::header::{HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

use crate::{auth, read_capped, Service, ServiceResult, MAX_BODY_BYTES};

const PROTOCOL_VERSION: &str = "2025-03-26";
const SESSION_HEADER: &str = "mcp-session-id";

#[derive(Debug, Clone)]
struct ToolInfo {
    name: String,
}

pub struct McpService {
    name: String,
    endpoint: Url,
    auth: AuthConfig,
    http: PrivacyHttp,
    session: Mutex<Option<String>>,
    next_id: AtomicI64,
    /// Discovery outcome, memoized including failure.
    tools: OnceCell<Result<Vec<ToolInfo>, String>>,
}

impl McpService {
    pub fn new(cfg: &ServiceConfig, http: PrivacyHttp) -> anyhow::Result<Self> {
        let endpoint = Url::parse(&cfg.endpoint)
            .map_err(|e| anyhow::anyhow!("service {:?}: invalid endpoint: {e}", cfg.name))?;
        Ok(Self {
            name: cfg.name.clone(),
            endpoint,
            auth: cfg.auth.clone(),
            http,
            session: Mutex::new(None),
            next_id: AtomicI64::new(0),
            tools: OnceCell::new(),
        })
    }

    /// One JSON-RPC round trip. Returns the `result` value, or an error
    /// string for transport, HTTP, envelope, and JSON-RPC failures.
    async fn rpc(&self, method: &str, params: Value) -> Result<Value, String> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let mut url = self.endpoint.clone();
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(session) = self.session.lock().unwrap().clone() {
            if let Ok(value) = HeaderValue::from_str(&session) {
                headers.insert(HeaderName::from_static(SESSION_HEADER), value);
            }
        }
        auth::inject(&self.auth, &mut url, &mut headers).map_err(|e| e.to_string())?;

        let request = self
            .http
            .request(reqwest::Method::POST, url)
            .headers(headers)
            .body(payload.to_string())
            .build()
            .map_err(|e| e.to_string())?;

        debug!(service = %self.name, method, id, "mcp rpc");

        let response = self.http.execute(request).await.map_err(|e| e.to_string())?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session.lock().unwrap() = Some(session.to_string());
        }

        let status = response.status();
        let body = read_capped(response, MAX_BODY_BYTES)
            .await
            .map_err(|e| e.to_string())?;
        if status.as_u16() != 200 {
            return Err(crate::http_error(status, &body));
        }

        let envelope: Value =
            serde_json::from_slice(&body).map_err(|e| format!("invalid JSON-RPC response: {e}"))?;
        if let Some(error) = envelope.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(format!("RPC error {code}: {message}"));
        }
        Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn discover(&self) -> Result<Vec<ToolInfo>, String> {
        self.rpc(
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": "burrow",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        )
        .await?;

        let listed = self.rpc("tools/list", json!({})).await?;
        let tools = listed
            .get("tools")
            .and_then(Value::as_array)
            .ok_or_else(|| "tools/list returned no tool array".to_string())?
            .iter()
            .filter_map(|t| t.get("name").and_then(Value::as_str))
            .map(|name| ToolInfo {
                name: name.to_string(),
            })
            .collect();
        Ok(tools)
    }

    async fn tool_set(&self) -> &Result<Vec<ToolInfo>, String> {
        self.tools.get_or_init(|| self.discover()).await
    }
}

#[async_trait]
impl Service for McpService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        tool: &str,
        params: &BTreeMap<String, String>,
    ) -> anyhow::Result<ServiceResult> {
        let url = self.endpoint.as_str().to_string();

        let tools = match self.tool_set().await {
            Ok(tools) => tools,
            Err(e) => {
                return Ok(ServiceResult::failed(&self.name, tool, &url, e.clone()));
            }
        };
        if !tools.iter().any(|t| t.name == tool) {
            anyhow::bail!("service {:?}: no tool {tool:?}", self.name);
        }

        let arguments: Value = params
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect::<serde_json::Map<String, Value>>()
            .into();

        let result = match self
            .rpc("tools/call", json!({ "name": tool, "arguments": arguments }))
            .await
        {
            Ok(result) => result,
            Err(e) => return Ok(ServiceResult::failed(&self.name, tool, &url, e)),
        };

        let text: String = result
            .get("content")
            .and_then(Value::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                    .filter_map(|b| b.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if result.get("isError").and_then(Value::as_bool) == Some(true) {
            return Ok(ServiceResult::failed(&self.name, tool, &url, text));
        }
        Ok(ServiceResult::ok(&self.name, tool, &url, text.into_bytes()))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
