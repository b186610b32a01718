// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;

use async_trait::async_trait;
use burrow_config::{AuthConfig, ParamLocation, ServiceConfig, ToolConfig};
use burrow_privacy::PrivacyHttp;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use tracing::debug;
use url::Url;

use crate::{auth, http_error, read_capped, Service, ServiceResult, MAX_BODY_BYTES};

/// Characters escaped when a param value lands inside a path segment.
const PATH_COMPONENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'%')
    .add(b'&')
    .add(b'=')
    .add(b'+');

/// Generic REST adapter: declared tools, path templating, query mapping,
/// optional raw JSON body, auth injection.
pub struct RestService {
    name: String,
    endpoint: String,
    auth: AuthConfig,
    tools: Vec<ToolConfig>,
    http: PrivacyHttp,
}

impl RestService {
    pub fn new(cfg: &ServiceConfig, http: PrivacyHttp) -> anyhow::Result<Self> {
        Url::parse(&cfg.endpoint)
            .map_err(|e| anyhow::anyhow!("service {:?}: invalid endpoint: {e}", cfg.name))?;
        Ok(Self {
            name: cfg.name.clone(),
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            auth: cfg.auth.clone(),
            tools: cfg.tools.clone(),
            http,
        })
    }

    fn tool(&self, name: &str) -> anyhow::Result<&ToolConfig> {
        self.tools
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| anyhow::anyhow!("service {:?}: unknown tool {name:?}", self.name))
    }

    /// Resolve the tool's path template and query mapping into a full URL.
    fn build_url(&self, tool: &ToolConfig, params: &BTreeMap<String, String>) -> anyhow::Result<Url> {
        let mut path = tool.path.clone();
        for param in &tool.params {
            if param.location != ParamLocation::Path {
                continue;
            }
            let value = params.get(&param.name).ok_or_else(|| {
                anyhow::anyhow!(
                    "service {:?}, tool {:?}: missing path param {:?}",
                    self.name,
                    tool.name,
                    param.name
                )
            })?;
            let escaped = utf8_percent_encode(value, PATH_COMPONENT).to_string();
            path = path.replace(&format!("{{{}}}", param.wire_name()), &escaped);
        }

        let mut url = Url::parse(&format!("{}{}", self.endpoint, path))
            .map_err(|e| anyhow::anyhow!("service {:?}: building URL: {e}", self.name))?;

        // Query params append after any query the template already carries.
        for param in &tool.params {
            if param.location != ParamLocation::Query {
                continue;
            }
            if let Some(value) = params.get(&param.name) {
                url.query_pairs_mut().append_pair(param.wire_name(), value);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl Service for RestService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        tool_name: &str,
        params: &BTreeMap<String, String>,
    ) -> anyhow::Result<ServiceResult> {
        let tool = self.tool(tool_name)?;
        let mut url = self.build_url(tool, params)?;

        let method = reqwest::Method::from_bytes(tool.method.as_bytes())
            .map_err(|_| anyhow::anyhow!("tool {:?}: bad method {:?}", tool.name, tool.method))?;

        let mut headers = reqwest::header::HeaderMap::new();
        auth::inject(&self.auth, &mut url, &mut headers)?;

        let mut builder = self.http.request(method, url.clone()).headers(headers);
        if let Some(body_param) = &tool.body {
            if let Some(body) = params.get(body_param) {
                builder = builder
                    .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                    .body(body.clone());
            }
        }
        let request = builder
            .build()
            .map_err(|e| anyhow::anyhow!("tool {:?}: building request: {e}", tool.name))?;

        debug!(service = %self.name, tool = %tool.name, url = %url, "rest fetch");

        let display_url = url.as_str();
        let response = match self.http.execute(request).await {
            Ok(r) => r,
            Err(e) => {
                return Ok(ServiceResult::failed(
                    &self.name,
                    tool_name,
                    display_url,
                    e.to_string(),
                ))
            }
        };

        let status = response.status();
        let body = match read_capped(response, MAX_BODY_BYTES).await {
            Ok(b) => b,
            Err(e) => {
                return Ok(ServiceResult::failed(
                    &self.name,
                    tool_name,
                    display_url,
                    e.to_string(),
                ))
            }
        };

        if status.as_u16() >= 400 {
            return Ok(ServiceResult::failed(
                &self.name,
                tool_name,
                display_url,
                http_error(status, &body),
            ));
        }
        Ok(ServiceResult::ok(&self.name, tool_name, display_url, body))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_config::{AuthMethod, ParamConfig, ServiceKind};
    use burrow_privacy::{build_client, PrivacyPolicy};
    use std::time::Duration;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_service(endpoint: &str, tools: Vec<ToolConfig>, auth: AuthConfig) -> RestService {
        let cfg = ServiceConfig {
            name: "testsvc".into(),
            kind: ServiceKind::Rest,
            endpoint: endpoint.into(),
            auth,
            spec: None,
            tools,
            cache_ttl_seconds: 0,
            max_items: 0,
        };
        let client = build_client(None, Duration::from_secs(5)).unwrap();
        RestService::new(&cfg, PrivacyHttp::new(client, PrivacyPolicy::disabled())).unwrap()
    }

    fn tool(name: &str, path: &str, params: Vec<ParamConfig>) -> ToolConfig {
        ToolConfig {
            name: name.into(),
            method: "GET".into(),
            path: path.into(),
            body: None,
            params,
        }
    }

    fn query_param_cfg(name: &str, maps_to: &str) -> ParamConfig {
        ParamConfig {
            name: name.into(),
            kind: "string".into(),
            maps_to: maps_to.into(),
            location: ParamLocation::Query,
        }
    }

    fn path_param_cfg(name: &str) -> ParamConfig {
        ParamConfig {
            name: name.into(),
            kind: "string".into(),
            maps_to: String::new(),
            location: ParamLocation::Path,
        }
    }

    #[tokio::test]
    async fn plain_get_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_string("sunny"))
            .mount(&server)
            .await;

        let svc = make_service(&server.uri(), vec![tool("forecast", "/forecast", vec![])], AuthConfig::default());
        let result = svc.execute("forecast", &BTreeMap::new()).await.unwrap();
        assert!(result.is_ok());
        assert_eq!(result.data, b"sunny");
        assert_eq!(result.tool, "forecast");
    }

    #[tokio::test]
    async fn unknown_tool_is_a_hard_error() {
        let svc = make_service("https://api.example.com", vec![], AuthConfig::default());
        let err = svc.execute("nope", &BTreeMap::new()).await.unwrap_err();
        assert!(err.to_string().contains("unknown tool"));
    }

    #[tokio::test]
    async fn path_params_substituted_and_escaped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/points/39.7,-104.9/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let svc = make_service(
            &server.uri(),
            vec![tool(
                "point",
                "/points/{coords}/forecast",
                vec![path_param_cfg("coords")],
            )],
            AuthConfig::default(),
        );
        let mut params = BTreeMap::new();
        params.insert("coords".to_string(), "39.7,-104.9".to_string());
        let result = svc.execute("point", &params).await.unwrap();
        assert!(result.is_ok(), "error: {:?}", result.error);
    }

    #[tokio::test]
    async fn query_params_use_maps_to_and_preserve_template_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/alerts/active"))
            .and(query_param("area", "CO"))
            .and(query_param("severity", "extreme"))
            .respond_with(ResponseTemplate::new(200).set_body_string("alerts"))
            .mount(&server)
            .await;

        let svc = make_service(
            &server.uri(),
            vec![tool(
                "alerts",
                "/alerts/active?severity=extreme",
                vec![query_param_cfg("state", "area")],
            )],
            AuthConfig::default(),
        );
        let mut params = BTreeMap::new();
        params.insert("state".to_string(), "CO".to_string());
        let result = svc.execute("alerts", &params).await.unwrap();
        assert!(result.is_ok(), "error: {:?}", result.error);
    }

    #[tokio::test]
    async fn body_param_becomes_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("content-type", "application/json"))
            .and(body_string(r#"{"q":"solar"}"#))
            .respond_with(ResponseTemplate::new(200).set_body_string("found"))
            .mount(&server)
            .await;

        let mut t = tool("search", "/search", vec![]);
        t.method = "POST".into();
        t.body = Some("query".into());
        let svc = make_service(&server.uri(), vec![t], AuthConfig::default());
        let mut params = BTreeMap::new();
        params.insert("query".to_string(), r#"{"q":"solar"}"#.to_string());
        let result = svc.execute("search", &params).await.unwrap();
        assert!(result.is_ok(), "error: {:?}", result.error);
    }

    #[tokio::test]
    async fn http_4xx_becomes_result_error_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such gridpoint"))
            .mount(&server)
            .await;

        let svc = make_service(&server.uri(), vec![tool("forecast", "/forecast", vec![])], AuthConfig::default());
        let result = svc.execute("forecast", &BTreeMap::new()).await.unwrap();
        assert_eq!(result.error.as_deref(), Some("HTTP 404: no such gridpoint"));
    }

    #[tokio::test]
    async fn transport_failure_becomes_result_error() {
        // Nothing listens on this port.
        let svc = make_service(
            "http://127.0.0.1:9",
            vec![tool("x", "/x", vec![])],
            AuthConfig::default(),
        );
        let result = svc.execute("x", &BTreeMap::new()).await.unwrap();
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn api_key_auth_lands_in_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .and(query_param("api_key", "sekrit"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let svc = make_service(
            &server.uri(),
            vec![tool("data", "/data", vec![])],
            AuthConfig {
                method: AuthMethod::ApiKey,
                key: Some("sekrit".into()),
                ..AuthConfig::default()
            },
        );
        let result = svc.execute("data", &BTreeMap::new()).await.unwrap();
        assert!(result.is_ok(), "error: {:?}", result.error);
    }

    #[tokio::test]
    async fn user_agent_auth_survives_privacy_rotation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gridpoints/BOU/62,60/forecast"))
            .and(header("user-agent", "burrow/1.0 qs@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_string("forecast"))
            .mount(&server)
            .await;

        // Full hardening on: rotation must spare the auth UA, and the
        // sentinel must not reach the server.
        let cfg = ServiceConfig {
            name: "weather-gov".into(),
            kind: ServiceKind::Rest,
            endpoint: server.uri(),
            auth: AuthConfig {
                method: AuthMethod::UserAgent,
                value: Some("burrow/1.0 qs@example.com".into()),
                ..AuthConfig::default()
            },
            spec: None,
            tools: vec![tool("forecast", "/gridpoints/BOU/62,60/forecast", vec![])],
            cache_ttl_seconds: 0,
            max_items: 0,
        };
        let client = build_client(None, Duration::from_secs(5)).unwrap();
        let svc = RestService::new(&cfg, PrivacyHttp::new(client, PrivacyPolicy::new(true, true, true))).unwrap();

        let result = svc.execute("forecast", &BTreeMap::new()).await.unwrap();
        assert!(result.is_ok(), "error: {:?}", result.error);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].headers.get("x-burrow-preserve-ua").is_none());
    }
}
