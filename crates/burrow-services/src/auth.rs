// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Auth injection shared by the HTTP-backed adapters.
//!
//! Injection happens after the request URL is final and is visible to the
//! privacy layer at dispatch time — which is what lets `user_agent` auth
//! flag its User-Agent as load-bearing via the preserve sentinel.

use anyhow::Context;
use burrow_config::{AuthConfig, AuthMethod};
use burrow_privacy::PRESERVE_UA_HEADER;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, USER_AGENT};
use url::Url;

const DEFAULT_KEY_PARAM: &str = "api_key";
const DEFAULT_KEY_HEADER: &str = "X-API-Key";

/// Apply `auth` to an outbound request's URL and headers. Credentials are
/// expected in resolved (working copy) form.
pub(crate) fn inject(auth: &AuthConfig, url: &mut Url, headers: &mut HeaderMap) -> anyhow::Result<()> {
    match auth.method {
        AuthMethod::ApiKey => {
            let key = auth.key.as_deref().unwrap_or_default();
            let param = auth.key_param.as_deref().unwrap_or(DEFAULT_KEY_PARAM);
            url.query_pairs_mut().append_pair(param, key);
        }
        AuthMethod::ApiKeyHeader => {
            let key = auth.key.as_deref().unwrap_or_default();
            let name = auth.key_param.as_deref().unwrap_or(DEFAULT_KEY_HEADER);
            headers.insert(
                HeaderName::from_bytes(name.as_bytes())
                    .with_context(|| format!("invalid auth header name {name:?}"))?,
                HeaderValue::from_str(key).context("invalid api key value")?,
            );
        }
        AuthMethod::Bearer => {
            let token = auth.token.as_deref().unwrap_or_default();
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .context("invalid bearer token value")?,
            );
        }
        AuthMethod::UserAgent => {
            let value = auth.value.as_deref().unwrap_or_default();
            headers.insert(
                USER_AGENT,
                HeaderValue::from_str(value).context("invalid user-agent value")?,
            );
            headers.insert(
                HeaderName::from_static(PRESERVE_UA_HEADER),
                HeaderValue::from_static("true"),
            );
        }
        AuthMethod::None => {}
    }
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
