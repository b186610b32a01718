// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Outbound HTTP privacy hardening.
//!
//! Every adapter owns its own [`reqwest::Client`] (compartmentalization —
//! no two services ever share a connection pool or proxy), wrapped in a
//! [`PrivacyHttp`] that applies the configured [`PrivacyPolicy`] to each
//! request immediately before dispatch:
//!
//! - `strip_referrers` removes `Referer` and `Origin`.
//! - `randomize_user_agent` overwrites `User-Agent` from a round-robin pool
//!   of common desktop browsers — unless the request carries the
//!   [`PRESERVE_UA_HEADER`] sentinel, set by adapters whose upstream
//!   authenticates on a specific User-Agent. The sentinel itself is always
//!   removed; it must never reach the destination server.
//! - `minimize_requests` drops `X-Requested-With` and `DNT` and pins
//!   `Accept: */*`.
//!
//! The policy consumes a request and returns the hardened one; the caller's
//! builder output is moved, never aliased, so nothing upstream observes the
//! mutation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::header::{HeaderValue, ACCEPT, ORIGIN, REFERER, USER_AGENT};
use tracing::trace;

/// Sentinel header: "this request's User-Agent is load-bearing, leave it".
/// Stripped unconditionally before the request goes out.
pub const PRESERVE_UA_HEADER: &str = "x-burrow-preserve-ua";

/// Fixed rotation pool of common desktop browser User-Agent strings.
const UA_POOL: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

/// Header-level privacy policy applied to every outbound request.
#[derive(Debug)]
pub struct PrivacyPolicy {
    strip_referrers: bool,
    randomize_user_agent: bool,
    minimize_requests: bool,
    ua_cursor: AtomicUsize,
}

impl PrivacyPolicy {
    pub fn new(strip_referrers: bool, randomize_user_agent: bool, minimize_requests: bool) -> Self {
        Self {
            strip_referrers,
            randomize_user_agent,
            minimize_requests,
            ua_cursor: AtomicUsize::new(0),
        }
    }

    /// A policy with every hardening switched off; requests pass unchanged.
    pub fn disabled() -> Self {
        Self::new(false, false, false)
    }

    /// Next User-Agent from the rotation pool.
    fn next_user_agent(&self) -> &'static str {
        let idx = self.ua_cursor.fetch_add(1, Ordering::Relaxed);
        UA_POOL[idx % UA_POOL.len()]
    }

    /// Apply the policy to `request` and return the hardened request.
    pub fn apply(&self, mut request: reqwest::Request) -> reqwest::Request {
        let headers = request.headers_mut();

        if self.strip_referrers {
            headers.remove(REFERER);
            headers.remove(ORIGIN);
        }

        let preserve_ua = headers.remove(PRESERVE_UA_HEADER).is_some();
        if self.randomize_user_agent && !preserve_ua {
            let ua = self.next_user_agent();
            headers.insert(USER_AGENT, HeaderValue::from_static(ua));
            trace!(ua, "rotated user-agent");
        }

        if self.minimize_requests {
            headers.remove("x-requested-with");
            headers.remove("dnt");
            headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        }

        request
    }
}

/// An adapter's private HTTP transport: an isolated [`reqwest::Client`]
/// (optionally pinned to a proxy) plus the privacy policy applied on every
/// send. The policy wraps the client; it never replaces it.
#[derive(Debug)]
pub struct PrivacyHttp {
    client: reqwest::Client,
    policy: PrivacyPolicy,
}

impl PrivacyHttp {
    pub fn new(client: reqwest::Client, policy: PrivacyPolicy) -> Self {
        Self { client, policy }
    }

    /// Start a request builder on the underlying client.
    pub fn request(&self, method: reqwest::Method, url: reqwest::Url) -> reqwest::RequestBuilder {
        self.client.request(method, url)
    }

    /// Harden and dispatch a built request.
    pub async fn execute(&self, request: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        let request = self.policy.apply(request);
        self.client.execute(request).await
    }
}

/// Build an isolated client for one adapter, with its resolved proxy pinned
/// at construction. `proxy` is an already-parsed proxy URL (see
/// `burrow-config`'s proxy grammar); `None` means a direct connection.
pub fn build_client(proxy: Option<&str>, timeout: Duration) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(5));
    if let Some(proxy_url) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
    } else {
        // An explicit direct connection also ignores HTTP_PROXY etc. —
        // routing is decided by Burrow's config alone.
        builder = builder.no_proxy();
    }
    Ok(builder.build()?)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
