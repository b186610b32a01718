// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Fetch a service's machine-readable API description (`spec` URL).
//!
//! Consumed by the configuration wizard when a user points Burrow at an
//! OpenAPI document or similar. The core never interprets the content; it
//! only enforces the transport guard rails: a short timeout and a 1 MiB
//! read cap, so a misconfigured URL cannot stall or balloon a session.

use std::time::Duration;

use anyhow::Context;

use crate::read_capped;

pub const SPEC_TIMEOUT: Duration = Duration::from_secs(30);
pub const SPEC_MAX_BYTES: usize = 1024 * 1024;

/// Download a spec document, capped at [`SPEC_MAX_BYTES`].
pub async fn fetch_spec(url: &str) -> anyhow::Result<String> {
    let client = reqwest::Client::builder()
        .timeout(SPEC_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(3))
        .build()?;
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("fetching spec {url}"))?;
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("spec {url}: HTTP {}", status.as_u16());
    }
    let body = read_capped(response, SPEC_MAX_BYTES)
        .await
        .with_context(|| format!("reading spec {url}"))?;
    Ok(String::from_utf8_lossy(&body).into_owned())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
