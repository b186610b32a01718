// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Content-addressed TTL cache, as a decorator over any [`Service`].
//!
//! Entries live at `<cache_root>/<service>/<fingerprint>.json` and are
//! plain pretty-printed JSON so a user can inspect exactly what a service
//! returned and when. Corruption is handled by deletion, never repair;
//! error results are never cached.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::{Service, ServiceResult};

/// Cache key: SHA-256 over `service\0tool\0k1=v1\0k2=v2…` with params in
/// key order, truncated to 128 bits. Deterministic for any map holding the
/// same entries.
pub fn fingerprint(service: &str, tool: &str, params: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(service.as_bytes());
    hasher.update([0]);
    hasher.update(tool.as_bytes());
    for (k, v) in params {
        hasher.update([0]);
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
    }
    hex::encode(&hasher.finalize()[..16])
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    service: String,
    tool: String,
    params: BTreeMap<String, String>,
    timestamp: DateTime<Utc>,
    ttl_seconds: u64,
    /// Raw result bytes, base64.
    data: String,
    #[serde(default)]
    error: String,
}

pub struct CachedService {
    inner: Arc<dyn Service>,
    root: PathBuf,
    ttl: Duration,
}

impl CachedService {
    pub fn new(inner: Arc<dyn Service>, root: PathBuf, ttl: Duration) -> Self {
        Self { inner, root, ttl }
    }

    fn entry_path(&self, tool: &str, params: &BTreeMap<String, String>) -> PathBuf {
        self.root
            .join(self.inner.name())
            .join(format!("{}.json", fingerprint(self.inner.name(), tool, params)))
    }

    /// A fresh-enough, well-formed entry, or `None`. Any malformed file is
    /// deleted on sight — stale-on-corrupt data must never be served.
    fn lookup(&self, tool: &str, params: &BTreeMap<String, String>) -> Option<ServiceResult> {
        let path = self.entry_path(tool, params);
        if !path.is_file() {
            return None;
        }
        let parsed: Option<(CacheEntry, Vec<u8>)> = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str::<CacheEntry>(&text).ok())
            .and_then(|entry| {
                BASE64
                    .decode(&entry.data)
                    .ok()
                    .map(|data| (entry, data))
            });
        let Some((entry, data)) = parsed else {
            warn!(path = %path.display(), "deleting corrupt cache entry");
            let _ = std::fs::remove_file(&path);
            return None;
        };

        let age = Utc::now().signed_duration_since(entry.timestamp);
        if age.num_seconds() < 0 || age.num_seconds() as u64 > self.ttl.as_secs() {
            return None;
        }

        debug!(service = %entry.service, tool = %entry.tool, "cache hit");
        Some(ServiceResult {
            service: entry.service,
            tool: entry.tool,
            url: String::new(),
            data,
            timestamp: entry.timestamp,
            error: None,
        })
    }

    /// Best-effort write; a full disk degrades to cacheless operation.
    fn store(&self, tool: &str, params: &BTreeMap<String, String>, result: &ServiceResult) {
        let entry = CacheEntry {
            service: result.service.clone(),
            tool: result.tool.clone(),
            params: params.clone(),
            timestamp: result.timestamp,
            ttl_seconds: self.ttl.as_secs(),
            data: BASE64.encode(&result.data),
            error: String::new(),
        };
        let path = self.entry_path(tool, params);
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(&entry)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            std::fs::write(&path, json)
        };
        if let Err(e) = write() {
            warn!(path = %path.display(), error = %e, "cache write failed");
        }
    }
}

#[async_trait]
impl Service for CachedService {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn execute(
        &self,
        tool: &str,
        params: &BTreeMap<String, String>,
    ) -> anyhow::Result<ServiceResult> {
        if self.ttl.is_zero() {
            return self.inner.execute(tool, params).await;
        }
        if let Some(hit) = self.lookup(tool, params) {
            return Ok(hit);
        }
        let result = self.inner.execute(tool, params).await?;
        if result.is_ok() {
            self.store(tool, params, &result);
        }
        Ok(result)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
