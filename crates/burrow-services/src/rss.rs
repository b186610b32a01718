// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! RSS-2.0 / Atom adapter.
//!
//! One implicit tool, `feed`: fetch the endpoint, detect the dialect from
//! the root element (`<rss>` vs `<feed>`), and normalize into a single JSON
//! shape so routines never care which dialect a source speaks. Descriptions
//! are flattened to plain text (tag scan + entity decode) and dates are
//! normalized to RFC3339 UTC where one of the candidate layouts matches —
//! anything else passes through untouched.

use std::collections::BTreeMap;

use async_trait::async_trait;
use burrow_config::{AuthConfig, ServiceConfig};
use burrow_privacy::PrivacyHttp;
use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::{auth, http_error, read_capped, Service, ServiceResult, MAX_BODY_BYTES};

pub(crate) const DEFAULT_MAX_ITEMS: usize = 20;
pub(crate) const FEED_TOOL: &str = "feed";

#[derive(Debug, Default, Clone, Serialize, PartialEq)]
pub struct FeedMeta {
    pub title: String,
    pub link: String,
    pub description: String,
}

#[derive(Debug, Default, Clone, Serialize, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: String,
    pub author: String,
}

#[derive(Debug, Default, Clone, Serialize, PartialEq)]
pub struct FeedDoc {
    pub feed: FeedMeta,
    pub items: Vec<FeedItem>,
    pub fetched_at: String,
    pub item_count: usize,
}

pub struct RssService {
    name: String,
    endpoint: Url,
    auth: AuthConfig,
    max_items: usize,
    http: PrivacyHttp,
}

impl RssService {
    pub fn new(cfg: &ServiceConfig, http: PrivacyHttp) -> anyhow::Result<Self> {
        let endpoint = Url::parse(&cfg.endpoint)
            .map_err(|e| anyhow::anyhow!("service {:?}: invalid endpoint: {e}", cfg.name))?;
        Ok(Self {
            name: cfg.name.clone(),
            endpoint,
            auth: cfg.auth.clone(),
            max_items: if cfg.max_items == 0 {
                DEFAULT_MAX_ITEMS
            } else {
                cfg.max_items as usize
            },
            http,
        })
    }
}

#[async_trait]
impl Service for RssService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        tool: &str,
        _params: &BTreeMap<String, String>,
    ) -> anyhow::Result<ServiceResult> {
        if tool != FEED_TOOL {
            anyhow::bail!("service {:?}: unknown tool {tool:?} (feeds expose only \"feed\")", self.name);
        }

        let mut url = self.endpoint.clone();
        let mut headers = reqwest::header::HeaderMap::new();
        auth::inject(&self.auth, &mut url, &mut headers)?;

        let request = self
            .http
            .request(reqwest::Method::GET, url.clone())
            .headers(headers)
            .build()
            .map_err(|e| anyhow::anyhow!("service {:?}: building request: {e}", self.name))?;

        debug!(service = %self.name, url = %url, "feed fetch");

        let display_url = url.as_str();
        let response = match self.http.execute(request).await {
            Ok(r) => r,
            Err(e) => {
                return Ok(ServiceResult::failed(&self.name, tool, display_url, e.to_string()))
            }
        };
        let status = response.status();
        let body = match read_capped(response, MAX_BODY_BYTES).await {
            Ok(b) => b,
            Err(e) => {
                return Ok(ServiceResult::failed(&self.name, tool, display_url, e.to_string()))
            }
        };
        if status.as_u16() >= 400 {
            return Ok(ServiceResult::failed(
                &self.name,
                tool,
                display_url,
                http_error(status, &body),
            ));
        }

        let text = String::from_utf8_lossy(&body);
        match parse_feed(&text, self.max_items) {
            Ok(doc) => {
                let json = serde_json::to_vec_pretty(&doc)
                    .map_err(|e| anyhow::anyhow!("encoding feed: {e}"))?;
                Ok(ServiceResult::ok(&self.name, tool, display_url, json))
            }
            Err(e) => Ok(ServiceResult::failed(&self.name, tool, display_url, e)),
        }
    }
}

enum Dialect {
    Rss,
    Atom,
}

/// Parse a feed document of either dialect into the normalized shape.
/// Returns a human-readable error string for malformed input (a parse
/// failure is source data, not a programmer error).
pub(crate) fn parse_feed(xml: &str, max_items: usize) -> Result<FeedDoc, String> {
    let mut reader = Reader::from_str(xml);

    let mut dialect: Option<Dialect> = None;
    let mut doc = FeedDoc::default();
    let mut items: Vec<FeedItem> = Vec::new();

    let mut in_item = false;
    let mut in_author = false;
    let mut buf = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let qname = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if dialect.is_none() {
                    dialect = Some(match qname.as_str() {
                        "rss" => Dialect::Rss,
                        "feed" => Dialect::Atom,
                        other => return Err(format!("not a feed: root element <{other}>")),
                    });
                    continue;
                }
                match (dialect.as_ref().unwrap(), qname.as_str()) {
                    (Dialect::Rss, "item") | (Dialect::Atom, "entry") => {
                        in_item = true;
                        items.push(FeedItem::default());
                    }
                    (Dialect::Atom, "author") => in_author = true,
                    (Dialect::Atom, "link") => {
                        // Atom links live in attributes; prefer rel=alternate
                        // (or no rel at all) over self/edit links.
                        let rel = attr(e, "rel").unwrap_or_default();
                        if rel.is_empty() || rel == "alternate" {
                            if let Some(href) = attr(e, "href") {
                                if in_item {
                                    if let Some(item) = items.last_mut() {
                                        item.link = href;
                                    }
                                } else if doc.feed.link.is_empty() {
                                    doc.feed.link = href;
                                }
                            }
                        }
                    }
                    _ => {}
                }
                buf.clear();
            }
            Ok(Event::Text(ref t)) => {
                if let Ok(text) = t.decode() {
                    buf.push_str(&text);
                }
            }
            Ok(Event::GeneralRef(ref t)) => {
                if let Ok(name) = t.decode() {
                    buf.push('&');
                    buf.push_str(&name);
                    buf.push(';');
                }
            }
            Ok(Event::CData(ref t)) => {
                buf.push_str(&String::from_utf8_lossy(&t.clone().into_inner()));
            }
            Ok(Event::End(ref e)) => {
                let qname = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let value = buf.trim().to_string();
                match dialect {
                    Some(Dialect::Rss) => {
                        assign_rss(&mut doc, &mut items, in_item, &qname, value)
                    }
                    Some(Dialect::Atom) => {
                        assign_atom(&mut doc, &mut items, in_item, in_author, &qname, value)
                    }
                    None => {}
                }
                match qname.as_str() {
                    "item" | "entry" => in_item = false,
                    "author" => in_author = false,
                    _ => {}
                }
                buf.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("feed parse error at byte {}: {e}", reader.buffer_position())),
            _ => {}
        }
    }

    if dialect.is_none() {
        return Err("not a feed: empty document".to_string());
    }

    items.truncate(max_items);
    doc.item_count = items.len();
    doc.items = items;
    doc.fetched_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    Ok(doc)
}

fn attr(e: &quick_xml::events::BytesStart<'_>, name: &str) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn assign_rss(doc: &mut FeedDoc, items: &mut [FeedItem], in_item: bool, qname: &str, value: String) {
    if value.is_empty() {
        return;
    }
    if in_item {
        let Some(item) = items.last_mut() else { return };
        match qname {
            "title" => item.title = strip_html(&value),
            "link" => item.link = value,
            "description" => item.description = strip_html(&value),
            "pubDate" => item.pub_date = normalize_date(&value),
            "author" => item.author = value,
            // Dublin Core byline, only as a fallback.
            "dc:creator" => {
                if item.author.is_empty() {
                    item.author = value;
                }
            }
            _ => {}
        }
    } else {
        match qname {
            "title" => doc.feed.title = strip_html(&value),
            "link" => doc.feed.link = value,
            "description" => doc.feed.description = strip_html(&value),
            _ => {}
        }
    }
}

fn assign_atom(
    doc: &mut FeedDoc,
    items: &mut [FeedItem],
    in_item: bool,
    in_author: bool,
    qname: &str,
    value: String,
) {
    if value.is_empty() {
        return;
    }
    if in_item {
        let Some(item) = items.last_mut() else { return };
        match qname {
            "title" => item.title = strip_html(&value),
            "summary" | "content" => item.description = strip_html(&value),
            "published" => item.pub_date = normalize_date(&value),
            "updated" => {
                if item.pub_date.is_empty() {
                    item.pub_date = normalize_date(&value);
                }
            }
            "name" if in_author => item.author = value,
            _ => {}
        }
    } else {
        match qname {
            "title" => doc.feed.title = strip_html(&value),
            "subtitle" => doc.feed.description = strip_html(&value),
            _ => {}
        }
    }
}

/// Drop `<...>` runs with a simple scanner, then decode HTML entities.
pub(crate) fn strip_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    decode_entities(out.trim())
}

fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest[..rest.len().min(10)].find(';') else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            _ => entity
                .strip_prefix('#')
                .and_then(|num| {
                    if let Some(hex) = num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        num.parse::<u32>().ok()
                    }
                })
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Try the candidate layouts; return RFC3339 UTC on a match, the input
/// verbatim otherwise. Downstream consumers must tolerate the pass-through.
pub(crate) fn normalize_date(input: &str) -> String {
    let input = input.trim();
    // RFC1123Z / RFC1123 and friends.
    if let Ok(dt) = DateTime::parse_from_rfc2822(input) {
        return dt
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return dt
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true);
    }
    if let Ok(dt) = DateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%z") {
        return dt
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true);
    }
    if let Ok(d) = chrono::NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(midnight) = d.and_hms_opt(0, 0, 0) {
            return midnight
                .and_utc()
                .to_rfc3339_opts(SecondsFormat::Secs, true);
        }
    }
    input.to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
