// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};

/// Ledger entry types, one subdirectory each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryKind {
    Report,
    Result,
    Session,
    Contact,
    Note,
}

impl EntryKind {
    pub const ALL: [EntryKind; 5] = [
        EntryKind::Report,
        EntryKind::Result,
        EntryKind::Session,
        EntryKind::Contact,
        EntryKind::Note,
    ];

    /// Singular type name, as written in front matter.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Report => "report",
            EntryKind::Result => "result",
            EntryKind::Session => "session",
            EntryKind::Contact => "contact",
            EntryKind::Note => "note",
        }
    }

    /// Subdirectory name under the ledger root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            EntryKind::Report => "reports",
            EntryKind::Result => "results",
            EntryKind::Session => "sessions",
            EntryKind::Contact => "contacts",
            EntryKind::Note => "notes",
        }
    }

    pub fn parse(s: &str) -> Option<EntryKind> {
        EntryKind::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ledger entry: typed front matter plus a markdown body.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub kind: EntryKind,
    pub label: String,
    pub routine: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub content: String,
}

impl Entry {
    pub fn new(kind: EntryKind, label: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            routine: None,
            timestamp: Utc::now(),
            content: content.into(),
        }
    }

    pub fn with_routine(mut self, routine: impl Into<String>) -> Self {
        self.routine = Some(routine.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Serialize to the on-disk form: YAML front matter, `---`, body.
    pub fn format(&self) -> String {
        let mut out = String::new();
        out.push_str("---\n");
        out.push_str(&format!("type: {}\n", self.kind.as_str()));
        out.push_str(&format!("label: \"{}\"\n", self.label));
        if let Some(routine) = &self.routine {
            out.push_str(&format!("routine: \"{routine}\"\n"));
        }
        out.push_str(&format!("timestamp: {}\n", self.timestamp.to_rfc3339()));
        out.push_str("---\n");
        out.push_str(&self.content);
        out
    }

    /// Parse an on-disk file, best effort. Corrupt or absent front matter
    /// degrades gracefully: the raw body is preserved, the kind falls back
    /// to the directory the file lives in, and the timestamp falls back to
    /// the filename prefix.
    pub fn parse(dir_kind: EntryKind, path: &Path, text: &str) -> Entry {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();

        let mut entry = Entry {
            kind: dir_kind,
            label: label_from_stem(stem),
            routine: None,
            timestamp: timestamp_from_stem(stem).unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            content: text.to_string(),
        };

        let Some(rest) = text.strip_prefix("---\n") else {
            return entry;
        };
        let Some(end) = rest.find("\n---\n") else {
            return entry;
        };
        let (front, body) = (&rest[..end], &rest[end + 5..]);
        entry.content = body.to_string();

        for line in front.lines() {
            let Some((key, raw)) = line.split_once(':') else {
                continue;
            };
            let value = unquote(raw.trim());
            match key.trim() {
                "type" => {
                    if let Some(kind) = EntryKind::parse(&value) {
                        entry.kind = kind;
                    }
                }
                "label" => entry.label = value,
                "routine" => {
                    if !value.is_empty() {
                        entry.routine = Some(value);
                    }
                }
                "timestamp" => {
                    if let Ok(ts) = DateTime::parse_from_rfc3339(&value) {
                        entry.timestamp = ts.with_timezone(&Utc);
                    }
                }
                _ => {}
            }
        }
        entry
    }
}

fn unquote(v: &str) -> String {
    let v = v.trim();
    if v.len() >= 2 && v.starts_with('"') && v.ends_with('"') {
        v[1..v.len() - 1].to_string()
    } else {
        v.to_string()
    }
}

/// `2026-02-19T083000-some-label` → the label part.
fn label_from_stem(stem: &str) -> String {
    match timestamp_from_stem(stem) {
        Some(_) if stem.len() > 18 => stem[18..].to_string(),
        _ => stem.to_string(),
    }
}

/// Parse the `%Y-%m-%dT%H%M%S` filename prefix.
fn timestamp_from_stem(stem: &str) -> Option<DateTime<Utc>> {
    if stem.len() < 17 {
        return None;
    }
    NaiveDateTime::parse_from_str(&stem[..17], "%Y-%m-%dT%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
