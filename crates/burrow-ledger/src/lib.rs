// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The context ledger: Burrow's longitudinal, append-only archive.
//!
//! Every entry is one plain markdown file with a small YAML front matter
//! block, grouped by type under the ledger root:
//!
//! ```text
//! context/
//!   reports/   results/   sessions/   contacts/   notes/
//!     2026-02-19T083000-weather-report.md
//! ```
//!
//! Files are never rewritten or deleted by the core; name collisions get a
//! numeric suffix. Reads take no lock — a file is either fully present or
//! absent, so crash-consistent scans need no coordination with writers.

mod entry;
mod slug;

pub use entry::{Entry, EntryKind};
pub use slug::slug;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::debug;
use walkdir::WalkDir;

/// Per-type ledger statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeStats {
    pub count: u64,
    pub bytes: u64,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

pub struct Ledger {
    root: PathBuf,
    /// Serializes append's pick-name-then-write critical section.
    write_lock: Mutex<()>,
}

impl Ledger {
    /// Open (and lazily create) the ledger under `root`.
    pub fn open(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        for kind in EntryKind::ALL {
            std::fs::create_dir_all(root.join(kind.dir_name()))
                .with_context(|| format!("creating {}", root.join(kind.dir_name()).display()))?;
        }
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Append one entry; returns the path written. Existing files are never
    /// overwritten — collisions take `-2`, `-3`, … suffixes.
    pub fn append(&self, entry: &Entry) -> anyhow::Result<PathBuf> {
        let _guard = self.write_lock.lock().unwrap();

        let dir = self.root.join(entry.kind.dir_name());
        let stem = format!(
            "{}-{}",
            entry.timestamp.format("%Y-%m-%dT%H%M%S"),
            slug(&entry.label)
        );
        let mut path = dir.join(format!("{stem}.md"));
        let mut n = 1;
        while path.exists() {
            n += 1;
            path = dir.join(format!("{stem}-{n}.md"));
        }

        std::fs::write(&path, entry.format())
            .with_context(|| format!("writing {}", path.display()))?;
        debug!(path = %path.display(), kind = entry.kind.as_str(), "ledger append");
        Ok(path)
    }

    /// Case-insensitive substring search over whole file contents, across
    /// all entry types, newest first.
    pub fn search(&self, query: &str) -> anyhow::Result<Vec<Entry>> {
        let needle = query.to_lowercase();
        let mut hits = Vec::new();
        for (kind, path) in self.entry_files() {
            let Ok(text) = std::fs::read_to_string(&path) else {
                continue;
            };
            if text.to_lowercase().contains(&needle) {
                hits.push(Entry::parse(kind, &path, &text));
            }
        }
        hits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(hits)
    }

    /// Entries of one type, newest first. `limit` 0 means no cap.
    pub fn list(&self, kind: EntryKind, limit: usize) -> anyhow::Result<Vec<Entry>> {
        let mut entries = Vec::new();
        for (k, path) in self.entry_files() {
            if k != kind {
                continue;
            }
            let Ok(text) = std::fs::read_to_string(&path) else {
                continue;
            };
            entries.push(Entry::parse(k, &path, &text));
        }
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if limit > 0 {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    /// Concatenate recent entries (newest first) into a prompt-ready block,
    /// stopping before the first entry that would push the total past
    /// `max_bytes`.
    pub fn gather_context(&self, max_bytes: usize) -> anyhow::Result<String> {
        let mut entries = Vec::new();
        for (kind, path) in self.entry_files() {
            let Ok(text) = std::fs::read_to_string(&path) else {
                continue;
            };
            entries.push(Entry::parse(kind, &path, &text));
        }
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let mut out = String::new();
        for entry in entries {
            let chunk = format!(
                "## {} ({})\n{}\n\n",
                entry.label,
                entry.timestamp.format("%Y-%m-%d %H:%M"),
                entry.content
            );
            if out.len() + chunk.len() > max_bytes {
                break;
            }
            out.push_str(&chunk);
        }
        Ok(out)
    }

    /// Per-type counts, byte totals, and timestamp bounds. Only the front
    /// matter (first 512 bytes) of each file is read.
    pub fn stats(&self) -> anyhow::Result<BTreeMap<&'static str, TypeStats>> {
        let mut stats: BTreeMap<&'static str, TypeStats> = BTreeMap::new();
        for (kind, path) in self.entry_files() {
            let Ok(meta) = std::fs::metadata(&path) else {
                continue;
            };
            let entry = stats.entry(kind.as_str()).or_default();
            entry.count += 1;
            entry.bytes += meta.len();
            if let Some(ts) = read_timestamp_head(&path) {
                entry.earliest = Some(match entry.earliest {
                    Some(cur) => cur.min(ts),
                    None => ts,
                });
                entry.latest = Some(match entry.latest {
                    Some(cur) => cur.max(ts),
                    None => ts,
                });
            }
        }
        Ok(stats)
    }

    fn entry_files(&self) -> Vec<(EntryKind, PathBuf)> {
        let mut files = Vec::new();
        for kind in EntryKind::ALL {
            let dir = self.root.join(kind.dir_name());
            for entry in WalkDir::new(&dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.into_path();
                if path.extension().and_then(|e| e.to_str()) == Some("md") {
                    files.push((kind, path));
                }
            }
        }
        files
    }
}

/// Extract the front-matter timestamp by reading at most the first 512
/// bytes of the file.
fn read_timestamp_head(path: &Path) -> Option<DateTime<Utc>> {
    use std::io::Read;
    let mut head = [0u8; 512];
    let mut file = std::fs::File::open(path).ok()?;
    let n = file.read(&mut head).ok()?;
    let text = String::from_utf8_lossy(&head[..n]);
    for line in text.lines() {
        if let Some(raw) = line.strip_prefix("timestamp:") {
            let raw = raw.trim().trim_matches('"');
            if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
                return Some(ts.with_timezone(&Utc));
            }
        }
    }
    None
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
