// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A declarative recipe: schedule, sources, synthesis prompt, and which LLM
/// provider turns the collected data into a report. One YAML file per
/// routine in `<root>/routines/`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Routine {
    pub name: String,
    /// "HH:MM" in 24h clock. Surrounding quotes tolerated (a bare `07:30`
    /// is YAML sexagesimal, so users often quote it — and sometimes
    /// double-quote it through shell history).
    #[serde(default)]
    pub schedule: String,
    /// IANA zone name; empty means the host's local zone.
    #[serde(default)]
    pub timezone: String,
    #[serde(default)]
    pub report: ReportConfig,
    /// Provider name, or empty / "none" / "passthrough" for the
    /// deterministic synthesizer.
    #[serde(default)]
    pub llm: String,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// System prompt for the synthesizer.
    #[serde(default)]
    pub system: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    pub service: String,
    pub tool: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Section heading used in the collected-results blob instead of
    /// `service/tool`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_label: Option<String>,
}

impl Routine {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let routine: Routine =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        Ok(routine)
    }

    /// Schedule with surrounding single or double quotes stripped.
    pub fn normalized_schedule(&self) -> &str {
        self.schedule
            .trim()
            .trim_matches(|c| c == '\'' || c == '"')
    }

    /// Report title, falling back to the routine name.
    pub fn title(&self) -> &str {
        if self.report.title.is_empty() {
            &self.name
        } else {
            &self.report.title
        }
    }
}

/// Load every `.yaml` / `.yml` routine in `dir`, sorted by file name.
/// Files that fail to parse are logged and skipped so one broken routine
/// does not take the scheduler down.
pub fn load_routines(dir: &Path) -> anyhow::Result<Vec<Routine>> {
    let mut routines = Vec::new();
    if !dir.is_dir() {
        return Ok(routines);
    }
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            )
        })
        .collect();
    entries.sort();
    for path in entries {
        match Routine::load(&path) {
            Ok(r) => routines.push(r),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable routine"),
        }
    }
    Ok(routines)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
