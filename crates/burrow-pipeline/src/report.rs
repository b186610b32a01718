// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use anyhow::Context;
use burrow_config::SourceConfig;
use burrow_ledger::slug;
use burrow_services::ServiceResult;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::SourceStatus;

#[derive(Serialize)]
struct MetaSource<'a> {
    service: &'a str,
    tool: &'a str,
    ok: bool,
    latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

#[derive(Serialize)]
struct Meta<'a> {
    routine: &'a str,
    title: &'a str,
    run_at: String,
    sources: Vec<MetaSource<'a>>,
}

/// Write the report directory:
///
/// ```text
/// <reports>/<YYYY-MM-DDThhmm>-<slug(routine)>/
///   report.md
///   data/<nnn>-<slug(service)>-<slug(tool)>.json   (successes only)
///   meta.json
/// ```
///
/// Writes are in place and not transactional; `meta.json` goes last so its
/// presence marks a complete run, and a partial directory stays on disk for
/// a human to inspect.
pub(crate) fn persist(
    reports_root: &Path,
    routine_name: &str,
    title: &str,
    run_at: DateTime<Utc>,
    markdown: &str,
    successes: &[(SourceConfig, ServiceResult)],
    statuses: &[SourceStatus],
) -> anyhow::Result<PathBuf> {
    let dir = reports_root.join(format!(
        "{}-{}",
        run_at.format("%Y-%m-%dT%H%M"),
        slug(routine_name)
    ));
    let data_dir = dir.join("data");
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;

    let report_file = dir.join("report.md");
    std::fs::write(&report_file, markdown)
        .with_context(|| format!("writing {}", report_file.display()))?;

    for (i, (source, result)) in successes.iter().enumerate() {
        let file = data_dir.join(format!(
            "{:03}-{}-{}.json",
            i + 1,
            slug(&source.service),
            slug(&source.tool)
        ));
        std::fs::write(&file, &result.data)
            .with_context(|| format!("writing {}", file.display()))?;
    }

    let meta = Meta {
        routine: routine_name,
        title,
        run_at: run_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        sources: statuses
            .iter()
            .map(|s| MetaSource {
                service: &s.service,
                tool: &s.tool,
                ok: s.ok,
                latency_ms: s.latency.as_millis() as u64,
                error: s.error.as_deref(),
            })
            .collect(),
    };
    let meta_file = dir.join("meta.json");
    std::fs::write(&meta_file, serde_json::to_string_pretty(&meta)?)
        .with_context(|| format!("writing {}", meta_file.display()))?;

    Ok(dir)
}

/// Report directories under `reports_root`, newest first. The timestamp
/// prefix makes lexical order chronological.
pub fn list_report_dirs(reports_root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    if !reports_root.is_dir() {
        return Ok(dirs);
    }
    for entry in std::fs::read_dir(reports_root)
        .with_context(|| format!("reading {}", reports_root.display()))?
    {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    dirs.reverse();
    Ok(dirs)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn source(service: &str, tool: &str) -> SourceConfig {
        SourceConfig {
            service: service.into(),
            tool: tool.into(),
            params: BTreeMap::new(),
            context_label: None,
        }
    }

    #[test]
    fn persist_writes_expected_layout() {
        let dir = tempfile::tempdir().unwrap();
        let run_at = Utc.with_ymd_and_hms(2026, 2, 19, 8, 30, 0).unwrap();
        let successes = vec![(
            source("weather-gov", "forecast"),
            ServiceResult::ok("weather-gov", "forecast", "https://x", b"{\"temp\": 40}".to_vec()),
        )];
        let statuses = vec![
            SourceStatus {
                service: "weather-gov".into(),
                tool: "forecast".into(),
                ok: true,
                latency: Duration::from_millis(120),
                error: None,
            },
            SourceStatus {
                service: "down".into(),
                tool: "x".into(),
                ok: false,
                latency: Duration::from_millis(30),
                error: Some("HTTP 503".into()),
            },
        ];

        let out = persist(
            dir.path(),
            "weather",
            "Weather Report",
            run_at,
            "# Weather Report\n",
            &successes,
            &statuses,
        )
        .unwrap();

        assert!(out.ends_with("2026-02-19T0830-weather"));
        assert_eq!(
            std::fs::read_to_string(out.join("report.md")).unwrap(),
            "# Weather Report\n"
        );
        assert_eq!(
            std::fs::read(out.join("data/001-weather-gov-forecast.json")).unwrap(),
            b"{\"temp\": 40}"
        );

        let meta: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join("meta.json")).unwrap()).unwrap();
        assert_eq!(meta["routine"], "weather");
        assert_eq!(meta["run_at"], "2026-02-19T08:30:00Z");
        assert_eq!(meta["sources"].as_array().unwrap().len(), 2);
        assert_eq!(meta["sources"][1]["error"], "HTTP 503");
        assert!(meta["sources"][0].get("error").is_none());
    }

    #[test]
    fn list_report_dirs_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["2026-02-17T0800-a", "2026-02-19T0800-a", "2026-02-18T0800-b"] {
            std::fs::create_dir_all(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("stray-file"), "x").unwrap();

        let dirs = list_report_dirs(dir.path()).unwrap();
        let names: Vec<_> = dirs
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["2026-02-19T0800-a", "2026-02-18T0800-b", "2026-02-17T0800-a"]
        );
    }

    #[test]
    fn missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_report_dirs(&dir.path().join("reports")).unwrap().is_empty());
    }
}
