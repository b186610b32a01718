// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use burrow_config::{Profile, Routine, SourceConfig};
use burrow_ledger::{Entry, EntryKind, Ledger};
use burrow_llm::{Collected, CollectedSection, Synthesizer};
use burrow_services::{Registry, ServiceResult};
use burrow_template::Expander;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, info, warn};

/// Per-source outcome of a run or a dry `test_sources` pass.
#[derive(Debug, Clone)]
pub struct SourceStatus {
    pub service: String,
    pub tool: String,
    pub ok: bool,
    pub latency: Duration,
    pub error: Option<String>,
}

/// A finished run.
#[derive(Debug)]
pub struct Report {
    pub routine: String,
    pub title: String,
    pub run_at: DateTime<Utc>,
    pub markdown: String,
    /// Where the report directory was written.
    pub dir: PathBuf,
    pub statuses: Vec<SourceStatus>,
}

/// Runs one routine end to end: expand → fan out → synthesize → persist →
/// ledger. Construct per run; the profile and ledger are explicit
/// attachment points.
pub struct Executor {
    registry: Arc<Registry>,
    synthesizer: Arc<dyn Synthesizer>,
    reports_dir: PathBuf,
    profile: Profile,
    ledger: Option<Arc<Ledger>>,
    /// service name → endpoint, for prompt anonymization.
    endpoints: HashMap<String, String>,
}

impl Executor {
    pub fn new(
        registry: Arc<Registry>,
        synthesizer: Arc<dyn Synthesizer>,
        reports_dir: PathBuf,
    ) -> Self {
        Self {
            registry,
            synthesizer,
            reports_dir,
            profile: Profile::default(),
            ledger: None,
            endpoints: HashMap::new(),
        }
    }

    pub fn set_profile(&mut self, profile: Profile) {
        self.profile = profile;
    }

    pub fn set_ledger(&mut self, ledger: Arc<Ledger>) {
        self.ledger = Some(ledger);
    }

    pub fn set_endpoints(&mut self, endpoints: HashMap<String, String>) {
        self.endpoints = endpoints;
    }

    /// Execute the full pipeline for `routine`.
    ///
    /// A failing source is recorded and skipped; a failing synthesis aborts
    /// the run with no report directory written. Dropping the returned
    /// future cancels in-flight fetches.
    pub async fn run(&self, routine: &Routine) -> anyhow::Result<Report> {
        let run_at = Utc::now();
        let expander = Expander::new(self.profile.clone());

        let title = self.expand_logged(&expander, routine, routine.title());
        let system = self.expand_logged(&expander, routine, &routine.synthesis.system);

        let outcomes = self.fan_out(&expander, routine).await;

        let mut collected = Collected {
            queried: routine.sources.len(),
            ..Collected::default()
        };
        let mut statuses = Vec::with_capacity(outcomes.len());
        let mut successes: Vec<(SourceConfig, ServiceResult)> = Vec::new();
        for (source, status, result) in outcomes {
            if let (true, Some(result)) = (status.ok, result) {
                collected.sections.push(CollectedSection {
                    label: section_label(&source),
                    service: source.service.clone(),
                    tool: source.tool.clone(),
                    endpoint: self
                        .endpoints
                        .get(&source.service)
                        .cloned()
                        .unwrap_or_default(),
                    data: String::from_utf8_lossy(&result.data).into_owned(),
                });
                successes.push((source, result));
            }
            statuses.push(status);
        }

        let markdown = self
            .synthesizer
            .synthesize(&system, &collected, &title)
            .await
            .map_err(|e| anyhow::anyhow!("routine {:?}: synthesis failed: {e}", routine.name))?;

        let dir = crate::report::persist(
            &self.reports_dir,
            &routine.name,
            &title,
            run_at,
            &markdown,
            &successes,
            &statuses,
        )?;

        if let Some(ledger) = &self.ledger {
            let report_entry = Entry::new(EntryKind::Report, &title, &markdown)
                .with_routine(&routine.name)
                .at(run_at);
            if let Err(e) = ledger.append(&report_entry) {
                warn!(routine = %routine.name, error = %e, "ledger report append failed");
            }
            for (source, result) in &successes {
                let entry = Entry::new(
                    EntryKind::Result,
                    format!("{}/{}", source.service, source.tool),
                    String::from_utf8_lossy(&result.data).into_owned(),
                )
                .with_routine(&routine.name)
                .at(run_at);
                if let Err(e) = ledger.append(&entry) {
                    warn!(routine = %routine.name, error = %e, "ledger result append failed");
                }
            }
        }

        info!(
            routine = %routine.name,
            queried = statuses.len(),
            succeeded = successes.len(),
            dir = %dir.display(),
            "run complete"
        );

        Ok(Report {
            routine: routine.name.clone(),
            title,
            run_at,
            markdown,
            dir,
            statuses,
        })
    }

    /// Query every source without synthesizing or persisting anything.
    pub async fn test_sources(&self, routine: &Routine) -> Vec<SourceStatus> {
        let expander = Expander::new(self.profile.clone());
        self.fan_out(&expander, routine)
            .await
            .into_iter()
            .map(|(_, status, _)| status)
            .collect()
    }

    /// Query all sources in parallel. The returned vector follows the
    /// routine's declaration order regardless of completion order.
    async fn fan_out(
        &self,
        expander: &Expander,
        routine: &Routine,
    ) -> Vec<(SourceConfig, SourceStatus, Option<ServiceResult>)> {
        let fetches = routine.sources.iter().map(|source| {
            let (params, unresolved) = expander.expand_params(&source.params);
            if !unresolved.is_empty() {
                warn!(
                    routine = %routine.name,
                    service = %source.service,
                    fields = %unresolved.join(", "),
                    "unresolved profile fields in params"
                );
            }
            async move {
                let started = std::time::Instant::now();
                let outcome = match self.registry.get(&source.service) {
                    Ok(service) => service.execute(&source.tool, &params).await,
                    Err(e) => Err(e),
                };
                let latency = started.elapsed();

                let (status, result) = match outcome {
                    Ok(result) if result.is_ok() => (
                        SourceStatus {
                            service: source.service.clone(),
                            tool: source.tool.clone(),
                            ok: true,
                            latency,
                            error: None,
                        },
                        Some(result),
                    ),
                    Ok(result) => (
                        SourceStatus {
                            service: source.service.clone(),
                            tool: source.tool.clone(),
                            ok: false,
                            latency,
                            error: result.error.clone(),
                        },
                        Some(result),
                    ),
                    Err(e) => (
                        SourceStatus {
                            service: source.service.clone(),
                            tool: source.tool.clone(),
                            ok: false,
                            latency,
                            error: Some(e.to_string()),
                        },
                        None,
                    ),
                };
                if let Some(error) = &status.error {
                    warn!(
                        routine = %routine.name,
                        service = %source.service,
                        tool = %source.tool,
                        error = %error,
                        "source failed"
                    );
                } else {
                    debug!(
                        routine = %routine.name,
                        service = %source.service,
                        tool = %source.tool,
                        ms = latency.as_millis() as u64,
                        "source ok"
                    );
                }
                (source.clone(), status, result)
            }
        });
        join_all(fetches).await
    }

    fn expand_logged(&self, expander: &Expander, routine: &Routine, input: &str) -> String {
        let expansion = expander.expand(input);
        if let Some(error) = expansion.error() {
            warn!(routine = %routine.name, %error, "template expansion incomplete");
        }
        expansion.text
    }
}

fn section_label(source: &SourceConfig) -> String {
    source
        .context_label
        .clone()
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| format!("{}/{}", source.service, source.tool))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
