// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use burrow_config::{resolve_credentials, Paths, Profile, Routine};
use burrow_ledger::Ledger;
use burrow_llm::build_synthesizer;
use burrow_services::{build_service, Registry};
use tracing::debug;

use crate::{Executor, Report, SourceStatus};

/// Per-run wiring: loads config and profile fresh, builds the registry
/// with each adapter's proxy and cache, selects the synthesizer, and
/// drives the [`Executor`].
///
/// Everything is constructed per run and dropped when the run ends, so
/// resolved credentials never outlive the run that needed them.
pub struct PipelineRunner {
    paths: Paths,
}

impl PipelineRunner {
    pub fn new(paths: Paths) -> Self {
        Self { paths }
    }

    fn build_executor(&self, routine: &Routine) -> anyhow::Result<Executor> {
        let config = burrow_config::load(&self.paths)?;
        let resolved = resolve_credentials(&config);
        let profile = Profile::load(&self.paths.profile_file())?;

        let mut registry = Registry::new();
        let mut endpoints = HashMap::new();
        for svc in &resolved.services {
            let service = build_service(svc, &resolved.privacy, &self.paths.cache_dir())
                .with_context(|| format!("building service {:?}", svc.name))?;
            endpoints.insert(svc.name.clone(), svc.endpoint.clone());
            registry.register(service)?;
        }
        debug!(services = registry.len(), routine = %routine.name, "registry built");

        let synthesizer = build_synthesizer(&routine.llm, &resolved)
            .with_context(|| format!("routine {:?}", routine.name))?;

        let mut executor = Executor::new(
            Arc::new(registry),
            synthesizer,
            self.paths.reports_dir(),
        );
        executor.set_profile(profile);
        executor.set_endpoints(endpoints);
        Ok(executor)
    }

    /// Run a routine end to end, including ledger appends.
    pub async fn run_routine(&self, routine: &Routine) -> anyhow::Result<Report> {
        let mut executor = self.build_executor(routine)?;
        let ledger = Ledger::open(self.paths.context_dir())?;
        executor.set_ledger(Arc::new(ledger));
        executor.run(routine).await
    }

    /// Probe a routine's sources without synthesizing or persisting.
    pub async fn test_routine(&self, routine: &Routine) -> anyhow::Result<Vec<SourceStatus>> {
        let executor = self.build_executor(routine)?;
        Ok(executor.test_sources(routine).await)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
