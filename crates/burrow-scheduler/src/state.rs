// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Crash-safe scheduler memory: which routines already ran on which
/// date-in-their-zone.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SchedulerState {
    /// routine name → "YYYY-MM-DD" in that routine's timezone.
    #[serde(default)]
    pub last_run: BTreeMap<String, String>,
}

/// JSON-on-disk state store. Saves go through a temp file in the target
/// directory plus rename, so a crash mid-write leaves the previous state
/// intact.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the state; a missing file is an empty state.
    pub fn load(&self) -> anyhow::Result<SchedulerState> {
        if !self.path.is_file() {
            return Ok(SchedulerState::default());
        }
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", self.path.display()))
    }

    /// Atomically replace the state file.
    pub fn save(&self, state: &SchedulerState) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(state).context("serializing scheduler state")?;
        std::fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("renaming {} into place", tmp.display()))?;
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
