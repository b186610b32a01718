// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Time-of-day scheduler.
//!
//! One tick per minute (plus one immediately on start). A routine is due
//! when its `HH:MM` target in its own timezone has passed and it has not
//! already run on that date-in-zone. Launches go to separate tasks so a
//! slow routine never delays the rest; the scheduler awaits all of them
//! before returning.
//!
//! Two locks, deliberately separate: `inflight` (who is running right now)
//! and the state mutex, which covers the whole load→modify→save sequence so
//! two completions cannot lose each other's `last_run` update.

mod clock;
mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use state::{SchedulerState, StateStore};

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use burrow_config::Routine;
use chrono::{DateTime, NaiveTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What the scheduler invokes for each due routine. Implemented by the
/// pipeline's runner; tests substitute recorders.
#[async_trait]
pub trait RoutineRunner: Send + Sync {
    async fn run_routine(&self, routine: &Routine) -> anyhow::Result<()>;
}

/// Routine supplier, re-read on every tick so edits to the routines
/// directory take effect without a restart.
pub trait RoutineLoader: Send + Sync {
    fn load(&self) -> anyhow::Result<Vec<Routine>>;
}

/// Loads routines from a directory of YAML files.
pub struct DirLoader {
    dir: PathBuf,
}

impl DirLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl RoutineLoader for DirLoader {
    fn load(&self) -> anyhow::Result<Vec<Routine>> {
        burrow_config::load_routines(&self.dir)
    }
}

pub struct Scheduler {
    loader: Arc<dyn RoutineLoader>,
    runner: Arc<dyn RoutineRunner>,
    store: Arc<StateStore>,
    clock: Arc<dyn Clock>,
    inflight: Arc<Mutex<HashSet<String>>>,
    /// Serializes the full load→modify→save sequence on completion.
    state_mu: Arc<tokio::sync::Mutex<()>>,
}

impl Scheduler {
    pub fn new(
        loader: Arc<dyn RoutineLoader>,
        runner: Arc<dyn RoutineRunner>,
        store: StateStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            loader,
            runner,
            store: Arc::new(store),
            clock,
            inflight: Arc::new(Mutex::new(HashSet::new())),
            state_mu: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Compute the due set and launch each due routine in its own task.
    /// Returns the launch handles; callers decide when to await them.
    pub fn tick(&self) -> Vec<JoinHandle<()>> {
        let now = self.clock.now_utc();
        let state = match self.store.load() {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "scheduler state unreadable, assuming empty");
                SchedulerState::default()
            }
        };
        let routines = match self.loader.load() {
            Ok(routines) => routines,
            Err(e) => {
                warn!(error = %e, "routine load failed, skipping tick");
                return Vec::new();
            }
        };

        let mut handles = Vec::new();
        for routine in routines {
            let Some(today) = self.due_on(&routine, now, &state) else {
                continue;
            };
            {
                let mut inflight = self.inflight.lock().unwrap();
                if !inflight.insert(routine.name.clone()) {
                    debug!(routine = %routine.name, "still running, skipping");
                    continue;
                }
            }
            info!(routine = %routine.name, date = %today, "launching");
            handles.push(self.launch(routine, today));
        }
        handles
    }

    /// `Some(today-in-zone)` when `routine` should run now.
    fn due_on(&self, routine: &Routine, now: DateTime<Utc>, state: &SchedulerState) -> Option<String> {
        let schedule = routine.normalized_schedule();
        if schedule.is_empty() {
            return None;
        }
        let Some(target) = parse_schedule(schedule) else {
            warn!(routine = %routine.name, schedule, "invalid schedule, skipping");
            return None;
        };
        let Some((today, time_in_zone)) = zone_today(&routine.timezone, now) else {
            warn!(routine = %routine.name, timezone = %routine.timezone, "invalid timezone, skipping");
            return None;
        };
        if state.last_run.get(&routine.name) == Some(&today) {
            return None;
        }
        if time_in_zone < target {
            return None;
        }
        Some(today)
    }

    fn launch(&self, routine: Routine, today: String) -> JoinHandle<()> {
        let runner = self.runner.clone();
        let store = self.store.clone();
        let state_mu = self.state_mu.clone();
        let inflight = self.inflight.clone();
        tokio::spawn(async move {
            let name = routine.name.clone();
            match runner.run_routine(&routine).await {
                Ok(()) => {
                    // Reload under the mutex: another completion may have
                    // saved between our launch and now.
                    let _guard = state_mu.lock().await;
                    let mut state = store.load().unwrap_or_default();
                    state.last_run.insert(name.clone(), today);
                    if let Err(e) = store.save(&state) {
                        warn!(routine = %name, error = %e, "recording completion failed");
                    }
                }
                Err(e) => {
                    // Nothing recorded: the routine stays eligible for a
                    // retry on the next tick of the same date.
                    warn!(routine = %name, error = %e, "routine failed");
                }
            }
            inflight.lock().unwrap().remove(&name);
        })
    }

    /// One tick, then wait for every launched routine. `daemon --once`.
    pub async fn run_once(&self) {
        for handle in self.tick() {
            let _ = handle.await;
        }
    }

    /// Tick immediately, then every minute until `shutdown` resolves.
    /// Outstanding routine tasks are awaited before returning.
    pub async fn run_until(&self, shutdown: impl std::future::Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    handles.retain(|h| !h.is_finished());
                    handles.extend(self.tick());
                }
                _ = &mut shutdown => break,
            }
        }
        info!(outstanding = handles.len(), "scheduler stopping");
        for handle in handles {
            let _ = handle.await;
        }
    }
}

/// Parse `HH:MM` (24-hour).
fn parse_schedule(schedule: &str) -> Option<NaiveTime> {
    let (h, m) = schedule.split_once(':')?;
    let h: u32 = h.trim().parse().ok()?;
    let m: u32 = m.trim().parse().ok()?;
    NaiveTime::from_hms_opt(h, m, 0)
}

/// Today's date string and wall-clock time in the routine's zone. Empty
/// zone means the host's local zone.
fn zone_today(timezone: &str, now: DateTime<Utc>) -> Option<(String, NaiveTime)> {
    let tz = timezone.trim();
    if tz.is_empty() {
        let local = now.with_timezone(&chrono::Local);
        return Some((local.format("%Y-%m-%d").to_string(), local.time()));
    }
    let zone: chrono_tz::Tz = tz.parse().ok()?;
    let zoned = now.with_timezone(&zone);
    Some((zoned.format("%Y-%m-%d").to_string(), zoned.time()))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
