// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use burrow_config::{load_routines, Paths, Routine};
use burrow_ledger::{slug, Entry, EntryKind, Ledger};
use burrow_pipeline::{list_report_dirs, PipelineRunner};
use burrow_scheduler::{DirLoader, RoutineRunner, Scheduler, StateStore, SystemClock};
use cli::{Cli, Commands, ContextCommands, ReportCommands, RoutineCommands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let paths = match &cli.root {
        Some(root) => Paths::at(root),
        None => Paths::resolve(),
    };

    match cli.command {
        Commands::Init => init_root(&paths),
        Commands::Daemon { once } => run_daemon(&paths, once).await,
        Commands::Routines { command } => run_routines(&paths, command).await,
        Commands::Context { command } => run_context(&paths, command),
        Commands::Note { text, label } => add_note(&paths, text, label),
        Commands::Reports { command } => run_reports(&paths, command),
    }
}

fn init_logging(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

// ── init ──────────────────────────────────────────────────────────────────────

const DEFAULT_CONFIG: &str = r#"# Burrow configuration.
# Services are queried read-only on your routines' schedules; credentials
# may reference environment variables as ${VAR} and are resolved per run.

services: []

llm:
  providers: []

privacy:
  strip_attribution_for_remote: true
  default_proxy: ""
  routes: []
  minimize_requests: true
  strip_referrers: true
  randomize_user_agent: true
"#;

const EXAMPLE_ROUTINE: &str = r#"# Example routine. Rename to <name>.yaml to activate.
name: weather
schedule: "07:30"
timezone: ""
report:
  title: "Morning Weather"
llm: none
synthesis:
  system: "Summarize today's forecast in two short paragraphs."
sources: []
"#;

fn init_root(paths: &Paths) -> anyhow::Result<()> {
    std::fs::create_dir_all(paths.routines_dir())
        .with_context(|| format!("creating {}", paths.routines_dir().display()))?;
    std::fs::create_dir_all(paths.reports_dir())
        .with_context(|| format!("creating {}", paths.reports_dir().display()))?;
    Ledger::open(paths.context_dir())?;

    let config_file = paths.config_file();
    if config_file.exists() {
        println!("config exists, leaving it alone: {}", config_file.display());
    } else {
        std::fs::write(&config_file, DEFAULT_CONFIG)
            .with_context(|| format!("writing {}", config_file.display()))?;
        println!("wrote {}", config_file.display());
    }

    let example = paths.routines_dir().join("weather.yaml.example");
    if !example.exists() {
        std::fs::write(&example, EXAMPLE_ROUTINE)
            .with_context(|| format!("writing {}", example.display()))?;
    }

    println!("burrow root ready at {}", paths.root().display());
    Ok(())
}

// ── daemon ────────────────────────────────────────────────────────────────────

/// Adapts the pipeline runner to the scheduler's contract.
struct DaemonRunner {
    runner: PipelineRunner,
}

#[async_trait::async_trait]
impl RoutineRunner for DaemonRunner {
    async fn run_routine(&self, routine: &Routine) -> anyhow::Result<()> {
        self.runner.run_routine(routine).await.map(|_| ())
    }
}

async fn run_daemon(paths: &Paths, once: bool) -> anyhow::Result<()> {
    // Fail early on an unreadable config rather than on the first tick.
    burrow_config::load(paths)?;

    let scheduler = Scheduler::new(
        Arc::new(DirLoader::new(paths.routines_dir())),
        Arc::new(DaemonRunner {
            runner: PipelineRunner::new(paths.clone()),
        }),
        StateStore::new(paths.state_file()),
        Arc::new(SystemClock),
    );

    if once {
        scheduler.run_once().await;
        return Ok(());
    }

    println!("burrow daemon running (ctrl-c to stop)");
    scheduler
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    Ok(())
}

// ── routines ──────────────────────────────────────────────────────────────────

fn find_routine(paths: &Paths, name: &str) -> anyhow::Result<Routine> {
    let routines = load_routines(&paths.routines_dir())?;
    if let Some(routine) = routines.into_iter().find(|r| r.name == name) {
        return Ok(routine);
    }
    for ext in ["yaml", "yml"] {
        let path = paths.routines_dir().join(format!("{name}.{ext}"));
        if path.is_file() {
            return Routine::load(&path);
        }
    }
    anyhow::bail!(
        "no routine {name:?} in {}",
        paths.routines_dir().display()
    )
}

async fn run_routines(paths: &Paths, command: RoutineCommands) -> anyhow::Result<()> {
    match command {
        RoutineCommands::List => {
            let routines = load_routines(&paths.routines_dir())?;
            if routines.is_empty() {
                println!("no routines in {}", paths.routines_dir().display());
                return Ok(());
            }
            for r in routines {
                let schedule = if r.normalized_schedule().is_empty() {
                    "unscheduled".to_string()
                } else {
                    r.normalized_schedule().to_string()
                };
                let tz = if r.timezone.is_empty() { "local" } else { r.timezone.as_str() };
                let llm = if r.llm.is_empty() { "none" } else { r.llm.as_str() };
                println!(
                    "{:<24} {:<12} {:<24} {:>2} source(s)  llm={llm}",
                    r.name,
                    schedule,
                    tz,
                    r.sources.len(),
                );
            }
            Ok(())
        }
        RoutineCommands::Run { name } => {
            let routine = find_routine(paths, &name)?;
            let runner = PipelineRunner::new(paths.clone());
            let report = runner.run_routine(&routine).await?;
            let ok = report.statuses.iter().filter(|s| s.ok).count();
            println!(
                "report written: {} ({ok}/{} sources ok)",
                report.dir.display(),
                report.statuses.len(),
            );
            Ok(())
        }
        RoutineCommands::Test { name } => {
            let routine = find_routine(paths, &name)?;
            let runner = PipelineRunner::new(paths.clone());
            let statuses = runner.test_routine(&routine).await?;
            let mut failed = false;
            for s in &statuses {
                match &s.error {
                    None => println!(
                        "OK    {:<32} {:>6} ms",
                        format!("{}/{}", s.service, s.tool),
                        s.latency.as_millis(),
                    ),
                    Some(e) => {
                        failed = true;
                        println!(
                            "FAIL  {:<32} {:>6} ms  {e}",
                            format!("{}/{}", s.service, s.tool),
                            s.latency.as_millis(),
                        );
                    }
                }
            }
            if failed {
                anyhow::bail!("routine {:?}: one or more sources failed", routine.name);
            }
            Ok(())
        }
        RoutineCommands::History { name, limit } => {
            let suffix = format!("-{}", slug(&name));
            let dirs: Vec<_> = list_report_dirs(&paths.reports_dir())?
                .into_iter()
                .filter(|d| {
                    d.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.ends_with(&suffix))
                })
                .take(limit)
                .collect();
            if dirs.is_empty() {
                println!("no reports for routine {name:?}");
            }
            for dir in dirs {
                println!("{}", dir.display());
            }
            Ok(())
        }
    }
}

// ── context ledger ────────────────────────────────────────────────────────────

fn parse_kind(kind: &str) -> anyhow::Result<EntryKind> {
    EntryKind::parse(kind).ok_or_else(|| {
        anyhow::anyhow!("unknown entry type {kind:?} (report|result|session|contact|note)")
    })
}

fn print_entries(entries: &[Entry]) {
    for e in entries {
        println!(
            "{}  [{}]  {}",
            e.timestamp.format("%Y-%m-%d %H:%M"),
            e.kind,
            e.label,
        );
    }
}

fn run_context(paths: &Paths, command: ContextCommands) -> anyhow::Result<()> {
    let ledger = Ledger::open(paths.context_dir())?;
    match command {
        ContextCommands::Search { query, limit } => {
            let mut hits = ledger.search(&query)?;
            hits.truncate(limit);
            if hits.is_empty() {
                println!("no matches for {query:?}");
            }
            print_entries(&hits);
            Ok(())
        }
        ContextCommands::List { kind, limit } => {
            let entries = ledger.list(parse_kind(&kind)?, limit)?;
            print_entries(&entries);
            Ok(())
        }
        ContextCommands::Stats => {
            let stats = ledger.stats()?;
            if stats.is_empty() {
                println!("ledger is empty");
                return Ok(());
            }
            for (kind, s) in stats {
                let bounds = match (s.earliest, s.latest) {
                    (Some(a), Some(b)) => {
                        format!("{} .. {}", a.format("%Y-%m-%d"), b.format("%Y-%m-%d"))
                    }
                    _ => "-".to_string(),
                };
                println!("{kind:<8} {:>5} entries  {:>8} bytes  {bounds}", s.count, s.bytes);
            }
            Ok(())
        }
        ContextCommands::Gather { max_bytes } => {
            print!("{}", ledger.gather_context(max_bytes)?);
            Ok(())
        }
    }
}

fn add_note(paths: &Paths, text: Vec<String>, label: Option<String>) -> anyhow::Result<()> {
    let text = text.join(" ");
    if text.trim().is_empty() {
        anyhow::bail!("note text is empty");
    }
    let label = label.unwrap_or_else(|| {
        text.split_whitespace().take(5).collect::<Vec<_>>().join(" ")
    });
    let ledger = Ledger::open(paths.context_dir())?;
    let path = ledger.append(&Entry::new(EntryKind::Note, label, text))?;
    println!("noted: {}", path.display());
    Ok(())
}

// ── reports ───────────────────────────────────────────────────────────────────

fn run_reports(paths: &Paths, command: ReportCommands) -> anyhow::Result<()> {
    match command {
        ReportCommands::List { limit } => {
            let dirs = list_report_dirs(&paths.reports_dir())?;
            if dirs.is_empty() {
                println!("no reports yet");
            }
            for dir in dirs.into_iter().take(limit) {
                println!("{}", dir.display());
            }
            Ok(())
        }
        ReportCommands::Show { dir } => {
            let report_dir = match dir {
                Some(name) => paths.reports_dir().join(name),
                None => list_report_dirs(&paths.reports_dir())?
                    .into_iter()
                    .next()
                    .context("no reports yet")?,
            };
            let file = report_dir.join("report.md");
            let markdown = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            print!("{markdown}");
            Ok(())
        }
    }
}
