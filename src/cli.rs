// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Burrow: scheduled read-only collection from your services, synthesized
/// into local markdown reports, remembered in a plain-text ledger.
#[derive(Parser, Debug)]
#[command(name = "burrow", version, about, max_term_width = 100)]
pub struct Cli {
    /// Burrow root directory (default: $BURROW_DIR or ~/.burrow).
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Verbose logging to stderr (or set RUST_LOG).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the Burrow directory skeleton and a starter config.
    Init,

    /// Run the scheduler: tick once a minute and launch due routines.
    Daemon {
        /// Perform exactly one tick, wait for launched routines, exit.
        #[arg(long)]
        once: bool,
    },

    /// Inspect and run routines.
    Routines {
        #[command(subcommand)]
        command: RoutineCommands,
    },

    /// Search and inspect the context ledger.
    Context {
        #[command(subcommand)]
        command: ContextCommands,
    },

    /// Append a note to the ledger.
    Note {
        /// Note text.
        text: Vec<String>,
        /// Label for the note (default: first few words).
        #[arg(long, short)]
        label: Option<String>,
    },

    /// Browse generated reports.
    Reports {
        #[command(subcommand)]
        command: ReportCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum RoutineCommands {
    /// List configured routines with schedule and sources.
    List,
    /// Run one routine now, regardless of its schedule.
    Run {
        /// Routine name (or routine file stem).
        name: String,
    },
    /// Query a routine's sources and report status + latency, no report.
    Test {
        /// Routine name (or routine file stem).
        name: String,
    },
    /// Recent report directories produced by a routine.
    History {
        /// Routine name.
        name: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum ContextCommands {
    /// Case-insensitive substring search across all ledger entries.
    Search {
        query: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// List entries of one type, newest first.
    List {
        /// Entry type: report | result | session | contact | note.
        #[arg(long, short = 't', default_value = "report")]
        kind: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Per-type entry counts, sizes, and date bounds.
    Stats,
    /// Concatenate recent entries into a prompt-ready block on stdout.
    Gather {
        #[arg(long, default_value_t = 16384)]
        max_bytes: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum ReportCommands {
    /// List report directories, newest first.
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print a report's markdown (latest when no directory is given).
    Show {
        /// Report directory name under <root>/reports.
        dir: Option<String>,
    },
}
