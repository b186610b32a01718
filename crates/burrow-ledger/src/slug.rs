// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
/// Filesystem-safe slug: lowercase ASCII alphanumerics with single dashes.
///
/// Used for ledger filenames, report directory names, and per-source data
/// file names. Bounded at 64 characters; an input with nothing usable
/// becomes `"entry"` so a filename is always produced.
pub fn slug(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_dash = true;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
        if out.len() >= 64 {
            break;
        }
    }
    let trimmed = out.trim_matches('-').to_string();
    if trimmed.is_empty() {
        "entry".to_string()
    } else {
        trimmed
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
