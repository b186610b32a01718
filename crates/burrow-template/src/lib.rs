// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Profile expansion for routine strings.
//!
//! Routine params, synthesis prompts, and report titles are templates
//! evaluated against the user profile. Two syntaxes are accepted:
//!
//! - the legacy form `{{profile.KEY}}` (dotted keys traverse nested maps,
//!   whitespace inside the braces tolerated), rewritten before parsing;
//! - the full Tera surface: `{{ profile(key="KEY") }}`, `{{ today() }}`,
//!   `{{ yesterday() }}`, `{{ now() }}`, `{{ year() }}`, `{{ month() }}`,
//!   `{{ day() }}`, `{{ date(value=..., format=...) }}`, plus the built-in
//!   `split` / `join` / `lower` / `upper` filters.
//!
//! Unknown profile keys are left in the text as the original
//! `{{profile.KEY}}` reference and reported in [`Expansion::unresolved`];
//! expansion never fails the run. If the template does not parse or render
//! at all, a regex-only fallback resolves just the legacy references and
//! passes everything else through verbatim.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use burrow_config::Profile;
use chrono::{DateTime, Duration, Local};
use tera::Tera;
use tracing::debug;

/// The result of expanding one template. `unresolved` lists profile keys
/// that had no value; the original reference text remains in `text` for
/// each of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expansion {
    pub text: String,
    pub unresolved: Vec<String>,
}

impl Expansion {
    /// A loggable error when any reference failed to resolve.
    pub fn error(&self) -> Option<String> {
        if self.unresolved.is_empty() {
            None
        } else {
            Some(format!(
                "unresolved profile fields: {}",
                self.unresolved.join(", ")
            ))
        }
    }
}

/// Template expander bound to one profile snapshot.
///
/// Stateless between calls: every expansion builds its own engine and
/// returns fresh strings/maps, so a shared `Expander` is safe across tasks.
pub struct Expander {
    profile: Arc<Profile>,
    fixed_now: Option<DateTime<Local>>,
}

impl Expander {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile: Arc::new(profile),
            fixed_now: None,
        }
    }

    /// Pin the clock, for deterministic date functions in tests.
    pub fn with_fixed_now(profile: Profile, now: DateTime<Local>) -> Self {
        Self {
            profile: Arc::new(profile),
            fixed_now: Some(now),
        }
    }

    fn now(&self) -> DateTime<Local> {
        self.fixed_now.unwrap_or_else(Local::now)
    }

    /// Expand a single template string.
    pub fn expand(&self, input: &str) -> Expansion {
        if !input.contains("{{") && !input.contains("{%") {
            return Expansion {
                text: input.to_string(),
                unresolved: Vec::new(),
            };
        }

        let rewritten = rewrite_legacy(input);
        let unresolved = Arc::new(Mutex::new(Vec::new()));

        match self.render_tera(&rewritten, unresolved.clone()) {
            Ok(text) => Expansion {
                text,
                unresolved: unresolved.lock().unwrap().clone(),
            },
            Err(e) => {
                debug!(error = %e, "template engine failed, using legacy expander");
                Expansion {
                    text: self.expand_legacy(input),
                    unresolved: Vec::new(),
                }
            }
        }
    }

    /// Expand every value of a params map. The input map is never touched;
    /// a fresh map is returned. Unresolved keys accumulate across values.
    pub fn expand_params(&self, params: &BTreeMap<String, String>) -> (BTreeMap<String, String>, Vec<String>) {
        let mut out = BTreeMap::new();
        let mut unresolved = Vec::new();
        for (k, v) in params {
            let expansion = self.expand(v);
            out.insert(k.clone(), expansion.text);
            for field in expansion.unresolved {
                if !unresolved.contains(&field) {
                    unresolved.push(field);
                }
            }
        }
        (out, unresolved)
    }

    fn render_tera(
        &self,
        template: &str,
        unresolved: Arc<Mutex<Vec<String>>>,
    ) -> tera::Result<String> {
        let mut tera = Tera::default();
        tera.add_raw_template("inline", template)?;

        let profile = self.profile.clone();
        tera.register_function(
            "profile",
            move |args: &std::collections::HashMap<String, tera::Value>| {
                let key = args
                    .get("key")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| tera::Error::msg("profile() requires key"))?;
                match profile.lookup(key) {
                    Some(value) => Ok(tera::Value::String(value)),
                    None => {
                        unresolved.lock().unwrap().push(key.to_string());
                        // Keep the original reference visible in the output.
                        Ok(tera::Value::String(format!("{{{{profile.{key}}}}}")))
                    }
                }
            },
        );

        let now = self.now();
        register_date_fn(&mut tera, "today", move || now.format("%Y-%m-%d").to_string());
        let now = self.now();
        register_date_fn(&mut tera, "yesterday", move || {
            (now - Duration::days(1)).format("%Y-%m-%d").to_string()
        });
        let now = self.now();
        register_date_fn(&mut tera, "now", move || now.to_rfc3339());
        let now = self.now();
        register_date_fn(&mut tera, "year", move || now.format("%Y").to_string());
        let now = self.now();
        register_date_fn(&mut tera, "month", move || now.format("%m").to_string());
        let now = self.now();
        register_date_fn(&mut tera, "day", move || now.format("%d").to_string());

        tera.register_function(
            "date",
            |args: &std::collections::HashMap<String, tera::Value>| {
                let value = args
                    .get("value")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| tera::Error::msg("date() requires value"))?;
                let format = args
                    .get("format")
                    .and_then(|v| v.as_str())
                    .unwrap_or("%Y-%m-%d");
                Ok(tera::Value::String(reformat_date(value, format)))
            },
        );

        tera.render("inline", &tera::Context::new())
    }

    /// Regex-only fallback: resolve `{{profile.KEY}}` references, leave all
    /// other text (including broken template syntax) verbatim.
    fn expand_legacy(&self, input: &str) -> String {
        legacy_re()
            .replace_all(input, |caps: &regex::Captures<'_>| {
                let key = &caps[1];
                self.profile
                    .lookup(key)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

fn register_date_fn(
    tera: &mut Tera,
    name: &'static str,
    f: impl Fn() -> String + Send + Sync + 'static,
) {
    tera.register_function(
        name,
        move |_: &std::collections::HashMap<String, tera::Value>| Ok(tera::Value::String(f())),
    );
}

fn legacy_re() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"\{\{\s*profile\.([A-Za-z0-9_][A-Za-z0-9_.-]*)\s*\}\}").unwrap())
}

/// Rewrite legacy `{{profile.KEY}}` references into the function surface
/// before handing the template to the engine.
fn rewrite_legacy(input: &str) -> String {
    legacy_re()
        .replace_all(input, |caps: &regex::Captures<'_>| {
            format!("{{{{ profile(key=\"{}\") }}}}", &caps[1])
        })
        .into_owned()
}

/// Re-render a date string in `format`, trying the candidate input layouts
/// `%Y-%m-%d`, RFC3339, `%m/%d/%Y`. Unparseable input passes through.
fn reformat_date(value: &str, format: &str) -> String {
    if let Ok(d) = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return d.format(format).to_string();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return dt.format(format).to_string();
    }
    if let Ok(d) = chrono::NaiveDate::parse_from_str(value, "%m/%d/%Y") {
        return d.format(format).to_string();
    }
    value.to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn profile() -> Profile {
        Profile::from_yaml(
            r#"
name: Trivyn
interests: [rust, radio]
location:
  city: Denver
"#,
        )
        .unwrap()
    }

    fn expander() -> Expander {
        let now = Local.with_ymd_and_hms(2026, 2, 19, 8, 30, 0).unwrap();
        Expander::with_fixed_now(profile(), now)
    }

    #[test]
    fn legacy_reference_resolves() {
        let e = expander().expand("Hello {{profile.name}}");
        assert_eq!(e.text, "Hello Trivyn");
        assert!(e.unresolved.is_empty());
    }

    #[test]
    fn whitespace_tolerant_legacy_reference() {
        let e = expander().expand("Hello {{ profile.name }}");
        assert_eq!(e.text, "Hello Trivyn");
    }

    #[test]
    fn dotted_key_traverses_profile() {
        let e = expander().expand("in {{profile.location.city}}");
        assert_eq!(e.text, "in Denver");
    }

    #[test]
    fn list_value_comma_joined() {
        let e = expander().expand("{{profile.interests}}");
        assert_eq!(e.text, "rust, radio");
    }

    #[test]
    fn unknown_key_left_in_place_and_reported() {
        let e = expander().expand("Hi {{profile.nickname}}!");
        assert_eq!(e.text, "Hi {{profile.nickname}}!");
        assert_eq!(e.unresolved, vec!["nickname"]);
        assert!(e.error().unwrap().contains("nickname"));
    }

    #[test]
    fn function_surface_profile_call() {
        let e = expander().expand(r#"{{ profile(key="name") }}"#);
        assert_eq!(e.text, "Trivyn");
    }

    #[test]
    fn date_functions_use_pinned_clock() {
        let e = expander();
        assert_eq!(e.expand("{{ today() }}").text, "2026-02-19");
        assert_eq!(e.expand("{{ yesterday() }}").text, "2026-02-18");
        assert_eq!(e.expand("{{ year() }}-{{ month() }}-{{ day() }}").text, "2026-02-19");
        assert!(e.expand("{{ now() }}").text.starts_with("2026-02-19T08:30:00"));
    }

    #[test]
    fn date_reformat_tries_candidate_layouts() {
        let e = expander();
        assert_eq!(
            e.expand(r#"{{ date(value="2026-02-19", format="%m/%d/%Y") }}"#).text,
            "02/19/2026"
        );
        assert_eq!(
            e.expand(r#"{{ date(value="02/19/2026") }}"#).text,
            "2026-02-19"
        );
        // Unparseable input passes through.
        assert_eq!(
            e.expand(r#"{{ date(value="not a date") }}"#).text,
            "not a date"
        );
    }

    #[test]
    fn builtin_filters_available() {
        let e = expander().expand(r#"{{ profile(key="name") | upper }}"#);
        assert_eq!(e.text, "TRIVYN");
    }

    #[test]
    fn broken_template_falls_back_to_legacy_expansion() {
        let e = expander().expand("Hello {{profile.name}} and {{unbalanced");
        assert!(e.text.contains("Trivyn"));
        assert!(e.text.contains("{{unbalanced"));
        assert!(e.unresolved.is_empty());
    }

    #[test]
    fn expansion_is_idempotent_when_fully_resolved() {
        let e = expander();
        let once = e.expand("Report for {{profile.name}} on {{ today() }}").text;
        let twice = e.expand(&once).text;
        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_key_expansion_is_stable() {
        let e = expander();
        let once = e.expand("{{profile.missing}}").text;
        let twice = e.expand(&once).text;
        assert_eq!(once, twice);
    }

    #[test]
    fn expand_params_returns_fresh_map() {
        let e = expander();
        let mut params = BTreeMap::new();
        params.insert("who".to_string(), "{{profile.name}}".to_string());
        params.insert("when".to_string(), "{{ today() }}".to_string());
        params.insert("bad".to_string(), "{{profile.gone}}".to_string());

        let (out, unresolved) = e.expand_params(&params);
        assert_eq!(out.get("who").unwrap(), "Trivyn");
        assert_eq!(out.get("when").unwrap(), "2026-02-19");
        assert_eq!(out.get("bad").unwrap(), "{{profile.gone}}");
        assert_eq!(unresolved, vec!["gone"]);
        // Input untouched.
        assert_eq!(params.get("who").unwrap(), "{{profile.name}}");
    }

    #[test]
    fn plain_text_short_circuits() {
        let e = expander().expand("no templates here");
        assert_eq!(e.text, "no templates here");
    }
}
