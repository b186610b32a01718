// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! End-to-end scenarios driven through the public crate APIs: a full
//! passthrough run against mocked services, remote attribution stripping,
//! cross-timezone scheduling with a manual clock, credential confinement,
//! and transport compartmentalization.

use std::sync::{Arc, Mutex};

use burrow_config::{Paths, Routine};
use burrow_pipeline::PipelineRunner;
use burrow_scheduler::{
    DirLoader, ManualClock, RoutineRunner, Scheduler, SchedulerState, StateStore,
};
use chrono::{TimeZone, Utc};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn burrow_root() -> (tempfile::TempDir, Paths) {
    let dir = tempfile::tempdir().unwrap();
    let paths = Paths::at(dir.path());
    std::fs::create_dir_all(paths.routines_dir()).unwrap();
    (dir, paths)
}

fn write_config(paths: &Paths, yaml: &str) {
    std::fs::write(paths.config_file(), yaml).unwrap();
}

fn write_routine(paths: &Paths, name: &str, yaml: &str) {
    std::fs::write(paths.routines_dir().join(format!("{name}.yaml")), yaml).unwrap();
}

// ── S1: quickstart happy path ────────────────────────────────────────────────

#[tokio::test]
async fn quickstart_weather_run_produces_full_report() {
    let weather = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gridpoints/BOU/62,60/forecast"))
        .and(header("user-agent", "burrow/1.0 qs@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"periods": ["sunny"]}"#))
        .mount(&weather)
        .await;
    Mock::given(method("GET"))
        .and(path("/alerts/active"))
        .and(query_param("area", "CO"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"alerts": []}"#))
        .mount(&weather)
        .await;

    let (_dir, paths) = burrow_root();
    write_config(
        &paths,
        &format!(
            r#"
services:
  - name: weather-gov
    type: rest
    endpoint: {endpoint}
    auth:
      method: user_agent
      value: "burrow/1.0 qs@example.com"
    tools:
      - name: forecast
        method: GET
        path: /gridpoints/BOU/62,60/forecast
      - name: alerts
        method: GET
        path: /alerts/active?area=CO
"#,
            endpoint = weather.uri()
        ),
    );
    write_routine(
        &paths,
        "weather",
        r#"
name: weather
schedule: "07:00"
report:
  title: "Weather Report — Denver/Boulder, CO"
llm: none
synthesis:
  system: "Summarize the forecast."
sources:
  - service: weather-gov
    tool: forecast
  - service: weather-gov
    tool: alerts
"#,
    );

    let runner = PipelineRunner::new(paths.clone());
    let routine = burrow_config::load_routines(&paths.routines_dir())
        .unwrap()
        .into_iter()
        .find(|r| r.name == "weather")
        .unwrap();

    let report = runner.run_routine(&routine).await.unwrap();
    assert!(report.markdown.contains("# Weather Report — Denver/Boulder, CO"));
    assert!(report.markdown.contains("**Sources queried:** 2"));
    assert!(report.markdown.contains("**Successful:** 2"));

    let report_md = std::fs::read_to_string(report.dir.join("report.md")).unwrap();
    assert_eq!(report_md, report.markdown);
    let data_files = std::fs::read_dir(report.dir.join("data")).unwrap().count();
    assert_eq!(data_files, 2);

    let statuses = runner.test_routine(&routine).await.unwrap();
    assert_eq!(statuses.len(), 2);
    for status in &statuses {
        assert!(status.ok, "source failed: {:?}", status.error);
        assert!(status.latency.as_nanos() > 0);
    }
}

// ── S2: remote attribution strip ─────────────────────────────────────────────

#[tokio::test]
async fn remote_synthesis_prompt_carries_no_attribution() {
    let sam = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("3 open opportunities"))
        .mount(&sam)
        .await;
    let edgar = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/filings"))
        .respond_with(ResponseTemplate::new(200).set_body_string("2 new filings"))
        .mount(&edgar)
        .await;
    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"content": "# Market Brief\n\nquiet day"}}]
        })))
        .mount(&llm)
        .await;

    let (_dir, paths) = burrow_root();
    write_config(
        &paths,
        &format!(
            r#"
services:
  - name: sam-gov
    type: rest
    endpoint: {sam}
    tools:
      - name: search_opportunities
        method: GET
        path: /search
  - name: edgar
    type: rest
    endpoint: {edgar}
    tools:
      - name: filings
        method: GET
        path: /filings
llm:
  providers:
    - name: cloud/gpt
      type: openrouter
      endpoint: {llm}
      api_key: test-key
      model: gpt-test
      privacy: remote
privacy:
  strip_attribution_for_remote: true
"#,
            sam = sam.uri(),
            edgar = edgar.uri(),
            llm = llm.uri()
        ),
    );
    write_routine(
        &paths,
        "market",
        r#"
name: market
schedule: "06:00"
report:
  title: "Market Brief"
llm: cloud/gpt
synthesis:
  system: "Summarize business signals."
sources:
  - service: sam-gov
    tool: search_opportunities
  - service: edgar
    tool: filings
"#,
    );

    let runner = PipelineRunner::new(paths.clone());
    let routine = burrow_config::load_routines(&paths.routines_dir())
        .unwrap()
        .remove(0);
    let report = runner.run_routine(&routine).await.unwrap();
    assert!(report.markdown.contains("Market Brief"));

    let llm_requests = llm.received_requests().await.unwrap();
    assert_eq!(llm_requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&llm_requests[0].body).unwrap();
    let user_prompt = body["messages"][1]["content"].as_str().unwrap();
    assert!(!user_prompt.contains("sam-gov"), "leaked service name: {user_prompt}");
    assert!(!user_prompt.contains("edgar"), "leaked service name: {user_prompt}");
    for endpoint in [sam.uri(), edgar.uri()] {
        let host = endpoint.trim_start_matches("http://").to_string();
        assert!(!user_prompt.contains(&host), "leaked endpoint {host}: {user_prompt}");
    }
    assert!(user_prompt.contains("## Source 1"));
    assert!(user_prompt.contains("## Source 2"));
    // Payload content still reaches the model.
    assert!(user_prompt.contains("3 open opportunities"));
    assert!(user_prompt.contains("2 new filings"));
}

// ── S3: scheduler timezone handling ──────────────────────────────────────────

#[derive(Default)]
struct RecordingRunner {
    launched: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl RoutineRunner for RecordingRunner {
    async fn run_routine(&self, routine: &Routine) -> anyhow::Result<()> {
        self.launched.lock().unwrap().push(routine.name.clone());
        Ok(())
    }
}

#[tokio::test]
async fn one_tick_launches_both_timezones_exactly_once() {
    let (_dir, paths) = burrow_root();
    write_routine(
        &paths,
        "a",
        "name: A\nschedule: \"05:00\"\ntimezone: America/Anchorage\n",
    );
    write_routine(
        &paths,
        "b",
        "name: B\nschedule: \"09:00\"\ntimezone: America/New_York\n",
    );

    // 2026-02-19 14:01 UTC = 05:01 Anchorage = 09:01 New York.
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 2, 19, 14, 1, 0).unwrap(),
    ));
    let runner = Arc::new(RecordingRunner::default());
    let store = StateStore::new(paths.state_file());
    let scheduler = Scheduler::new(
        Arc::new(DirLoader::new(paths.routines_dir())),
        runner.clone(),
        store.clone(),
        clock.clone(),
    );

    let handles = scheduler.tick();
    assert_eq!(handles.len(), 2);
    for handle in handles {
        handle.await.unwrap();
    }
    let mut launched = runner.launched.lock().unwrap().clone();
    launched.sort();
    assert_eq!(launched, vec!["A", "B"]);

    let state: SchedulerState = store.load().unwrap();
    assert_eq!(state.last_run.get("A").map(String::as_str), Some("2026-02-19"));
    assert_eq!(state.last_run.get("B").map(String::as_str), Some("2026-02-19"));

    // One minute later: nothing is due.
    clock.advance(chrono::Duration::minutes(1));
    assert!(scheduler.tick().is_empty());
    assert_eq!(runner.launched.lock().unwrap().len(), 2);
}

// ── Credential confinement ───────────────────────────────────────────────────

#[test]
fn saved_config_never_contains_resolved_secrets() {
    let (_dir, paths) = burrow_root();
    std::env::set_var("BURROW_IT_SECRET", "actual-secret-value");
    write_config(
        &paths,
        r#"# keep this comment
services:
  - name: gh
    type: rest
    endpoint: https://api.github.com
    auth:
      method: bearer
      token: ${BURROW_IT_SECRET}
"#,
    );

    let config = burrow_config::load(&paths).unwrap();
    assert_eq!(
        config.services[0].auth.token.as_deref(),
        Some("${BURROW_IT_SECRET}")
    );

    let resolved = burrow_config::resolve_credentials(&config);
    assert_eq!(
        resolved.services[0].auth.token.as_deref(),
        Some("actual-secret-value")
    );

    burrow_config::save(&paths, &config).unwrap();
    let on_disk = std::fs::read_to_string(paths.config_file()).unwrap();
    assert!(on_disk.starts_with("# keep this comment"));
    assert!(on_disk.contains("${BURROW_IT_SECRET}"));
    assert!(!on_disk.contains("actual-secret-value"));
}

// ── Compartmentalization ─────────────────────────────────────────────────────

#[tokio::test]
async fn one_service_auth_never_leaks_into_another() {
    let private = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200).set_body_string("private data"))
        .mount(&private)
        .await;
    let public = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(200).set_body_string("public data"))
        .mount(&public)
        .await;

    let (_dir, paths) = burrow_root();
    write_config(
        &paths,
        &format!(
            r#"
services:
  - name: private-api
    type: rest
    endpoint: {private}
    auth:
      method: user_agent
      value: "distinct-auth-agent/9.9"
    tools:
      - name: pull
        method: GET
        path: /a
  - name: public-api
    type: rest
    endpoint: {public}
    tools:
      - name: pull
        method: GET
        path: /b
"#,
            private = private.uri(),
            public = public.uri()
        ),
    );
    write_routine(
        &paths,
        "both",
        r#"
name: both
schedule: "06:00"
llm: none
sources:
  - service: private-api
    tool: pull
  - service: public-api
    tool: pull
"#,
    );

    let runner = PipelineRunner::new(paths.clone());
    let routine = burrow_config::load_routines(&paths.routines_dir())
        .unwrap()
        .remove(0);
    runner.run_routine(&routine).await.unwrap();

    // The authenticated UA reaches its own upstream, with the preserve
    // sentinel consumed on the way out.
    let private_reqs = private.received_requests().await.unwrap();
    assert_eq!(
        private_reqs[0].headers.get("user-agent").unwrap(),
        "distinct-auth-agent/9.9"
    );
    assert!(private_reqs[0].headers.get("x-burrow-preserve-ua").is_none());

    // The other service's transport never sees that credential.
    let public_reqs = public.received_requests().await.unwrap();
    let public_ua = public_reqs[0]
        .headers
        .get("user-agent")
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default();
    assert_ne!(public_ua, "distinct-auth-agent/9.9");
}

// ── S6: template fallback (through a real run) ───────────────────────────────

#[tokio::test]
async fn broken_template_still_runs_with_legacy_expansion() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("data"))
        .mount(&server)
        .await;

    let (_dir, paths) = burrow_root();
    std::fs::write(paths.profile_file(), "name: Trivyn\n").unwrap();
    write_config(
        &paths,
        &format!(
            r#"
services:
  - name: src
    type: rest
    endpoint: {endpoint}
    tools:
      - name: pull
        method: GET
        path: /x
"#,
            endpoint = server.uri()
        ),
    );
    write_routine(
        &paths,
        "greeting",
        r#"
name: greeting
schedule: "06:00"
report:
  title: "Hello {{profile.name}} and {{unbalanced"
llm: none
sources:
  - service: src
    tool: pull
"#,
    );

    let runner = PipelineRunner::new(paths.clone());
    let routine = burrow_config::load_routines(&paths.routines_dir())
        .unwrap()
        .remove(0);
    let report = runner.run_routine(&routine).await.unwrap();
    assert!(report.title.contains("Trivyn"));
    assert!(report.title.contains("{{unbalanced"));
}
