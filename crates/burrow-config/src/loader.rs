// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::Config;

/// All on-disk locations derived from the Burrow root directory.
///
/// The root defaults to `~/.burrow` and is overridden by the `BURROW_DIR`
/// environment variable. Every filesystem write the core performs lands
/// under this root.
#[derive(Debug, Clone)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    /// Resolve the root from `BURROW_DIR`, falling back to `~/.burrow`.
    pub fn resolve() -> Self {
        let root = match std::env::var_os("BURROW_DIR") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".burrow"),
        };
        Self { root }
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    pub fn profile_file(&self) -> PathBuf {
        self.root.join("profile.yaml")
    }

    pub fn routines_dir(&self) -> PathBuf {
        self.root.join("routines")
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join("scheduler-state.json")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root.join("reports")
    }

    pub fn context_dir(&self) -> PathBuf {
        self.root.join("context")
    }
}

/// Load and validate `config.yaml` under `paths`. A missing file yields the
/// default configuration so first-run commands work before `init`.
pub fn load(paths: &Paths) -> anyhow::Result<Config> {
    let file = paths.config_file();
    if !file.is_file() {
        debug!(path = %file.display(), "no config file, using defaults");
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(&file)
        .with_context(|| format!("reading {}", file.display()))?;
    let config: Config =
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", file.display()))?;
    config
        .validate()
        .with_context(|| format!("validating {}", file.display()))?;
    Ok(config)
}

/// Save `config` to `config.yaml`, keeping the previous file as
/// `config.yaml.bak` and re-attaching any leading `#` comment header the
/// previous file carried. Credential fields are serialized exactly as held
/// in `config` — callers must pass the unresolved form, never the working
/// copy produced by [`crate::resolve_credentials`].
pub fn save(paths: &Paths, config: &Config) -> anyhow::Result<()> {
    config.validate().context("validating config before save")?;
    std::fs::create_dir_all(paths.root())
        .with_context(|| format!("creating {}", paths.root().display()))?;

    let file = paths.config_file();
    let mut header = String::new();
    if file.is_file() {
        let previous = std::fs::read_to_string(&file)
            .with_context(|| format!("reading {}", file.display()))?;
        header = leading_comment_header(&previous);
        std::fs::write(file.with_extension("yaml.bak"), &previous)
            .with_context(|| format!("writing {}", file.with_extension("yaml.bak").display()))?;
    }

    let body = serde_yaml::to_string(config).context("serializing config")?;
    let text = if header.is_empty() {
        body
    } else {
        format!("{header}{body}")
    };
    std::fs::write(&file, text).with_context(|| format!("writing {}", file.display()))?;
    debug!(path = %file.display(), "config saved");
    Ok(())
}

/// The leading run of `#` comment lines (plus interior blank lines) at the
/// top of a YAML document, terminated by the first content line.
fn leading_comment_header(text: &str) -> String {
    let mut header = String::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') || trimmed.is_empty() {
            header.push_str(line);
            header.push('\n');
        } else {
            break;
        }
    }
    // A header that is only blank lines is not worth keeping.
    if header.trim().is_empty() {
        String::new()
    } else {
        header
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AuthConfig, AuthMethod, ServiceConfig, ServiceKind};

    fn temp_paths() -> (tempfile::TempDir, Paths) {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::at(dir.path());
        (dir, paths)
    }

    #[test]
    fn missing_config_yields_defaults() {
        let (_dir, paths) = temp_paths();
        let c = load(&paths).unwrap();
        assert!(c.services.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let (_dir, paths) = temp_paths();
        let mut c = Config::default();
        c.services.push(ServiceConfig {
            name: "hn".into(),
            kind: ServiceKind::Rss,
            endpoint: "https://news.ycombinator.com/rss".into(),
            auth: AuthConfig::default(),
            spec: None,
            tools: vec![],
            cache_ttl_seconds: 600,
            max_items: 10,
        });
        save(&paths, &c).unwrap();
        let back = load(&paths).unwrap();
        assert_eq!(back.services.len(), 1);
        assert_eq!(back.services[0].name, "hn");
        assert_eq!(back.services[0].max_items, 10);
    }

    #[test]
    fn save_preserves_comment_header_and_writes_bak() {
        let (_dir, paths) = temp_paths();
        std::fs::create_dir_all(paths.root()).unwrap();
        std::fs::write(
            paths.config_file(),
            "# Burrow configuration\n# edit with care\n\nservices: []\n",
        )
        .unwrap();

        save(&paths, &Config::default()).unwrap();

        let text = std::fs::read_to_string(paths.config_file()).unwrap();
        assert!(text.starts_with("# Burrow configuration\n# edit with care\n"));
        assert!(paths.config_file().with_extension("yaml.bak").is_file());
    }

    #[test]
    fn saved_config_keeps_env_reference_verbatim() {
        let (_dir, paths) = temp_paths();
        std::env::set_var("BURROW_LOADER_TEST_KEY", "resolved-secret");
        let mut c = Config::default();
        c.services.push(ServiceConfig {
            name: "gh".into(),
            kind: ServiceKind::Rest,
            endpoint: "https://api.github.com".into(),
            auth: AuthConfig {
                method: AuthMethod::Bearer,
                token: Some("${BURROW_LOADER_TEST_KEY}".into()),
                ..AuthConfig::default()
            },
            spec: None,
            tools: vec![],
            cache_ttl_seconds: 0,
            max_items: 0,
        });
        save(&paths, &c).unwrap();
        let text = std::fs::read_to_string(paths.config_file()).unwrap();
        assert!(text.contains("${BURROW_LOADER_TEST_KEY}"));
        assert!(!text.contains("resolved-secret"));
    }

    #[test]
    fn invalid_config_file_fails_load() {
        let (_dir, paths) = temp_paths();
        std::fs::create_dir_all(paths.root()).unwrap();
        std::fs::write(
            paths.config_file(),
            "services:\n  - name: a\n    type: rest\n    endpoint: 'not a url'\n",
        )
        .unwrap();
        assert!(load(&paths).is_err());
    }

    #[test]
    fn paths_derive_from_root() {
        let p = Paths::at("/tmp/burrow-test");
        assert!(p.config_file().ends_with("config.yaml"));
        assert!(p.routines_dir().ends_with("routines"));
        assert!(p.state_file().ends_with("scheduler-state.json"));
        assert!(p.cache_dir().ends_with("cache"));
        assert!(p.context_dir().ends_with("context"));
    }
}
