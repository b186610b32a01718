// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;

use anyhow::Context;
use serde_yaml::Value;

/// The user profile: a free-form YAML map.
///
/// Typed accessors exist for the common fields, but the raw map is
/// authoritative — template lookup walks it directly so users can add any
/// key they want to reference from routines.
#[derive(Debug, Clone, Default)]
pub struct Profile {
    raw: serde_yaml::Mapping,
}

impl Profile {
    /// Load `profile.yaml`; a missing file yields an empty profile.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_yaml::from_str(text)?;
        match value {
            Value::Mapping(raw) => Ok(Self { raw }),
            Value::Null => Ok(Self::default()),
            _ => anyhow::bail!("profile must be a YAML mapping"),
        }
    }

    pub fn from_mapping(raw: serde_yaml::Mapping) -> Self {
        Self { raw }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn name(&self) -> Option<String> {
        self.lookup("name")
    }

    pub fn description(&self) -> Option<String> {
        self.lookup("description")
    }

    pub fn interests(&self) -> Vec<String> {
        match key_of(&self.raw, "interests") {
            Some(Value::Sequence(seq)) => seq.iter().filter_map(scalar_to_string).collect(),
            Some(other) => scalar_to_string(other).into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Resolve a dot-separated key path against the raw map.
    ///
    /// Scalar leaves are stringified; list leaves are comma-joined. A path
    /// that dead-ends (missing key, non-map interior node) yields `None`.
    pub fn lookup(&self, dotted: &str) -> Option<String> {
        let mut current: &Value = &Value::Null;
        let mut map = &self.raw;
        for (i, segment) in dotted.split('.').enumerate() {
            if i > 0 {
                match current {
                    Value::Mapping(inner) => map = inner,
                    _ => return None,
                }
            }
            current = key_of(map, segment)?;
        }
        render_value(current)
    }
}

fn key_of<'a>(map: &'a serde_yaml::Mapping, key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.as_str() == Some(key))
        .map(|(_, v)| v)
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn render_value(v: &Value) -> Option<String> {
    match v {
        Value::Sequence(seq) => {
            let parts: Vec<String> = seq.iter().filter_map(scalar_to_string).collect();
            Some(parts.join(", "))
        }
        Value::Null => None,
        Value::Mapping(_) => None,
        other => scalar_to_string(other),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Profile {
        Profile::from_yaml(
            r#"
name: Trivyn
description: contract researcher
interests:
  - federal contracting
  - rust
location:
  city: Denver
  state: CO
grants:
  naics: [541511, 541512]
"#,
        )
        .unwrap()
    }

    #[test]
    fn scalar_lookup() {
        assert_eq!(sample().lookup("name").as_deref(), Some("Trivyn"));
    }

    #[test]
    fn dotted_lookup_traverses_maps() {
        assert_eq!(sample().lookup("location.city").as_deref(), Some("Denver"));
        assert_eq!(sample().lookup("location.state").as_deref(), Some("CO"));
    }

    #[test]
    fn list_renders_comma_joined() {
        assert_eq!(
            sample().lookup("interests").as_deref(),
            Some("federal contracting, rust")
        );
        assert_eq!(sample().lookup("grants.naics").as_deref(), Some("541511, 541512"));
    }

    #[test]
    fn missing_key_is_none() {
        assert!(sample().lookup("nope").is_none());
        assert!(sample().lookup("location.zip").is_none());
        assert!(sample().lookup("name.deeper").is_none());
    }

    #[test]
    fn map_leaf_is_not_a_scalar() {
        assert!(sample().lookup("location").is_none());
    }

    #[test]
    fn typed_accessors() {
        let p = sample();
        assert_eq!(p.name().as_deref(), Some("Trivyn"));
        assert_eq!(p.description().as_deref(), Some("contract researcher"));
        assert_eq!(p.interests(), vec!["federal contracting", "rust"]);
    }

    #[test]
    fn empty_and_missing_profiles() {
        assert!(Profile::from_yaml("").unwrap().is_empty());
        let dir = tempfile::tempdir().unwrap();
        assert!(Profile::load(&dir.path().join("profile.yaml")).unwrap().is_empty());
    }

    #[test]
    fn non_mapping_profile_rejected() {
        assert!(Profile::from_yaml("- just\n- a\n- list\n").is_err());
    }
}
