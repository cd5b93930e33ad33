//! Run configuration: targets, per-entity-type filters, and defaults.
//!
//! To disable an entity type set its filter to `"false"`. To restrict it, set
//! any filter in the remote query DSL, e.g. `userstories.count==0 and
//! project.isactive==true` for `feature`. A target without `entity_types`
//! inherits the defaults' list.

use crate::models::{EntityTypeSpec, PERMISSIVE_FILTER, Protocol, Target};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

/// Largest `take` the remote accepts.
pub const MAX_PAGE_SIZE: usize = 1000;

const DEFAULT_ENTITY_TYPES: &[&str] = &[
    "roleeffort",
    "task",
    "bug",
    "userstory",
    "request",
    "feature",
    "epic",
    "portfolioepic",
    "iteration",
    "teamiteration",
    "release",
    "project",
];

/// What the runner does after a traversal fails.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Log and continue with the next entity type of the same target.
    #[default]
    NextEntityType,
    /// Log and skip the rest of the target.
    NextTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTypeConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl EntityTypeConfig {
    pub fn new(name: impl Into<String>, filter: Option<&str>) -> Self {
        Self {
            name: name.into(),
            filter: filter.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub page_size: usize,
    pub protocol: Protocol,
    pub entity_types: Vec<EntityTypeConfig>,
    /// Default filter per entity type, used when an entity type has none.
    pub filters: BTreeMap<String, String>,
    pub request_timeout_secs: Option<u64>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            page_size: 200,
            protocol: Protocol::Https,
            entity_types: DEFAULT_ENTITY_TYPES
                .iter()
                .map(|name| EntityTypeConfig::new(*name, Some(crate::models::DISABLED_FILTER)))
                .collect(),
            filters: BTreeMap::new(),
            request_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub host: String,
    #[serde(default)]
    pub token: String,
    /// Environment variable holding the token, read when `token` is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub entity_types: Vec<EntityTypeConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecalcConfig {
    /// When true, `run` only validates consistency and does not recalculate.
    #[serde(default = "default_validate_only")]
    pub validate_only: bool,
    #[serde(default)]
    pub on_error: OnError,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

fn default_validate_only() -> bool {
    true
}

impl Default for RecalcConfig {
    fn default() -> Self {
        Self {
            validate_only: true,
            on_error: OnError::default(),
            defaults: DefaultsConfig::default(),
            targets: Vec::new(),
        }
    }
}

impl RecalcConfig {
    /// Load and validate a YAML (`.yaml`/`.yml`) or JSON file.
    #[tracing::instrument(level = "debug")]
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {}: {e}", path.display())))?;
        let cfg = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text)?,
            _ => Self::from_json_str(&text)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        serde_yaml::from_str(s).map_err(|e| Error::Config(format!("parse yaml: {e}")))
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| Error::Config(format!("parse json: {e}")))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(Error::Config("at least one target is required".to_string()));
        }
        check_page_size("defaults.page_size", self.defaults.page_size)?;
        check_entity_types("defaults.entity_types", &self.defaults.entity_types)?;

        for (idx, t) in self.targets.iter().enumerate() {
            if t.host.trim().is_empty() {
                return Err(Error::Config(format!("targets[{idx}].host is empty")));
            }
            if let Some(size) = t.page_size {
                check_page_size(&format!("targets[{idx}].page_size"), size)?;
            }
            check_entity_types(&format!("targets[{idx}].entity_types"), &t.entity_types)?;
        }
        Ok(())
    }

    /// Resolve targets, reading `token_env` from the process environment.
    pub fn resolve_targets(&self) -> Result<Vec<Target>> {
        self.resolve_targets_with(|name| std::env::var(name).ok())
    }

    #[tracing::instrument(level = "debug", skip(self, env))]
    pub fn resolve_targets_with(&self, env: impl Fn(&str) -> Option<String>) -> Result<Vec<Target>> {
        self.validate()?;
        self.targets
            .iter()
            .map(|t| {
                let token = if t.token.trim().is_empty() {
                    t.token_env
                        .as_deref()
                        .and_then(|name| env(name))
                        .unwrap_or_default()
                } else {
                    t.token.clone()
                };
                if token.trim().is_empty() {
                    return Err(Error::Config(format!("no token for target {}", t.host)));
                }

                let entity_types = if t.entity_types.is_empty() {
                    &self.defaults.entity_types
                } else {
                    &t.entity_types
                };

                Ok(Target {
                    host: t.host.trim().to_string(),
                    token,
                    protocol: t.protocol.unwrap_or(self.defaults.protocol),
                    page_size: t.page_size.unwrap_or(self.defaults.page_size),
                    request_timeout: t
                        .request_timeout_secs
                        .or(self.defaults.request_timeout_secs)
                        .map(Duration::from_secs),
                    entity_types: entity_types
                        .iter()
                        .map(|e| EntityTypeSpec::new(e.name.clone(), self.resolve_filter(e)))
                        .collect(),
                })
            })
            .collect()
    }

    /// Explicit filter, then the defaults' filter for the type, then `"true"`.
    pub fn resolve_filter(&self, entity_type: &EntityTypeConfig) -> String {
        if let Some(f) = entity_type.filter.as_deref().filter(|f| !f.trim().is_empty()) {
            return f.to_string();
        }
        if let Some(f) = self
            .defaults
            .filters
            .get(&entity_type.name)
            .filter(|f| !f.trim().is_empty())
        {
            return f.clone();
        }
        tracing::debug!(
            entity_type = %entity_type.name,
            "no filter configured; using permissive default"
        );
        PERMISSIVE_FILTER.to_string()
    }
}

fn check_page_size(field: &str, size: usize) -> Result<()> {
    if size == 0 || size > MAX_PAGE_SIZE {
        return Err(Error::Config(format!(
            "{field} must be in 1..={MAX_PAGE_SIZE}, got {size}"
        )));
    }
    Ok(())
}

fn check_entity_types(field: &str, types: &[EntityTypeConfig]) -> Result<()> {
    let mut seen = HashSet::new();
    for e in types {
        if e.name.trim().is_empty() {
            return Err(Error::Config(format!("{field} contains an empty name")));
        }
        if !seen.insert(e.name.as_str()) {
            return Err(Error::Config(format!(
                "{field} lists '{}' more than once",
                e.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML: &str = r#"
validate_only: false
defaults:
  page_size: 100
  filters:
    feature: "userstories.count==0"
targets:
  - host: acme.tpondemand.com
    token_env: ACME_TOKEN
    entity_types:
      - name: userstory
      - name: feature
      - name: bug
        filter: "FALSE"
  - host: other.tpondemand.com
    token: other-token
    protocol: http
    page_size: 50
"#;

    #[test]
    fn yaml_resolves_filters_tokens_and_inheritance() {
        let cfg = RecalcConfig::from_yaml_str(YAML).unwrap();
        assert!(!cfg.validate_only);
        assert_eq!(cfg.on_error, OnError::NextEntityType);

        let targets = cfg
            .resolve_targets_with(|name| (name == "ACME_TOKEN").then(|| "acme-token".to_string()))
            .unwrap();
        assert_eq!(targets.len(), 2);

        let acme = &targets[0];
        assert_eq!(acme.token, "acme-token");
        assert_eq!(acme.page_size, 100);
        assert_eq!(acme.protocol, Protocol::Https);
        assert_eq!(acme.entity_type("userstory").unwrap().filter, "true");
        assert_eq!(
            acme.entity_type("feature").unwrap().filter,
            "userstories.count==0"
        );
        assert!(acme.entity_type("bug").unwrap().is_disabled());

        let other = &targets[1];
        assert_eq!(other.base_url(), "http://other.tpondemand.com");
        assert_eq!(other.page_size, 50);
        assert_eq!(other.entity_types.len(), DEFAULT_ENTITY_TYPES.len());
        assert!(other.entity_types.iter().all(|e| e.is_disabled()));
    }

    #[test]
    fn missing_token_is_a_config_error() {
        let cfg = RecalcConfig::from_yaml_str(YAML).unwrap();
        let err = cfg.resolve_targets_with(|_| None).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("acme.tpondemand.com")));
    }

    #[test]
    fn empty_filter_falls_back_to_permissive_default() {
        let cfg = RecalcConfig::default();
        let filter = cfg.resolve_filter(&EntityTypeConfig::new("general", Some("  ")));
        assert_eq!(filter, "true");
    }

    #[test]
    fn rejects_out_of_range_page_size() {
        let mut cfg = RecalcConfig::from_yaml_str(YAML).unwrap();
        cfg.targets[1].page_size = Some(MAX_PAGE_SIZE + 1);
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
        cfg.targets[1].page_size = Some(0);
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_duplicate_entity_types_and_empty_hosts() {
        let mut cfg = RecalcConfig::from_yaml_str(YAML).unwrap();
        cfg.targets[0]
            .entity_types
            .push(EntityTypeConfig::new("bug", None));
        assert!(cfg.validate().is_err());

        let mut cfg = RecalcConfig::from_yaml_str(YAML).unwrap();
        cfg.targets[1].host = " ".to_string();
        assert!(cfg.validate().is_err());

        assert!(RecalcConfig::default().validate().is_err());
    }

    #[test]
    fn load_picks_parser_by_extension() {
        let mut yaml = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        yaml.write_all(YAML.as_bytes()).unwrap();
        let from_yaml = RecalcConfig::load(yaml.path()).unwrap();

        let mut json = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        json.write_all(serde_json::to_string(&from_yaml).unwrap().as_bytes())
            .unwrap();
        let from_json = RecalcConfig::load(json.path()).unwrap();

        assert_eq!(from_yaml, from_json);
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let cfg = RecalcConfig::from_json_str(r#"{"targets": [{"host": "a", "token": "t"}]}"#)
            .unwrap();
        assert!(cfg.validate_only);
        assert_eq!(cfg.defaults.page_size, 200);
        assert_eq!(cfg.defaults.protocol, Protocol::Https);
        assert_eq!(cfg.defaults.entity_types.len(), 12);
    }
}
