use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Filter value that disables an entity type entirely.
///
/// This is a magic string in the configuration contract, compared
/// case-insensitively and never sent to the remote.
pub const DISABLED_FILTER: &str = "false";

/// Filter used when nothing more specific is configured.
pub const PERMISSIVE_FILTER: &str = "true";

/// True when `filter` is the disabling sentinel (`"false"` in any letter casing).
pub fn is_disabled_filter(filter: &str) -> bool {
    filter.eq_ignore_ascii_case(DISABLED_FILTER)
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolParseError {
    #[error("unsupported protocol: {0}")]
    Unsupported(String),
}

/// Transport scheme used to reach a target host.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    #[default]
    Https,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ProtocolParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            _ => Err(ProtocolParseError::Unsupported(s.to_string())),
        }
    }
}

/// An entity type together with its resolved filter expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTypeSpec {
    pub name: String,
    pub filter: String,
}

impl EntityTypeSpec {
    pub fn new(name: impl Into<String>, filter: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filter: filter.into(),
        }
    }

    pub fn is_disabled(&self) -> bool {
        is_disabled_filter(&self.filter)
    }
}

/// One remote account, fully resolved. Immutable for the duration of a run.
#[derive(Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub token: String,
    pub protocol: Protocol,
    pub page_size: usize,
    pub request_timeout: Option<Duration>,
    pub entity_types: Vec<EntityTypeSpec>,
}

impl Target {
    /// `{protocol}://{host}` without a trailing slash.
    pub fn base_url(&self) -> String {
        format!(
            "{}://{}",
            self.protocol,
            self.host.trim().trim_end_matches('/')
        )
    }

    pub fn entity_type(&self, name: &str) -> Option<&EntityTypeSpec> {
        self.entity_types.iter().find(|e| e.name == name)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("host", &self.host)
            .field("token", &"[REDACTED]")
            .field("protocol", &self.protocol)
            .field("page_size", &self.page_size)
            .field("request_timeout", &self.request_timeout)
            .field("entity_types", &self.entity_types)
            .finish()
    }
}

/// The unit of work submitted to bulk operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    pub id: u64,
    pub entity_type: String,
}

impl EntityRef {
    pub fn new(id: u64, entity_type: impl Into<String>) -> Self {
        Self {
            id,
            entity_type: entity_type.into(),
        }
    }
}
