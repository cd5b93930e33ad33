pub mod redaction;

use crate::traversal::traits::DiagnosticLog;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Target used for report lines emitted through `TracingLog`.
pub const REPORT_TARGET: &str = "recalc::report";

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    #[default]
    Text,
}

impl LogFormat {
    #[tracing::instrument(level = "debug")]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "text" | "plain" | "pretty" => Some(Self::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct O11yConfig {
    pub format: LogFormat,
    /// Append to this file instead of writing to stderr.
    pub log_file: Option<PathBuf>,
    /// Used when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl Default for O11yConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            log_file: None,
            default_filter: "info".to_string(),
        }
    }
}

impl O11yConfig {
    /// Reads `RECALC_LOG_FORMAT` and `RECALC_LOG_FILE`.
    #[tracing::instrument(level = "debug")]
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("RECALC_LOG_FORMAT") {
            if !v.trim().is_empty() {
                cfg.format = LogFormat::parse(&v)
                    .ok_or_else(|| Error::Config(format!("invalid RECALC_LOG_FORMAT: {v}")))?;
            }
        }

        if let Ok(v) = std::env::var("RECALC_LOG_FILE") {
            if !v.trim().is_empty() {
                cfg.log_file = Some(PathBuf::from(v));
            }
        }

        Ok(cfg)
    }
}

#[tracing::instrument(level = "info", skip_all)]
pub fn init_global_from_env() -> Result<()> {
    init_global(O11yConfig::from_env()?)
}

/// Install the global subscriber. Fails if one is already installed.
#[tracing::instrument(level = "info", skip_all)]
pub fn init_global(cfg: O11yConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.default_filter.as_str()));

    let writer = match &cfg.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| Error::Config(format!("open log file {}: {e}", path.display())))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_ansi(cfg.log_file.is_none());
    let layer = match cfg.format {
        LogFormat::Json => fmt.json().with_filter(filter).boxed(),
        LogFormat::Text => fmt.with_filter(filter).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| Error::Config(format!("tracing already initialized: {e}")))
}

/// `DiagnosticLog` backed by `tracing` events under `recalc::report`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl DiagnosticLog for TracingLog {
    fn info(&self, message: &str, detail: Option<serde_json::Value>) {
        match detail {
            Some(d) => tracing::info!(target: REPORT_TARGET, detail = %d, "{message}"),
            None => tracing::info!(target: REPORT_TARGET, "{message}"),
        }
    }

    fn warn(&self, message: &str, detail: Option<serde_json::Value>) {
        match detail {
            Some(d) => tracing::warn!(target: REPORT_TARGET, detail = %d, "{message}"),
            None => tracing::warn!(target: REPORT_TARGET, "{message}"),
        }
    }

    fn error(&self, message: &str, detail: Option<serde_json::Value>) {
        match detail {
            Some(d) => tracing::error!(target: REPORT_TARGET, detail = %d, "{message}"),
            None => tracing::error!(target: REPORT_TARGET, "{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses_aliases() {
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse(" pretty "), Some(LogFormat::Text));
        assert_eq!(LogFormat::parse("xml"), None);
    }
}
