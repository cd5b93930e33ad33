use crate::models::EntityRef;
use crate::traversal::traits::ProgressSink;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Which remote bulk endpoint a traversal drives.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Triggers server-side metric recomputation. Mutates the remote.
    Recompute,
    /// Checks metric consistency. Read-only.
    Validate,
}

impl OperationKind {
    /// Noun used in human-readable log lines.
    pub fn activity(self) -> &'static str {
        match self {
            OperationKind::Recompute => "recalculation",
            OperationKind::Validate => "validation",
        }
    }

    /// Name of the remote operation, as it appears in page summaries.
    pub fn operation_name(self) -> &'static str {
        match self {
            OperationKind::Recompute => "CalculateAllMetrics",
            OperationKind::Validate => "CheckAllMetrics",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.activity())
    }
}

/// Fields requested for each page item.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Selection {
    /// `id` only; refs carry the configured entity type name.
    Ids,
    /// `id` plus the resolved entity type display name from the remote.
    IdsWithEntityType,
}

/// Per-entity diagnostic returned by a bulk endpoint.
///
/// The shape differs between recompute and validate; `id` and `entityType` are
/// always present. Unknown fields are preserved for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerEntityReport {
    pub id: u64,
    #[serde(default)]
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_metrics: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inconsistent_fields: Option<Vec<serde_json::Value>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl PerEntityReport {
    pub fn new(id: u64, entity_type: impl Into<String>) -> Self {
        Self {
            id,
            entity_type: entity_type.into(),
            errors: None,
            failed_metrics: None,
            inconsistent_fields: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_errors(mut self, errors: Vec<serde_json::Value>) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn with_failed_metrics(mut self, failed: Vec<serde_json::Value>) -> Self {
        self.failed_metrics = Some(failed);
        self
    }

    pub fn with_inconsistent_fields(mut self, fields: Vec<serde_json::Value>) -> Self {
        self.inconsistent_fields = Some(fields);
        self
    }

    pub fn error_count(&self) -> u64 {
        self.errors.as_ref().map_or(0, |v| v.len() as u64)
    }

    pub fn failed_metric_count(&self) -> u64 {
        self.failed_metrics.as_ref().map_or(0, |v| v.len() as u64)
    }

    pub fn inconsistent_field_count(&self) -> u64 {
        self.inconsistent_fields.as_ref().map_or(0, |v| v.len() as u64)
    }

    pub fn is_inconsistent(&self) -> bool {
        self.inconsistent_field_count() > 0
    }
}

/// Response of one bulk invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationReport {
    pub reports: Vec<PerEntityReport>,
}

/// Running totals over all pages of one validate traversal.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub total_errors: u64,
    pub total_inconsistent_fields: u64,
    pub total_inconsistent_entities: u64,
}

impl AggregateReport {
    /// Totals for a single page of reports.
    pub fn from_reports(reports: &[PerEntityReport]) -> Self {
        let mut out = Self::default();
        for r in reports {
            out.total_errors += r.error_count();
            out.total_inconsistent_fields += r.inconsistent_field_count();
            if r.is_inconsistent() {
                out.total_inconsistent_entities += 1;
            }
        }
        out
    }

    pub fn absorb(&mut self, other: &AggregateReport) {
        self.total_errors += other.total_errors;
        self.total_inconsistent_fields += other.total_inconsistent_fields;
        self.total_inconsistent_entities += other.total_inconsistent_entities;
    }

    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Filter was the disabling sentinel; no remote call was made.
    Disabled,
    /// The remote reported zero matching entities.
    NoMatchingEntities,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraversalSummary<A> {
    pub entity_type: String,
    /// Remote count at the start. May be stale by the end of the run.
    pub expected: u64,
    pub pages: u64,
    pub entities: u64,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub aggregate: A,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TraversalOutcome<A> {
    Skipped {
        entity_type: String,
        reason: SkipReason,
    },
    Completed(TraversalSummary<A>),
}

impl<A> TraversalOutcome<A> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, TraversalOutcome::Skipped { .. })
    }

    pub fn summary(&self) -> Option<&TraversalSummary<A>> {
        match self {
            TraversalOutcome::Completed(s) => Some(s),
            TraversalOutcome::Skipped { .. } => None,
        }
    }
}

/// State owned by one `run_for` call and dropped when it returns.
pub struct TraversalContext {
    pub entity_type: String,
    pub filter: String,
    pub progress: Box<dyn ProgressSink>,
    pub started_at: DateTime<Utc>,
    started: Instant,
}

impl TraversalContext {
    pub fn new(
        entity_type: impl Into<String>,
        filter: impl Into<String>,
        progress: Box<dyn ProgressSink>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            filter: filter.into(),
            progress,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Turn a page of ids into refs. Items without a resolved entity type fall
    /// back to the configured name.
    pub fn refs_for(&self, page: Vec<EntityRef>) -> Vec<EntityRef> {
        page.into_iter()
            .map(|mut r| {
                if r.entity_type.trim().is_empty() {
                    r.entity_type = self.entity_type.clone();
                }
                r
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_entity_report_tolerates_nulls_and_missing_lists() {
        let r: PerEntityReport = serde_json::from_value(serde_json::json!({
            "id": 12,
            "entityType": "Bug",
            "errors": null,
            "inconsistentFields": ["startDate", "endDate"],
            "metric": "effort"
        }))
        .unwrap();
        assert_eq!(r.error_count(), 0);
        assert_eq!(r.failed_metric_count(), 0);
        assert_eq!(r.inconsistent_field_count(), 2);
        assert_eq!(r.extra.get("metric"), Some(&serde_json::json!("effort")));
    }

    #[test]
    fn aggregate_counts_entities_once_regardless_of_field_count() {
        let reports = vec![
            PerEntityReport::new(1, "Bug")
                .with_inconsistent_fields(vec!["a".into(), "b".into()])
                .with_errors(vec!["boom".into()]),
            PerEntityReport::new(2, "Bug"),
            PerEntityReport::new(3, "Bug").with_inconsistent_fields(vec![]),
        ];
        let agg = AggregateReport::from_reports(&reports);
        assert_eq!(
            agg,
            AggregateReport {
                total_errors: 1,
                total_inconsistent_fields: 2,
                total_inconsistent_entities: 1,
            }
        );
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let outcome: TraversalOutcome<()> = TraversalOutcome::Skipped {
            entity_type: "bug".to_string(),
            reason: SkipReason::NoMatchingEntities,
        };
        let v = serde_json::to_value(&outcome).unwrap();
        assert_eq!(v["status"], "skipped");
        assert_eq!(v["reason"], "no_matching_entities");
    }
}
