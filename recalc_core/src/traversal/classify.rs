//! Per-operation report classifiers.

use crate::traversal::models::{
    AggregateReport, OperationKind, OperationReport, PerEntityReport, Selection,
};
use crate::traversal::traits::{DiagnosticLog, ReportClassifier};

fn detail<T: serde::Serialize>(value: &T) -> Option<serde_json::Value> {
    serde_json::to_value(value).ok()
}

/// Recompute: one summary line per page, warning if any metric failed.
///
/// Does not accumulate counts.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecomputeClassifier;

impl ReportClassifier for RecomputeClassifier {
    type Aggregate = ();

    fn kind(&self) -> OperationKind {
        OperationKind::Recompute
    }

    fn selection(&self) -> Selection {
        Selection::Ids
    }

    fn fold(
        &self,
        _entity_type: &str,
        report: &OperationReport,
        _acc: &mut (),
        log: &dyn DiagnosticLog,
    ) {
        let name = self.kind().operation_name();
        if report.reports.iter().any(|r| r.failed_metric_count() > 0) {
            log.warn(
                &format!("{name} response: Some metrics execution was failed."),
                detail(report),
            );
        } else {
            log.info(
                &format!("{name} response: All metrics were executed successfully."),
                detail(report),
            );
        }
    }
}

/// Validate: totals across pages plus one line per errored or inconsistent entity.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValidateClassifier;

impl ValidateClassifier {
    fn entity_label(entity_type: &str, r: &PerEntityReport) -> String {
        let ty = if r.entity_type.is_empty() {
            entity_type
        } else {
            r.entity_type.as_str()
        };
        format!("{ty}#{}", r.id)
    }
}

impl ReportClassifier for ValidateClassifier {
    type Aggregate = AggregateReport;

    fn kind(&self) -> OperationKind {
        OperationKind::Validate
    }

    // Reports are keyed by the resolved entity type name, so ask for it.
    fn selection(&self) -> Selection {
        Selection::IdsWithEntityType
    }

    fn fold(
        &self,
        entity_type: &str,
        report: &OperationReport,
        acc: &mut AggregateReport,
        log: &dyn DiagnosticLog,
    ) {
        let page = AggregateReport::from_reports(&report.reports);
        tracing::debug!(
            entity_type,
            errors = page.total_errors,
            inconsistent_fields = page.total_inconsistent_fields,
            inconsistent_entities = page.total_inconsistent_entities,
            "validation page folded"
        );

        for r in report.reports.iter().filter(|r| r.error_count() > 0) {
            log.warn(
                &format!(
                    "Failed check of entity {} ({} errors).",
                    Self::entity_label(entity_type, r),
                    r.error_count()
                ),
                detail(r),
            );
        }
        for r in report.reports.iter().filter(|r| r.is_inconsistent()) {
            log.warn(
                &format!(
                    "Inconsistent entity {} ({} field(s)).",
                    Self::entity_label(entity_type, r),
                    r.inconsistent_field_count()
                ),
                detail(r),
            );
        }

        acc.absorb(&page);
    }
}
