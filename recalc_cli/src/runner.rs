//! Outer sequencer: every target in order, every entity type in order.

use chrono::{DateTime, Utc};
use recalc_core::{
    AggregateReport, BatchTraversalEngine, DiagnosticLog, NoProgress, OnError, OperationKind,
    ProgressFactory, RemoteApi, ReportClassifier, Result, Target, TraversalOutcome,
};
use recalc_integrations::TargetprocessClient;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Builds the remote collaborators for one target.
pub trait RemoteFactory: Send + Sync {
    fn connect(&self, target: &Target) -> Result<Arc<dyn RemoteApi>>;
}

/// Connects over HTTP.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpRemoteFactory;

impl RemoteFactory for HttpRemoteFactory {
    fn connect(&self, target: &Target) -> Result<Arc<dyn RemoteApi>> {
        Ok(Arc::new(TargetprocessClient::new(target)?))
    }
}

/// Aggregates that contribute to run-wide validation totals.
pub trait RunTotals {
    fn totals(&self) -> Option<AggregateReport>;
}

impl RunTotals for () {
    fn totals(&self) -> Option<AggregateReport> {
        None
    }
}

impl RunTotals for AggregateReport {
    fn totals(&self) -> Option<AggregateReport> {
        Some(*self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraversalFailure {
    pub host: String,
    /// `None` when the target could not be connected at all.
    pub entity_type: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub kind: OperationKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub targets: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub entities: u64,
    /// Summed validation totals. `None` for recalculation.
    pub totals: Option<AggregateReport>,
    pub failures: Vec<TraversalFailure>,
}

impl RunSummary {
    fn new(run_id: Uuid, kind: OperationKind, targets: usize) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            kind,
            started_at: now,
            finished_at: now,
            targets,
            completed: 0,
            skipped: 0,
            failed: 0,
            entities: 0,
            totals: None,
            failures: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// One-line account of what failed, or `None` for a clean run.
    ///
    /// Targets that could not be connected never start a traversal and are
    /// reported on their own.
    pub fn failure_message(&self) -> Option<String> {
        if self.is_success() {
            return None;
        }
        let unreachable = self.failures.iter().filter(|f| f.entity_type.is_none()).count();
        let failed = self.failed - unreachable;
        let attempted = failed + self.completed + self.skipped;

        let mut parts = Vec::new();
        if failed > 0 {
            parts.push(format!("{failed} of {attempted} traversal(s) failed"));
        }
        if unreachable > 0 {
            parts.push(format!("{unreachable} of {} target(s) unreachable", self.targets));
        }
        Some(parts.join("; "))
    }

    fn absorb(&mut self, totals: Option<AggregateReport>) {
        if let Some(t) = totals {
            self.totals.get_or_insert_with(AggregateReport::default).absorb(&t);
        }
    }

    fn fail(&mut self, host: &str, entity_type: Option<&str>, error: &recalc_core::Error) {
        self.failed += 1;
        self.failures.push(TraversalFailure {
            host: host.to_string(),
            entity_type: entity_type.map(str::to_string),
            error: error.to_string(),
        });
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub struct Runner<C: ReportClassifier> {
    classifier: C,
    remotes: Arc<dyn RemoteFactory>,
    progress: Arc<dyn ProgressFactory>,
    log: Arc<dyn DiagnosticLog>,
    on_error: OnError,
}

impl<C> Runner<C>
where
    C: ReportClassifier + Clone,
    C::Aggregate: RunTotals,
{
    pub fn new(
        classifier: C,
        remotes: Arc<dyn RemoteFactory>,
        log: Arc<dyn DiagnosticLog>,
        on_error: OnError,
    ) -> Self {
        Self {
            classifier,
            remotes,
            progress: Arc::new(NoProgress),
            log,
            on_error,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressFactory>) -> Self {
        self.progress = progress;
        self
    }

    /// Never fails as a whole; per-target and per-type failures land in the summary.
    pub async fn run(&self, targets: &[Target]) -> RunSummary {
        self.run_with_id(Uuid::new_v4(), targets).await
    }

    #[tracing::instrument(
        level = "info",
        skip(self, targets),
        fields(kind = %self.classifier.kind(), targets = targets.len())
    )]
    async fn run_with_id(&self, run_id: Uuid, targets: &[Target]) -> RunSummary {
        let kind = self.classifier.kind();
        let activity = kind.activity();
        let mut summary = RunSummary::new(run_id, kind, targets.len());

        for target in targets {
            self.log
                .info(&format!("Starting {activity} for {}...", target.host), None);
            let failed_before = summary.failed;
            self.run_target(target, &mut summary).await;

            if summary.failed == failed_before {
                self.log.info(
                    &format!("{} completed for {}", capitalize(activity), target.host),
                    None,
                );
            } else {
                let failures = &summary.failures[failed_before..];
                self.log.error(
                    &format!("Unable to complete {activity} for {}", target.host),
                    serde_json::to_value(failures).ok(),
                );
            }
        }

        summary.finished_at = Utc::now();
        self.log.info(
            &format!(
                "{} completed for {} targets",
                capitalize(activity),
                targets.len()
            ),
            serde_json::to_value(&summary).ok(),
        );
        summary
    }

    async fn run_target(&self, target: &Target, summary: &mut RunSummary) {
        let remote = match self.remotes.connect(target) {
            Ok(remote) => remote,
            Err(e) => {
                summary.fail(&target.host, None, &e);
                return;
            }
        };
        let engine = BatchTraversalEngine::new(
            remote,
            self.classifier.clone(),
            self.log.clone(),
            target.page_size,
        )
        .with_progress(self.progress.clone());

        for spec in &target.entity_types {
            match engine.run_for(&spec.name, &spec.filter).await {
                Ok(TraversalOutcome::Skipped { .. }) => summary.skipped += 1,
                Ok(TraversalOutcome::Completed(s)) => {
                    summary.completed += 1;
                    summary.entities += s.entities;
                    summary.absorb(s.aggregate.totals());
                }
                Err(e) => {
                    tracing::warn!(host = %target.host, entity_type = %spec.name, error = %e, "traversal failed");
                    summary.fail(&target.host, Some(spec.name.as_str()), &e);
                    if self.on_error == OnError::NextTarget {
                        return;
                    }
                }
            }
        }
    }
}
