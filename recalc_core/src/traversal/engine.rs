use crate::models::is_disabled_filter;
use crate::traversal::cursor::PageCursor;
use crate::traversal::models::{
    OperationKind, SkipReason, TraversalContext, TraversalOutcome, TraversalSummary,
};
use crate::traversal::traits::{
    DiagnosticLog, NoProgress, ProgressFactory, RemoteApi, ReportClassifier,
};
use crate::{Error, Result};
use std::sync::Arc;

/// Count, then page through one entity collection and run a bulk operation per page.
///
/// One engine serves both operation kinds; the classifier decides the endpoint,
/// the page selection, and the aggregate. Pages are processed strictly one at a
/// time and a failure aborts the remaining pages without retrying.
pub struct BatchTraversalEngine<C: ReportClassifier> {
    remote: Arc<dyn RemoteApi>,
    classifier: C,
    progress: Arc<dyn ProgressFactory>,
    log: Arc<dyn DiagnosticLog>,
    page_size: usize,
}

impl<C: ReportClassifier> BatchTraversalEngine<C> {
    pub fn new(
        remote: Arc<dyn RemoteApi>,
        classifier: C,
        log: Arc<dyn DiagnosticLog>,
        page_size: usize,
    ) -> Self {
        Self {
            remote,
            classifier,
            progress: Arc::new(NoProgress),
            log,
            page_size,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressFactory>) -> Self {
        self.progress = progress;
        self
    }

    pub fn kind(&self) -> OperationKind {
        self.classifier.kind()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[tracing::instrument(level = "info", skip(self), fields(kind = %self.classifier.kind()))]
    pub async fn run_for(
        &self,
        entity_type: &str,
        filter: &str,
    ) -> Result<TraversalOutcome<C::Aggregate>> {
        if entity_type.trim().is_empty() {
            return Err(Error::InvalidInput("entity_type is empty".to_string()));
        }
        if self.page_size == 0 {
            return Err(Error::InvalidInput("page_size must be > 0".to_string()));
        }

        let activity = self.kind().activity();

        // Checked before any remote call.
        if is_disabled_filter(filter) {
            self.log
                .info(&format!("Skipping {activity} for {entity_type}"), None);
            return Ok(TraversalOutcome::Skipped {
                entity_type: entity_type.to_string(),
                reason: SkipReason::Disabled,
            });
        }

        let expected = match self.remote.count(entity_type, filter).await {
            Ok(n) => n,
            Err(e) => {
                self.log.error(
                    &format!("Unable to fetch count for {entity_type}."),
                    Some(error_detail(&e)),
                );
                return Err(e);
            }
        };

        if expected == 0 {
            self.log.info(
                &format!("Skipping {activity} for {entity_type} because no targets were found"),
                None,
            );
            return Ok(TraversalOutcome::Skipped {
                entity_type: entity_type.to_string(),
                reason: SkipReason::NoMatchingEntities,
            });
        }

        self.log.info(
            &format!("Starting {activity} for {entity_type} (count = {expected})..."),
            None,
        );

        let progress = self.progress.start(entity_type, expected);
        let mut ctx = TraversalContext::new(entity_type, filter, progress);
        let result = self.traverse(&mut ctx).await;
        ctx.progress.finish();
        let (aggregate, pages, entities) = result?;

        let elapsed = ctx.elapsed();
        self.log.info(
            &format!(
                "Completed {activity} for {entity_type} (time = {:.3} s)",
                elapsed.as_secs_f64()
            ),
            Some(serde_json::json!({
                "pages": pages,
                "entities": entities,
                "aggregate": serde_json::to_value(&aggregate).unwrap_or(serde_json::Value::Null),
            })),
        );

        Ok(TraversalOutcome::Completed(TraversalSummary {
            entity_type: ctx.entity_type,
            expected,
            pages,
            entities,
            started_at: ctx.started_at,
            elapsed,
            aggregate,
        }))
    }

    /// The page loop. Returns `(aggregate, pages, entities)`.
    async fn traverse(&self, ctx: &mut TraversalContext) -> Result<(C::Aggregate, u64, u64)> {
        let kind = self.kind();
        let selection = self.classifier.selection();
        let entity_type = ctx.entity_type.clone();

        let mut cursor = PageCursor::new(ctx.filter.clone());
        let mut acc = C::Aggregate::default();
        let mut pages = 0u64;
        let mut entities = 0u64;

        while !cursor.is_exhausted() {
            let fetched = self
                .remote
                .fetch_page(&entity_type, &cursor.predicate(), selection, self.page_size)
                .await;
            let page = match fetched {
                Ok(page) => page,
                Err(e) => {
                    self.log.error(
                        &format!("Unable to fetch ids for {entity_type}."),
                        Some(error_detail(&e)),
                    );
                    return Err(self.aborted(&entity_type, pages, &acc, e));
                }
            };
            if page.is_empty() {
                cursor.advance(&page);
                break;
            }

            let targets = ctx.refs_for(page);
            let report = match self.remote.invoke(kind, &targets).await {
                Ok(report) => report,
                Err(e) => {
                    self.log.error(
                        &format!(
                            "Unable to run {} for {} targets.",
                            kind.operation_name(),
                            targets.len()
                        ),
                        Some(error_detail(&e)),
                    );
                    return Err(self.aborted(&entity_type, pages, &acc, e));
                }
            };

            self.classifier
                .fold(&entity_type, &report, &mut acc, self.log.as_ref());

            let size = targets.len() as u64;
            ctx.progress.tick(size);
            pages += 1;
            entities += size;
            cursor.advance(&targets);

            tracing::debug!(
                entity_type = %entity_type,
                page = pages,
                size,
                next_min_id = cursor.min_id(),
                "page processed"
            );
        }

        Ok((acc, pages, entities))
    }

    fn aborted(
        &self,
        entity_type: &str,
        pages_completed: u64,
        partial: &C::Aggregate,
        source: Error,
    ) -> Error {
        Error::TraversalAborted {
            entity_type: entity_type.to_string(),
            pages_completed,
            partial: serde_json::to_value(partial).unwrap_or(serde_json::Value::Null),
            source: Box::new(source),
        }
    }
}

fn error_detail(e: &Error) -> serde_json::Value {
    let mut chain = Vec::new();
    let mut cur: Option<&(dyn std::error::Error + 'static)> = Some(e);
    while let Some(err) = cur {
        chain.push(err.to_string());
        cur = err.source();
    }
    serde_json::json!({ "error": e.to_string(), "chain": chain })
}
