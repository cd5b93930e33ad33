use crate::Result;
use crate::models::EntityRef;
use crate::traversal::models::{OperationKind, OperationReport, Selection};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Debug;

/// Resolves how many remote entities match a filter.
#[async_trait]
pub trait EntityCounter: Send + Sync {
    /// One remote read. Fails with `Error::RemoteRequest`.
    async fn count(&self, entity_type: &str, filter: &str) -> Result<u64>;
}

/// Fetches one page of entity ids.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Up to `page_size` refs matching `predicate`, ordered by ascending id.
    ///
    /// With `Selection::Ids` the returned refs may carry an empty entity type;
    /// the engine fills in the configured name.
    async fn fetch_page(
        &self,
        entity_type: &str,
        predicate: &str,
        selection: Selection,
        page_size: usize,
    ) -> Result<Vec<EntityRef>>;
}

/// Sends a page worth of refs to a bulk endpoint.
#[async_trait]
pub trait BulkOperation: Send + Sync {
    /// Fails with `Error::RemoteOperation`. Not retried.
    async fn invoke(&self, kind: OperationKind, targets: &[EntityRef]) -> Result<OperationReport>;
}

/// Everything a traversal needs from one remote account.
pub trait RemoteApi: EntityCounter + PageSource + BulkOperation {}

impl<T> RemoteApi for T where T: EntityCounter + PageSource + BulkOperation {}

/// Receives tick increments as pages complete.
pub trait ProgressSink: Send {
    fn tick(&mut self, n: u64);

    fn finish(&mut self) {}
}

/// Creates one progress sink per traversal.
pub trait ProgressFactory: Send + Sync {
    fn start(&self, entity_type: &str, total: u64) -> Box<dyn ProgressSink>;
}

/// Progress that goes nowhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn tick(&mut self, _n: u64) {}
}

impl ProgressFactory for NoProgress {
    fn start(&self, _entity_type: &str, _total: u64) -> Box<dyn ProgressSink> {
        Box::new(NoProgress)
    }
}

/// Injected logging capability for summaries and per-entity diagnostics.
///
/// `detail` is an optional structured payload (usually the offending report).
pub trait DiagnosticLog: Send + Sync {
    fn info(&self, message: &str, detail: Option<serde_json::Value>);
    fn warn(&self, message: &str, detail: Option<serde_json::Value>);
    fn error(&self, message: &str, detail: Option<serde_json::Value>);
}

/// Per-operation policy plugged into the traversal engine.
///
/// Picks the bulk endpoint, the page selection, and how page reports fold into
/// the running aggregate.
pub trait ReportClassifier: Send + Sync {
    type Aggregate: Default + Clone + Debug + Serialize + Send + Sync;

    fn kind(&self) -> OperationKind;

    fn selection(&self) -> Selection;

    /// Fold one page's report into `acc`, emitting diagnostics on `log`.
    /// Totals never decrease.
    fn fold(
        &self,
        entity_type: &str,
        report: &OperationReport,
        acc: &mut Self::Aggregate,
        log: &dyn DiagnosticLog,
    );
}
