//! In-memory collaborators for tests: a fake remote, a recording log, and a
//! recording progress factory.
//!
//! Compiled for this crate's tests and, for downstream crates, behind the
//! `test-support` feature.

use crate::models::EntityRef;
use crate::traversal::models::{OperationKind, OperationReport, PerEntityReport, Selection};
use crate::traversal::traits::{
    BulkOperation, DiagnosticLog, EntityCounter, PageSource, ProgressFactory, ProgressSink,
};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A remote call observed by `FakeRemote`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Count {
        entity_type: String,
        filter: String,
    },
    FetchPage {
        entity_type: String,
        predicate: String,
        page_size: usize,
    },
    Invoke {
        kind: OperationKind,
        targets: Vec<EntityRef>,
    },
}

type PageHook = Box<dyn FnMut(&mut Vec<u64>) + Send>;

struct FakeState {
    /// Sorted; duplicates allowed.
    ids: Vec<u64>,
    calls: Vec<RemoteCall>,
    page_fetches: usize,
    bulk_calls: usize,
    hooks: HashMap<usize, PageHook>,
}

/// In-memory remote over a mutable id collection.
///
/// Only the `(id>=N)` clause of a page predicate is interpreted; the filter
/// itself matches everything. Bulk calls answer with scripted reports, or a
/// clean report for unscripted ids.
pub struct FakeRemote {
    resolved_name: String,
    state: Mutex<FakeState>,
    reports: HashMap<u64, PerEntityReport>,
    fail_count: bool,
    fail_page: Option<usize>,
    fail_bulk: Option<usize>,
    max_take: Option<usize>,
}

impl FakeRemote {
    /// `resolved_name` is what the remote reports as the entity type display name.
    pub fn new(resolved_name: impl Into<String>, ids: impl IntoIterator<Item = u64>) -> Self {
        let mut ids: Vec<u64> = ids.into_iter().collect();
        ids.sort_unstable();
        Self {
            resolved_name: resolved_name.into(),
            state: Mutex::new(FakeState {
                ids,
                calls: Vec::new(),
                page_fetches: 0,
                bulk_calls: 0,
                hooks: HashMap::new(),
            }),
            reports: HashMap::new(),
            fail_count: false,
            fail_page: None,
            fail_bulk: None,
            max_take: None,
        }
    }

    pub fn with_report(mut self, id: u64, report: PerEntityReport) -> Self {
        self.reports.insert(id, report);
        self
    }

    pub fn fail_count(mut self) -> Self {
        self.fail_count = true;
        self
    }

    /// Fail the n-th page fetch (1-based).
    pub fn fail_page_fetch(mut self, n: usize) -> Self {
        self.fail_page = Some(n);
        self
    }

    /// Fail the n-th bulk call (1-based).
    pub fn fail_bulk_call(mut self, n: usize) -> Self {
        self.fail_bulk = Some(n);
        self
    }

    /// Serve at most `n` items per page regardless of the requested size.
    pub fn cap_take(mut self, n: usize) -> Self {
        self.max_take = Some(n);
        self
    }

    /// Mutate the collection right after the n-th page fetch (1-based) is served.
    pub fn on_page(self, n: usize, hook: impl FnMut(&mut Vec<u64>) + Send + 'static) -> Self {
        lock(&self.state).hooks.insert(n, Box::new(hook));
        self
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        lock(&self.state).calls.clone()
    }

    pub fn page_fetches(&self) -> usize {
        lock(&self.state).page_fetches
    }

    pub fn page_predicates(&self) -> Vec<String> {
        lock(&self.state)
            .calls
            .iter()
            .filter_map(|c| match c {
                RemoteCall::FetchPage { predicate, .. } => Some(predicate.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn bulk_targets(&self) -> Vec<Vec<EntityRef>> {
        lock(&self.state)
            .calls
            .iter()
            .filter_map(|c| match c {
                RemoteCall::Invoke { targets, .. } => Some(targets.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn bulk_sizes(&self) -> Vec<usize> {
        self.bulk_targets().iter().map(Vec::len).collect()
    }
}

/// Lower id bound encoded in a page predicate, `0` when there is none.
fn min_id_of(predicate: &str) -> u64 {
    predicate
        .rsplit_once("(id>=")
        .and_then(|(_, rest)| rest.trim_end_matches(')').parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl EntityCounter for FakeRemote {
    async fn count(&self, entity_type: &str, filter: &str) -> Result<u64> {
        let mut state = lock(&self.state);
        state.calls.push(RemoteCall::Count {
            entity_type: entity_type.to_string(),
            filter: filter.to_string(),
        });
        if self.fail_count {
            return Err(Error::remote_request_msg("count", "simulated transport error"));
        }
        Ok(state.ids.len() as u64)
    }
}

#[async_trait]
impl PageSource for FakeRemote {
    async fn fetch_page(
        &self,
        entity_type: &str,
        predicate: &str,
        selection: Selection,
        page_size: usize,
    ) -> Result<Vec<EntityRef>> {
        let mut state = lock(&self.state);
        state.calls.push(RemoteCall::FetchPage {
            entity_type: entity_type.to_string(),
            predicate: predicate.to_string(),
            page_size,
        });
        state.page_fetches += 1;
        let n = state.page_fetches;
        if self.fail_page == Some(n) {
            return Err(Error::remote_request_msg(
                "fetch ids",
                "simulated transport error",
            ));
        }

        let min_id = min_id_of(predicate);
        let name = match selection {
            Selection::Ids => String::new(),
            Selection::IdsWithEntityType => self.resolved_name.clone(),
        };
        let page: Vec<EntityRef> = state
            .ids
            .iter()
            .filter(|id| **id >= min_id)
            .take(self.max_take.map_or(page_size, |cap| cap.min(page_size)))
            .map(|id| EntityRef::new(*id, name.clone()))
            .collect();

        if let Some(mut hook) = state.hooks.remove(&n) {
            hook(&mut state.ids);
            state.ids.sort_unstable();
        }
        Ok(page)
    }
}

#[async_trait]
impl BulkOperation for FakeRemote {
    async fn invoke(&self, kind: OperationKind, targets: &[EntityRef]) -> Result<OperationReport> {
        let mut state = lock(&self.state);
        state.calls.push(RemoteCall::Invoke {
            kind,
            targets: targets.to_vec(),
        });
        state.bulk_calls += 1;
        if self.fail_bulk == Some(state.bulk_calls) {
            return Err(Error::remote_operation_msg(
                kind.operation_name(),
                "simulated transport error",
            ));
        }
        let reports = targets
            .iter()
            .map(|t| {
                self.reports
                    .get(&t.id)
                    .cloned()
                    .unwrap_or_else(|| PerEntityReport::new(t.id, t.entity_type.clone()))
            })
            .collect();
        Ok(OperationReport { reports })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub level: LogLevel,
    pub message: String,
    pub detail: Option<serde_json::Value>,
}

/// `DiagnosticLog` that keeps every line in memory.
#[derive(Debug, Default)]
pub struct RecordingLog {
    lines: Mutex<Vec<LogLine>>,
}

impl RecordingLog {
    pub fn lines(&self) -> Vec<LogLine> {
        lock(&self.lines).clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        lock(&self.lines).iter().any(|l| l.message.contains(needle))
    }

    fn push(&self, level: LogLevel, message: &str, detail: Option<serde_json::Value>) {
        lock(&self.lines).push(LogLine {
            level,
            message: message.to_string(),
            detail,
        });
    }
}

impl DiagnosticLog for RecordingLog {
    fn info(&self, message: &str, detail: Option<serde_json::Value>) {
        self.push(LogLevel::Info, message, detail);
    }

    fn warn(&self, message: &str, detail: Option<serde_json::Value>) {
        self.push(LogLevel::Warn, message, detail);
    }

    fn error(&self, message: &str, detail: Option<serde_json::Value>) {
        self.push(LogLevel::Error, message, detail);
    }
}

#[derive(Debug, Default, Clone)]
struct ProgressRecord {
    total: u64,
    ticks: Vec<u64>,
    finished: bool,
}

/// `ProgressFactory` that records totals and ticks per entity type.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    records: Arc<Mutex<BTreeMap<String, ProgressRecord>>>,
}

impl RecordingProgress {
    pub fn ticks(&self, entity_type: &str) -> Vec<u64> {
        lock(&self.records)
            .get(entity_type)
            .map(|r| r.ticks.clone())
            .unwrap_or_default()
    }

    pub fn total(&self, entity_type: &str) -> Option<u64> {
        lock(&self.records).get(entity_type).map(|r| r.total)
    }

    pub fn finished(&self, entity_type: &str) -> bool {
        lock(&self.records)
            .get(entity_type)
            .is_some_and(|r| r.finished)
    }
}

struct RecordingSink {
    entity_type: String,
    records: Arc<Mutex<BTreeMap<String, ProgressRecord>>>,
}

impl ProgressSink for RecordingSink {
    fn tick(&mut self, n: u64) {
        if let Some(r) = lock(&self.records).get_mut(&self.entity_type) {
            r.ticks.push(n);
        }
    }

    fn finish(&mut self) {
        if let Some(r) = lock(&self.records).get_mut(&self.entity_type) {
            r.finished = true;
        }
    }
}

impl ProgressFactory for RecordingProgress {
    fn start(&self, entity_type: &str, total: u64) -> Box<dyn ProgressSink> {
        lock(&self.records).insert(
            entity_type.to_string(),
            ProgressRecord {
                total,
                ..Default::default()
            },
        );
        Box::new(RecordingSink {
            entity_type: entity_type.to_string(),
            records: self.records.clone(),
        })
    }
}
