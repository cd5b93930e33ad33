//! recalc core library: models, configuration, and the batch traversal engine
//! shared by the HTTP integration and the command-line runner.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod models;
pub mod o11y;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traversal;

pub use config::{DefaultsConfig, EntityTypeConfig, OnError, RecalcConfig, TargetConfig};
pub use error::{Error, Result};
pub use models::{EntityRef, EntityTypeSpec, Protocol, Target, is_disabled_filter};
pub use o11y::TracingLog;
pub use traversal::classify::{RecomputeClassifier, ValidateClassifier};
pub use traversal::engine::BatchTraversalEngine;
pub use traversal::models::{
    AggregateReport, OperationKind, OperationReport, PerEntityReport, Selection, SkipReason,
    TraversalOutcome, TraversalSummary,
};
pub use traversal::traits::{
    BulkOperation, DiagnosticLog, EntityCounter, NoProgress, PageSource, ProgressFactory,
    ProgressSink, RemoteApi, ReportClassifier,
};
