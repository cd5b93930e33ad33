//! Targetprocess REST client.
//!
//! Counts and id pages go through the v2 query API; recompute and validate go
//! through the MetricSetup bulk endpoints. The account token travels as a
//! query parameter, so URLs are redacted before they reach logs or errors.

pub mod client;
pub mod types;

pub use client::TargetprocessClient;
