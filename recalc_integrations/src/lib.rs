//! HTTP collaborators for the recalc traversal engine.

#![forbid(unsafe_code)]

pub mod targetprocess;

pub use targetprocess::TargetprocessClient;
