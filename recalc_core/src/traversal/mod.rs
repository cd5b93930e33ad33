//! Batch traversal: cursor-paginated bulk operations over remote entity collections.
//!
//! For one entity type and filter the engine:
//! - Counts matching entities and short-circuits when there are none
//! - Fetches id pages in ascending order behind a minimum-id cursor
//! - Sends each page to a bulk endpoint (recompute or validate)
//! - Folds per-entity reports into a running aggregate and ticks progress

pub mod classify;
pub mod cursor;
pub mod engine;
pub mod models;
pub mod traits;
