//! minidruid monitor - statement statistics for pooled connections
//!
//! This crate provides the optional statistics decoration of the pool:
//! - Per-statement execution counters and timings
//! - A bounded ring buffer of slow statements
//! - SQL merging, so structurally identical statements share one counter
//! - A `Connection` wrapper that times everything executed through it

pub mod stat;

pub use stat::*;
