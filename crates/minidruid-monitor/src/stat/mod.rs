//! Statement statistics module
//!
//! Collects execution statistics for every statement run through a
//! `StatConnection` and keeps the most recent slow statements for inspection.

mod collector;
mod connection;
mod merge;

#[cfg(test)]
mod tests;

pub use collector::*;
pub use connection::{StatConnection, StatPreparedStatement, StatTransaction};
pub use merge::merge_sql;
