//! minidruid core - shared abstractions for the pooled data source
//!
//! This crate provides the traits and types that the pool and the
//! statistics layer agree on:
//!
//! - `Connection` - a physical database connection supplied by a driver
//! - `Transaction` - a transaction opened on a connection
//! - `PreparedStatement` - a statement prepared once and executed many times
//! - `MiniDruidError` - the error taxonomy used across the workspace
//! - Common types like `Value`, `Row`, `QueryResult`

mod connection;
mod error;
pub mod transaction;
mod types;

pub use connection::*;
pub use error::*;
pub use transaction::*;
pub use types::*;
