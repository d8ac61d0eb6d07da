//! Connection validation
//!
//! Runs the configured validation query against a physical connection and
//! measures the round trip. Without a validation query a connection is
//! considered valid as long as the driver does not report it closed.

use std::time::{Duration, Instant};

use minidruid_core::{Connection, MiniDruidError, Result};

/// Check that a connection is still usable.
///
/// Returns the round-trip time of the validation query, or a
/// `MiniDruidError::Validation` describing why the connection was rejected.
pub(crate) async fn validate_connection(
    conn: &dyn Connection,
    query: Option<&str>,
    timeout: Option<Duration>,
) -> Result<Duration> {
    if conn.is_closed() {
        return Err(MiniDruidError::Validation("connection is closed".into()));
    }

    let Some(query) = query else {
        return Ok(Duration::ZERO);
    };

    let start = Instant::now();
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, conn.query(query, &[])).await {
            Ok(result) => result,
            Err(_) => {
                return Err(MiniDruidError::Validation(format!(
                    "validation query timed out after {:?}",
                    limit
                )));
            }
        },
        None => conn.query(query, &[]).await,
    };

    match outcome {
        Ok(_) => Ok(start.elapsed()),
        Err(e) => Err(MiniDruidError::Validation(format!(
            "validation query failed: {}",
            e
        ))),
    }
}
