//! Retention — capping how many captures are kept.
//!
//! When the capture count exceeds the configured maximum, the oldest rows
//! are evicted along with their index entries and image files. File removal
//! is best effort; a missing file never blocks eviction.

use anyhow::Result;
use rusqlite::Connection;

use crate::context::store;
use crate::index;

/// Evict the oldest captures until at most `max_captures` remain.
///
/// Returns the number of captures evicted.
pub fn enforce(conn: &mut Connection, max_captures: usize) -> Result<usize> {
    let count = store::capture_count(conn)?;
    if count <= max_captures {
        return Ok(0);
    }

    let excess = count - max_captures;
    let victims = store::oldest_captures(conn, excess)?;
    let mut evicted = 0;

    for capture in victims {
        index::delete(conn, &capture.id)?;
        store::delete_capture(conn, &capture.id)?;
        evicted += 1;

        if let Err(e) = std::fs::remove_file(&capture.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %capture.path, error = %e, "failed to remove capture file");
            }
        }
    }

    tracing::info!(evicted, remaining = max_captures, "retention pass complete");
    Ok(evicted)
}
