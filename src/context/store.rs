//! Metadata store — SQL read/write paths for captures, tasks, and
//! activity links.
//!
//! The vector side lives in [`crate::index`]; this module owns the relational
//! tables. Duplicate-hash lookups use the `hash_prefix` bucket column so the
//! near-duplicate scan touches one bucket instead of the whole table.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::capture::hash::PerceptualHash;
use crate::context::types::{ActivityLink, Capture, Task, TaskStatus};

fn row_to_capture(row: &Row) -> rusqlite::Result<Capture> {
    Ok(Capture {
        id: row.get(0)?,
        path: row.get(1)?,
        created_at: row.get(2)?,
        image_hash: row.get(3)?,
        hash_prefix: row.get(4)?,
        file_size: row.get::<_, i64>(5)? as u64,
        description: row.get(6)?,
        tags: row.get(7)?,
        analyzed: row.get::<_, i64>(8)? != 0,
        embedded: row.get::<_, i64>(9)? != 0,
        embedding_model: row.get(10)?,
        task_id: row.get(11)?,
    })
}

const CAPTURE_COLS: &str = "id, path, created_at, image_hash, hash_prefix, file_size, \
     description, tags, analyzed, embedded, embedding_model, task_id";

/// Insert a new capture row. The id must be a fresh UUID v7.
pub fn insert_capture(conn: &Connection, capture: &Capture) -> Result<()> {
    conn.execute(
        "INSERT INTO captures (id, path, created_at, image_hash, hash_prefix, file_size, \
         description, tags, analyzed, embedded, embedding_model, task_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            capture.id,
            capture.path,
            capture.created_at,
            capture.image_hash,
            capture.hash_prefix,
            capture.file_size as i64,
            capture.description,
            capture.tags,
            capture.analyzed as i64,
            capture.embedded as i64,
            capture.embedding_model,
            capture.task_id,
        ],
    )?;
    Ok(())
}

pub fn get_capture(conn: &Connection, id: &str) -> Result<Option<Capture>> {
    let capture = conn
        .query_row(
            &format!("SELECT {CAPTURE_COLS} FROM captures WHERE id = ?1"),
            params![id],
            row_to_capture,
        )
        .optional()?;
    Ok(capture)
}

/// Find a capture whose hash is byte-identical to the given one.
pub fn find_exact_hash(conn: &Connection, hash: &PerceptualHash) -> Result<Option<String>> {
    let id = conn
        .query_row(
            "SELECT id FROM captures WHERE image_hash = ?1 LIMIT 1",
            params![hash.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Find a capture whose hash is within `threshold` bits of the given one.
///
/// Scans only the hash's prefix bucket. A near-duplicate whose differing bits
/// fall in the top 16 can land in a neighboring bucket and be missed; the
/// exact-match check and last-hash comparison still catch the common case.
pub fn find_near_hash(
    conn: &Connection,
    hash: &PerceptualHash,
    threshold: u32,
) -> Result<Option<String>> {
    let mut stmt = conn.prepare(
        "SELECT id, image_hash FROM captures WHERE hash_prefix = ?1 AND image_hash IS NOT NULL",
    )?;
    let rows: Vec<(String, String)> = stmt
        .query_map(params![hash.prefix_key()], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for (id, stored) in rows {
        if let Ok(stored_hash) = stored.parse::<PerceptualHash>() {
            if hash.is_near(&stored_hash, threshold) {
                return Ok(Some(id));
            }
        }
    }
    Ok(None)
}

/// Hash of the most recently persisted capture, if any.
pub fn latest_capture_hash(conn: &Connection) -> Result<Option<PerceptualHash>> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT image_hash FROM captures WHERE image_hash IS NOT NULL \
             ORDER BY created_at DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(stored.and_then(|s| s.parse().ok()))
}

/// Record an analyzer's output for a capture and mark it analyzed.
pub fn update_analysis(
    conn: &Connection,
    id: &str,
    description: &str,
    tags: &str,
) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE captures SET description = ?1, tags = ?2, analyzed = 1 WHERE id = ?3",
        params![description, tags, id],
    )?;
    Ok(rows > 0)
}

/// Flag a capture as embedded and record the model that produced the vector.
pub fn mark_embedded(conn: &Connection, id: &str, model: &str) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE captures SET embedded = 1, embedding_model = ?1 WHERE id = ?2",
        params![model, id],
    )?;
    Ok(rows > 0)
}

/// Captures that have been analyzed but whose descriptions are not yet in the
/// vector index. Oldest first so backlog drains in capture order.
/// Whitespace-only descriptions are excluded; they have nothing to embed and
/// would otherwise sit at the head of the backlog forever.
pub fn pending_embeddings(conn: &Connection, limit: usize) -> Result<Vec<Capture>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CAPTURE_COLS} FROM captures \
         WHERE analyzed = 1 AND embedded = 0 AND description IS NOT NULL \
           AND TRIM(description, ' ' || CHAR(9) || CHAR(10) || CHAR(13)) != '' \
         ORDER BY created_at ASC LIMIT ?1"
    ))?;
    let captures = stmt
        .query_map(params![limit as i64], row_to_capture)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(captures)
}

/// Most recent captures, newest first.
pub fn recent_captures(conn: &Connection, limit: usize) -> Result<Vec<Capture>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CAPTURE_COLS} FROM captures ORDER BY created_at DESC LIMIT ?1"
    ))?;
    let captures = stmt
        .query_map(params![limit as i64], row_to_capture)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(captures)
}

/// Most recent captures that are both analyzed and embedded, newest first.
/// Used as the resurfacing fallback when no query context is available.
pub fn recent_analyzed_captures(conn: &Connection, limit: usize) -> Result<Vec<Capture>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CAPTURE_COLS} FROM captures \
         WHERE analyzed = 1 AND embedded = 1 \
         ORDER BY created_at DESC LIMIT ?1"
    ))?;
    let captures = stmt
        .query_map(params![limit as i64], row_to_capture)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(captures)
}

pub fn capture_count(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM captures", [], |row| row.get(0))?;
    Ok(count as usize)
}

/// The `n` oldest captures, oldest first. Retention evicts from this end.
pub fn oldest_captures(conn: &Connection, n: usize) -> Result<Vec<Capture>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CAPTURE_COLS} FROM captures ORDER BY created_at ASC LIMIT ?1"
    ))?;
    let captures = stmt
        .query_map(params![n as i64], row_to_capture)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(captures)
}

/// Delete a capture row. Activity links cascade. Returns `false` if the id
/// did not exist.
pub fn delete_capture(conn: &Connection, id: &str) -> Result<bool> {
    let rows = conn.execute("DELETE FROM captures WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

/// Manually assign a capture to a task.
pub fn set_capture_task(conn: &Connection, capture_id: &str, task_id: &str) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE captures SET task_id = ?1 WHERE id = ?2",
        params![task_id, capture_id],
    )?;
    Ok(rows > 0)
}

// --- tasks ---

fn row_to_task(row: &Row) -> rusqlite::Result<Task> {
    let status: String = row.get(3)?;
    let embedding: Option<Vec<u8>> = row.get(4)?;
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: status.parse().unwrap_or(TaskStatus::Active),
        embedding: embedding.as_deref().and_then(crate::context::bytes_to_embedding),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

const TASK_COLS: &str = "id, title, description, status, embedding, created_at, updated_at";

pub fn insert_task(conn: &Connection, task: &Task) -> Result<()> {
    let embedding_bytes = task
        .embedding
        .as_deref()
        .map(|e| crate::context::embedding_to_bytes(e).to_vec());
    conn.execute(
        "INSERT INTO tasks (id, title, description, status, embedding, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            task.id,
            task.title,
            task.description,
            task.status.as_str(),
            embedding_bytes,
            task.created_at,
            task.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_task(conn: &Connection, id: &str) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            &format!("SELECT {TASK_COLS} FROM tasks WHERE id = ?1"),
            params![id],
            row_to_task,
        )
        .optional()?;
    Ok(task)
}

/// Active tasks that carry an embedding. These are the only match candidates.
pub fn active_tasks_with_embeddings(conn: &Connection) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLS} FROM tasks WHERE status = 'active' AND embedding IS NOT NULL"
    ))?;
    let tasks = stmt
        .query_map([], row_to_task)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tasks)
}

pub fn set_task_embedding(conn: &Connection, id: &str, embedding: &[f32]) -> Result<bool> {
    let now = chrono::Utc::now().to_rfc3339();
    let rows = conn.execute(
        "UPDATE tasks SET embedding = ?1, updated_at = ?2 WHERE id = ?3",
        params![crate::context::embedding_to_bytes(embedding), now, id],
    )?;
    Ok(rows > 0)
}

pub fn set_task_status(conn: &Connection, id: &str, status: TaskStatus) -> Result<bool> {
    let now = chrono::Utc::now().to_rfc3339();
    let rows = conn.execute(
        "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now, id],
    )?;
    Ok(rows > 0)
}

// --- activity links ---

fn row_to_link(row: &Row) -> rusqlite::Result<ActivityLink> {
    let method: String = row.get(4)?;
    let activity_type: String = row.get(6)?;
    Ok(ActivityLink {
        id: row.get(0)?,
        capture_id: row.get(1)?,
        task_id: row.get(2)?,
        confidence: row.get(3)?,
        method: method
            .parse()
            .unwrap_or(crate::context::types::MatchMethod::Semantic),
        duration_minutes: row.get::<_, i64>(5)? as u32,
        activity_type: activity_type
            .parse()
            .unwrap_or(crate::context::types::ActivityType::General),
        description: row.get(7)?,
        created_at: row.get(8)?,
    })
}

const LINK_COLS: &str = "id, capture_id, task_id, confidence, method, duration_minutes, \
     activity_type, description, created_at";

pub fn insert_link(conn: &Connection, link: &ActivityLink) -> Result<()> {
    conn.execute(
        "INSERT INTO activity_links (id, capture_id, task_id, confidence, method, \
         duration_minutes, activity_type, description, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            link.id,
            link.capture_id,
            link.task_id,
            link.confidence,
            link.method.as_str(),
            link.duration_minutes as i64,
            link.activity_type.as_str(),
            link.description,
            link.created_at,
        ],
    )?;
    Ok(())
}

pub fn links_for_capture(conn: &Connection, capture_id: &str) -> Result<Vec<ActivityLink>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LINK_COLS} FROM activity_links WHERE capture_id = ?1 ORDER BY confidence DESC"
    ))?;
    let links = stmt
        .query_map(params![capture_id], row_to_link)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(links)
}

pub fn links_for_task(conn: &Connection, task_id: &str) -> Result<Vec<ActivityLink>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LINK_COLS} FROM activity_links WHERE task_id = ?1 ORDER BY created_at DESC"
    ))?;
    let links = stmt
        .query_map(params![task_id], row_to_link)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(links)
}

/// Creation timestamps of captures in `[since, until]`, excluding
/// `exclude_id`, oldest first. Feeds the matcher's duration estimate.
pub fn capture_times_between(
    conn: &Connection,
    since: &str,
    until: &str,
    exclude_id: &str,
) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT created_at FROM captures \
         WHERE created_at >= ?1 AND created_at <= ?2 AND id != ?3 \
         ORDER BY created_at ASC",
    )?;
    let times = stmt
        .query_map(params![since, until, exclude_id], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(times)
}
