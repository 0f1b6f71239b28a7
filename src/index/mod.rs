//! Vector index over capture embeddings.
//!
//! Vectors live in the `captures_vec` vec0 virtual table; the denormalized
//! text metadata for each entry lives in `captures_vec_meta`. Writes keep the
//! two in lockstep inside a transaction. KNN queries return raw L2 distances;
//! callers convert them to similarity scores.

use anyhow::{bail, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::context::embedding_to_bytes;
use crate::embedding::EMBEDDING_DIM;

/// One indexed capture: vector plus its denormalized metadata.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: String,
    pub embedding: Vec<f32>,
    pub description: String,
    pub tags: String,
    pub created_at: String,
}

/// A KNN result with the raw vec0 L2 distance.
#[derive(Debug, Clone)]
pub struct IndexMatch {
    pub id: String,
    pub distance: f64,
    pub description: String,
    pub tags: String,
    pub created_at: String,
}

fn check_dimensions(embedding: &[f32]) -> Result<()> {
    if embedding.len() != EMBEDDING_DIM {
        bail!(
            "embedding has {} dimensions, expected {EMBEDDING_DIM}",
            embedding.len()
        );
    }
    Ok(())
}

/// Insert a new entry. Fails if the id is already indexed.
pub fn add(conn: &mut Connection, entry: &IndexEntry) -> Result<()> {
    check_dimensions(&entry.embedding)?;
    if contains(conn, &entry.id)? {
        bail!("capture {} is already indexed", entry.id);
    }

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO captures_vec (id, embedding) VALUES (?1, ?2)",
        params![entry.id, embedding_to_bytes(&entry.embedding)],
    )?;
    tx.execute(
        "INSERT INTO captures_vec_meta (id, description, tags, created_at) \
         VALUES (?1, ?2, ?3, ?4)",
        params![entry.id, entry.description, entry.tags, entry.created_at],
    )?;
    tx.commit()?;
    Ok(())
}

/// Replace an existing entry's vector and metadata. Fields left `None` keep
/// their current value. Fails if the id is not indexed.
pub fn update(
    conn: &mut Connection,
    id: &str,
    embedding: Option<&[f32]>,
    description: Option<&str>,
    tags: Option<&str>,
) -> Result<()> {
    let existing = get(conn, id)?;
    let Some(existing) = existing else {
        bail!("capture {id} is not indexed");
    };

    let tx = conn.transaction()?;
    if let Some(embedding) = embedding {
        check_dimensions(embedding)?;
        tx.execute(
            "UPDATE captures_vec SET embedding = ?1 WHERE id = ?2",
            params![embedding_to_bytes(embedding), id],
        )?;
    }
    tx.execute(
        "UPDATE captures_vec_meta SET description = ?1, tags = ?2 WHERE id = ?3",
        params![
            description.unwrap_or(&existing.description),
            tags.unwrap_or(&existing.tags),
            id
        ],
    )?;
    tx.commit()?;
    Ok(())
}

/// Insert or replace an entry. The write path uses this so a capture row
/// whose index entry went missing heals on the next embed pass.
pub fn upsert(conn: &mut Connection, entry: &IndexEntry) -> Result<()> {
    check_dimensions(&entry.embedding)?;

    let tx = conn.transaction()?;
    // vec0 has no ON CONFLICT support; delete-then-insert instead
    tx.execute("DELETE FROM captures_vec WHERE id = ?1", params![entry.id])?;
    tx.execute(
        "INSERT INTO captures_vec (id, embedding) VALUES (?1, ?2)",
        params![entry.id, embedding_to_bytes(&entry.embedding)],
    )?;
    tx.execute(
        "INSERT INTO captures_vec_meta (id, description, tags, created_at) \
         VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT(id) DO UPDATE SET description = ?2, tags = ?3, created_at = ?4",
        params![entry.id, entry.description, entry.tags, entry.created_at],
    )?;
    tx.commit()?;
    Ok(())
}

/// Remove an entry. Returns `false` if the id was not indexed.
pub fn delete(conn: &mut Connection, id: &str) -> Result<bool> {
    let tx = conn.transaction()?;
    let removed = tx.execute("DELETE FROM captures_vec WHERE id = ?1", params![id])?;
    tx.execute("DELETE FROM captures_vec_meta WHERE id = ?1", params![id])?;
    tx.commit()?;
    Ok(removed > 0)
}

pub fn contains(conn: &Connection, id: &str) -> Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM captures_vec WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Fetch an entry with its vector and metadata.
pub fn get(conn: &Connection, id: &str) -> Result<Option<IndexEntry>> {
    let row: Option<(Vec<u8>, String, String, String)> = conn
        .query_row(
            "SELECT v.embedding, m.description, m.tags, m.created_at \
             FROM captures_vec v JOIN captures_vec_meta m ON m.id = v.id \
             WHERE v.id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()?;

    let Some((bytes, description, tags, created_at)) = row else {
        return Ok(None);
    };
    let Some(embedding) = crate::context::bytes_to_embedding(&bytes) else {
        bail!("stored embedding for {id} has invalid byte length {}", bytes.len());
    };
    Ok(Some(IndexEntry {
        id: id.to_string(),
        embedding,
        description,
        tags,
        created_at,
    }))
}

pub fn count(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM captures_vec", [], |row| row.get(0))?;
    Ok(count as usize)
}

/// K-nearest-neighbor query, ascending by L2 distance.
pub fn query(conn: &Connection, embedding: &[f32], limit: usize) -> Result<Vec<IndexMatch>> {
    check_dimensions(embedding)?;

    let mut stmt = conn.prepare(
        "SELECT v.id, v.distance, m.description, m.tags, m.created_at \
         FROM (SELECT id, distance FROM captures_vec \
               WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2) v \
         JOIN captures_vec_meta m ON m.id = v.id \
         ORDER BY v.distance",
    )?;

    let matches = stmt
        .query_map(params![embedding_to_bytes(embedding), limit as i64], |row| {
            Ok(IndexMatch {
                id: row.get(0)?,
                distance: row.get(1)?,
                description: row.get(2)?,
                tags: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_db() -> Connection {
        db::open_memory_database().unwrap()
    }

    /// Unit vector along the given dimension.
    fn unit_embedding(dim: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[dim] = 1.0;
        v
    }

    fn entry(id: &str, dim: usize) -> IndexEntry {
        IndexEntry {
            id: id.into(),
            embedding: unit_embedding(dim),
            description: format!("capture {id}"),
            tags: "test".into(),
            created_at: "2026-08-27T10:00:00Z".into(),
        }
    }

    #[test]
    fn add_and_get() {
        let mut conn = test_db();
        add(&mut conn, &entry("c1", 0)).unwrap();

        let fetched = get(&conn, "c1").unwrap().unwrap();
        assert_eq!(fetched.description, "capture c1");
        assert_eq!(fetched.embedding, unit_embedding(0));
        assert!(get(&conn, "missing").unwrap().is_none());
        assert_eq!(count(&conn).unwrap(), 1);
    }

    #[test]
    fn add_rejects_duplicate_id() {
        let mut conn = test_db();
        add(&mut conn, &entry("c1", 0)).unwrap();
        let err = add(&mut conn, &entry("c1", 1)).unwrap_err();
        assert!(err.to_string().contains("already indexed"));
    }

    #[test]
    fn add_rejects_wrong_dimensions() {
        let mut conn = test_db();
        let mut bad = entry("c1", 0);
        bad.embedding = vec![1.0; 3];
        assert!(add(&mut conn, &bad).is_err());
    }

    #[test]
    fn update_merges_metadata() {
        let mut conn = test_db();
        add(&mut conn, &entry("c1", 0)).unwrap();

        // Only description changes; tags and vector are preserved
        update(&mut conn, "c1", None, Some("new description"), None).unwrap();

        let fetched = get(&conn, "c1").unwrap().unwrap();
        assert_eq!(fetched.description, "new description");
        assert_eq!(fetched.tags, "test");
        assert_eq!(fetched.embedding, unit_embedding(0));
    }

    #[test]
    fn update_missing_id_fails() {
        let mut conn = test_db();
        let err = update(&mut conn, "ghost", None, Some("x"), None).unwrap_err();
        assert!(err.to_string().contains("not indexed"));
    }

    #[test]
    fn upsert_inserts_then_replaces() {
        let mut conn = test_db();
        upsert(&mut conn, &entry("c1", 0)).unwrap();
        assert_eq!(count(&conn).unwrap(), 1);

        let mut replacement = entry("c1", 5);
        replacement.description = "replaced".into();
        upsert(&mut conn, &replacement).unwrap();

        assert_eq!(count(&conn).unwrap(), 1);
        let fetched = get(&conn, "c1").unwrap().unwrap();
        assert_eq!(fetched.description, "replaced");
        assert_eq!(fetched.embedding, unit_embedding(5));
    }

    #[test]
    fn delete_is_idempotent() {
        let mut conn = test_db();
        add(&mut conn, &entry("c1", 0)).unwrap();

        assert!(delete(&mut conn, "c1").unwrap());
        assert!(!delete(&mut conn, "c1").unwrap());
        assert!(get(&conn, "c1").unwrap().is_none());
    }

    #[test]
    fn query_orders_by_distance() {
        let mut conn = test_db();
        add(&mut conn, &entry("exact", 0)).unwrap();
        add(&mut conn, &entry("orthogonal", 100)).unwrap();

        let results = query(&conn, &unit_embedding(0), 10).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "exact");
        assert!(results[0].distance < 1e-6);
        assert!(results[1].distance > 1.0);
    }
}
