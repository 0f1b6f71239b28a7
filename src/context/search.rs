//! Similarity search over indexed captures.
//!
//! Queries run against the vector index, over-fetching 2x the requested
//! limit before converting distances to clipped-cosine scores, filtering by
//! the minimum similarity, and truncating.

use anyhow::Result;
use rusqlite::Connection;

use crate::context::l2_to_similarity;
use crate::embedding::EmbeddingProvider;
use crate::index;

/// One search result, highest similarity first.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub capture_id: String,
    /// Clipped-cosine similarity in `[0.0, 1.0]`.
    pub similarity: f64,
    pub description: String,
    pub tags: String,
    /// ISO 8601 capture timestamp.
    pub timestamp: String,
}

/// Search the index with a pre-computed embedding.
pub fn search_by_embedding(
    conn: &Connection,
    embedding: &[f32],
    limit: usize,
    min_similarity: f64,
) -> Result<Vec<SearchHit>> {
    if limit == 0 {
        return Ok(vec![]);
    }

    // Over-fetch so the min-similarity filter still leaves enough results
    let matches = index::query(conn, embedding, limit * 2)?;

    let mut hits: Vec<SearchHit> = matches
        .into_iter()
        .map(|m| SearchHit {
            capture_id: m.id,
            similarity: l2_to_similarity(m.distance),
            description: m.description,
            tags: m.tags,
            timestamp: m.created_at,
        })
        .filter(|h| h.similarity >= min_similarity)
        .collect();

    hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    hits.truncate(limit);
    Ok(hits)
}

/// Embed a free-text query and search the index with it.
///
/// An embedding failure is logged and yields an empty result set rather than
/// an error; a search that cannot run is indistinguishable from one with no
/// matches.
pub fn search_by_text(
    conn: &Connection,
    embedder: &dyn EmbeddingProvider,
    query: &str,
    limit: usize,
    min_similarity: f64,
) -> Result<Vec<SearchHit>> {
    if query.trim().is_empty() {
        return Ok(vec![]);
    }

    let embedding = match embedder.embed(query) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(error = %e, "query embedding failed, returning no results");
            return Ok(vec![]);
        }
    };

    search_by_embedding(conn, &embedding, limit, min_similarity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::embedding::EMBEDDING_DIM;
    use crate::index::IndexEntry;

    fn test_db() -> Connection {
        db::open_memory_database().unwrap()
    }

    fn unit_embedding(dim: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[dim] = 1.0;
        v
    }

    /// L2-normalized vector close to dimension 0 (cosine ~0.997 against it).
    fn near_embedding() -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[0] = 0.99;
        v[1] = 0.07;
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.iter_mut().for_each(|x| *x /= norm);
        v
    }

    fn index_entry(id: &str, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry {
            id: id.into(),
            embedding,
            description: format!("capture {id}"),
            tags: String::new(),
            created_at: "2026-08-27T10:00:00Z".into(),
        }
    }

    #[test]
    fn identical_embedding_scores_one() {
        let mut conn = test_db();
        index::add(&mut conn, &index_entry("c1", unit_embedding(0))).unwrap();

        let hits = search_by_embedding(&conn, &unit_embedding(0), 5, 0.0).unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn min_similarity_filters_orthogonal_vectors() {
        let mut conn = test_db();
        index::add(&mut conn, &index_entry("close", near_embedding())).unwrap();
        index::add(&mut conn, &index_entry("far", unit_embedding(100))).unwrap();

        // Orthogonal unit vectors score exactly 0.5
        let hits = search_by_embedding(&conn, &unit_embedding(0), 5, 0.7).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].capture_id, "close");
    }

    #[test]
    fn results_sorted_and_truncated() {
        let mut conn = test_db();
        index::add(&mut conn, &index_entry("exact", unit_embedding(0))).unwrap();
        index::add(&mut conn, &index_entry("near", near_embedding())).unwrap();
        index::add(&mut conn, &index_entry("ortho", unit_embedding(100))).unwrap();

        let hits = search_by_embedding(&conn, &unit_embedding(0), 2, 0.0).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].capture_id, "exact");
        assert_eq!(hits[1].capture_id, "near");
        assert!(hits[0].similarity >= hits[1].similarity);
    }

    #[test]
    fn empty_index_yields_no_hits() {
        let conn = test_db();
        let hits = search_by_embedding(&conn, &unit_embedding(0), 5, 0.0).unwrap();
        assert!(hits.is_empty());
    }

    struct FailingEmbedder;
    impl EmbeddingProvider for FailingEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            anyhow::bail!("backend offline")
        }
        fn model_name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn text_search_swallows_embed_failure() {
        let mut conn = test_db();
        index::add(&mut conn, &index_entry("c1", unit_embedding(0))).unwrap();

        let hits = search_by_text(&conn, &FailingEmbedder, "rust code", 5, 0.0).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn blank_query_short_circuits() {
        let conn = test_db();
        let hits = search_by_text(&conn, &FailingEmbedder, "   ", 5, 0.0).unwrap();
        assert!(hits.is_empty());
    }
}
