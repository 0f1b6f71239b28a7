mod helpers;

use glimpse::context::search::{search_by_embedding, search_by_text};
use helpers::{index_embedding, similar_embedding, test_db, test_embedding, StubEmbedder};

#[test]
fn search_ranks_by_similarity_and_applies_the_floor() {
    let mut conn = test_db();
    let base = test_embedding(0);

    index_embedding(&mut conn, "exact", &base, "2026-08-27T10:00:00Z");
    index_embedding(&mut conn, "near", &similar_embedding(&base), "2026-08-27T09:00:00Z");
    index_embedding(&mut conn, "ortho", &test_embedding(100), "2026-08-27T08:00:00Z");

    let hits = search_by_embedding(&conn, &base, 10, 0.7).unwrap();
    assert_eq!(hits.len(), 2, "orthogonal capture scores 0.5 and is filtered");
    assert_eq!(hits[0].capture_id, "exact");
    assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    assert_eq!(hits[1].capture_id, "near");
    assert!(hits[1].similarity > 0.9 && hits[1].similarity < 1.0);
}

#[test]
fn limit_truncates_after_sorting() {
    let mut conn = test_db();
    let base = test_embedding(0);

    index_embedding(&mut conn, "exact", &base, "2026-08-27T10:00:00Z");
    index_embedding(&mut conn, "near", &similar_embedding(&base), "2026-08-27T09:00:00Z");

    let hits = search_by_embedding(&conn, &base, 1, 0.0).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].capture_id, "exact");
}

#[test]
fn text_search_uses_the_backend_embedding() {
    let mut conn = test_db();
    // StubEmbedder keys on text length, so index a vector matching the query length
    let query = "what was that dashboard";
    index_embedding(
        &mut conn,
        "match",
        &test_embedding((query.len() % 251) as u8),
        "2026-08-27T10:00:00Z",
    );
    index_embedding(&mut conn, "other", &test_embedding(199), "2026-08-27T09:00:00Z");

    let hits = search_by_text(&conn, &StubEmbedder, query, 5, 0.9).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].capture_id, "match");
}

#[test]
fn search_of_empty_index_is_empty() {
    let conn = test_db();
    let hits = search_by_embedding(&conn, &test_embedding(0), 5, 0.0).unwrap();
    assert!(hits.is_empty());
}
