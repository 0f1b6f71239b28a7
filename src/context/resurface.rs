//! Context resurfacing — bringing relevant old captures back up.
//!
//! Relevance is the clipped-cosine similarity attenuated by exponential time
//! decay: a capture one decay period old keeps ~37% of its raw score.
//! Queries can anchor on an existing capture, on free text, or on nothing at
//! all (the recency fallback).

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::config::ResurfacingConfig;
use crate::context::{search, store};
use crate::embedding::EmbeddingProvider;
use crate::index;

/// Raw score assigned to fallback suggestions with no query context.
const FALLBACK_SIMILARITY: f64 = 0.8;

/// A resurfaced capture.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Suggestion {
    pub capture_id: String,
    /// Raw clipped-cosine similarity before decay.
    pub similarity: f64,
    /// Decay-adjusted relevance — what suggestions are ranked by.
    pub relevance: f64,
    pub description: String,
    pub tags: String,
    /// ISO 8601 capture timestamp.
    pub timestamp: String,
}

/// Exponential time decay: `exp(-age_days / decay_days)`.
pub fn decay_factor(age_days: f64, decay_days: f64) -> f64 {
    if decay_days <= 0.0 {
        return 1.0;
    }
    (-age_days.max(0.0) / decay_days).exp()
}

fn age_days(timestamp: &str, now: DateTime<Utc>) -> f64 {
    match DateTime::parse_from_rfc3339(timestamp) {
        Ok(t) => (now - t.with_timezone(&Utc)).num_seconds() as f64 / 86_400.0,
        // Unparseable timestamps decay as if brand new
        Err(_) => 0.0,
    }
}

fn rank(mut suggestions: Vec<Suggestion>, max: usize) -> Vec<Suggestion> {
    suggestions.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
    suggestions.truncate(max);
    suggestions
}

fn within_window(timestamp: &str, now: DateTime<Utc>, window_days: Option<f64>) -> bool {
    match window_days {
        Some(days) => age_days(timestamp, now) <= days,
        None => true,
    }
}

fn suggestions_from_embedding(
    conn: &Connection,
    embedding: &[f32],
    exclude_id: Option<&str>,
    config: &ResurfacingConfig,
    time_window_days: Option<f64>,
    now: DateTime<Utc>,
) -> Result<Vec<Suggestion>> {
    // Over-fetch: decay and the window filter both thin the results
    let hits = search::search_by_embedding(
        conn,
        embedding,
        config.max_suggestions * 3 + 1,
        config.min_similarity,
    )?;

    let suggestions = hits
        .into_iter()
        .filter(|h| Some(h.capture_id.as_str()) != exclude_id)
        .filter(|h| within_window(&h.timestamp, now, time_window_days))
        .map(|h| {
            let decay = decay_factor(age_days(&h.timestamp, now), config.decay_days);
            Suggestion {
                capture_id: h.capture_id,
                similarity: h.similarity,
                relevance: h.similarity * decay,
                description: h.description,
                tags: h.tags,
                timestamp: h.timestamp,
            }
        })
        .collect();

    Ok(rank(suggestions, config.max_suggestions))
}

/// Resurface captures similar to an existing capture, excluding itself.
///
/// Returns an empty vec when the capture has no index entry.
pub fn related_to_capture(
    conn: &Connection,
    capture_id: &str,
    config: &ResurfacingConfig,
    time_window_days: Option<f64>,
) -> Result<Vec<Suggestion>> {
    let Some(entry) = index::get(conn, capture_id)? else {
        tracing::debug!(capture_id, "capture not indexed, nothing to resurface");
        return Ok(vec![]);
    };
    suggestions_from_embedding(
        conn,
        &entry.embedding,
        Some(capture_id),
        config,
        time_window_days,
        Utc::now(),
    )
}

/// Resurface captures relevant to a free-text description of current work.
pub fn resurface_by_text(
    conn: &Connection,
    embedder: &dyn EmbeddingProvider,
    query: &str,
    config: &ResurfacingConfig,
    time_window_days: Option<f64>,
) -> Result<Vec<Suggestion>> {
    let embedding = match embedder.embed(query) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(error = %e, "query embedding failed, no suggestions");
            return Ok(vec![]);
        }
    };
    suggestions_from_embedding(conn, &embedding, None, config, time_window_days, Utc::now())
}

/// Suggestions without any query context: recent analyzed-and-indexed
/// captures, newest first, all at a flat relevance. Recency is already the
/// ordering here, so no decay is applied.
pub fn recent_suggestions(
    conn: &Connection,
    config: &ResurfacingConfig,
    time_window_days: Option<f64>,
) -> Result<Vec<Suggestion>> {
    let now = Utc::now();
    let captures = store::recent_analyzed_captures(conn, config.max_suggestions * 3)?;

    let mut suggestions: Vec<Suggestion> = captures
        .into_iter()
        .filter(|c| within_window(&c.created_at, now, time_window_days))
        .map(|c| Suggestion {
            capture_id: c.id,
            similarity: FALLBACK_SIMILARITY,
            relevance: FALLBACK_SIMILARITY,
            description: c.description.unwrap_or_default(),
            tags: c.tags.unwrap_or_default(),
            timestamp: c.created_at,
        })
        .collect();

    suggestions.truncate(config.max_suggestions);
    Ok(suggestions)
}
