//! Glue between capture metadata, the embedding backend, and the vector
//! index.
//!
//! [`Embedder`] wraps the configured backend and degrades gracefully: when
//! the backend is missing or fails, generation returns `None`/failed indices
//! instead of propagating an error, and the rest of the engine keeps running
//! without vectors. [`Analyzer`] is the seam for whatever produces capture
//! descriptions; the engine only needs its text output.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use rusqlite::Connection;

use crate::config::EmbeddingConfig;
use crate::context::store;
use crate::context::types::Capture;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::index::{self, IndexEntry};

/// Output of a batch embedding pass. Indices refer to the input slice.
#[derive(Debug, Default)]
pub struct BatchResult {
    /// Successfully embedded inputs as `(input_index, vector)` pairs.
    pub vectors: Vec<(usize, Vec<f32>)>,
    /// Indices of inputs that produced no vector (empty text or backend failure).
    pub failed: Vec<usize>,
}

/// Embedding front-end with an optional backend.
pub struct Embedder {
    provider: Option<Arc<dyn EmbeddingProvider>>,
}

impl Embedder {
    pub fn new(provider: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self { provider }
    }

    /// Build from config. A backend that fails to load is logged and treated
    /// as absent — captures still flow, they just stay unembedded.
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        match create_provider(config) {
            Ok(provider) => Self {
                provider: Some(Arc::from(provider)),
            },
            Err(e) => {
                tracing::warn!(error = %e, "embedding backend unavailable");
                Self { provider: None }
            }
        }
    }

    pub fn available(&self) -> bool {
        self.provider.is_some()
    }

    pub fn model_name(&self) -> Option<&str> {
        self.provider.as_deref().map(|p| p.model_name())
    }

    /// Shared handle to the backend, for components that embed on their own
    /// threads.
    pub fn provider(&self) -> Option<Arc<dyn EmbeddingProvider>> {
        self.provider.clone()
    }

    /// Embed one text. `None` for empty input, a missing backend, or a
    /// backend error — generation never raises.
    pub fn generate(&self, text: &str) -> Option<Vec<f32>> {
        if text.trim().is_empty() {
            return None;
        }
        let provider = self.provider.as_deref()?;
        match provider.embed(text) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(error = %e, "embedding failed");
                None
            }
        }
    }

    /// Embed a batch. Empty inputs are failed up front without touching the
    /// backend; a backend error fails every remaining input.
    pub fn generate_batch(&self, texts: &[&str]) -> BatchResult {
        let mut result = BatchResult::default();

        let mut todo: Vec<(usize, &str)> = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                result.failed.push(i);
            } else {
                todo.push((i, *text));
            }
        }
        if todo.is_empty() {
            return result;
        }

        let Some(provider) = self.provider.as_deref() else {
            result.failed.extend(todo.iter().map(|(i, _)| *i));
            return result;
        };

        let inputs: Vec<&str> = todo.iter().map(|(_, t)| *t).collect();
        match provider.embed_batch(&inputs) {
            Ok(vectors) => {
                for ((i, _), vector) in todo.into_iter().zip(vectors) {
                    result.vectors.push((i, vector));
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, count = todo.len(), "batch embedding failed");
                result.failed.extend(todo.iter().map(|(i, _)| *i));
            }
        }
        result
    }
}

/// Embed a capture's description and index it, then flag the row.
///
/// The index write is an upsert, so a capture whose vector went missing
/// heals here. Returns `false` when no vector could be produced.
pub fn embed_and_index(
    conn: &mut Connection,
    embedder: &Embedder,
    capture: &Capture,
) -> Result<bool> {
    let description = capture.description.as_deref().unwrap_or_default();
    let Some(vector) = embedder.generate(description) else {
        return Ok(false);
    };

    index::upsert(
        conn,
        &IndexEntry {
            id: capture.id.clone(),
            embedding: vector,
            description: description.to_string(),
            tags: capture.tags.clone().unwrap_or_default(),
            created_at: capture.created_at.clone(),
        },
    )?;

    let model = embedder.model_name().unwrap_or("unknown");
    store::mark_embedded(conn, &capture.id, model)?;
    Ok(true)
}

/// Counts from an [`embed_pending`] pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct EmbedStats {
    pub processed: usize,
    pub failed: usize,
}

/// Drain the backlog of analyzed-but-unembedded captures in batches.
pub fn embed_pending(
    conn: &mut Connection,
    embedder: &Embedder,
    batch_size: usize,
) -> Result<EmbedStats> {
    let mut stats = EmbedStats::default();
    let batch_size = batch_size.max(1);

    loop {
        let batch = store::pending_embeddings(conn, batch_size)?;
        if batch.is_empty() {
            break;
        }

        let texts: Vec<&str> = batch
            .iter()
            .map(|c| c.description.as_deref().unwrap_or_default())
            .collect();
        let result = embedder.generate_batch(&texts);

        // Backend down or everything failed: stop, the backlog stays queued
        if result.vectors.is_empty() {
            stats.failed += result.failed.len();
            break;
        }

        for (i, vector) in result.vectors {
            let capture = &batch[i];
            index::upsert(
                conn,
                &IndexEntry {
                    id: capture.id.clone(),
                    embedding: vector,
                    description: capture.description.clone().unwrap_or_default(),
                    tags: capture.tags.clone().unwrap_or_default(),
                    created_at: capture.created_at.clone(),
                },
            )?;
            let model = embedder.model_name().unwrap_or("unknown");
            store::mark_embedded(conn, &capture.id, model)?;
            stats.processed += 1;
        }
        stats.failed += result.failed.len();

        if batch.len() < batch_size {
            break;
        }
    }

    tracing::info!(
        processed = stats.processed,
        failed = stats.failed,
        "embedding backlog drained"
    );
    Ok(stats)
}

/// What an analyzer extracted from one capture.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub description: String,
    /// Comma-separated tags.
    pub tags: String,
}

/// Produces a text description of a capture image. Implementations range
/// from OCR to a vision model; the engine only consumes the text.
pub trait Analyzer: Send + Sync {
    fn analyze(&self, image_path: &Path) -> Result<Analysis>;
}

/// Run the analyzer on a capture, persist the description, and embed it.
pub fn analyze_and_index(
    conn: &mut Connection,
    analyzer: &dyn Analyzer,
    embedder: &Embedder,
    capture_id: &str,
) -> Result<bool> {
    let Some(capture) = store::get_capture(conn, capture_id)? else {
        anyhow::bail!("capture not found: {capture_id}");
    };

    let analysis = analyzer.analyze(Path::new(&capture.path))?;
    store::update_analysis(conn, capture_id, &analysis.description, &analysis.tags)?;

    let refreshed = Capture {
        description: Some(analysis.description),
        tags: Some(analysis.tags),
        analyzed: true,
        ..capture
    };
    embed_and_index(conn, embedder, &refreshed)
}
