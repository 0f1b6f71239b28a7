#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use glimpse::capture::hash::PerceptualHash;
use glimpse::capture::source::FrameSource;
use glimpse::context::store;
use glimpse::context::types::{Capture, Task, TaskStatus};
use glimpse::embedding::{EmbeddingProvider, EMBEDDING_DIM};
use glimpse::index::{self, IndexEntry};
use glimpse::pipeline::{Analysis, Analyzer};
use image::{DynamicImage, Rgb, RgbImage};
use rusqlite::Connection;

/// Open a fresh in-memory database with the full schema applied.
pub fn test_db() -> Connection {
    glimpse::db::open_memory_database().unwrap()
}

/// Generate a deterministic 384-dim embedding with a spike at position `seed`.
/// Each seed produces a distinct, orthogonal-ish vector.
pub fn test_embedding(seed: u8) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[seed as usize % EMBEDDING_DIM] = 1.0;
    v
}

/// Generate an embedding similar to `base` with small perturbation.
/// The result will have high cosine similarity to `base`.
pub fn similar_embedding(base: &[f32]) -> Vec<f32> {
    let mut v = base.to_vec();
    for i in 0..5 {
        v[(i * 37) % EMBEDDING_DIM] += 0.05;
    }
    // L2 normalize
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

/// Insert a capture row directly. Returns the capture unchanged for chaining.
pub fn insert_capture(conn: &Connection, id: &str, created_at: &str) -> Capture {
    let capture = Capture {
        id: id.into(),
        path: format!("/tmp/glimpse-test/{id}.jpg"),
        created_at: created_at.into(),
        image_hash: None,
        hash_prefix: None,
        file_size: 0,
        description: None,
        tags: None,
        analyzed: false,
        embedded: false,
        embedding_model: None,
        task_id: None,
    };
    store::insert_capture(conn, &capture).unwrap();
    capture
}

/// Insert an analyzed capture with a description.
pub fn insert_analyzed_capture(
    conn: &Connection,
    id: &str,
    created_at: &str,
    description: &str,
) -> Capture {
    let capture = insert_capture(conn, id, created_at);
    store::update_analysis(conn, id, description, "").unwrap();
    store::get_capture(conn, id).unwrap().unwrap()
}

/// Insert a capture with a specific perceptual hash.
pub fn insert_hashed_capture(conn: &Connection, id: &str, created_at: &str, hash_bits: u64) {
    let hash: PerceptualHash = format!("{hash_bits:016x}").parse().unwrap();
    let capture = Capture {
        id: id.into(),
        path: format!("/tmp/glimpse-test/{id}.jpg"),
        created_at: created_at.into(),
        image_hash: Some(hash.to_string()),
        hash_prefix: Some(hash.prefix_key()),
        file_size: 0,
        description: None,
        tags: None,
        analyzed: false,
        embedded: false,
        embedding_model: None,
        task_id: None,
    };
    store::insert_capture(conn, &capture).unwrap();
}

/// Insert an active task with an embedding.
pub fn insert_task(conn: &Connection, id: &str, title: &str, embedding: &[f32]) {
    let now = chrono::Utc::now().to_rfc3339();
    store::insert_task(
        conn,
        &Task {
            id: id.into(),
            title: title.into(),
            description: None,
            status: TaskStatus::Active,
            embedding: Some(embedding.to_vec()),
            created_at: now.clone(),
            updated_at: now,
        },
    )
    .unwrap();
}

/// Index a capture embedding with minimal metadata.
pub fn index_embedding(conn: &mut Connection, id: &str, embedding: &[f32], created_at: &str) {
    index::add(
        conn,
        &IndexEntry {
            id: id.into(),
            embedding: embedding.to_vec(),
            description: format!("capture {id}"),
            tags: String::new(),
            created_at: created_at.into(),
        },
    )
    .unwrap();
}

/// Deterministic embedding backend: spike position derived from text length.
pub struct StubEmbedder;

impl EmbeddingProvider for StubEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(test_embedding((text.len() % 251) as u8))
    }
    fn model_name(&self) -> &str {
        "stub-embedder"
    }
}

/// Frame source that serves a fixed sequence of images, then repeats the
/// last one. Counts how many frames were grabbed.
pub struct FakeSource {
    frames: Vec<DynamicImage>,
    cursor: AtomicUsize,
}

impl FakeSource {
    pub fn new(frames: Vec<DynamicImage>) -> Self {
        Self {
            frames,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn grabbed(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }
}

impl FrameSource for FakeSource {
    fn grab(&mut self) -> Result<DynamicImage> {
        let i = self.cursor.fetch_add(1, Ordering::SeqCst);
        let frame = self
            .frames
            .get(i)
            .or_else(|| self.frames.last())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("fake source has no frames"))?;
        Ok(frame)
    }
}

/// A horizontal gradient image; `offset` shifts the gradient so different
/// offsets produce visually (and hash-wise) distinct frames.
pub fn gradient_frame(offset: u32) -> DynamicImage {
    let img = RgbImage::from_fn(64, 64, |x, y| {
        let v = (((x + offset * 16) % 64) * 4) as u8;
        let w = ((y % 64) * 2) as u8;
        Rgb([v, w, v.wrapping_add(w)])
    });
    DynamicImage::ImageRgb8(img)
}

/// Analyzer that returns a canned description.
pub struct FixedAnalyzer(pub &'static str);

impl Analyzer for FixedAnalyzer {
    fn analyze(&self, _image_path: &Path) -> Result<Analysis> {
        Ok(Analysis {
            description: self.0.to_string(),
            tags: "test".into(),
        })
    }
}

/// Shared stub provider handle for components that take an Arc.
pub fn stub_provider() -> Arc<dyn EmbeddingProvider> {
    Arc::new(StubEmbedder)
}
