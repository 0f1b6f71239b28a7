//! Screen context engine — capture, deduplicate, embed, and resurface what
//! you were working on.
//!
//! Glimpse periodically captures the screen, drops near-duplicate frames via
//! perceptual hashing, turns frame descriptions into vectors, and uses those
//! vectors to answer "what was I doing?" questions: similarity search,
//! capture→task activity matching, and time-decayed resurfacing of old
//! context.
//!
//! # Architecture
//!
//! - **Storage**: SQLite with [sqlite-vec](https://github.com/asg017/sqlite-vec)
//!   for vector search; image files live on disk, only metadata in the database
//! - **Embeddings**: Local ONNX Runtime with all-MiniLM-L6-v2 (384 dimensions)
//! - **Dedup**: 64-bit average perceptual hash with a Hamming-distance gate
//! - **Matching**: A bounded background pool links captures to active tasks
//!
//! # Modules
//!
//! - [`config`] — Configuration loading from TOML files and environment variables
//! - [`db`] — SQLite initialization and schema
//! - [`embedding`] — Text-to-vector embedding via ONNX Runtime
//! - [`capture`] — Capture loop, perceptual hashing, and retention
//! - [`index`] — Vector index over capture embeddings
//! - [`context`] — Metadata store, search, activity matching, and resurfacing
//! - [`pipeline`] — Glue between captures, the embedder, and the index

pub mod capture;
pub mod cli;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod index;
pub mod pipeline;
