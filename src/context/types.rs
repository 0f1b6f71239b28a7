//! Core context type definitions.
//!
//! Defines [`Capture`] (one persisted frame), [`Task`] (an externally-owned
//! work item), [`ActivityLink`] (a capture→task association), and the
//! enums backing their SQL text columns.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a task. Only `Active` tasks participate in matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Active,
    Done,
    Archived,
}

impl TaskStatus {
    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Done => "done",
            Self::Archived => "archived",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "done" => Ok(Self::Done),
            "archived" => Ok(Self::Archived),
            _ => Err(format!("unknown task status: {s}")),
        }
    }
}

/// How a capture→task link was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    /// Embedding similarity between capture description and task text.
    Semantic,
    /// Recorded by the user directly.
    Manual,
    /// Keyword overlap fallback when no embeddings are available.
    Keyword,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Manual => "manual",
            Self::Keyword => "keyword",
        }
    }
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MatchMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "semantic" => Ok(Self::Semantic),
            "manual" => Ok(Self::Manual),
            "keyword" => Ok(Self::Keyword),
            _ => Err(format!("unknown match method: {s}")),
        }
    }
}

/// Broad classification of what a captured frame shows, inferred from its
/// description text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Coding,
    Reading,
    Video,
    Browsing,
    Communication,
    General,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coding => "coding",
            Self::Reading => "reading",
            Self::Video => "video",
            Self::Browsing => "browsing",
            Self::Communication => "communication",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActivityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coding" => Ok(Self::Coding),
            "reading" => Ok(Self::Reading),
            "video" => Ok(Self::Video),
            "browsing" => Ok(Self::Browsing),
            "communication" => Ok(Self::Communication),
            "general" => Ok(Self::General),
            _ => Err(format!("unknown activity type: {s}")),
        }
    }
}

/// A captured frame, matching the `captures` table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capture {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    /// Absolute path of the image file on disk.
    pub path: String,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// Hex-encoded 64-bit average perceptual hash, if computed.
    pub image_hash: Option<String>,
    /// Top-16-bit hash bucket key, kept in sync with `image_hash`.
    pub hash_prefix: Option<String>,
    /// Size of the image file in bytes.
    pub file_size: u64,
    /// Text description of the frame contents, once analyzed.
    pub description: Option<String>,
    /// Comma-separated tags, once analyzed.
    pub tags: Option<String>,
    /// Whether an analyzer has produced a description for this capture.
    pub analyzed: bool,
    /// Whether this capture's description has been embedded and indexed.
    pub embedded: bool,
    /// Model that produced the indexed embedding, if any.
    pub embedding_model: Option<String>,
    /// Task this capture was manually assigned to, if any.
    pub task_id: Option<String>,
}

/// A work item, matching the `tasks` table schema. Tasks are owned by an
/// external task manager; this engine reads them for matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// UUID v7 primary key.
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    /// Pre-computed embedding of `title + description`, little-endian f32 bytes.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-modification timestamp.
    pub updated_at: String,
}

impl Task {
    /// The text a task is matched and embedded by.
    pub fn matchable_text(&self) -> String {
        match &self.description {
            Some(desc) if !desc.is_empty() => format!("{}. {}", self.title, desc),
            _ => self.title.clone(),
        }
    }
}

/// A capture→task association, matching the `activity_links` table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLink {
    /// UUID v7 primary key.
    pub id: String,
    pub capture_id: String,
    pub task_id: String,
    /// Match confidence in `[0.0, 1.0]` — the clipped cosine similarity.
    pub confidence: f64,
    pub method: MatchMethod,
    /// Estimated minutes of activity this capture represents, in `[1, 60]`.
    pub duration_minutes: u32,
    pub activity_type: ActivityType,
    /// Short human-readable note (usually the capture description).
    pub description: Option<String>,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
}
