//! Activity matching — associating captures with active tasks.
//!
//! [`match_capture`] is the single entry point: it resolves an embedding for
//! the capture (index lookup first, re-embed as fallback), scores it against
//! every active task, and records a link for each score at or above the
//! configured threshold. When no embedding can be produced it falls back to
//! keyword overlap.
//!
//! [`MatcherPool`] runs matching off the capture thread on a small bounded
//! worker pool; a full queue rejects the job rather than queuing unboundedly.

use std::path::PathBuf;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::config::MatchingConfig;
use crate::context::types::{ActivityLink, ActivityType, MatchMethod, Task};
use crate::context::{clipped_cosine, cosine_similarity, store};
use crate::embedding::EmbeddingProvider;
use crate::index;

/// Window for relating a capture to its neighbors in the capture stream.
const DURATION_WINDOW_MINUTES: i64 = 10;
/// Duration assigned when no neighboring captures exist.
const DEFAULT_DURATION_MINUTES: u32 = 5;
/// Minimum word-overlap ratio for a keyword fallback match.
const KEYWORD_THRESHOLD: f64 = 0.5;

/// Match a capture against all active tasks and persist qualifying links.
///
/// Returns the links created, best first. A capture with no description, or
/// one whose embedding cannot be resolved and whose text overlaps no task,
/// yields an empty vec.
pub fn match_capture(
    conn: &mut Connection,
    embedder: Option<&dyn EmbeddingProvider>,
    capture_id: &str,
    config: &MatchingConfig,
) -> Result<Vec<ActivityLink>> {
    let Some(capture) = store::get_capture(conn, capture_id)? else {
        anyhow::bail!("capture not found: {capture_id}");
    };

    let description = capture.description.clone().unwrap_or_default();
    if description.is_empty() {
        tracing::debug!(capture_id, "capture has no description, skipping match");
        return Ok(vec![]);
    }

    let tasks = store::active_tasks_with_embeddings(conn)?;
    if tasks.is_empty() {
        return Ok(vec![]);
    }

    let activity_type = classify_activity(&description);

    // Prefer the already-indexed vector; re-embed only when it is missing.
    let capture_embedding = match index::get(conn, capture_id)? {
        Some(entry) => Some(entry.embedding),
        None => match embedder {
            Some(e) => match e.embed(&description) {
                Ok(v) => Some(v),
                Err(err) => {
                    tracing::warn!(capture_id, error = %err, "re-embedding failed");
                    None
                }
            },
            None => None,
        },
    };

    let mut scored: Vec<(f64, MatchMethod, &Task)> = Vec::new();
    match &capture_embedding {
        Some(embedding) => {
            for task in &tasks {
                let Some(task_embedding) = task.embedding.as_deref() else {
                    continue;
                };
                let similarity = clipped_cosine(cosine_similarity(embedding, task_embedding));
                if similarity >= config.threshold {
                    scored.push((similarity, MatchMethod::Semantic, task));
                }
            }
        }
        None => {
            // No vector available; fall back to word overlap
            for task in &tasks {
                let overlap = keyword_overlap(&description, &task.matchable_text());
                if overlap >= KEYWORD_THRESHOLD {
                    scored.push((overlap, MatchMethod::Keyword, task));
                }
            }
        }
    }

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    let duration = estimate_duration(conn, &capture.id, &capture.created_at)?;

    let mut links = Vec::with_capacity(scored.len());
    for (confidence, method, task) in scored {
        let link = ActivityLink {
            id: uuid::Uuid::now_v7().to_string(),
            capture_id: capture.id.clone(),
            task_id: task.id.clone(),
            confidence,
            method,
            duration_minutes: duration,
            activity_type,
            description: Some(description.clone()),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        store::insert_link(conn, &link)?;
        tracing::info!(
            capture_id,
            task_id = %task.id,
            confidence = format!("{confidence:.3}"),
            method = %method,
            "activity link recorded"
        );
        links.push(link);
    }

    Ok(links)
}

/// Classify what a capture shows from its description text. First matching
/// category wins, most specific first.
pub fn classify_activity(description: &str) -> ActivityType {
    let text = description.to_lowercase();

    const CODING: &[&str] = &[
        "code", "editor", "ide", "terminal", "function", "debug", "compiler", "repository",
        "pull request", "diff",
    ];
    const READING: &[&str] = &["documentation", "article", "pdf", "paper", "book", "tutorial"];
    const VIDEO: &[&str] = &["video", "youtube", "player", "streaming", "watching"];
    const BROWSING: &[&str] = &["browser", "search results", "website", "webpage", "tab"];
    const COMMUNICATION: &[&str] = &["email", "chat", "slack", "message", "meeting", "call"];

    let contains_any = |words: &[&str]| words.iter().any(|w| text.contains(w));

    if contains_any(CODING) {
        ActivityType::Coding
    } else if contains_any(READING) {
        ActivityType::Reading
    } else if contains_any(VIDEO) {
        ActivityType::Video
    } else if contains_any(BROWSING) {
        ActivityType::Browsing
    } else if contains_any(COMMUNICATION) {
        ActivityType::Communication
    } else {
        ActivityType::General
    }
}

/// Estimate how many minutes of activity a capture represents.
///
/// Looks at the neighboring captures within ten minutes on either side and
/// averages the gap to the nearest earlier and nearest later one; with no
/// neighbors in the window, the default of five minutes applies. Clamped to
/// `[1, 60]`.
pub fn estimate_duration(
    conn: &Connection,
    capture_id: &str,
    capture_created_at: &str,
) -> Result<u32> {
    let capture_time = chrono::DateTime::parse_from_rfc3339(capture_created_at)
        .with_context(|| format!("invalid capture timestamp: {capture_created_at}"))?
        .with_timezone(&chrono::Utc);

    let window = chrono::Duration::minutes(DURATION_WINDOW_MINUTES);
    let since = (capture_time - window).to_rfc3339();
    let until = (capture_time + window).to_rfc3339();
    let neighbors = store::capture_times_between(conn, &since, &until, capture_id)?;

    let max_gap = DURATION_WINDOW_MINUTES * 60;
    let mut before: Option<i64> = None;
    let mut after: Option<i64> = None;
    for ts in &neighbors {
        let Ok(t) = chrono::DateTime::parse_from_rfc3339(ts) else {
            continue;
        };
        let gap = (capture_time - t.with_timezone(&chrono::Utc)).num_seconds();
        if gap > 0 && gap < max_gap {
            // Nearest earlier capture wins
            before = Some(before.map_or(gap, |g| g.min(gap)));
        } else if gap < 0 && -gap < max_gap {
            after = Some(after.map_or(-gap, |g| g.min(-gap)));
        }
    }

    let gaps: Vec<f64> = [before, after].iter().flatten().map(|&g| g as f64).collect();
    if gaps.is_empty() {
        return Ok(DEFAULT_DURATION_MINUTES);
    }

    let avg_minutes = gaps.iter().sum::<f64>() / gaps.len() as f64 / 60.0;
    Ok((avg_minutes.round() as i64).clamp(1, 60) as u32)
}

/// Fraction of the task's words that also appear in the description.
fn keyword_overlap(description: &str, task_text: &str) -> f64 {
    let desc_words: std::collections::HashSet<String> = description
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| w.len() > 2)
        .collect();
    let task_words: Vec<String> = task_text
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| w.len() > 2)
        .collect();

    if task_words.is_empty() {
        return 0.0;
    }
    let overlap = task_words.iter().filter(|w| desc_words.contains(*w)).count();
    overlap as f64 / task_words.len() as f64
}

/// Bounded background pool that runs [`match_capture`] off the capture thread.
///
/// Each worker opens its own database connection. Dispatch is non-blocking:
/// a full queue rejects the job.
pub struct MatcherPool {
    sender: Option<SyncSender<String>>,
    workers: Vec<JoinHandle<()>>,
}

impl MatcherPool {
    pub fn new(
        db_path: PathBuf,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        config: MatchingConfig,
    ) -> Self {
        let (sender, receiver) = sync_channel::<String>(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..config.workers.max(1))
            .map(|i| {
                let receiver = Arc::clone(&receiver);
                let embedder = embedder.clone();
                let db_path = db_path.clone();
                let config = config.clone();
                std::thread::Builder::new()
                    .name(format!("matcher-{i}"))
                    .spawn(move || worker_loop(&db_path, embedder, &config, &receiver))
                    .unwrap_or_else(|e| panic!("failed to spawn matcher worker: {e}"))
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
        }
    }

    /// Queue a capture for matching. Returns `false` when the queue is full
    /// or the pool is shut down; the capture is simply not matched.
    pub fn dispatch(&self, capture_id: &str) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };
        match sender.try_send(capture_id.to_string()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(capture_id, "matcher queue full, skipping match");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!(capture_id, "matcher pool is shut down");
                false
            }
        }
    }

    /// Drain the queue and join all workers.
    pub fn shutdown(mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("matcher worker panicked");
            }
        }
    }
}

impl Drop for MatcherPool {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    db_path: &std::path::Path,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    config: &MatchingConfig,
    receiver: &Mutex<Receiver<String>>,
) {
    let mut conn = match crate::db::open_database(db_path) {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(error = %e, "matcher worker could not open database");
            return;
        }
    };

    loop {
        let job = {
            let Ok(guard) = receiver.lock() else {
                return;
            };
            guard.recv()
        };
        let Ok(capture_id) = job else {
            return; // all senders dropped
        };

        let result = match_capture(&mut conn, embedder.as_deref(), &capture_id, config);
        if let Err(e) = result {
            tracing::warn!(capture_id, error = %e, "activity matching failed");
        }
    }
}
