//! Continuous screen capture.
//!
//! [`CaptureEngine`] runs one cycle: grab a frame, hash it, gate
//! near-duplicates, persist the image and metadata, analyze/embed when
//! backends are configured, hand the capture to the matcher pool, and
//! enforce retention. [`CaptureScheduler`] drives cycles on a dedicated
//! thread with an interruptible randomized sleep.

pub mod hash;
pub mod retention;
pub mod source;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use image::ImageEncoder;
use rand::Rng;
use rusqlite::Connection;

use crate::config::{CaptureConfig, StorageConfig};
use crate::context::matcher::MatcherPool;
use crate::context::store;
use crate::context::types::Capture;
use crate::pipeline::{Analyzer, Embedder};
use hash::PerceptualHash;
use source::FrameSource;

/// How long [`CaptureScheduler::stop`] waits for the loop to exit.
const STOP_WAIT: Duration = Duration::from_secs(5);

/// Outcome of one capture cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Frame persisted as a new capture.
    Stored { capture_id: String, path: PathBuf },
    /// Frame dropped as a near-duplicate of an existing capture.
    Duplicate { distance: u32 },
}

/// Everything one capture cycle needs. Owned by the scheduler thread, or
/// used directly for one-shot captures.
pub struct CaptureEngine {
    conn: Connection,
    source: Box<dyn FrameSource>,
    analyzer: Option<Box<dyn Analyzer>>,
    embedder: Embedder,
    matcher: Option<Arc<MatcherPool>>,
    capture_cfg: CaptureConfig,
    storage_cfg: StorageConfig,
    capture_dir: PathBuf,
    last_hash: Option<PerceptualHash>,
}

impl CaptureEngine {
    pub fn new(
        conn: Connection,
        source: Box<dyn FrameSource>,
        analyzer: Option<Box<dyn Analyzer>>,
        embedder: Embedder,
        matcher: Option<Arc<MatcherPool>>,
        capture_cfg: CaptureConfig,
        storage_cfg: StorageConfig,
    ) -> Result<Self> {
        let capture_dir = crate::config::expand_tilde(&capture_cfg.capture_dir);
        std::fs::create_dir_all(&capture_dir).with_context(|| {
            format!("failed to create capture directory {}", capture_dir.display())
        })?;

        // Resume dedup against whatever was captured before restart
        let last_hash = store::latest_capture_hash(&conn)?;

        Ok(Self {
            conn,
            source,
            analyzer,
            embedder,
            matcher,
            capture_cfg,
            storage_cfg,
            capture_dir,
            last_hash,
        })
    }

    /// Run one full capture cycle.
    pub fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let frame = self.source.grab()?;
        let frame_hash = PerceptualHash::of_image(&frame);

        if self.capture_cfg.deduplicate {
            if let Some(distance) = self.duplicate_distance(&frame_hash)? {
                tracing::debug!(hash = %frame_hash, distance, "near-duplicate frame dropped");
                return Ok(CycleOutcome::Duplicate { distance });
            }
        }

        let id = uuid::Uuid::now_v7().to_string();
        let path = self.capture_dir.join(format!("{id}.jpg"));
        let file_size = save_jpeg(&frame, &path, self.storage_cfg.jpeg_quality)?;

        let capture = Capture {
            id: id.clone(),
            path: path.to_string_lossy().into_owned(),
            created_at: chrono::Utc::now().to_rfc3339(),
            image_hash: Some(frame_hash.to_string()),
            hash_prefix: Some(frame_hash.prefix_key()),
            file_size,
            description: None,
            tags: None,
            analyzed: false,
            embedded: false,
            embedding_model: None,
            task_id: None,
        };
        store::insert_capture(&self.conn, &capture)?;
        self.last_hash = Some(frame_hash);

        tracing::info!(capture_id = %id, bytes = file_size, "frame captured");

        // Analysis and embedding are best effort; the raw capture is already safe
        if let Some(analyzer) = self.analyzer.as_deref() {
            match crate::pipeline::analyze_and_index(&mut self.conn, analyzer, &self.embedder, &id)
            {
                Ok(embedded) => {
                    if let Some(matcher) = &self.matcher {
                        matcher.dispatch(&id);
                    }
                    if !embedded {
                        tracing::debug!(capture_id = %id, "capture analyzed but not embedded");
                    }
                }
                Err(e) => tracing::warn!(capture_id = %id, error = %e, "analysis failed"),
            }
        }

        retention::enforce(&mut self.conn, self.capture_cfg.max_captures)?;

        Ok(CycleOutcome::Stored { capture_id: id, path })
    }

    /// Hamming distance to the nearest known duplicate, if any is within the
    /// configured threshold. Checks the previous frame first, then the exact
    /// hash index, then the prefix bucket.
    fn duplicate_distance(&self, frame_hash: &PerceptualHash) -> Result<Option<u32>> {
        let threshold = self.capture_cfg.hash_threshold;

        if let Some(last) = &self.last_hash {
            let distance = frame_hash.distance(last);
            if distance <= threshold {
                return Ok(Some(distance));
            }
        }
        if store::find_exact_hash(&self.conn, frame_hash)?.is_some() {
            return Ok(Some(0));
        }
        if let Some(id) = store::find_near_hash(&self.conn, frame_hash, threshold)? {
            let stored = store::get_capture(&self.conn, &id)?
                .and_then(|c| c.image_hash)
                .and_then(|h| h.parse::<PerceptualHash>().ok());
            let distance = stored.map_or(0, |h| frame_hash.distance(&h));
            return Ok(Some(distance));
        }
        Ok(None)
    }
}

/// Encode a frame as JPEG at the given quality. Returns the file size.
fn save_jpeg(frame: &image::DynamicImage, path: &std::path::Path, quality: u8) -> Result<u64> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = std::io::BufWriter::new(file);
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut writer, quality);

    // JPEG has no alpha channel
    let rgb = frame.to_rgb8();
    encoder
        .write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )
        .context("JPEG encoding failed")?;
    drop(writer);

    let size = std::fs::metadata(path)?.len();
    Ok(size)
}

#[derive(Debug, Default)]
struct Counters {
    cycles: AtomicU64,
    stored: AtomicU64,
    duplicates: AtomicU64,
    failures: AtomicU64,
}

struct Shared {
    // stop flag behind the mutex; the condvar doubles as the sleep interrupt
    // and the exit notification
    flags: Mutex<Flags>,
    condvar: Condvar,
    counters: Counters,
}

#[derive(Default)]
struct Flags {
    stop_requested: bool,
    exited: bool,
}

/// Snapshot of scheduler state. Counters are informational and may lag a
/// cycle behind.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub cycles: u64,
    pub stored: u64,
    pub duplicates: u64,
    pub failures: u64,
}

/// Drives [`CaptureEngine::run_cycle`] on a dedicated thread.
pub struct CaptureScheduler {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
    interval: IntervalPolicy,
}

#[derive(Clone, Copy)]
enum IntervalPolicy {
    Fixed(u64),
    Random { min: u64, max: u64 },
}

impl IntervalPolicy {
    fn from_config(config: &CaptureConfig) -> Self {
        if config.random_interval && config.min_interval_seconds <= config.max_interval_seconds {
            Self::Random {
                min: config.min_interval_seconds,
                max: config.max_interval_seconds,
            }
        } else {
            Self::Fixed(config.interval_seconds.max(1))
        }
    }

    fn next_delay(&self) -> Duration {
        match self {
            Self::Fixed(secs) => Duration::from_secs(*secs),
            Self::Random { min, max } => {
                Duration::from_secs(rand::thread_rng().gen_range(*min..=*max))
            }
        }
    }
}

impl CaptureScheduler {
    /// Start the capture loop. The engine moves onto the scheduler thread.
    pub fn start(mut engine: CaptureEngine) -> Self {
        let interval = IntervalPolicy::from_config(&engine.capture_cfg);
        let shared = Arc::new(Shared {
            flags: Mutex::new(Flags::default()),
            condvar: Condvar::new(),
            counters: Counters::default(),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("capture-loop".into())
            .spawn(move || {
                tracing::info!("capture loop started");
                loop {
                    run_one(&mut engine, &thread_shared.counters);

                    let delay = interval.next_delay();
                    if sleep_interruptible(&thread_shared, delay) {
                        break;
                    }
                }
                let mut flags = thread_shared
                    .flags
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                flags.exited = true;
                thread_shared.condvar.notify_all();
                tracing::info!("capture loop stopped");
            })
            .unwrap_or_else(|e| panic!("failed to spawn capture thread: {e}"));

        Self {
            shared,
            handle: Some(handle),
            interval,
        }
    }

    /// Request a stop and wait up to five seconds for the loop to exit.
    ///
    /// Returns `true` if the loop exited in time. A cycle stuck mid-capture
    /// is left to finish on its own; it is never force-killed.
    pub fn stop(mut self) -> bool {
        let exited = {
            let mut flags = self.shared.flags.lock().unwrap_or_else(|e| e.into_inner());
            flags.stop_requested = true;
            self.shared.condvar.notify_all();

            let deadline = std::time::Instant::now() + STOP_WAIT;
            while !flags.exited {
                let remaining = deadline.saturating_duration_since(std::time::Instant::now());
                if remaining.is_zero() {
                    break;
                }
                let (guard, _) = self
                    .shared
                    .condvar
                    .wait_timeout(flags, remaining)
                    .unwrap_or_else(|e| e.into_inner());
                flags = guard;
            }
            flags.exited
        };

        if exited {
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        } else {
            tracing::warn!("capture loop did not stop within {STOP_WAIT:?}");
        }
        exited
    }

    pub fn status(&self) -> SchedulerStatus {
        let flags = self.shared.flags.lock().unwrap_or_else(|e| e.into_inner());
        let c = &self.shared.counters;
        SchedulerStatus {
            running: !flags.exited,
            cycles: c.cycles.load(Ordering::Relaxed),
            stored: c.stored.load(Ordering::Relaxed),
            duplicates: c.duplicates.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
        }
    }

    /// The interval policy in effect, for status output.
    pub fn interval_description(&self) -> String {
        match self.interval {
            IntervalPolicy::Fixed(secs) => format!("every {secs}s"),
            IntervalPolicy::Random { min, max } => format!("every {min}-{max}s (randomized)"),
        }
    }
}

fn run_one(engine: &mut CaptureEngine, counters: &Counters) {
    counters.cycles.fetch_add(1, Ordering::Relaxed);
    // A failed cycle is logged and the loop keeps going
    match engine.run_cycle() {
        Ok(CycleOutcome::Stored { .. }) => {
            counters.stored.fetch_add(1, Ordering::Relaxed);
        }
        Ok(CycleOutcome::Duplicate { .. }) => {
            counters.duplicates.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            counters.failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, "capture cycle failed");
        }
    }
}

/// Sleep for `delay` unless a stop is requested first. Returns `true` when
/// the loop should exit.
fn sleep_interruptible(shared: &Shared, delay: Duration) -> bool {
    let deadline = std::time::Instant::now() + delay;
    let mut flags = shared.flags.lock().unwrap_or_else(|e| e.into_inner());
    loop {
        if flags.stop_requested {
            return true;
        }
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        if remaining.is_zero() {
            return false;
        }
        let (guard, _) = shared
            .condvar
            .wait_timeout(flags, remaining)
            .unwrap_or_else(|e| e.into_inner());
        flags = guard;
    }
}
