mod helpers;

use std::time::{Duration, Instant};

use glimpse::capture::{CaptureEngine, CaptureScheduler};
use glimpse::config::{CaptureConfig, StorageConfig};
use glimpse::context::store;
use glimpse::pipeline::Embedder;
use helpers::{gradient_frame, FakeSource};

fn fast_config(dir: &std::path::Path) -> CaptureConfig {
    CaptureConfig {
        capture_dir: dir.to_string_lossy().into_owned(),
        interval_seconds: 1,
        random_interval: false,
        deduplicate: true,
        hash_threshold: 5,
        max_captures: 100,
        ..CaptureConfig::default()
    }
}

fn build_engine(db_path: &std::path::Path, dir: &std::path::Path, frames: usize) -> CaptureEngine {
    let conn = glimpse::db::open_database(db_path).unwrap();
    let frames: Vec<_> = (0..frames as u32).map(|i| gradient_frame(i * 5 + 1)).collect();
    CaptureEngine::new(
        conn,
        Box::new(FakeSource::new(frames)),
        None,
        Embedder::new(None),
        None,
        fast_config(dir),
        StorageConfig::default(),
    )
    .unwrap()
}

#[test]
fn scheduler_runs_cycles_and_stops_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let db_dir = tempfile::tempdir().unwrap();
    let db_path = db_dir.path().join("context.db");

    let scheduler = CaptureScheduler::start(build_engine(&db_path, dir.path(), 8));

    // The first cycle fires immediately; give it a beat to land
    std::thread::sleep(Duration::from_millis(300));

    let status = scheduler.status();
    assert!(status.running);
    assert!(status.cycles >= 1, "no cycle ran");

    let stop_started = Instant::now();
    assert!(scheduler.stop(), "scheduler did not stop in time");
    // Stop interrupts the sleep instead of waiting out the interval
    assert!(stop_started.elapsed() < Duration::from_secs(2));

    let conn = glimpse::db::open_database(&db_path).unwrap();
    assert!(store::capture_count(&conn).unwrap() >= 1);
}

#[test]
fn repeated_frames_count_as_duplicates_not_failures() {
    let dir = tempfile::tempdir().unwrap();
    let db_dir = tempfile::tempdir().unwrap();
    let db_path = db_dir.path().join("context.db");

    // One distinct frame, then the source repeats it forever
    let scheduler = CaptureScheduler::start(build_engine(&db_path, dir.path(), 1));
    std::thread::sleep(Duration::from_millis(1300));

    let status = scheduler.status();
    assert!(scheduler.stop());

    assert_eq!(status.failures, 0);
    assert_eq!(status.stored, 1, "only the first frame should be stored");
    assert!(status.duplicates >= 1, "repeat frames should be deduplicated");
}

#[test]
fn failing_source_is_survived() {
    struct BrokenSource;
    impl glimpse::capture::source::FrameSource for BrokenSource {
        fn grab(&mut self) -> anyhow::Result<image::DynamicImage> {
            anyhow::bail!("display unavailable")
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let db_dir = tempfile::tempdir().unwrap();
    let conn = glimpse::db::open_database(db_dir.path().join("context.db")).unwrap();
    let engine = CaptureEngine::new(
        conn,
        Box::new(BrokenSource),
        None,
        Embedder::new(None),
        None,
        fast_config(dir.path()),
        StorageConfig::default(),
    )
    .unwrap();

    let scheduler = CaptureScheduler::start(engine);
    std::thread::sleep(Duration::from_millis(300));

    let status = scheduler.status();
    assert!(status.running, "loop must survive per-cycle failures");
    assert!(status.failures >= 1);
    assert_eq!(status.stored, 0);
    assert!(scheduler.stop());
}
