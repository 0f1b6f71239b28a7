//! Frame acquisition.
//!
//! [`FrameSource`] abstracts where frames come from so the scheduler and
//! dedup logic can be tested without a display. The production source grabs
//! the primary monitor via `xcap`.

use anyhow::{Context, Result};
use image::DynamicImage;

/// Produces frames for the capture pipeline.
pub trait FrameSource: Send {
    /// Grab one frame. Errors are per-cycle: the scheduler logs and moves on.
    fn grab(&mut self) -> Result<DynamicImage>;
}

/// Captures the primary monitor's screen contents.
pub struct ScreenSource;

impl ScreenSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ScreenSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for ScreenSource {
    fn grab(&mut self) -> Result<DynamicImage> {
        let monitors = xcap::Monitor::all().context("failed to enumerate monitors")?;

        let monitor = monitors
            .iter()
            .find(|m| m.is_primary().unwrap_or(false))
            .or_else(|| monitors.first())
            .context("no monitors available")?;

        let rgba = monitor
            .capture_image()
            .context("failed to capture screen")?;

        Ok(DynamicImage::ImageRgba8(rgba))
    }
}
