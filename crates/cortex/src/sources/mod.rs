//! Producer interfaces and adapters
//!
//! The cortex consumes three external producers: the pointer device, the raw
//! gaze pipeline and the content-detection pipeline. Each is a trait here so
//! hosts can plug in their own; the adapters cover headless runs, a UDP eye
//! tracker feed and an OCR pipeline that writes JSON.

mod detections;
mod gaze;
mod pointer;

pub use detections::{DetectionRecord, JsonDetectionFile, StaticDetections};
pub use gaze::{parse_gaze_message, SimulatedGaze, UdpGazeSource};
pub use pointer::{PolledPointer, SharedPointer, XdotoolPointer};

use crate::error::Result;
use crate::types::{Coordinate, DetectedRegion, GazeRatio};
use async_trait::async_trait;

/// Live pointer position. Cheap and synchronous, read once per fusion tick.
pub trait PointerSource: Send + Sync {
    /// `None` when the pointer cannot be read right now
    fn current_pointer_position(&self) -> Option<Coordinate>;
}

impl<F> PointerSource for F
where
    F: Fn() -> Option<Coordinate> + Send + Sync,
{
    fn current_pointer_position(&self) -> Option<Coordinate> {
        self()
    }
}

/// Raw gaze ratios from the pupil pipeline, one per frame
#[async_trait]
pub trait GazeSource: Send {
    /// Wait for the next frame's ratio. `SourceUnavailable` when the
    /// pipeline cannot be reached.
    async fn next_raw_gaze_ratio(&mut self) -> Result<GazeRatio>;
}

/// Text regions found on screen by the content-detection pipeline
#[async_trait]
pub trait DetectionSource: Send {
    /// Run (or fetch) one detection pass. May take seconds.
    async fn next_detections(&mut self) -> Result<Vec<DetectedRegion>>;
}
