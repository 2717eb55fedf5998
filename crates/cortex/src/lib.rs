//! # Magnifier Cortex
//!
//! Decides where a screen magnifier should point its viewport. Pointer
//! position, calibrated gaze and a content-importance map arrive
//! asynchronously and are fused into one target coordinate per tick.
//!
//! The [`Cortex`] coordinator owns the producer loops and exposes the control
//! surface (mode, weights, recalibration) and the fusion output.

pub mod calibration;
pub mod config;
pub mod error;
pub mod fusion;
pub mod importance;
pub mod runtime;
pub mod shared_state;
pub mod sources;
pub mod types;

pub use calibration::{CalibrationEngine, CalibrationProfile, CalibrationState, CalibrationTarget, PointId};
pub use config::{CortexConfig, WeightConfig};
pub use error::{CortexError, Result};
pub use fusion::{FusionCore, FusionInputs};
pub use importance::{GridDims, ImportanceMap, ImportanceScorer};
pub use shared_state::SourceStatus;
pub use sources::{DetectionSource, GazeSource, PointerSource};
pub use types::*;

use crate::calibration::CalibrationProgress;
use crate::runtime::FusionOutput;
use crate::shared_state::{latest_value, Publisher, SharedState};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

/// Results a slow subscriber may fall behind before it starts missing ticks
const SUBSCRIBER_CAPACITY: usize = 64;

/// The main coordinator that runs the gaze, importance and fusion loops
pub struct Cortex {
    shared: Arc<SharedState>,
    calibration: Arc<CalibrationEngine>,
    output: Arc<FusionOutput>,
    pointer: Arc<dyn PointerSource>,
    gaze: Option<(Box<dyn GazeSource>, Publisher<Coordinate>)>,
    detections: Option<(Box<dyn DetectionSource>, Publisher<ImportanceMap>)>,
    refresh: Arc<Notify>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Cortex {
    /// Validate the configuration and set up an idle cortex.
    ///
    /// Gaze and detection producers are optional; without them the matching
    /// source simply never contributes.
    pub fn new(config: CortexConfig, pointer: Arc<dyn PointerSource>) -> Result<Self> {
        config.validate()?;
        log::info!(
            "Initializing cortex: {}x{} screen, {}x{} importance grid, {:?} mode",
            config.screen_width,
            config.screen_height,
            config.grid_rows,
            config.grid_cols,
            config.mode
        );

        let (gaze_publisher, gaze_reader) = latest_value();
        let (importance_publisher, importance_reader) = latest_value();
        let shared = Arc::new(SharedState::new(config, gaze_reader, importance_reader));
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            shared,
            calibration: Arc::new(CalibrationEngine::new()),
            output: Arc::new(FusionOutput::new()),
            pointer,
            gaze: Some((Box::new(NoGaze), gaze_publisher)),
            detections: Some((Box::new(NoDetections), importance_publisher)),
            refresh: Arc::new(Notify::new()),
            shutdown_tx,
            tasks: Vec::new(),
        })
    }

    fn started(&self) -> bool {
        self.gaze.is_none()
    }

    /// Attach a gaze producer. Ignored with a warning once started.
    pub fn with_gaze_source(mut self, source: impl GazeSource + 'static) -> Self {
        match self.gaze.as_mut() {
            Some((slot, _)) => *slot = Box::new(source),
            None => log::warn!("Gaze source attached after start, ignoring it"),
        }
        self
    }

    /// Attach a detection producer. Ignored with a warning once started.
    pub fn with_detection_source(mut self, source: impl DetectionSource + 'static) -> Self {
        match self.detections.as_mut() {
            Some((slot, _)) => *slot = Box::new(source),
            None => log::warn!("Detection source attached after start, ignoring it"),
        }
        self
    }

    /// Use a prepared calibration engine, e.g. one with a loaded profile.
    /// The running loops keep their engine, so this is ignored once started.
    pub fn with_calibration(mut self, calibration: CalibrationEngine) -> Self {
        if self.started() {
            log::warn!("Calibration engine replaced after start, ignoring it");
        } else {
            self.calibration = Arc::new(calibration);
        }
        self
    }

    /// Spawn the loops. Must be called from within a tokio runtime.
    pub async fn start(&mut self) -> Result<()> {
        let (Some((gaze, gaze_publisher)), Some((detections, importance_publisher))) =
            (self.gaze.take(), self.detections.take())
        else {
            return Err(CortexError::AlreadyStarted);
        };

        log::info!("Starting cortex loops...");

        self.tasks.push(tokio::spawn(runtime::gaze_loop(
            gaze,
            Arc::clone(&self.calibration),
            gaze_publisher,
            Arc::clone(&self.shared),
            self.shutdown_tx.subscribe(),
        )));
        self.tasks.push(tokio::spawn(runtime::importance_loop(
            detections,
            importance_publisher,
            Arc::clone(&self.shared),
            Arc::clone(&self.refresh),
            self.shutdown_tx.subscribe(),
        )));
        self.tasks.push(tokio::spawn(runtime::fusion_loop(
            Arc::clone(&self.pointer),
            Arc::clone(&self.shared),
            Arc::clone(&self.output),
            self.shutdown_tx.subscribe(),
        )));

        Ok(())
    }

    /// Stop every loop and wait for them to exit
    pub async fn shutdown(mut self) -> Result<()> {
        log::info!("Shutting down cortex...");
        self.shutdown_tx.send_replace(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                log::warn!("Cortex task ended abnormally: {}", e);
            }
        }
        log::info!("Cortex stopped");
        Ok(())
    }

    /// Most recent fusion result, `None` before the first tick
    pub fn latest_fusion_result(&self) -> Option<FusionResult> {
        self.output.latest()
    }

    /// Receive every fusion result from now on
    pub fn subscribe_to_fusion_result(&self) -> Receiver<FusionResult> {
        self.output.subscribe(SUBSCRIBER_CAPACITY)
    }

    pub fn config(&self) -> Arc<CortexConfig> {
        self.shared.config()
    }

    /// Replace the whole configuration. Rejected configs leave the current
    /// one in place.
    pub fn set_config(&self, config: CortexConfig) -> Result<()> {
        self.shared.replace_config(config).map_err(|e| {
            log::warn!("Rejected configuration: {}", e);
            e
        })?;
        log::info!("Configuration updated");
        Ok(())
    }

    pub fn set_weight_config(&self, weights: WeightConfig) -> Result<()> {
        self.shared.replace_weights(weights).map_err(|e| {
            log::warn!("Rejected weight configuration: {}", e);
            e
        })?;
        log::info!("Weight configuration updated");
        Ok(())
    }

    pub fn set_mode(&self, mode: FusionMode) {
        log::info!("Fusion mode set to {:?}", mode);
        self.shared.set_mode(mode);
    }

    /// Target used by `FixedPosition` mode, clamped to the screen
    pub fn set_fixed_position(&self, position: Coordinate) -> Result<()> {
        self.shared.set_fixed_position(position)
    }

    /// Rebuild the importance map now instead of waiting for the next cycle
    pub fn request_importance_refresh(&self) {
        self.refresh.notify_one();
    }

    pub fn calibration(&self) -> &Arc<CalibrationEngine> {
        &self.calibration
    }

    pub fn calibration_state(&self) -> CalibrationState {
        self.calibration.state()
    }

    /// Begin collecting a new profile. The current one keeps working until
    /// the new one is built. Returns the first target to show.
    pub fn request_recalibration(&self) -> CalibrationTarget {
        let config = self.shared.config();
        self.calibration
            .request_recalibration(config.screen(), config.calibration_margin_px, config.calibration_samples)
    }

    /// Average the next gaze samples into the current target
    pub fn capture_calibration_point(&self) -> Result<CalibrationTarget> {
        self.calibration.arm_capture()
    }

    /// Record a ratio for the current target directly, bypassing sampling
    pub fn record_calibration_point(&self, ratio: GazeRatio) -> Result<CalibrationProgress> {
        self.calibration.record_point(ratio)
    }

    pub fn cancel_recalibration(&self) -> Result<()> {
        self.calibration.cancel_recalibration()
    }

    pub fn last_calibration_error(&self) -> Option<String> {
        self.calibration.last_error()
    }

    /// Advisory state of one producer
    pub fn source_status(&self, source: Source) -> SourceStatus {
        self.shared.status().get(source)
    }
}

/// Stand-in when no gaze producer is attached: waits forever
struct NoGaze;

#[async_trait::async_trait]
impl GazeSource for NoGaze {
    async fn next_raw_gaze_ratio(&mut self) -> Result<GazeRatio> {
        std::future::pending().await
    }
}

/// Stand-in when no detection producer is attached: waits forever
struct NoDetections;

#[async_trait::async_trait]
impl DetectionSource for NoDetections {
    async fn next_detections(&mut self) -> Result<Vec<DetectedRegion>> {
        std::future::pending().await
    }
}
