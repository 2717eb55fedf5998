//! Calibration engine
//!
//! Owns the active [`CalibrationProfile`] and the recalibration session. The
//! active profile keeps serving `map` while a new one is being collected and
//! is only replaced once the new profile builds successfully.

mod geometry;
mod layout;
mod profile;

pub use layout::PointId;
pub use profile::{CalibrationPoint, CalibrationProfile};

use crate::error::{CortexError, Result};
use crate::types::{Coordinate, GazeRatio, ScreenSize};
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    Uncalibrated,
    /// A recalibration session is collecting points
    Calibrating { collected: usize },
    Calibrated,
}

/// Target currently shown to the user
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationTarget {
    pub id: PointId,
    pub screen_point: Coordinate,
    /// Position of this target in the capture sequence, from 0
    pub index: usize,
}

/// Outcome of recording one calibration point
#[derive(Debug, Clone)]
pub enum CalibrationProgress {
    Collecting { collected: usize, next: CalibrationTarget },
    Completed(Arc<CalibrationProfile>),
}

#[derive(Debug)]
struct Session {
    screen: ScreenSize,
    margin: f64,
    samples_per_point: usize,
    points: Vec<CalibrationPoint>,
    samples: Vec<GazeRatio>,
    capturing: bool,
}

impl Session {
    fn target(&self) -> Option<CalibrationTarget> {
        let index = self.points.len();
        let id = *PointId::ALL.get(index)?;
        Some(CalibrationTarget {
            id,
            screen_point: id.screen_target(self.screen, self.margin),
            index,
        })
    }
}

/// Recalibration state machine plus the active profile
#[derive(Debug, Default)]
pub struct CalibrationEngine {
    active: RwLock<Option<Arc<CalibrationProfile>>>,
    session: Mutex<Option<Session>>,
    last_error: Mutex<Option<String>>,
    profile_path: Option<PathBuf>,
}

impl CalibrationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist every successfully built profile to `path`
    pub fn with_profile_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.profile_path = Some(path.into());
        self
    }

    pub fn state(&self) -> CalibrationState {
        if let Some(session) = self.session.lock().as_ref() {
            return CalibrationState::Calibrating {
                collected: session.points.len(),
            };
        }
        if self.active.read().is_some() {
            CalibrationState::Calibrated
        } else {
            CalibrationState::Uncalibrated
        }
    }

    pub fn active_profile(&self) -> Option<Arc<CalibrationProfile>> {
        self.active.read().clone()
    }

    pub fn install_profile(&self, profile: CalibrationProfile) -> Arc<CalibrationProfile> {
        let profile = Arc::new(profile);
        log::info!("Calibration profile {} is now active", profile.id());
        *self.active.write() = Some(Arc::clone(&profile));
        profile
    }

    /// Map a raw ratio through the active profile. `None` while uncalibrated.
    pub fn map(&self, ratio: GazeRatio) -> Option<Coordinate> {
        let profile = self.active_profile()?;
        Some(profile.map(ratio))
    }

    /// Message of the last failed recalibration, cleared on the next success
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Start (or restart) a recalibration session and return the first target.
    pub fn request_recalibration(
        &self,
        screen: ScreenSize,
        margin: f64,
        samples_per_point: usize,
    ) -> CalibrationTarget {
        let session = Session {
            screen,
            margin,
            samples_per_point: samples_per_point.max(1),
            points: Vec::with_capacity(PointId::COUNT),
            samples: Vec::with_capacity(samples_per_point),
            capturing: false,
        };
        let first = CalibrationTarget {
            id: PointId::Center,
            screen_point: PointId::Center.screen_target(screen, margin),
            index: 0,
        };

        let mut slot = self.session.lock();
        if slot.is_some() {
            log::info!("Restarting calibration session");
        } else {
            log::info!("Calibration session started ({} samples per point)", samples_per_point);
        }
        *slot = Some(session);
        first
    }

    /// Abandon the session. The previous profile, if any, stays active.
    pub fn cancel_recalibration(&self) -> Result<()> {
        match self.session.lock().take() {
            Some(session) => {
                log::info!("Calibration cancelled after {} points", session.points.len());
                Ok(())
            }
            None => Err(CortexError::CalibrationInactive),
        }
    }

    pub fn current_target(&self) -> Option<CalibrationTarget> {
        self.session.lock().as_ref().and_then(Session::target)
    }

    /// Start collecting raw samples for the current target
    pub fn arm_capture(&self) -> Result<CalibrationTarget> {
        let mut guard = self.session.lock();
        let session = guard.as_mut().ok_or(CortexError::CalibrationInactive)?;
        let target = session.target().ok_or(CortexError::CalibrationInactive)?;
        session.samples.clear();
        session.capturing = true;
        log::debug!("Capturing calibration point {} at {:?}", target.id, target.screen_point);
        Ok(target)
    }

    pub fn is_capturing(&self) -> bool {
        self.session.lock().as_ref().map_or(false, |s| s.capturing)
    }

    /// Feed one raw ratio into an armed capture.
    ///
    /// Returns `None` while nothing is being captured or more samples are
    /// needed, and the recording outcome once the point is complete.
    pub fn feed_sample(&self, ratio: GazeRatio) -> Option<Result<CalibrationProgress>> {
        let averaged = {
            let mut guard = self.session.lock();
            let session = guard.as_mut()?;
            if !session.capturing {
                return None;
            }
            session.samples.push(ratio);
            if session.samples.len() < session.samples_per_point {
                return None;
            }

            let n = session.samples.len() as f64;
            let (sx, sy) = session
                .samples
                .iter()
                .fold((0.0, 0.0), |(x, y), s| (x + s.x, y + s.y));
            session.samples.clear();
            session.capturing = false;
            GazeRatio::new(sx / n, sy / n)
        };

        Some(self.record_point(averaged))
    }

    /// Record the gaze ratio for the current target and advance.
    ///
    /// After the 13th point the profile is built. On success it replaces the
    /// active profile; on failure the session ends, the previous profile stays
    /// active and the error is kept for [`last_error`](Self::last_error).
    pub fn record_point(&self, ratio: GazeRatio) -> Result<CalibrationProgress> {
        let finished = {
            let mut guard = self.session.lock();
            let session = guard.as_mut().ok_or(CortexError::CalibrationInactive)?;
            let target = session.target().ok_or(CortexError::CalibrationInactive)?;

            session
                .points
                .push(CalibrationPoint::new(target.id, target.screen_point, ratio));
            session.capturing = false;
            session.samples.clear();
            log::info!(
                "Calibration point {}/{} ({}) recorded",
                session.points.len(),
                PointId::COUNT,
                target.id
            );

            match session.target() {
                Some(next) => {
                    return Ok(CalibrationProgress::Collecting {
                        collected: session.points.len(),
                        next,
                    })
                }
                None => guard.take().map(|s| s.points).unwrap_or_default(),
            }
        };

        match CalibrationProfile::build(&finished) {
            Ok(profile) => {
                *self.last_error.lock() = None;
                let profile = self.install_profile(profile);
                self.persist(&profile);
                Ok(CalibrationProgress::Completed(profile))
            }
            Err(e) => {
                log::warn!("Calibration failed, keeping previous profile: {}", e);
                *self.last_error.lock() = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn persist(&self, profile: &CalibrationProfile) {
        let Some(path) = &self.profile_path else {
            return;
        };
        match profile.save_to_path(path) {
            Ok(()) => log::info!("Saved calibration profile to {}", path.display()),
            Err(e) => log::warn!("Failed to save calibration profile to {}: {}", path.display(), e),
        }
    }
}
