//! Producer and fusion loops
//!
//! Three independent tasks share state only through the latest-value cells:
//! the gaze loop maps raw ratios through the active calibration, the
//! importance loop rebuilds the map on a slow cadence, and the fusion loop
//! ticks at a fixed rate. Each stops when the shutdown flag flips.

use crate::calibration::{CalibrationEngine, CalibrationProgress, PointId};
use crate::fusion::FusionCore;
use crate::importance::{ImportanceMap, ImportanceScorer};
use crate::shared_state::{Publisher, SharedState, SourceStatus};
use crate::sources::{DetectionSource, GazeSource, PointerSource};
use crate::types::{Coordinate, FusionResult, Source};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify};
use tokio::time::{self, Interval, MissedTickBehavior};

/// Pause after a failed gaze read before trying again
const GAZE_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Latest fusion result plus push subscribers
#[derive(Debug, Default)]
pub struct FusionOutput {
    latest: RwLock<Option<FusionResult>>,
    subscribers: Mutex<Vec<Sender<FusionResult>>>,
}

impl FusionOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<FusionResult> {
        self.latest.read().clone()
    }

    /// Bounded feed of results. A subscriber that falls `capacity` results
    /// behind misses ticks rather than slowing the fusion loop down.
    pub fn subscribe(&self, capacity: usize) -> Receiver<FusionResult> {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn publish(&self, result: FusionResult) {
        self.subscribers.lock().retain(|tx| match tx.try_send(result.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
        *self.latest.write() = Some(result);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

fn is_shutdown(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Mark a producer unavailable, warning only when the status changes
fn report_unavailable(shared: &SharedState, source: Source, reason: String) {
    if shared.status().set(source, SourceStatus::Unavailable(reason.clone())) {
        log::warn!("{} source unavailable: {}", source, reason);
    }
}

pub(crate) async fn gaze_loop(
    mut source: Box<dyn GazeSource>,
    calibration: Arc<CalibrationEngine>,
    publisher: Publisher<Coordinate>,
    shared: Arc<SharedState>,
    mut shutdown: watch::Receiver<bool>,
) {
    log::info!("Gaze loop started");

    while !is_shutdown(&shutdown) {
        let next = tokio::select! {
            _ = shutdown.changed() => break,
            next = source.next_raw_gaze_ratio() => next,
        };

        let ratio = match next {
            Ok(ratio) => ratio,
            Err(e) => {
                report_unavailable(&shared, Source::Gaze, e.to_string());
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = time::sleep(GAZE_RETRY_DELAY) => {}
                }
                continue;
            }
        };

        match calibration.feed_sample(ratio) {
            Some(Ok(CalibrationProgress::Completed(profile))) => {
                log::info!("Recalibration complete, profile {}", profile.id());
            }
            Some(Ok(CalibrationProgress::Collecting { collected, next })) => {
                log::info!(
                    "Calibration {}/{} captured, next target {}",
                    collected,
                    PointId::COUNT,
                    next.id
                );
            }
            Some(Err(e)) => log::warn!("Recalibration failed: {}", e),
            None => {}
        }

        match calibration.map(ratio) {
            Some(point) => {
                let point = shared.config().screen().clamp(point);
                publisher.publish(point);
                shared.status().set(Source::Gaze, SourceStatus::Live);
            }
            None => {
                if shared.status().set(Source::Gaze, SourceStatus::Uncalibrated) {
                    log::info!("Gaze arriving but no calibration profile, gaze is ignored until calibrated");
                }
            }
        }
    }

    log::info!("Gaze loop stopped");
}

pub(crate) async fn importance_loop(
    mut source: Box<dyn DetectionSource>,
    publisher: Publisher<ImportanceMap>,
    shared: Arc<SharedState>,
    refresh: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
) {
    log::info!("Importance loop started");

    while !is_shutdown(&shutdown) {
        let detections = tokio::select! {
            _ = shutdown.changed() => break,
            detections = source.next_detections() => detections,
        };

        let config = shared.config();
        match detections {
            Ok(regions) => {
                let started = Instant::now();
                let scorer = ImportanceScorer::from_config(&config);
                let weights = config.weights.clone();
                let dims = config.grid_dims();
                let count = regions.len();

                let rebuilt =
                    tokio::task::spawn_blocking(move || scorer.rebuild(&regions, &weights, dims)).await;
                match rebuilt {
                    Ok(map) => {
                        match map.peak_cell() {
                            Some(peak) => log::info!(
                                "Importance map rebuilt from {} regions in {:?}, peak cell ({}, {})",
                                count,
                                started.elapsed(),
                                peak.row,
                                peak.col
                            ),
                            None => log::info!(
                                "Importance map rebuilt from {} regions in {:?}, nothing scored",
                                count,
                                started.elapsed()
                            ),
                        }
                        publisher.publish(map);
                        shared.status().set(Source::Importance, SourceStatus::Live);
                    }
                    Err(e) => log::error!("Importance rebuild task failed: {}", e),
                }
            }
            Err(e) => report_unavailable(&shared, Source::Importance, e.to_string()),
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = refresh.notified() => log::debug!("Importance refresh requested"),
            _ = time::sleep(config.importance_update_interval()) => {}
        }
    }

    log::info!("Importance loop stopped");
}

fn ticker(period: Duration) -> Interval {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

pub(crate) async fn fusion_loop(
    pointer: Arc<dyn PointerSource>,
    shared: Arc<SharedState>,
    output: Arc<FusionOutput>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut core = FusionCore::new();
    let mut period = shared.config().fusion_tick_interval();
    let mut interval = ticker(period);
    let mut ticks: u64 = 0;
    log::info!("Fusion loop started ({:?} per tick)", period);

    while !is_shutdown(&shutdown) {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = interval.tick() => {}
        }

        let started = Instant::now();
        let position = pointer.current_pointer_position();
        let status = match position {
            Some(_) => SourceStatus::Live,
            None => SourceStatus::Unavailable("no pointer reading".into()),
        };
        shared.status().set(Source::Mouse, status);

        let inputs = shared.fusion_inputs(position);
        let result = core.tick(&inputs, Instant::now());
        log::debug!(
            "Fusion tick {}: ({:.1}, {:.1}) from {:?}{}",
            ticks,
            result.coordinate.x,
            result.coordinate.y,
            result.contributing_sources,
            if result.held { " (held)" } else { "" }
        );
        output.publish(result);
        ticks += 1;

        let elapsed = started.elapsed();
        if elapsed > period {
            log::warn!("Fusion tick took {:?}, longer than the {:?} period", elapsed, period);
        }

        let configured = inputs.config.fusion_tick_interval();
        if configured != period {
            log::info!("Fusion tick period changed from {:?} to {:?}", period, configured);
            period = configured;
            interval = ticker(period);
        }
    }

    log::info!("Fusion loop stopped after {} ticks", ticks);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FusionMode, SourceSet};

    fn result(x: f64) -> FusionResult {
        FusionResult {
            coordinate: Coordinate::new(x, 0.0),
            contributing_sources: SourceSet::only(Source::Mouse),
            mode: FusionMode::FollowMouse,
            exclusions: Vec::new(),
            held: false,
        }
    }

    #[test]
    fn test_output_latest_and_subscribers() {
        let output = FusionOutput::new();
        assert!(output.latest().is_none());

        let rx = output.subscribe(2);
        output.publish(result(1.0));
        output.publish(result(2.0));
        // Channel full: this one is dropped for the subscriber but still latest
        output.publish(result(3.0));

        assert_eq!(output.latest().unwrap().coordinate.x, 3.0);
        assert_eq!(rx.try_recv().unwrap().coordinate.x, 1.0);
        assert_eq!(rx.try_recv().unwrap().coordinate.x, 2.0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disconnected_subscribers_are_dropped() {
        let output = FusionOutput::new();
        let rx = output.subscribe(1);
        let _kept = output.subscribe(1);
        assert_eq!(output.subscriber_count(), 2);

        drop(rx);
        output.publish(result(1.0));
        assert_eq!(output.subscriber_count(), 1);
    }
}
