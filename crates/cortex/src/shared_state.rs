//! Shared state between the producer loops and the fusion tick
//!
//! Every cell is publish-by-replace: a writer builds a complete new value and
//! swaps an `Arc` to it in. The write lock is held for one pointer move, so a
//! reader can never be stuck behind an expensive writer, and never sees a
//! half-built value.

use crate::config::CortexConfig;
use crate::error::{CortexError, Result};
use crate::fusion::FusionInputs;
use crate::importance::ImportanceMap;
use crate::types::{Coordinate, FusionMode, Source, TimestampedValue};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;

type Slot<T> = RwLock<Option<TimestampedValue<Arc<T>>>>;

/// Create a latest-value cell, returning its only writer and a reader.
pub fn latest_value<T>() -> (Publisher<T>, Reader<T>) {
    let slot: Arc<Slot<T>> = Arc::new(RwLock::new(None));
    (
        Publisher {
            slot: Arc::clone(&slot),
        },
        Reader { slot },
    )
}

/// Write half of a latest-value cell. Not `Clone`: one producer per cell.
pub struct Publisher<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Publisher<T> {
    pub fn publish(&self, value: T) {
        self.publish_at(value, Instant::now());
    }

    /// Publish with an explicit timestamp. Timestamps from the future are
    /// pulled back to now so readers never see negative ages.
    pub fn publish_at(&self, value: T, timestamp: Instant) {
        let stamped = TimestampedValue::new(Arc::new(value), timestamp.min(Instant::now()));
        *self.slot.write() = Some(stamped);
    }

    /// Withdraw the current value entirely
    pub fn clear(&self) {
        *self.slot.write() = None;
    }
}

/// Read half of a latest-value cell
pub struct Reader<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Clone for Reader<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Reader<T> {
    /// Cheap immutable snapshot of the latest value
    pub fn snapshot(&self) -> Option<TimestampedValue<Arc<T>>> {
        self.slot.read().clone()
    }
}

/// Mode and fixed target, written by the settings surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Controls {
    pub mode: FusionMode,
    pub fixed_position: Coordinate,
}

/// Advisory per-source state shown to the settings/status surface
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SourceStatus {
    /// No producer attached
    #[default]
    Idle,
    Live,
    /// Gaze arrives but there is no calibration profile to map it with
    Uncalibrated,
    /// Last attempt to reach the producer failed
    Unavailable(String),
}

#[derive(Debug, Default)]
pub struct StatusBoard {
    entries: RwLock<[SourceStatus; 3]>,
}

impl StatusBoard {
    /// Record a status. Returns true when it differs from the previous one.
    pub fn set(&self, source: Source, status: SourceStatus) -> bool {
        if self.entries.read()[source.index()] == status {
            return false;
        }
        let mut entries = self.entries.write();
        let slot = &mut entries[source.index()];
        log::debug!("{} source status: {:?} -> {:?}", source, slot, status);
        *slot = status;
        true
    }

    pub fn get(&self, source: Source) -> SourceStatus {
        self.entries.read()[source.index()].clone()
    }
}

/// Everything the fusion tick reads, plus the cells the settings surface writes.
pub struct SharedState {
    gaze: Reader<Coordinate>,
    importance: Reader<ImportanceMap>,
    config: RwLock<Arc<CortexConfig>>,
    controls: RwLock<Controls>,
    status: StatusBoard,
}

impl SharedState {
    pub fn new(config: CortexConfig, gaze: Reader<Coordinate>, importance: Reader<ImportanceMap>) -> Self {
        let controls = Controls {
            mode: config.mode,
            fixed_position: config.screen().center(),
        };

        Self {
            gaze,
            importance,
            config: RwLock::new(Arc::new(config)),
            controls: RwLock::new(controls),
            status: StatusBoard::default(),
        }
    }

    pub fn config(&self) -> Arc<CortexConfig> {
        Arc::clone(&self.config.read())
    }

    /// Validate and swap in a new configuration. On error the old one stays.
    ///
    /// Lock order is always `config` then `controls`, so a tick snapshot
    /// sees the new config together with its mode.
    pub fn replace_config(&self, config: CortexConfig) -> Result<()> {
        config.validate()?;
        let mode = config.mode;
        let mut current = self.config.write();
        *current = Arc::new(config);
        self.controls.write().mode = mode;
        Ok(())
    }

    /// Replace only the weight table, keeping every other setting
    pub fn replace_weights(&self, weights: crate::config::WeightConfig) -> Result<()> {
        weights.validate()?;
        let mut current = self.config.write();
        let mut next = CortexConfig::clone(&current);
        next.weights = weights;
        *current = Arc::new(next);
        Ok(())
    }

    pub fn controls(&self) -> Controls {
        *self.controls.read()
    }

    pub fn set_mode(&self, mode: FusionMode) {
        self.controls.write().mode = mode;
    }

    pub fn set_fixed_position(&self, position: Coordinate) -> Result<()> {
        if !(position.x.is_finite() && position.y.is_finite()) {
            return Err(CortexError::invalid_config(format!(
                "fixed position must be finite, got ({}, {})",
                position.x, position.y
            )));
        }
        let config = self.config.read();
        self.controls.write().fixed_position = config.screen().clamp(position);
        Ok(())
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    /// Take the consistent input snapshot for one fusion tick.
    ///
    /// The pointer is read live by the caller and passed in; gaze and
    /// importance are whatever was last published.
    pub fn fusion_inputs(&self, pointer: Option<Coordinate>) -> FusionInputs {
        let (config, controls) = {
            let config = self.config.read();
            (Arc::clone(&config), self.controls())
        };
        FusionInputs {
            pointer,
            gaze: self.gaze.snapshot(),
            importance: self.importance.snapshot(),
            controls,
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeightConfig;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_publish_replaces_value() {
        let (publisher, reader) = latest_value::<u32>();
        assert!(reader.snapshot().is_none());

        publisher.publish(1);
        let first = reader.snapshot().unwrap();
        publisher.publish(2);
        let second = reader.snapshot().unwrap();

        // Earlier snapshots are unaffected by later publishes
        assert_eq!(*first.value, 1);
        assert_eq!(*second.value, 2);
        assert!(second.timestamp >= first.timestamp);

        publisher.clear();
        assert!(reader.snapshot().is_none());
    }

    #[test]
    fn test_future_timestamp_is_pulled_back() {
        let (publisher, reader) = latest_value::<u32>();
        publisher.publish_at(7, Instant::now() + Duration::from_secs(60));
        let snap = reader.snapshot().unwrap();
        assert!(snap.timestamp <= Instant::now());
    }

    #[test]
    fn test_readers_never_observe_partial_values() {
        let (publisher, reader) = latest_value::<Vec<u64>>();
        publisher.publish(vec![0; 64]);

        let writer = thread::spawn(move || {
            for i in 1..500u64 {
                publisher.publish(vec![i; 64]);
            }
        });

        for _ in 0..500 {
            let snap = reader.snapshot().unwrap();
            let first = snap.value[0];
            assert!(snap.value.iter().all(|v| *v == first));
        }

        writer.join().unwrap();
    }

    #[test]
    fn test_invalid_config_keeps_previous() {
        let (_gp, gaze) = latest_value();
        let (_ip, importance) = latest_value();
        let state = SharedState::new(CortexConfig::default(), gaze, importance);

        let mut bad = WeightConfig::default();
        bad.sources.mouse = f64::NAN;
        assert!(state.replace_weights(bad).is_err());
        assert_eq!(state.config().weights, WeightConfig::default());

        let mut good = WeightConfig::default();
        good.sources.mouse = 0.9;
        state.replace_weights(good).unwrap();
        assert_eq!(state.config().weights.sources.mouse, 0.9);
    }

    #[test]
    fn test_replace_config_updates_mode() {
        let (_gp, gaze) = latest_value();
        let (_ip, importance) = latest_value();
        let state = SharedState::new(CortexConfig::default(), gaze, importance);
        assert_eq!(state.controls().mode, FusionMode::Blended);

        let next = CortexConfig {
            mode: FusionMode::FollowMouse,
            ..CortexConfig::default()
        };
        state.replace_config(next).unwrap();
        assert_eq!(state.controls().mode, FusionMode::FollowMouse);
    }

    fn state() -> SharedState {
        let (_gp, gaze) = latest_value();
        let (_ip, importance) = latest_value();
        SharedState::new(CortexConfig::default(), gaze, importance)
    }

    #[test]
    fn test_weight_update_never_reverts_config() {
        let state = Arc::new(state());
        let wide = CortexConfig {
            screen_width: 2560.0,
            ..CortexConfig::default()
        };

        let weights_writer = {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                for i in 0..500 {
                    let mut weights = WeightConfig::default();
                    weights.sources.mouse = 0.1 + (i % 5) as f64 * 0.1;
                    state.replace_weights(weights).unwrap();
                }
            })
        };
        for _ in 0..500 {
            state.replace_config(wide.clone()).unwrap();
        }
        weights_writer.join().unwrap();

        assert_eq!(state.config().screen_width, 2560.0);
    }

    #[test]
    fn test_snapshot_mode_matches_config() {
        let state = Arc::new(state());
        let follow = CortexConfig {
            screen_width: 800.0,
            mode: FusionMode::FollowMouse,
            ..CortexConfig::default()
        };
        let blended = CortexConfig {
            screen_width: 1600.0,
            mode: FusionMode::Blended,
            ..CortexConfig::default()
        };

        let writer = {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                for i in 0..1000 {
                    let next = if i % 2 == 0 { follow.clone() } else { blended.clone() };
                    state.replace_config(next).unwrap();
                }
            })
        };
        for _ in 0..1000 {
            let inputs = state.fusion_inputs(None);
            assert_eq!(inputs.controls.mode, inputs.config.mode);
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_status_board() {
        let board = StatusBoard::default();
        assert_eq!(board.get(Source::Gaze), SourceStatus::Idle);
        assert!(board.set(Source::Gaze, SourceStatus::Unavailable("no camera".into())));
        assert!(!board.set(Source::Gaze, SourceStatus::Unavailable("no camera".into())));
        assert_eq!(board.get(Source::Gaze), SourceStatus::Unavailable("no camera".into()));
        assert_eq!(board.get(Source::Importance), SourceStatus::Idle);
    }
}
