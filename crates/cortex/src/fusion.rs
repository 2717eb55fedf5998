//! Coordinate fusion core
//!
//! Merges the live pointer, the calibrated gaze point and the importance map
//! into one viewport target per tick. A tick works on one immutable snapshot
//! of its inputs and never waits on a producer.

use crate::config::CortexConfig;
use crate::error::CortexError;
use crate::importance::ImportanceMap;
use crate::shared_state::Controls;
use crate::types::{
    Coordinate, Exclusion, ExclusionReason, FusionMode, FusionResult, Source, SourceSet, TimestampedValue,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Everything one tick reads, captured once at tick start
#[derive(Debug, Clone)]
pub struct FusionInputs {
    /// Read live, carries no timestamp
    pub pointer: Option<Coordinate>,
    pub gaze: Option<TimestampedValue<Arc<Coordinate>>>,
    pub importance: Option<TimestampedValue<Arc<ImportanceMap>>>,
    pub controls: Controls,
    pub config: Arc<CortexConfig>,
}

/// Stateful only in the coordinate it holds when every source drops out
#[derive(Debug, Default)]
pub struct FusionCore {
    last: Option<Coordinate>,
}

impl FusionCore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&mut self, inputs: &FusionInputs, now: Instant) -> FusionResult {
        let config = &inputs.config;
        let screen = config.screen();
        let mode = inputs.controls.mode;
        let mut exclusions = Vec::new();

        if inputs.pointer.is_none() {
            exclusions.push(Exclusion {
                source: Source::Mouse,
                reason: ExclusionReason::Unavailable,
            });
        }
        let gaze = fresh(
            inputs.gaze.as_ref(),
            Source::Gaze,
            now,
            config.gaze_stale_timeout(),
            &mut exclusions,
        )
        .copied();
        let importance = fresh(
            inputs.importance.as_ref(),
            Source::Importance,
            now,
            config.importance_stale_timeout(),
            &mut exclusions,
        );

        let chosen = match mode {
            FusionMode::FollowMouse => inputs.pointer.map(|p| (p, SourceSet::only(Source::Mouse))),
            FusionMode::FixedPosition => Some((inputs.controls.fixed_position, SourceSet::empty())),
            FusionMode::ImportanceBased | FusionMode::Blended => {
                let anchor = gaze.or(inputs.pointer);
                let peak = importance
                    .and_then(|map| importance_candidate(map, config, mode, anchor, &mut exclusions));

                let mut candidates = Vec::with_capacity(3);
                if let Some(p) = inputs.pointer {
                    candidates.push((Source::Mouse, p));
                }
                if let Some(g) = gaze {
                    candidates.push((Source::Gaze, g));
                }
                if let Some(i) = peak {
                    candidates.push((Source::Importance, i));
                }
                weighted_average(&candidates, config, mode)
            }
        };

        let (coordinate, contributing_sources, held) = match chosen {
            Some((coordinate, sources)) => (screen.clamp(coordinate), sources, false),
            None => {
                let previous = self.last.unwrap_or_else(|| screen.center());
                (screen.clamp(previous), SourceSet::empty(), true)
            }
        };
        self.last = Some(coordinate);

        FusionResult {
            coordinate,
            contributing_sources,
            mode,
            exclusions,
            held,
        }
    }
}

/// Borrow a published value if it is fresh, recording why not otherwise.
fn fresh<'a, T>(
    value: Option<&'a TimestampedValue<Arc<T>>>,
    source: Source,
    now: Instant,
    timeout: Duration,
    exclusions: &mut Vec<Exclusion>,
) -> Option<&'a T> {
    let Some(value) = value else {
        exclusions.push(Exclusion {
            source,
            reason: ExclusionReason::Unavailable,
        });
        return None;
    };

    match value.fresh_within(source, now, timeout) {
        Ok(inner) => Some(inner.as_ref()),
        Err(CortexError::StaleData { age_ms, .. }) => {
            exclusions.push(Exclusion {
                source,
                reason: ExclusionReason::Stale { age_ms },
            });
            None
        }
        Err(_) => None,
    }
}

/// Importance candidate for this tick, if it clears the threshold.
///
/// Importance-based mode with a local search radius pulls toward important
/// cells around the anchor instead of jumping to the global peak.
fn importance_candidate(
    map: &ImportanceMap,
    config: &CortexConfig,
    mode: FusionMode,
    anchor: Option<Coordinate>,
    exclusions: &mut Vec<Exclusion>,
) -> Option<Coordinate> {
    if map.is_empty() {
        exclusions.push(Exclusion {
            source: Source::Importance,
            reason: ExclusionReason::EmptyMap,
        });
        return None;
    }

    let threshold = config.importance_threshold;
    let found = match (mode, config.local_search_radius_px, anchor) {
        (FusionMode::ImportanceBased, Some(radius), Some(anchor)) => map
            .attraction_near(anchor, radius, threshold)
            .map(|(point, _)| point)
            .ok_or_else(|| map.local_peak(anchor, radius)),
        _ => {
            let score = map.peak_score();
            match map.peak_coordinate() {
                Some(point) if score >= threshold => Ok(point),
                _ => Err(score),
            }
        }
    };

    match found {
        Ok(point) => Some(point),
        Err(score) => {
            exclusions.push(Exclusion {
                source: Source::Importance,
                reason: ExclusionReason::BelowThreshold { score },
            });
            None
        }
    }
}

/// Weighted mean over the surviving candidates, weights renormalized to 1.
///
/// Candidates whose weight is zero do not contribute. If every surviving
/// weight is zero the candidates are averaged uniformly instead.
fn weighted_average(
    candidates: &[(Source, Coordinate)],
    config: &CortexConfig,
    mode: FusionMode,
) -> Option<(Coordinate, SourceSet)> {
    if candidates.is_empty() {
        return None;
    }

    let table = config.weights.source_weights(mode);
    let total: f64 = candidates.iter().map(|(source, _)| table.weight(*source)).sum();
    let uniform = !(total.is_finite() && total > 0.0);

    let mut x = 0.0;
    let mut y = 0.0;
    let mut sources = SourceSet::empty();
    for (source, point) in candidates {
        let share = if uniform {
            1.0 / candidates.len() as f64
        } else {
            table.weight(*source) / total
        };
        if share <= 0.0 {
            continue;
        }
        x += point.x * share;
        y += point.y * share;
        sources.insert(*source);
    }

    Some((Coordinate::new(x, y), sources))
}
