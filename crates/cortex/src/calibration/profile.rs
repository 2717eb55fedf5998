//! Calibration profile: build, map, persist

use super::geometry::{bilinear, inverse_bilinear, is_strictly_convex, outside_unit, Hull, Vec2};
use super::layout::{PointId, QUADS};
use crate::error::{CortexError, Result};
use crate::types::{Coordinate, GazeRatio, ScreenSize};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Parameter-space slack when deciding whether a point lies inside a quad
const UV_SLACK: f64 = 1e-9;

/// One calibration sample: where the target was and what the eye tracker said
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub id: PointId,
    pub screen_point: Coordinate,
    pub gaze_ratio: GazeRatio,
}

impl CalibrationPoint {
    pub fn new(id: PointId, screen_point: Coordinate, gaze_ratio: GazeRatio) -> Self {
        Self {
            id,
            screen_point,
            gaze_ratio,
        }
    }
}

/// Precomputed interpolation data for one quad
#[derive(Debug, Clone, PartialEq)]
struct QuadModel {
    gaze: [Vec2; 4],
    screen: [Vec2; 4],
    /// Screen-space error of plain bilinear interpolation at the inner point
    residual: Vec2,
    /// Bubble value at the inner point's parameters; zero disables correction
    bubble_norm: f64,
}

impl QuadModel {
    fn screen_at(&self, u: f64, v: f64) -> Vec2 {
        let base = bilinear(&self.screen, u, v);
        if self.bubble_norm > 0.0 {
            base + self.residual * (bubble(u, v) / self.bubble_norm)
        } else {
            base
        }
    }
}

/// Bump that is 1 at the quad centre and 0 along every edge
fn bubble(u: f64, v: f64) -> f64 {
    16.0 * u * (1.0 - u) * v * (1.0 - v)
}

/// Immutable 13-point gaze-to-screen mapping
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationProfile {
    id: String,
    created_at_ms: u64,
    /// Indexed by `PointId::index`
    points: Vec<CalibrationPoint>,
    hull: Hull,
    quads: Vec<QuadModel>,
}

impl CalibrationProfile {
    /// Validate 13 points and precompute the interpolation model.
    pub fn build(points: &[CalibrationPoint]) -> Result<Self> {
        let created_at_ms = unix_millis();
        Self::build_with_id(points, format!("profile-{created_at_ms}"), created_at_ms)
    }

    fn build_with_id(points: &[CalibrationPoint], id: String, created_at_ms: u64) -> Result<Self> {
        let mut slots: [Option<CalibrationPoint>; PointId::COUNT] = [None; PointId::COUNT];
        for point in points {
            let slot = &mut slots[point.id.index()];
            if slot.is_some() {
                return Err(CortexError::DegenerateCalibration(format!(
                    "calibration point {} supplied twice",
                    point.id
                )));
            }
            *slot = Some(*point);
        }

        let supplied = slots.iter().filter(|slot| slot.is_some()).count();
        let points: Vec<CalibrationPoint> = slots.into_iter().flatten().collect();
        if supplied < PointId::COUNT {
            return Err(CortexError::IncompleteCalibration { supplied });
        }

        let gaze = |id: PointId| {
            let ratio = points[id.index()].gaze_ratio;
            Vec2::new(ratio.x, ratio.y)
        };
        let screen = |id: PointId| {
            let c = points[id.index()].screen_point;
            Vec2::new(c.x, c.y)
        };

        let mut quads = Vec::with_capacity(QUADS.len());
        for quad in QUADS {
            let gaze_corners = quad.corners.map(gaze);
            if !is_strictly_convex(&gaze_corners) {
                let names: Vec<String> = quad.corners.iter().map(|id| id.to_string()).collect();
                return Err(CortexError::DegenerateCalibration(format!(
                    "gaze samples for {} are collinear or fold over",
                    names.join(", ")
                )));
            }

            let screen_corners = quad.corners.map(screen);
            let (residual, bubble_norm) = match inverse_bilinear(&gaze_corners, gaze(quad.inner)) {
                Some((u, v)) if outside_unit((u, v)) == 0.0 => {
                    let predicted = bilinear(&screen_corners, u, v);
                    (screen(quad.inner) - predicted, bubble(u, v))
                }
                _ => {
                    log::warn!(
                        "{} calibration sample lies outside its cell, skipping its correction",
                        quad.inner
                    );
                    (Vec2::default(), 0.0)
                }
            };

            quads.push(QuadModel {
                gaze: gaze_corners,
                screen: screen_corners,
                residual,
                bubble_norm: if bubble_norm > 1e-6 { bubble_norm } else { 0.0 },
            });
        }

        let hull_points: Vec<Vec2> = PointId::ALL.iter().map(|id| gaze(*id)).collect();

        Ok(Self {
            id,
            created_at_ms,
            hull: Hull::new(&hull_points),
            points,
            quads,
        })
    }

    /// Identity-like profile whose gaze ratios sit exactly on the layout.
    /// Handy when the gaze producer already reports normalized screen ratios.
    pub fn linear(screen: ScreenSize, margin: f64) -> Result<Self> {
        let points: Vec<CalibrationPoint> = PointId::ALL
            .iter()
            .map(|id| {
                let (u, v) = id.layout();
                CalibrationPoint::new(*id, id.screen_target(screen, margin), GazeRatio::new(u, v))
            })
            .collect();
        Self::build(&points)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    /// Map a raw gaze ratio to a screen coordinate.
    ///
    /// Ratios outside the hull of the calibration samples are first pulled to
    /// the nearest hull boundary. All 13 samples map exactly onto their
    /// targets.
    pub fn map(&self, ratio: GazeRatio) -> Coordinate {
        let p = self.hull.clamp(Vec2::new(ratio.x, ratio.y));

        let mut best: Option<(&QuadModel, (f64, f64), f64)> = None;
        for quad in &self.quads {
            let Some(uv) = inverse_bilinear(&quad.gaze, p) else {
                continue;
            };
            let miss = outside_unit(uv);
            if miss <= UV_SLACK {
                best = Some((quad, uv, miss));
                break;
            }
            if best.map_or(true, |(_, _, best_miss)| miss < best_miss) {
                best = Some((quad, uv, miss));
            }
        }

        match best {
            Some((quad, (u, v), _)) => {
                let out = quad.screen_at(u.clamp(0.0, 1.0), v.clamp(0.0, 1.0));
                Coordinate::new(out.x, out.y)
            }
            None => self.nearest_point(p).screen_point,
        }
    }

    fn nearest_point(&self, p: Vec2) -> &CalibrationPoint {
        let distance = |point: &CalibrationPoint| {
            (Vec2::new(point.gaze_ratio.x, point.gaze_ratio.y) - p).length_squared()
        };
        // points always holds all 13 entries once built
        self.points
            .iter()
            .min_by(|a, b| distance(a).total_cmp(&distance(b)))
            .unwrap_or(&self.points[PointId::Center.index()])
    }

    /// Serialize as a human-readable TOML document
    pub fn save(&self) -> Result<String> {
        let record = ProfileRecord {
            profile_id: self.id.clone(),
            created_at_ms: self.created_at_ms,
            points: self
                .points
                .iter()
                .map(|p| PointRecord {
                    id: p.id,
                    screen_x: p.screen_point.x,
                    screen_y: p.screen_point.y,
                    gaze_x: p.gaze_ratio.x,
                    gaze_y: p.gaze_ratio.y,
                })
                .collect(),
        };
        Ok(toml::to_string_pretty(&record)?)
    }

    /// Rebuild a profile from [`save`](Self::save) output, keeping its id.
    pub fn load(blob: &str) -> Result<Self> {
        let record: ProfileRecord = toml::from_str(blob)?;

        let mut points = Vec::with_capacity(record.points.len());
        for p in record.points {
            for (axis, value) in [("gaze_x", p.gaze_x), ("gaze_y", p.gaze_y)] {
                if !(0.0..=1.0).contains(&value) {
                    return Err(CortexError::CalibrationFormat(format!(
                        "{} of point {} is {}, expected a value within [0, 1]",
                        axis, p.id, value
                    )));
                }
            }
            if !(p.screen_x.is_finite() && p.screen_y.is_finite()) {
                return Err(CortexError::CalibrationFormat(format!(
                    "screen position of point {} is not finite",
                    p.id
                )));
            }
            points.push(CalibrationPoint::new(
                p.id,
                Coordinate::new(p.screen_x, p.screen_y),
                GazeRatio::new(p.gaze_x, p.gaze_y),
            ));
        }

        Self::build_with_id(&points, record.profile_id, record.created_at_ms)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.save()?)?;
        Ok(())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let blob = std::fs::read_to_string(path)?;
        Self::load(&blob)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ProfileRecord {
    profile_id: String,
    created_at_ms: u64,
    points: Vec<PointRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PointRecord {
    id: PointId,
    screen_x: f64,
    screen_y: f64,
    gaze_x: f64,
    gaze_y: f64,
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen() -> ScreenSize {
        ScreenSize::new(1000.0, 800.0)
    }

    /// Eye tracker whose output is a squashed, shifted copy of the layout
    fn affine_points() -> Vec<CalibrationPoint> {
        PointId::ALL
            .iter()
            .map(|id| {
                let (u, v) = id.layout();
                CalibrationPoint::new(
                    *id,
                    id.screen_target(screen(), 50.0),
                    GazeRatio::new(0.2 + 0.6 * u, 0.3 + 0.4 * v),
                )
            })
            .collect()
    }

    fn assert_close(a: Coordinate, b: Coordinate) {
        assert!(a.distance(&b) < 1e-6, "{:?} != {:?}", a, b);
    }

    #[test]
    fn test_calibration_points_map_exactly() {
        let profile = CalibrationProfile::build(&affine_points()).unwrap();
        for point in affine_points() {
            assert_close(profile.map(point.gaze_ratio), point.screen_point);
        }
    }

    #[test]
    fn test_curved_calibration_points_map_exactly() {
        // Inner samples pulled off their cell centres, so the correction matters
        let mut points = affine_points();
        for point in points.iter_mut().filter(|p| p.id.is_inner()) {
            point.gaze_ratio = GazeRatio::new(point.gaze_ratio.x + 0.02, point.gaze_ratio.y - 0.015);
        }
        let profile = CalibrationProfile::build(&points).unwrap();
        for point in &points {
            assert_close(profile.map(point.gaze_ratio), point.screen_point);
        }
    }

    #[test]
    fn test_affine_interpolates_between_points() {
        let profile = CalibrationProfile::build(&affine_points()).unwrap();
        // A tenth of the way across and four tenths down the layout
        let mapped = profile.map(GazeRatio::new(0.2 + 0.6 * 0.1, 0.3 + 0.4 * 0.4));
        assert_close(mapped, Coordinate::new(50.0 + 900.0 * 0.1, 50.0 + 700.0 * 0.4));
    }

    #[test]
    fn test_outside_hull_is_clamped() {
        let profile = CalibrationProfile::build(&affine_points()).unwrap();
        let corner = profile.map(GazeRatio::new(0.0, 0.0));
        assert_close(corner, Coordinate::new(50.0, 50.0));

        let edge = profile.map(GazeRatio::new(0.5, 1.0));
        assert_close(edge, Coordinate::new(500.0, 750.0));
    }

    #[test]
    fn test_map_is_idempotent() {
        let profile = CalibrationProfile::build(&affine_points()).unwrap();
        let ratio = GazeRatio::new(0.37, 0.61);
        assert_eq!(profile.map(ratio), profile.map(ratio));
    }

    #[test]
    fn test_incomplete() {
        let points = affine_points();
        match CalibrationProfile::build(&points[..12]) {
            Err(CortexError::IncompleteCalibration { supplied }) => assert_eq!(supplied, 12),
            other => panic!("expected incomplete calibration, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_is_degenerate() {
        let mut points = affine_points();
        points[12] = points[0];
        assert!(matches!(
            CalibrationProfile::build(&points),
            Err(CortexError::DegenerateCalibration(_))
        ));
    }

    #[test]
    fn test_collinear_is_degenerate() {
        let mut points: Vec<CalibrationPoint> = PointId::ALL
            .iter()
            .map(|id| {
                let (u, v) = id.layout();
                CalibrationPoint::new(*id, id.screen_target(screen(), 50.0), GazeRatio::new(u, v))
            })
            .collect();
        // Centre lands on the line between top-center and middle-left
        points[PointId::Center.index()].gaze_ratio = GazeRatio::new(0.25, 0.25);
        assert!(matches!(
            CalibrationProfile::build(&points),
            Err(CortexError::DegenerateCalibration(_))
        ));
    }

    #[test]
    fn test_save_load_keeps_id_and_mapping() {
        let profile = CalibrationProfile::build(&affine_points()).unwrap();
        let blob = profile.save().unwrap();
        assert!(blob.contains("profile_id"));
        assert!(blob.contains("inner_bottom_right"));

        let loaded = CalibrationProfile::load(&blob).unwrap();
        assert_eq!(loaded.id(), profile.id());
        assert_eq!(loaded.created_at_ms(), profile.created_at_ms());
        let ratio = GazeRatio::new(0.41, 0.52);
        assert_eq!(loaded.map(ratio), profile.map(ratio));
    }

    #[test]
    fn test_load_rejects_bad_ratio() {
        let blob = CalibrationProfile::linear(screen(), 50.0).unwrap().save().unwrap();
        let broken = blob.replacen("gaze_x = 0.5", "gaze_x = 1.5", 1);
        assert_ne!(blob, broken);
        assert!(matches!(
            CalibrationProfile::load(&broken),
            Err(CortexError::CalibrationFormat(_))
        ));
    }

    #[test]
    fn test_linear_profile() {
        let profile = CalibrationProfile::linear(screen(), 0.0).unwrap();
        assert_close(profile.map(GazeRatio::new(0.3, 0.9)), Coordinate::new(300.0, 720.0));
    }
}
