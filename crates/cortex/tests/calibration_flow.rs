use magnifier_cortex::calibration::{CalibrationPoint, CalibrationProgress};
use magnifier_cortex::*;

const MARGIN: f64 = 50.0;

fn screen() -> ScreenSize {
    ScreenSize::new(1600.0, 900.0)
}

/// Raw ratios of a tracker that sees less of the right and bottom edges
/// than the left and top, and bows the middle outward
fn tracker_ratio(id: PointId) -> GazeRatio {
    let (u, v) = id.layout();
    let bow = 0.04 * (4.0 * u * (1.0 - u)) * (4.0 * v * (1.0 - v));
    GazeRatio::new(0.15 + 0.6 * u + bow, 0.2 + 0.5 * v + bow)
}

fn captured_points() -> Vec<CalibrationPoint> {
    PointId::ALL
        .iter()
        .map(|id| CalibrationPoint::new(*id, id.screen_target(screen(), MARGIN), tracker_ratio(*id)))
        .collect()
}

fn close(a: Coordinate, b: Coordinate) -> bool {
    a.distance(&b) < 1e-6
}

#[test]
fn every_captured_ratio_maps_back_to_its_target() {
    let profile = CalibrationProfile::build(&captured_points()).unwrap();

    for id in PointId::ALL {
        let mapped = profile.map(tracker_ratio(id));
        let target = id.screen_target(screen(), MARGIN);
        assert!(close(mapped, target), "{id}: mapped {mapped:?}, expected {target:?}");
    }
}

#[test]
fn mapping_is_idempotent_and_bounded() {
    let profile = CalibrationProfile::build(&captured_points()).unwrap();

    for (x, y) in [(0.0, 0.0), (0.33, 0.61), (0.5, 0.5), (1.0, 1.0), (0.9, 0.05)] {
        let ratio = GazeRatio::new(x, y);
        let first = profile.map(ratio);
        assert_eq!(first, profile.map(ratio));
        assert!(first.x >= MARGIN - 1e-6 && first.x <= screen().width - MARGIN + 1e-6);
        assert!(first.y >= MARGIN - 1e-6 && first.y <= screen().height - MARGIN + 1e-6);
    }
}

#[test]
fn twelve_points_are_incomplete() {
    let mut points = captured_points();
    points.pop();
    assert!(matches!(
        CalibrationProfile::build(&points),
        Err(CortexError::IncompleteCalibration { supplied: 12 })
    ));
}

#[test]
fn collinear_points_are_degenerate() {
    let mut points = captured_points();
    // Bottom-center drops onto the line from the centre to bottom-left
    let a = points[PointId::Center.index()].gaze_ratio;
    let b = points[PointId::BottomLeft.index()].gaze_ratio;
    points[PointId::BottomCenter.index()].gaze_ratio = GazeRatio::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0);

    assert!(matches!(
        CalibrationProfile::build(&points),
        Err(CortexError::DegenerateCalibration(_))
    ));
}

#[test]
fn recalibration_keeps_old_profile_until_done() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profile.toml");
    let engine = CalibrationEngine::new().with_profile_path(&path);
    let old = engine.install_profile(CalibrationProfile::linear(screen(), MARGIN).unwrap());

    let first = engine.request_recalibration(screen(), MARGIN, 1);
    assert_eq!(first.id, PointId::Center);
    assert_eq!(engine.state(), CalibrationState::Calibrating { collected: 0 });

    let mut completed = None;
    for id in PointId::ALL {
        // The old profile is still mapping in the middle of the session
        assert_eq!(engine.active_profile().unwrap().id(), old.id());
        match engine.record_point(tracker_ratio(id)).unwrap() {
            CalibrationProgress::Collecting { next, .. } => assert_ne!(next.id, id),
            CalibrationProgress::Completed(profile) => completed = Some(profile),
        }
    }

    let profile = completed.expect("13th point completes the session");
    assert_eq!(engine.state(), CalibrationState::Calibrated);
    assert!(close(
        engine.map(tracker_ratio(PointId::InnerTopRight)).unwrap(),
        PointId::InnerTopRight.screen_target(screen(), MARGIN)
    ));

    let reloaded = CalibrationProfile::load_from_path(&path).unwrap();
    assert_eq!(reloaded.id(), profile.id());
    let ratio = GazeRatio::new(0.4, 0.45);
    assert!(close(reloaded.map(ratio), profile.map(ratio)));
}
