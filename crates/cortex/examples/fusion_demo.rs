//! Example: One fusion tick by hand, without the background loops

use magnifier_cortex::shared_state::{latest_value, SharedState};
use magnifier_cortex::{
    Classification, Coordinate, CortexConfig, DetectedRegion, FusionCore, FusionMode, ImportanceScorer, Rect,
};
use std::time::Instant;

fn main() {
    let config = CortexConfig::default();
    let scorer = ImportanceScorer::from_config(&config);

    // A confirmation dialog on the right half of the screen
    let regions = vec![
        DetectedRegion::new(Rect::new(1300.0, 400.0, 300.0, 30.0), "Delete 3 files?", 93.0, Classification::Title),
        DetectedRegion::new(Rect::new(1320.0, 520.0, 90.0, 24.0), "OK", 97.0, Classification::Confirmation),
        DetectedRegion::new(Rect::new(1460.0, 520.0, 90.0, 24.0), "Cancel", 96.0, Classification::Button),
    ];
    let map = scorer.rebuild(&regions, &config.weights, config.grid_dims());
    for cell in map.top_cells(3) {
        println!("cell ({}, {}) scores {:.2}", cell.row, cell.col, cell.score);
    }

    let (gaze, gaze_reader) = latest_value();
    let (importance, importance_reader) = latest_value();
    let shared = SharedState::new(config, gaze_reader, importance_reader);
    importance.publish(map);
    gaze.publish(Coordinate::new(1100.0, 480.0));

    let mut core = FusionCore::new();
    let pointer = Some(Coordinate::new(300.0, 800.0));
    for mode in [
        FusionMode::FollowMouse,
        FusionMode::Blended,
        FusionMode::ImportanceBased,
        FusionMode::FixedPosition,
    ] {
        shared.set_mode(mode);
        let result = core.tick(&shared.fusion_inputs(pointer), Instant::now());
        println!(
            "{:?}: ({:.1}, {:.1}) from {:?}",
            mode, result.coordinate.x, result.coordinate.y, result.contributing_sources
        );
        for exclusion in &result.exclusions {
            println!("  {} excluded: {:?}", exclusion.source, exclusion.reason);
        }
    }
}
