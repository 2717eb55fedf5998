//! Example: Basic usage of the Cortex API

use anyhow::Result;
use magnifier_cortex::sources::{SharedPointer, SimulatedGaze, StaticDetections};
use magnifier_cortex::{CalibrationEngine, CalibrationProfile, Coordinate, Cortex, CortexConfig};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::init();

    let config = CortexConfig::default();
    let screen = config.screen();

    // The simulated sweep already produces screen ratios
    let calibration = CalibrationEngine::new();
    calibration.install_profile(CalibrationProfile::linear(screen, config.calibration_margin_px)?);

    let pointer = Arc::new(SharedPointer::new());
    let mut cortex = Cortex::new(config, pointer.clone())?
        .with_calibration(calibration)
        .with_gaze_source(SimulatedGaze::new())
        .with_detection_source(StaticDetections::demo_dialog(screen.width, screen.height));

    let results = cortex.subscribe_to_fusion_result();
    cortex.start().await?;

    println!("Cortex is running for two seconds");
    for step in 0..20 {
        pointer.set(Coordinate::new(100.0 + step as f64 * 40.0, 900.0));
        tokio::time::sleep(Duration::from_millis(100)).await;

        if let Some(result) = results.try_iter().last() {
            println!(
                "pointer ({:>4.0}, 900) -> target ({:>6.1}, {:>6.1}) via {:?}",
                100.0 + step as f64 * 40.0,
                result.coordinate.x,
                result.coordinate.y,
                result.contributing_sources
            );
        }
    }

    cortex.shutdown().await?;
    Ok(())
}
