//! Example: Walk a 13-point recalibration and save the profile

use anyhow::Result;
use magnifier_cortex::calibration::CalibrationProgress;
use magnifier_cortex::{CalibrationEngine, GazeRatio, ScreenSize};

fn main() -> Result<()> {
    let screen = ScreenSize::new(1920.0, 1080.0);
    let engine = CalibrationEngine::new();

    // A tracker that only reports the middle 60% of its range
    let mut target = engine.request_recalibration(screen, 50.0, 1);
    loop {
        let (u, v) = target.id.layout();
        let ratio = GazeRatio::new(0.2 + 0.6 * u, 0.2 + 0.6 * v);
        match engine.record_point(ratio)? {
            CalibrationProgress::Collecting { collected, next } => {
                println!("{collected}/13 captured, look at {} ({:.0}, {:.0})", next.id, next.screen_point.x, next.screen_point.y);
                target = next;
            }
            CalibrationProgress::Completed(profile) => {
                println!("profile {} built", profile.id());
                for (x, y) in [(0.2, 0.2), (0.5, 0.5), (0.65, 0.35), (0.95, 0.95)] {
                    let p = profile.map(GazeRatio::new(x, y));
                    println!("  ratio ({x:.2}, {y:.2}) -> ({:.1}, {:.1})", p.x, p.y);
                }
                print!("{}", profile.save()?);
                break;
            }
        }
    }

    Ok(())
}
