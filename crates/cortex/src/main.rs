//! Magnifier Cortex daemon
//!
//! Runs the fusion engine against live inputs:
//! - Pointer position from xdotool when available
//! - Gaze ratios from a UDP eye tracker or a simulated sweep
//! - Detections from a JSON file or a built-in demo dialog
//!
//! Fusion results are logged; a magnifier front end would subscribe instead.

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use magnifier_cortex::calibration::CalibrationProfile;
use magnifier_cortex::sources::{JsonDetectionFile, SimulatedGaze, StaticDetections, UdpGazeSource, XdotoolPointer};
use magnifier_cortex::{CalibrationEngine, Coordinate, Cortex, CortexConfig, FusionMode, PointerSource};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "magnifier-cortex")]
#[command(about = "Fuses pointer, gaze and on-screen importance into a magnifier target")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Fusion mode: follow_mouse, fixed_position, importance_based or blended
    #[arg(short, long)]
    mode: Option<FusionMode>,

    #[arg(long)]
    screen_width: Option<f64>,

    #[arg(long)]
    screen_height: Option<f64>,

    /// Listen for eye tracker datagrams on this address
    #[arg(long, value_name = "ADDR", conflicts_with = "simulate_gaze")]
    gaze_udp: Option<SocketAddr>,

    /// Feed a synthetic figure-8 gaze sweep
    #[arg(long)]
    simulate_gaze: bool,

    /// JSON detections file, re-read every importance cycle
    #[arg(long, value_name = "FILE")]
    detections: Option<PathBuf>,

    /// Calibration profile to load at startup and save recalibrations to
    #[arg(long, value_name = "FILE")]
    calibration: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<CortexConfig> {
    let mut config = match &args.config {
        Some(path) => CortexConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => CortexConfig::default(),
    };
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(width) = args.screen_width {
        config.screen_width = width;
    }
    if let Some(height) = args.screen_height {
        config.screen_height = height;
    }
    config.validate()?;
    Ok(config)
}

fn calibration_engine(args: &Args, config: &CortexConfig) -> Result<CalibrationEngine> {
    let mut engine = CalibrationEngine::new();

    if let Some(path) = &args.calibration {
        engine = engine.with_profile_path(path);
        if path.exists() {
            let profile = CalibrationProfile::load_from_path(path)
                .with_context(|| format!("loading calibration {}", path.display()))?;
            engine.install_profile(profile);
            return Ok(engine);
        }
        log::info!("No calibration at {} yet, it will be written after recalibrating", path.display());
    }

    // The sweep is already in screen ratios, so an ideal profile maps it 1:1
    if args.simulate_gaze {
        engine.install_profile(CalibrationProfile::linear(config.screen(), config.calibration_margin_px)?);
    }

    Ok(engine)
}

fn pointer_source(period: Duration) -> Result<Arc<dyn PointerSource>> {
    if XdotoolPointer::is_available() {
        log::info!("Pointer: xdotool every {:?}", period);
        let pointer = XdotoolPointer::spawn(period).context("starting xdotool pointer poller")?;
        Ok(Arc::new(pointer))
    } else {
        log::warn!("xdotool not found, pointer input disabled");
        Ok(Arc::new(|| -> Option<Coordinate> { None }))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(LevelFilter::Info)
        .init();

    let args = Args::parse();

    log::info!("═══════════════════════════════════════");
    log::info!("  Magnifier Cortex");
    log::info!("═══════════════════════════════════════");

    let config = load_config(&args)?;
    let calibration = calibration_engine(&args, &config)?;
    let stale_timeout = config.gaze_stale_timeout();
    let (width, height) = (config.screen_width, config.screen_height);
    let pointer = pointer_source(config.fusion_tick_interval())?;

    let mut cortex = Cortex::new(config, pointer)?.with_calibration(calibration);

    if let Some(addr) = args.gaze_udp {
        cortex = cortex.with_gaze_source(UdpGazeSource::bind(addr, stale_timeout).await?);
    } else if args.simulate_gaze {
        log::info!("Gaze: simulated figure-8 at {} fps", SimulatedGaze::FPS);
        cortex = cortex.with_gaze_source(SimulatedGaze::new());
    } else {
        log::info!("Gaze: none");
    }

    cortex = match &args.detections {
        Some(path) => {
            log::info!("Detections: {}", path.display());
            cortex.with_detection_source(JsonDetectionFile::new(path))
        }
        None => {
            log::info!("Detections: built-in demo dialog");
            cortex.with_detection_source(StaticDetections::demo_dialog(width, height))
        }
    };

    cortex.start().await?;

    log::info!("Cortex running, press Ctrl+C to exit");
    log::info!("───────────────────────────────────────");

    // Set up Ctrl+C handler
    let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(1);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal...");
        let _ = tx.blocking_send(());
    })?;

    // Log a summary of the fusion output about once a second
    let results = cortex.subscribe_to_fusion_result();
    let reporter = tokio::task::spawn_blocking(move || {
        let mut count: u64 = 0;
        for result in results.iter() {
            if count % 30 == 0 {
                log::info!(
                    "Target ({:.0}, {:.0}) from {:?}{}",
                    result.coordinate.x,
                    result.coordinate.y,
                    result.contributing_sources,
                    if result.held { " (held)" } else { "" }
                );
            }
            count += 1;
        }
    });

    // Wait for shutdown signal
    rx.recv().await;

    cortex.shutdown().await?;
    // Dropping the cortex closes the subscription, which ends the reporter
    reporter.await?;

    log::info!("Cortex shutdown complete. Goodbye!");
    Ok(())
}
