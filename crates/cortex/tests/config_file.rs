use magnifier_cortex::*;
use std::io::Write;

#[test]
fn load_settings_file_with_overrides() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
screen_width = 2560
screen_height = 1440
mode = "importance_based"
local_search_radius_px = 300
gaze_stale_timeout_ms = 250

[weights]
density_coefficient = 0.5

[weights.importance_based]
mouse = 0.1
gaze = 0.1
importance = 0.8
"#
    )
    .unwrap();

    let config = CortexConfig::load(file.path()).unwrap();
    assert_eq!(config.screen(), ScreenSize::new(2560.0, 1440.0));
    assert_eq!(config.mode, FusionMode::ImportanceBased);
    assert_eq!(config.local_search_radius_px, Some(300.0));
    assert_eq!(config.gaze_stale_timeout().as_millis(), 250);
    assert_eq!(config.weights.density_coefficient, 0.5);
    assert_eq!(config.weights.source_weights(FusionMode::ImportanceBased).importance, 0.8);
    // Untouched tables keep their defaults
    assert_eq!(config.weights.source_weights(FusionMode::Blended).mouse, 0.4);
    assert_eq!(config.grid_dims(), GridDims::new(7, 14));
}

#[test]
fn invalid_settings_file_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "importance_threshold = 2.0").unwrap();
    assert!(matches!(
        CortexConfig::load(file.path()),
        Err(CortexError::ConfigurationInvalid(_))
    ));

    let missing = file.path().with_extension("absent");
    assert!(matches!(CortexConfig::load(&missing), Err(CortexError::Io(_))));
}
