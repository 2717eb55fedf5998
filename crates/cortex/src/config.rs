//! Configuration surface
//!
//! `CortexConfig` is what the settings UI hands over. It is loaded from TOML,
//! validated as a whole, and published by replacement: a rejected config never
//! half-applies.

use crate::error::{CortexError, Result};
use crate::importance::GridDims;
use crate::types::{Classification, FusionMode, ScreenSize, Source};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Per-source weights for the blended average
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceWeights {
    pub mouse: f64,
    pub gaze: f64,
    pub importance: f64,
}

impl SourceWeights {
    pub const fn new(mouse: f64, gaze: f64, importance: f64) -> Self {
        Self {
            mouse,
            gaze,
            importance,
        }
    }

    pub fn weight(&self, source: Source) -> f64 {
        match source {
            Source::Mouse => self.mouse,
            Source::Gaze => self.gaze,
            Source::Importance => self.importance,
        }
    }
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self::new(0.4, 0.3, 0.3)
    }
}

/// Multiplier per detection classification
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationWeights {
    pub confirmation: f64,
    pub button: f64,
    pub error: f64,
    pub input_field: f64,
    pub title: f64,
    pub checkbox: f64,
    pub plain: f64,
}

impl ClassificationWeights {
    pub fn weight(&self, classification: Classification) -> f64 {
        match classification {
            Classification::Confirmation => self.confirmation,
            Classification::Button => self.button,
            Classification::Error => self.error,
            Classification::InputField => self.input_field,
            Classification::Title => self.title,
            Classification::Checkbox => self.checkbox,
            Classification::Plain => self.plain,
        }
    }

    fn values(&self) -> [(&'static str, f64); 7] {
        [
            ("confirmation", self.confirmation),
            ("button", self.button),
            ("error", self.error),
            ("input_field", self.input_field),
            ("title", self.title),
            ("checkbox", self.checkbox),
            ("plain", self.plain),
        ]
    }
}

impl Default for ClassificationWeights {
    fn default() -> Self {
        Self {
            confirmation: 3.0,
            button: 3.0,
            error: 2.5,
            input_field: 2.0,
            title: 1.5,
            checkbox: 1.0,
            plain: 1.0,
        }
    }
}

/// Tunable factors for fusion and importance scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightConfig {
    /// Glyph height that scores a size factor of exactly 1
    pub base_font_px: f64,
    /// Floor for the glyph height divisor
    pub min_font_px: f64,
    pub min_size_factor: f64,
    pub max_size_factor: f64,
    /// Length weight reached at full scale
    pub length_weight_max: f64,
    /// Character count treated as full-scale text length
    pub text_length_full_scale: usize,
    pub density_coefficient: f64,
    /// Source weights used in `Blended` mode
    pub sources: SourceWeights,
    /// Source weights used in `ImportanceBased` mode
    pub importance_based: SourceWeights,
    pub classification: ClassificationWeights,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            base_font_px: 20.0,
            min_font_px: 5.0,
            min_size_factor: 1.0,
            max_size_factor: 4.0,
            length_weight_max: 1.5,
            text_length_full_scale: 40,
            density_coefficient: 0.2,
            sources: SourceWeights::default(),
            importance_based: SourceWeights::new(0.2, 0.2, 0.6),
            classification: ClassificationWeights::default(),
        }
    }
}

impl WeightConfig {
    /// Source weight table for a fusion mode
    pub fn source_weights(&self, mode: FusionMode) -> &SourceWeights {
        match mode {
            FusionMode::ImportanceBased => &self.importance_based,
            _ => &self.sources,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (table, weights) in [("sources", &self.sources), ("importance_based", &self.importance_based)] {
            for source in Source::ALL {
                non_negative(&format!("weights.{table}.{source}"), weights.weight(source))?;
            }
        }

        for (name, value) in self.classification.values() {
            non_negative(&format!("weights.classification.{name}"), value)?;
        }

        positive("weights.base_font_px", self.base_font_px)?;
        positive("weights.min_font_px", self.min_font_px)?;
        positive("weights.min_size_factor", self.min_size_factor)?;
        positive("weights.max_size_factor", self.max_size_factor)?;
        if self.min_size_factor > self.max_size_factor {
            return Err(CortexError::invalid_config(format!(
                "weights.min_size_factor ({}) exceeds weights.max_size_factor ({})",
                self.min_size_factor, self.max_size_factor
            )));
        }

        if !self.length_weight_max.is_finite() || self.length_weight_max < 1.0 {
            return Err(CortexError::invalid_config(format!(
                "weights.length_weight_max must be >= 1, got {}",
                self.length_weight_max
            )));
        }
        if self.text_length_full_scale == 0 {
            return Err(CortexError::invalid_config("weights.text_length_full_scale must be at least 1"));
        }
        non_negative("weights.density_coefficient", self.density_coefficient)?;

        Ok(())
    }
}

/// Configuration for the cortex system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CortexConfig {
    pub screen_width: f64,
    pub screen_height: f64,
    pub grid_rows: usize,
    pub grid_cols: usize,
    /// Minimum normalized score an importance candidate needs, 0-1
    pub importance_threshold: f64,
    /// Detections below this confidence (0-100) are ignored
    pub confidence_threshold: u8,
    pub fusion_tick_interval_ms: u64,
    pub importance_update_interval_s: f64,
    pub gaze_stale_timeout_ms: u64,
    /// Importance is stale after this many update intervals
    pub importance_stale_factor: f64,
    pub mode: FusionMode,
    /// Raw samples averaged into each calibration point
    pub calibration_samples: usize,
    /// Distance of the outer calibration targets from the screen edge
    pub calibration_margin_px: f64,
    /// When set, importance-based mode looks for important cells near the
    /// gaze/pointer instead of using the global peak
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_search_radius_px: Option<f64>,
    pub weights: WeightConfig,
}

impl Default for CortexConfig {
    fn default() -> Self {
        Self {
            screen_width: 1920.0,
            screen_height: 1080.0,
            grid_rows: 7,
            grid_cols: 14,
            importance_threshold: 0.7,
            confidence_threshold: 25,
            fusion_tick_interval_ms: 30,
            importance_update_interval_s: 5.0,
            gaze_stale_timeout_ms: 500,
            importance_stale_factor: 2.0,
            mode: FusionMode::Blended,
            calibration_samples: 10,
            calibration_margin_px: 50.0,
            local_search_radius_px: None,
            weights: WeightConfig::default(),
        }
    }
}

impl CortexConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: CortexConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn screen(&self) -> ScreenSize {
        ScreenSize::new(self.screen_width, self.screen_height)
    }

    pub fn grid_dims(&self) -> GridDims {
        GridDims::new(self.grid_rows, self.grid_cols)
    }

    pub fn fusion_tick_interval(&self) -> Duration {
        Duration::from_millis(self.fusion_tick_interval_ms)
    }

    pub fn importance_update_interval(&self) -> Duration {
        Duration::from_secs_f64(self.importance_update_interval_s)
    }

    pub fn gaze_stale_timeout(&self) -> Duration {
        Duration::from_millis(self.gaze_stale_timeout_ms)
    }

    pub fn importance_stale_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.importance_update_interval_s * self.importance_stale_factor)
    }

    pub fn validate(&self) -> Result<()> {
        positive("screen_width", self.screen_width)?;
        positive("screen_height", self.screen_height)?;

        if self.grid_rows == 0 || self.grid_cols == 0 {
            return Err(CortexError::invalid_config(format!(
                "grid must have at least one row and column, got {}x{}",
                self.grid_rows, self.grid_cols
            )));
        }

        if !(0.0..=1.0).contains(&self.importance_threshold) {
            return Err(CortexError::invalid_config(format!(
                "importance_threshold must be within [0, 1], got {}",
                self.importance_threshold
            )));
        }

        if self.confidence_threshold > 100 {
            return Err(CortexError::invalid_config(format!(
                "confidence_threshold must be within [0, 100], got {}",
                self.confidence_threshold
            )));
        }

        if self.fusion_tick_interval_ms == 0 {
            return Err(CortexError::invalid_config("fusion_tick_interval_ms must be positive"));
        }
        // Upper bound keeps Duration::from_secs_f64 from panicking on absurd input
        if !(self.importance_update_interval_s > 0.0 && self.importance_update_interval_s <= 86_400.0) {
            return Err(CortexError::invalid_config(format!(
                "importance_update_interval_s must be within (0, 86400], got {}",
                self.importance_update_interval_s
            )));
        }
        if self.gaze_stale_timeout_ms == 0 {
            return Err(CortexError::invalid_config("gaze_stale_timeout_ms must be positive"));
        }
        if !(self.importance_stale_factor >= 1.0 && self.importance_stale_factor <= 100.0) {
            return Err(CortexError::invalid_config(format!(
                "importance_stale_factor must be within [1, 100], got {}",
                self.importance_stale_factor
            )));
        }

        if self.calibration_samples == 0 {
            return Err(CortexError::invalid_config("calibration_samples must be at least 1"));
        }
        non_negative("calibration_margin_px", self.calibration_margin_px)?;
        if self.calibration_margin_px * 2.0 >= self.screen_width.min(self.screen_height) {
            return Err(CortexError::invalid_config(format!(
                "calibration_margin_px {} leaves no room on a {}x{} screen",
                self.calibration_margin_px, self.screen_width, self.screen_height
            )));
        }

        if let Some(radius) = self.local_search_radius_px {
            positive("local_search_radius_px", radius)?;
            // Any larger radius already spans the whole screen from every anchor
            let limit = self.screen_width.max(self.screen_height);
            if radius > limit {
                return Err(CortexError::invalid_config(format!(
                    "local_search_radius_px must be at most {limit} on a {}x{} screen, got {radius}",
                    self.screen_width, self.screen_height
                )));
            }
        }

        self.weights.validate()
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(CortexError::invalid_config(format!("{name} must be finite and non-negative, got {value}")))
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(CortexError::invalid_config(format!("{name} must be finite and positive, got {value}")))
    }
}
