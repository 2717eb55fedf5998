//! Per-region scoring and map rebuild

use super::{GridDims, ImportanceMap};
use crate::config::{CortexConfig, WeightConfig};
use crate::types::{DetectedRegion, ScreenSize};
use ndarray::Array2;

/// Cell-independent factors of one detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionFactors {
    pub size: f64,
    pub confidence: f64,
    pub classification: f64,
    pub length: f64,
}

impl RegionFactors {
    /// Product of every factor except density, which depends on the cell
    pub fn base_score(&self) -> f64 {
        self.size * self.confidence * self.classification * self.length
    }
}

/// Builds importance maps from detections
#[derive(Debug, Clone, Copy)]
pub struct ImportanceScorer {
    screen: ScreenSize,
    confidence_threshold: f64,
}

impl ImportanceScorer {
    pub fn new(screen: ScreenSize, confidence_threshold: u8) -> Self {
        Self {
            screen,
            confidence_threshold: f64::from(confidence_threshold),
        }
    }

    pub fn from_config(config: &CortexConfig) -> Self {
        Self::new(config.screen(), config.confidence_threshold)
    }

    pub fn factors(&self, region: &DetectedRegion, weights: &WeightConfig) -> RegionFactors {
        let font = region.font_size();
        let font = if font.is_finite() { font.max(weights.min_font_px) } else { weights.base_font_px };
        let size = (weights.base_font_px / font).clamp(weights.min_size_factor, weights.max_size_factor);

        // NaN confidence fails the comparison and scores zero
        let confidence = if region.confidence >= self.confidence_threshold {
            region.confidence.min(100.0) / 100.0
        } else {
            0.0
        };

        let normalized_length =
            (region.char_count() as f64 / weights.text_length_full_scale as f64).min(1.0);
        let length = 1.0 + (weights.length_weight_max - 1.0) * normalized_length;

        RegionFactors {
            size,
            confidence,
            classification: weights.classification.weight(region.classification),
            length,
        }
    }

    /// Text density of a region within one cell: `1 + k * chars / cell_area`
    pub fn density(weights: &WeightConfig, char_count: usize, cell_area: f64) -> f64 {
        if cell_area > 0.0 {
            1.0 + weights.density_coefficient * char_count as f64 / cell_area
        } else {
            1.0
        }
    }

    /// Score every cell from scratch and return a normalized map.
    ///
    /// A region spanning several cells contributes to each in proportion to
    /// the share of its area that falls in that cell. A zero-area region
    /// counts in full for the cell holding its centre.
    pub fn rebuild(&self, detections: &[DetectedRegion], weights: &WeightConfig, dims: GridDims) -> ImportanceMap {
        let mut raw = Array2::<f64>::zeros((dims.rows, dims.cols));
        let mut scored = 0usize;

        for region in detections {
            let base = self.factors(region, weights).base_score();
            if !(base.is_finite() && base > 0.0) {
                continue;
            }
            let chars = region.char_count();
            let density = |cell_area: f64| Self::density(weights, chars, cell_area);

            let bbox = region.bounding_box;
            let area = bbox.area();

            if area <= 0.0 {
                if let Some((row, col)) = dims.cell_at(self.screen, bbox.center()) {
                    let cell = dims.cell_bounds(self.screen, row, col);
                    raw[[row, col]] += base * density(cell.area());
                    scored += 1;
                }
                continue;
            }

            let (rows, cols) = dims.overlapping(self.screen, &bbox);
            let mut touched = false;
            for row in rows {
                for col in cols.clone() {
                    let cell = dims.cell_bounds(self.screen, row, col);
                    let overlap = cell.intersection_area(&bbox);
                    if overlap <= 0.0 {
                        continue;
                    }
                    raw[[row, col]] += base * density(cell.area()) * (overlap / area);
                    touched = true;
                }
            }
            if touched {
                scored += 1;
            }
        }

        log::debug!(
            "Scored {} of {} detections on a {}x{} grid",
            scored,
            detections.len(),
            dims.rows,
            dims.cols
        );

        ImportanceMap::normalized(self.screen, dims, raw)
    }
}
