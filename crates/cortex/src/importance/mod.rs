//! Importance scoring engine
//!
//! Turns content detections into a grid of normalized priority scores. A map
//! is built once per update cycle and never mutated afterwards; the importance
//! loop publishes each new map by replacement.

mod grid;
mod scoring;

pub use grid::GridDims;
pub use scoring::{ImportanceScorer, RegionFactors};

use crate::types::{Coordinate, Rect, ScreenSize};
use ndarray::Array2;
use serde::Serialize;

/// One tile of the importance grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridCell {
    pub row: usize,
    pub col: usize,
    pub bounds: Rect,
    pub score: f64,
}

impl GridCell {
    pub fn center(&self) -> Coordinate {
        self.bounds.center()
    }
}

/// Immutable grid of per-cell scores plus its derived peak
#[derive(Debug, Clone)]
pub struct ImportanceMap {
    screen: ScreenSize,
    dims: GridDims,
    cells: Array2<GridCell>,
    peak: Option<(usize, usize)>,
    raw_max: f64,
}

impl ImportanceMap {
    /// All-zero map. Its peak is undefined.
    pub fn empty(screen: ScreenSize, dims: GridDims) -> Self {
        Self::from_scores(screen, dims, Array2::zeros((dims.rows, dims.cols)))
    }

    /// Build a map from scores that are already on the 0-1 scale.
    ///
    /// Negative or non-finite scores are stored as zero. The array shape must
    /// match `dims`; missing cells read as zero.
    pub fn from_scores(screen: ScreenSize, dims: GridDims, scores: Array2<f64>) -> Self {
        let cells = Array2::from_shape_fn((dims.rows, dims.cols), |(row, col)| GridCell {
            row,
            col,
            bounds: dims.cell_bounds(screen, row, col),
            score: scores.get((row, col)).copied().map(sanitize).unwrap_or(0.0),
        });

        let mut map = Self {
            screen,
            dims,
            cells,
            peak: None,
            raw_max: 0.0,
        };
        map.peak = map.find_peak();
        map.raw_max = map.peak_score();
        map
    }

    /// Normalize raw accumulated scores by their maximum.
    pub(crate) fn normalized(screen: ScreenSize, dims: GridDims, mut raw: Array2<f64>) -> Self {
        raw.mapv_inplace(sanitize);
        let max = raw.iter().copied().fold(0.0, f64::max);
        if max > 0.0 {
            raw.mapv_inplace(|score| score / max);
        }

        let mut map = Self::from_scores(screen, dims, raw);
        map.raw_max = max;
        map
    }

    pub fn screen(&self) -> ScreenSize {
        self.screen
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }

    pub fn cells(&self) -> &Array2<GridCell> {
        &self.cells
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&GridCell> {
        self.cells.get((row, col))
    }

    pub fn cell_at(&self, point: Coordinate) -> Option<&GridCell> {
        let (row, col) = self.dims.cell_at(self.screen, point)?;
        self.cell(row, col)
    }

    /// Largest score before normalization, useful for comparing cycles
    pub fn raw_max(&self) -> f64 {
        self.raw_max
    }

    /// True when no cell scores above zero
    pub fn is_empty(&self) -> bool {
        self.peak.is_none()
    }

    /// Highest scoring cell; ties go to the smallest row, then smallest column.
    pub fn peak_cell(&self) -> Option<&GridCell> {
        let (row, col) = self.peak?;
        self.cell(row, col)
    }

    pub fn peak_coordinate(&self) -> Option<Coordinate> {
        self.peak_cell().map(GridCell::center)
    }

    pub fn peak_score(&self) -> f64 {
        self.peak_cell().map(|cell| cell.score).unwrap_or(0.0)
    }

    /// Cells ordered by score, highest first. Ties keep row-major order.
    pub fn top_cells(&self, n: usize) -> Vec<&GridCell> {
        let mut ranked: Vec<&GridCell> = self.cells.iter().collect();
        // sort_by is stable, so equal scores stay in row-major order
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(n);
        ranked
    }

    /// Highest score among cells touching the square of half-width `radius`
    /// around `point`.
    pub fn local_peak(&self, point: Coordinate, radius: f64) -> f64 {
        self.window(point, radius)
            .map(|cell| cell.score)
            .fold(0.0, f64::max)
    }

    /// Pull toward important content near a point.
    ///
    /// Looks at cells touching the square of half-width `radius` around
    /// `point`, drops those scoring below `threshold` and returns the
    /// score-weighted centroid of the remaining cell centres together with the
    /// best score among them. `None` when nothing nearby clears the threshold.
    pub fn attraction_near(&self, point: Coordinate, radius: f64, threshold: f64) -> Option<(Coordinate, f64)> {
        let mut weight = 0.0;
        let mut x = 0.0;
        let mut y = 0.0;
        let mut best = 0.0_f64;

        for cell in self.window(point, radius) {
            if cell.score <= 0.0 || cell.score < threshold {
                continue;
            }
            let center = cell.center();
            x += center.x * cell.score;
            y += center.y * cell.score;
            weight += cell.score;
            best = best.max(cell.score);
        }

        if weight > 0.0 {
            Some((Coordinate::new(x / weight, y / weight), best))
        } else {
            None
        }
    }

    fn window(&self, point: Coordinate, radius: f64) -> impl Iterator<Item = &GridCell> {
        let radius = if radius.is_finite() { radius.max(0.0) } else { 0.0 };
        let square = Rect::new(point.x - radius, point.y - radius, radius * 2.0, radius * 2.0);
        let (rows, cols) = self.dims.overlapping(self.screen, &square);

        rows.flat_map(move |row| cols.clone().map(move |col| (row, col)))
            .filter_map(move |(row, col)| self.cell(row, col))
            .filter(move |cell| touches(&cell.bounds, &square))
    }

    fn find_peak(&self) -> Option<(usize, usize)> {
        let mut peak: Option<&GridCell> = None;
        // Row-major walk with a strict comparison keeps the first maximum
        for cell in self.cells.iter() {
            if cell.score <= 0.0 {
                continue;
            }
            match peak {
                Some(best) if cell.score <= best.score => {}
                _ => peak = Some(cell),
            }
        }
        peak.map(|cell| (cell.row, cell.col))
    }
}

fn sanitize(score: f64) -> f64 {
    if score.is_finite() && score > 0.0 {
        score
    } else {
        0.0
    }
}

/// Closed-interval overlap, so a zero-sized square still selects its cell.
fn touches(cell: &Rect, square: &Rect) -> bool {
    cell.x <= square.right() && square.x < cell.right() && cell.y <= square.bottom() && square.y < cell.bottom()
}
