//! Screen tiling

use crate::types::{Coordinate, Rect, ScreenSize};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Grid dimensions, rows by columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridDims {
    pub rows: usize,
    pub cols: usize,
}

impl GridDims {
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Bounds of one cell.
    ///
    /// Edges are computed as `extent * i / n` for both neighbours, so adjacent
    /// cells share the exact same float boundary and the grid tiles the screen
    /// with no gaps or overlaps.
    pub fn cell_bounds(&self, screen: ScreenSize, row: usize, col: usize) -> Rect {
        let x0 = edge(screen.width, col, self.cols);
        let x1 = edge(screen.width, col + 1, self.cols);
        let y0 = edge(screen.height, row, self.rows);
        let y1 = edge(screen.height, row + 1, self.rows);
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// Cell containing a point. Points on the right/bottom screen edge belong
    /// to the last column/row; points off screen have no cell.
    pub fn cell_at(&self, screen: ScreenSize, point: Coordinate) -> Option<(usize, usize)> {
        if self.rows == 0 || self.cols == 0 {
            return None;
        }
        if !(0.0..=screen.width).contains(&point.x) || !(0.0..=screen.height).contains(&point.y) {
            return None;
        }

        let mut col = ((point.x / screen.width) * self.cols as f64).floor() as usize;
        let mut row = ((point.y / screen.height) * self.rows as f64).floor() as usize;
        col = col.min(self.cols - 1);
        row = row.min(self.rows - 1);

        // Float division can land one cell off right at a boundary
        if point.x < edge(screen.width, col, self.cols) && col > 0 {
            col -= 1;
        }
        if point.y < edge(screen.height, row, self.rows) && row > 0 {
            row -= 1;
        }

        Some((row, col))
    }

    /// Row and column ranges of the cells a rectangle may overlap.
    /// The ranges are conservative; callers still intersect exactly.
    pub fn overlapping(&self, screen: ScreenSize, rect: &Rect) -> (Range<usize>, Range<usize>) {
        let cols = span(rect.x, rect.right(), screen.width, self.cols);
        let rows = span(rect.y, rect.bottom(), screen.height, self.rows);
        (rows, cols)
    }
}

fn edge(extent: f64, index: usize, count: usize) -> f64 {
    extent * index as f64 / count as f64
}

fn span(start: f64, end: f64, extent: f64, count: usize) -> Range<usize> {
    if count == 0 || !(start.is_finite() && end.is_finite()) || end < 0.0 || start > extent {
        return 0..0;
    }
    // Clamp before the cast so huge rectangles cannot saturate to usize::MAX
    let cells = count as f64;
    let first = ((start / extent) * cells).floor().clamp(0.0, cells) as usize;
    let last = ((end / extent) * cells).ceil().clamp(0.0, cells) as usize;
    // Widen by one on each side to absorb rounding, the exact test happens later
    first.saturating_sub(1).min(count)..last.saturating_add(1).min(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cells_tile_screen() {
        let screen = ScreenSize::new(1920.0, 1080.0);
        let dims = GridDims::new(7, 14);

        let mut total = 0.0;
        for row in 0..dims.rows {
            for col in 0..dims.cols {
                let cell = dims.cell_bounds(screen, row, col);
                total += cell.area();

                if col + 1 < dims.cols {
                    let right = dims.cell_bounds(screen, row, col + 1);
                    assert_eq!(cell.right(), right.x);
                }
                if row + 1 < dims.rows {
                    let below = dims.cell_bounds(screen, row + 1, col);
                    assert_eq!(cell.bottom(), below.y);
                }
            }
        }

        assert!((total - 1920.0 * 1080.0).abs() < 1e-6);
        assert_eq!(dims.cell_bounds(screen, 6, 13).right(), 1920.0);
        assert_eq!(dims.cell_bounds(screen, 6, 13).bottom(), 1080.0);
    }

    #[test]
    fn test_cell_at() {
        let screen = ScreenSize::new(1000.0, 1000.0);
        let dims = GridDims::new(2, 2);
        assert_eq!(dims.cell_at(screen, Coordinate::new(0.0, 0.0)), Some((0, 0)));
        assert_eq!(dims.cell_at(screen, Coordinate::new(499.9, 500.0)), Some((1, 0)));
        assert_eq!(dims.cell_at(screen, Coordinate::new(1000.0, 1000.0)), Some((1, 1)));
        assert_eq!(dims.cell_at(screen, Coordinate::new(-1.0, 10.0)), None);
    }

    #[test]
    fn test_overlapping_is_conservative() {
        let screen = ScreenSize::new(1000.0, 1000.0);
        let dims = GridDims::new(4, 4);
        let (rows, cols) = dims.overlapping(screen, &Rect::new(260.0, 10.0, 200.0, 100.0));
        assert!(rows.contains(&0));
        assert!(cols.contains(&1));
        assert!(rows.end <= 4 && cols.end <= 4);

        let (rows, cols) = dims.overlapping(screen, &Rect::new(2000.0, 10.0, 5.0, 5.0));
        assert!(rows.is_empty() || cols.is_empty());
    }

    #[test]
    fn test_overlapping_huge_rect_covers_grid() {
        let screen = ScreenSize::new(1000.0, 1000.0);
        let dims = GridDims::new(7, 14);

        let (rows, cols) = dims.overlapping(screen, &Rect::new(0.0, 0.0, 1e30, 20.0));
        assert_eq!(cols, 0..14);
        assert_eq!(rows, 0..2);

        let (rows, cols) = dims.overlapping(screen, &Rect::new(-1e30, -1e30, 2e30, 2e30));
        assert_eq!((rows, cols), (0..7, 0..14));
    }
}
