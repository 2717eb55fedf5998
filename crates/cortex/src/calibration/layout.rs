//! Canonical 13-point calibration layout

use crate::types::{Coordinate, ScreenSize};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a calibration target. Persisted profiles key their
/// points by this, so the serialized names must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointId {
    Center,
    TopLeft,
    TopCenter,
    TopRight,
    MiddleLeft,
    MiddleRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
    InnerTopLeft,
    InnerTopRight,
    InnerBottomLeft,
    InnerBottomRight,
}

impl PointId {
    pub const COUNT: usize = 13;

    /// Capture order: centre first, then the outer ring, then the inner points
    pub const ALL: [PointId; 13] = [
        PointId::Center,
        PointId::TopLeft,
        PointId::TopCenter,
        PointId::TopRight,
        PointId::MiddleLeft,
        PointId::MiddleRight,
        PointId::BottomLeft,
        PointId::BottomCenter,
        PointId::BottomRight,
        PointId::InnerTopLeft,
        PointId::InnerTopRight,
        PointId::InnerBottomLeft,
        PointId::InnerBottomRight,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Position in the unit layout square.
    /// Outer points sit on the {0, 0.5, 1} lattice, inner points at the quarters.
    pub fn layout(self) -> (f64, f64) {
        match self {
            PointId::Center => (0.5, 0.5),
            PointId::TopLeft => (0.0, 0.0),
            PointId::TopCenter => (0.5, 0.0),
            PointId::TopRight => (1.0, 0.0),
            PointId::MiddleLeft => (0.0, 0.5),
            PointId::MiddleRight => (1.0, 0.5),
            PointId::BottomLeft => (0.0, 1.0),
            PointId::BottomCenter => (0.5, 1.0),
            PointId::BottomRight => (1.0, 1.0),
            PointId::InnerTopLeft => (0.25, 0.25),
            PointId::InnerTopRight => (0.75, 0.25),
            PointId::InnerBottomLeft => (0.25, 0.75),
            PointId::InnerBottomRight => (0.75, 0.75),
        }
    }

    pub fn is_inner(self) -> bool {
        matches!(
            self,
            PointId::InnerTopLeft | PointId::InnerTopRight | PointId::InnerBottomLeft | PointId::InnerBottomRight
        )
    }

    /// Where the target is drawn on a screen, `margin` pixels in from the edges
    pub fn screen_target(self, screen: ScreenSize, margin: f64) -> Coordinate {
        let (u, v) = self.layout();
        Coordinate::new(
            margin + u * (screen.width - 2.0 * margin),
            margin + v * (screen.height - 2.0 * margin),
        )
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PointId::Center => "center",
            PointId::TopLeft => "top-left",
            PointId::TopCenter => "top-center",
            PointId::TopRight => "top-right",
            PointId::MiddleLeft => "middle-left",
            PointId::MiddleRight => "middle-right",
            PointId::BottomLeft => "bottom-left",
            PointId::BottomCenter => "bottom-center",
            PointId::BottomRight => "bottom-right",
            PointId::InnerTopLeft => "inner top-left",
            PointId::InnerTopRight => "inner top-right",
            PointId::InnerBottomLeft => "inner bottom-left",
            PointId::InnerBottomRight => "inner bottom-right",
        };
        f.write_str(name)
    }
}

/// One interpolation cell of the outer 3x3 lattice
#[derive(Debug, Clone, Copy)]
pub(crate) struct Quad {
    /// Corners at (0,0), (1,0), (1,1), (0,1) of the cell's own parameter space
    pub corners: [PointId; 4],
    /// Inner point that anchors the cell's bubble correction
    pub inner: PointId,
}

pub(crate) const QUADS: [Quad; 4] = [
    Quad {
        corners: [PointId::TopLeft, PointId::TopCenter, PointId::Center, PointId::MiddleLeft],
        inner: PointId::InnerTopLeft,
    },
    Quad {
        corners: [PointId::TopCenter, PointId::TopRight, PointId::MiddleRight, PointId::Center],
        inner: PointId::InnerTopRight,
    },
    Quad {
        corners: [PointId::MiddleLeft, PointId::Center, PointId::BottomCenter, PointId::BottomLeft],
        inner: PointId::InnerBottomLeft,
    },
    Quad {
        corners: [PointId::Center, PointId::MiddleRight, PointId::BottomRight, PointId::BottomCenter],
        inner: PointId::InnerBottomRight,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_follow_capture_order() {
        for (i, id) in PointId::ALL.iter().enumerate() {
            assert_eq!(id.index(), i);
        }
    }

    #[test]
    fn test_screen_targets() {
        let screen = ScreenSize::new(1000.0, 600.0);
        assert_eq!(PointId::TopLeft.screen_target(screen, 50.0), Coordinate::new(50.0, 50.0));
        assert_eq!(PointId::Center.screen_target(screen, 50.0), Coordinate::new(500.0, 300.0));
        assert_eq!(PointId::BottomRight.screen_target(screen, 50.0), Coordinate::new(950.0, 550.0));
        assert_eq!(PointId::InnerTopRight.screen_target(screen, 0.0), Coordinate::new(750.0, 150.0));
    }

    #[test]
    fn test_quads_cover_each_point() {
        let mut seen = [0usize; PointId::COUNT];
        for quad in QUADS {
            for id in quad.corners {
                seen[id.index()] += 1;
            }
            assert!(quad.inner.is_inner());
            seen[quad.inner.index()] += 1;
        }
        // Centre joins all four cells, edge midpoints two, corners and inner points one
        assert_eq!(seen[PointId::Center.index()], 4);
        assert_eq!(seen[PointId::TopCenter.index()], 2);
        assert_eq!(seen[PointId::TopLeft.index()], 1);
        assert!(seen.iter().all(|n| *n >= 1));
    }
}
