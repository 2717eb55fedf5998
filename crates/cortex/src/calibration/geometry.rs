//! 2D helpers for the calibration model

use std::ops::{Add, Mul, Sub};

/// Below this a cross product counts as zero
pub(crate) const COLLINEAR_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn cross(self, other: Vec2) -> f64 {
        self.x * other.y - self.y * other.x
    }

    pub fn dot(self, other: Vec2) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn length_squared(self) -> f64 {
        self.dot(self)
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// Point on the quad `a b c d` at parameters `(u, v)`.
///
/// `a` sits at (0,0), `b` at (1,0), `c` at (1,1) and `d` at (0,1).
pub(crate) fn bilinear(quad: &[Vec2; 4], u: f64, v: f64) -> Vec2 {
    let [a, b, c, d] = *quad;
    a * ((1.0 - u) * (1.0 - v)) + b * (u * (1.0 - v)) + c * (u * v) + d * ((1.0 - u) * v)
}

/// Invert [`bilinear`]: find `(u, v)` with `bilinear(quad, u, v) == p`.
///
/// When two solutions exist the one inside the unit square wins, otherwise
/// the one closest to it. The result may lie outside `[0, 1]` when `p` is
/// outside the quad. `None` only for a collapsed quad.
pub(crate) fn inverse_bilinear(quad: &[Vec2; 4], p: Vec2) -> Option<(f64, f64)> {
    let [a, b, c, d] = *quad;
    let e = b - a;
    let f = d - a;
    let g = a - b + c - d;
    let h = p - a;

    let k2 = g.cross(f);
    let k1 = e.cross(f) + h.cross(g);
    let k0 = h.cross(e);

    let solve_u = |v: f64| -> Option<f64> {
        let den_x = e.x + g.x * v;
        let den_y = e.y + g.y * v;
        // Divide along whichever axis is better conditioned
        if den_x.abs() >= den_y.abs() {
            (den_x.abs() > f64::EPSILON).then(|| (h.x - f.x * v) / den_x)
        } else {
            Some((h.y - f.y * v) / den_y)
        }
    };

    if k2.abs() < 1e-12 {
        // Parallelogram: the system is linear in v
        if k1.abs() < 1e-12 {
            return None;
        }
        let v = -k0 / k1;
        return solve_u(v).map(|u| (u, v));
    }

    let disc = k1 * k1 - 4.0 * k0 * k2;
    if disc < 0.0 {
        return None;
    }
    let root = disc.sqrt();
    let half = 0.5 / k2;

    [(-k1 - root) * half, (-k1 + root) * half]
        .into_iter()
        .filter_map(|v| solve_u(v).map(|u| (u, v)))
        .min_by(|x, y| outside_unit(*x).total_cmp(&outside_unit(*y)))
}

/// How far `(u, v)` lies outside the unit square, 0 when inside
pub(crate) fn outside_unit((u, v): (f64, f64)) -> f64 {
    let du = (-u).max(u - 1.0).max(0.0);
    let dv = (-v).max(v - 1.0).max(0.0);
    du + dv
}

/// True when every corner turns the same way with a non-zero turn
pub(crate) fn is_strictly_convex(corners: &[Vec2; 4]) -> bool {
    let mut sign = 0.0_f64;
    for i in 0..4 {
        let prev = corners[i];
        let here = corners[(i + 1) % 4];
        let next = corners[(i + 2) % 4];
        let turn = (here - prev).cross(next - here);
        if turn.abs() <= COLLINEAR_EPS {
            return false;
        }
        if sign == 0.0 {
            sign = turn.signum();
        } else if turn.signum() != sign {
            return false;
        }
    }
    true
}

/// Convex hull, counter-clockwise, by the monotone chain method
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Hull {
    vertices: Vec<Vec2>,
}

impl Hull {
    pub fn new(points: &[Vec2]) -> Self {
        let mut sorted: Vec<Vec2> = points.to_vec();
        sorted.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
        sorted.dedup();

        if sorted.len() < 3 {
            return Self { vertices: sorted };
        }

        let mut lower: Vec<Vec2> = Vec::with_capacity(sorted.len());
        for &p in &sorted {
            while lower.len() >= 2 && turn(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
                lower.pop();
            }
            lower.push(p);
        }

        let mut upper: Vec<Vec2> = Vec::with_capacity(sorted.len());
        for &p in sorted.iter().rev() {
            while upper.len() >= 2 && turn(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
                upper.pop();
            }
            upper.push(p);
        }

        lower.pop();
        upper.pop();
        lower.extend(upper);
        Self { vertices: lower }
    }

    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    pub fn contains(&self, p: Vec2) -> bool {
        if self.vertices.len() < 3 {
            return false;
        }
        self.edges().all(|(a, b)| turn(a, b, p) >= -COLLINEAR_EPS)
    }

    /// `p` itself if inside, otherwise the nearest point on the boundary
    pub fn clamp(&self, p: Vec2) -> Vec2 {
        match self.vertices.len() {
            0 => p,
            1 => self.vertices[0],
            _ if self.contains(p) => p,
            _ => self
                .edges()
                .map(|(a, b)| closest_on_segment(a, b, p))
                .min_by(|x, y| (*x - p).length_squared().total_cmp(&(*y - p).length_squared()))
                .unwrap_or(p),
        }
    }

    fn edges(&self) -> impl Iterator<Item = (Vec2, Vec2)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }
}

fn turn(o: Vec2, a: Vec2, b: Vec2) -> f64 {
    (a - o).cross(b - o)
}

fn closest_on_segment(a: Vec2, b: Vec2, p: Vec2) -> Vec2 {
    let ab = b - a;
    let len = ab.length_squared();
    if len <= 0.0 {
        return a;
    }
    let t = ((p - a).dot(ab) / len).clamp(0.0, 1.0);
    a + ab * t
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> [Vec2; 4] {
        [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ]
    }

    #[test]
    fn test_inverse_of_unit_square() {
        let (u, v) = inverse_bilinear(&square(), Vec2::new(0.25, 0.75)).unwrap();
        assert!((u - 0.25).abs() < 1e-12);
        assert!((v - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_inverse_of_skewed_quad() {
        let quad = [
            Vec2::new(0.1, 0.1),
            Vec2::new(0.6, 0.0),
            Vec2::new(0.7, 0.5),
            Vec2::new(0.0, 0.4),
        ];
        for (u, v) in [(0.3, 0.6), (0.0, 1.0), (0.9, 0.1), (0.5, 0.5)] {
            let p = bilinear(&quad, u, v);
            let (iu, iv) = inverse_bilinear(&quad, p).unwrap();
            assert!((iu - u).abs() < 1e-9, "u {} vs {}", iu, u);
            assert!((iv - v).abs() < 1e-9, "v {} vs {}", iv, v);
        }
    }

    #[test]
    fn test_outside_point_reports_distance() {
        let uv = inverse_bilinear(&square(), Vec2::new(1.5, 0.5)).unwrap();
        assert!((outside_unit(uv) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_convexity() {
        assert!(is_strictly_convex(&square()));

        let mut collinear = square();
        collinear[2] = Vec2::new(0.5, 0.5);
        collinear[1] = Vec2::new(1.0, 0.0);
        collinear[3] = Vec2::new(0.0, 1.0);
        // (1,0) -> (0.5,0.5) -> (0,1) lie on one line
        assert!(!is_strictly_convex(&collinear));

        let mut bowtie = square();
        bowtie.swap(2, 3);
        assert!(!is_strictly_convex(&bowtie));
    }

    #[test]
    fn test_hull_and_clamp() {
        let points = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(0.5, 0.5),
            Vec2::new(0.5, 0.0),
        ];
        let hull = Hull::new(&points);
        assert_eq!(hull.vertices().len(), 4);

        assert_eq!(hull.clamp(Vec2::new(0.3, 0.3)), Vec2::new(0.3, 0.3));
        assert_eq!(hull.clamp(Vec2::new(1.5, 0.5)), Vec2::new(1.0, 0.5));
        assert_eq!(hull.clamp(Vec2::new(-1.0, -1.0)), Vec2::new(0.0, 0.0));
    }
}
