use nalgebra::DVector;

/// Minimum-ish bounding ball over a set of points, Ritter's approximate
/// algorithm (spec.md §F2, grounded on `original_source/cc/bounding-ball.hh`):
/// not an exact minimum enclosing ball, but cheap and good enough to size a
/// grid-test scan area or a blob-probe starting extent.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBall {
    center: DVector<f64>,
    diameter: f64,
}

impl BoundingBall {
    pub fn center(&self) -> &DVector<f64> {
        &self.center
    }

    pub fn diameter(&self) -> f64 {
        self.diameter
    }

    pub fn radius(&self) -> f64 {
        self.diameter / 2.0
    }

    /// Builds a ball from two opposite extreme points, as the source's
    /// two-point constructor does.
    pub fn from_two_points(p1: &DVector<f64>, p2: &DVector<f64>) -> Self {
        let center = (p1 + p2) / 2.0;
        let diameter = (p1 - p2).norm();
        Self { center, diameter }
    }

    /// Grows the ball (if necessary) to include `point`.
    pub fn extend(&mut self, point: &DVector<f64>) {
        let d = (point - &self.center).norm();
        if d > self.radius() {
            let new_radius = (self.radius() + d) / 2.0;
            let grow = new_radius - self.radius();
            let direction = if d > 1e-12 { (point - &self.center) / d } else { point - &self.center };
            self.center = &self.center + grow * direction;
            self.diameter = new_radius * 2.0;
        }
    }

    /// Ritter's algorithm: pick an arbitrary point, find the point farthest
    /// from it, find the point farthest from that (the two form a good
    /// initial diameter), then extend over every remaining point.
    pub fn enclosing(points: &[DVector<f64>]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        if points.len() == 1 {
            return Some(Self { center: points[0].clone(), diameter: 0.0 });
        }
        let seed = &points[0];
        let x = points
            .iter()
            .max_by(|a, b| (*a - seed).norm().partial_cmp(&(*b - seed).norm()).unwrap())
            .unwrap();
        let y = points
            .iter()
            .max_by(|a, b| (*a - x).norm().partial_cmp(&(*b - x).norm()).unwrap())
            .unwrap();
        let mut ball = Self::from_two_points(x, y);
        for p in points {
            ball.extend(p);
        }
        Some(ball)
    }
}
