use std::collections::HashMap;

use nalgebra::DVector;

use crate::{layout::Layout, stress::Stress};

/// Per-point stress-region outline: a polygon of `directions` vertices, each
/// the farthest point in that direction before stress rises by
/// `stress_diff` (spec.md §4.13).
#[derive(Debug, Clone)]
pub struct BlobPolygon {
    pub vertices: Vec<DVector<f64>>,
}

impl BlobPolygon {
    /// Shoelace-formula area over the first two coordinates: blobs are
    /// always reported on the map's displayed 2D plane even when the
    /// underlying layout has more dimensions.
    pub fn area(&self) -> f64 {
        if self.vertices.len() < 3 {
            return 0.0;
        }
        let n = self.vertices.len();
        let mut sum = 0.0;
        for i in 0..n {
            let a = &self.vertices[i];
            let b = &self.vertices[(i + 1) % n];
            let (ax, ay) = (a[0], if a.len() > 1 { a[1] } else { 0.0 });
            let (bx, by) = (b[0], if b.len() > 1 { b[1] } else { 0.0 });
            sum += ax * by - bx * ay;
        }
        (sum / 2.0).abs()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Blobs {
    pub polygons: HashMap<usize, BlobPolygon>,
}

impl Blobs {
    /// Walks outward from each selected point along `number_of_directions`
    /// evenly-spaced rays (in the first two coordinates of the layout) in
    /// steps of `precision`, stopping each ray once stress has risen by
    /// `stress_diff` over the layout's current stress.
    pub fn compute(stress: &Stress, layout: &Layout, points: &[usize], stress_diff: f64, number_of_directions: usize, precision: f64) -> Self {
        const MAX_STEPS: usize = 100_000;
        let base_stress = stress.value(layout);
        let dimensions = layout.number_of_dimensions();

        let mut polygons = HashMap::new();
        for &p in points {
            let origin = layout.point(p);
            let mut vertices = Vec::with_capacity(number_of_directions);
            for k in 0..number_of_directions.max(1) {
                let angle = 2.0 * std::f64::consts::PI * k as f64 / number_of_directions.max(1) as f64;
                let mut direction = DVector::zeros(dimensions);
                if dimensions >= 2 {
                    direction[0] = angle.cos();
                    direction[1] = angle.sin();
                } else if dimensions == 1 {
                    direction[0] = if k % 2 == 0 { 1.0 } else { -1.0 };
                }

                let mut radius = 0.0;
                let mut steps = 0;
                loop {
                    radius += precision;
                    steps += 1;
                    let candidate = &origin + radius * &direction;
                    let mut moved = layout.clone();
                    moved.set_point(p, candidate.as_slice());
                    let candidate_stress = stress.value(&moved);
                    if candidate_stress - base_stress >= stress_diff || steps >= MAX_STEPS {
                        break;
                    }
                }
                vertices.push(&origin + radius * &direction);
            }
            polygons.insert(p, BlobPolygon { vertices });
        }
        Self { polygons }
    }
}

/// One titer-implied residual: signed `map distance - target distance`
/// (spec.md §4.13), used by downstream visualization as an error vector.
#[derive(Debug, Clone, Copy)]
pub struct ErrorLine {
    pub antigen_or_point_i: usize,
    pub serum_or_point_j: usize,
    pub residual: f64,
}

impl ErrorLine {
    /// `true` if the map placed the two points farther apart than the
    /// titer implied (map underestimates similarity).
    pub fn is_positive(&self) -> bool {
        self.residual >= 0.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct ErrorLines {
    pub lines: Vec<ErrorLine>,
}

impl ErrorLines {
    pub fn compute(stress: &Stress, layout: &Layout) -> Self {
        let lines = stress
            .table_distances()
            .records()
            .iter()
            .map(|r| ErrorLine {
                antigen_or_point_i: r.i,
                serum_or_point_j: r.j,
                residual: layout.distance(r.i, r.j) - r.target,
            })
            .collect();
        Self { lines }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{column_bases::{ColumnBases, MinimumColumnBasis}, table::TiterTable, table_distances::{BuildOptions, TableDistances}, titer::Titer};
    use std::collections::HashSet;

    fn sample_stress() -> (Stress, Layout) {
        let mut t = TiterTable::new_dense(1, 1);
        t.set_titer(0, 0, Titer::Regular(40));
        let cb = ColumnBases::compute(&t, MinimumColumnBasis::None);
        let disconnected = HashSet::new();
        let avidity: Vec<f64> = Vec::new();
        let distances = TableDistances::build(
            &t,
            &cb,
            1,
            &BuildOptions {
                disconnected: &disconnected,
                dodgy_titer_is_regular: false,
                mult_antigen_titer_until_column_adjust: false,
                avidity_adjusts: &avidity,
            },
        );
        let stress = Stress::new(distances, 2, HashSet::new(), HashSet::new());
        let layout = Layout::from_rows(vec![vec![0.0, 0.0], vec![5.0, 0.0]]);
        (stress, layout)
    }

    #[test]
    fn blob_polygon_has_requested_vertex_count() {
        let (stress, layout) = sample_stress();
        let blobs = Blobs::compute(&stress, &layout, &[0], 0.5, 12, 0.05);
        assert_eq!(blobs.polygons[&0].vertices.len(), 12);
        assert!(blobs.polygons[&0].area() >= 0.0);
    }

    #[test]
    fn error_lines_have_one_entry_per_titer() {
        let (stress, layout) = sample_stress();
        let lines = ErrorLines::compute(&stress, &layout);
        assert_eq!(lines.lines.len(), 1);
    }
}
