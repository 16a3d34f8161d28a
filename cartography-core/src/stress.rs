use std::collections::HashSet;

use nalgebra::DMatrix;

use crate::{
    layout::Layout,
    table_distances::{DistanceRecord, TableDistances, TiterKind},
};

/// Slope of the logistic weight applied to censored-titer residuals
/// (spec.md §4.5).
const SIGMOID_SLOPE: f64 = 10.0;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x * SIGMOID_SLOPE).exp())
}

/// The stress objective and its analytic gradient over a `Layout`
/// (spec.md §4.5): sum of squared residuals for regular titers, and a
/// one-sided sigmoid-weighted square for left/right-censored ones.
///
/// `value`/`gradient` are pure functions of the `Layout` argument: a
/// `Stress` holds no mutable state and is safe to call from many threads at
/// once as long as each caller owns its own `Layout`.
#[derive(Debug, Clone)]
pub struct Stress {
    distances: TableDistances,
    number_of_points: usize,
    unmovable: HashSet<usize>,
    unmovable_in_last_dimension: HashSet<usize>,
}

impl Stress {
    pub fn new(
        distances: TableDistances,
        number_of_points: usize,
        unmovable: HashSet<usize>,
        unmovable_in_last_dimension: HashSet<usize>,
    ) -> Self {
        Self {
            distances,
            number_of_points,
            unmovable,
            unmovable_in_last_dimension,
        }
    }

    pub fn table_distances(&self) -> &TableDistances {
        &self.distances
    }

    fn record_contribution(record: &DistanceRecord, d: f64) -> f64 {
        let t = record.target;
        let residual = d - t;
        match record.kind {
            TiterKind::Regular | TiterKind::Dodgy => residual * residual,
            TiterKind::Less => residual * residual * sigmoid(t - d + 1.0),
            TiterKind::More => residual * residual * sigmoid(d - t - 1.0),
        }
    }

    /// `d(contribution)/d(distance)`, used to build the gradient via the
    /// chain rule through `distance = ||X_i - X_j||`.
    fn record_derivative(record: &DistanceRecord, d: f64) -> f64 {
        let t = record.target;
        let residual = d - t;
        match record.kind {
            TiterKind::Regular | TiterKind::Dodgy => 2.0 * residual,
            TiterKind::Less => {
                let u = t - d + 1.0;
                let s = sigmoid(u);
                2.0 * residual * s - residual * residual * SIGMOID_SLOPE * s * (1.0 - s)
            }
            TiterKind::More => {
                let v = d - t - 1.0;
                let s = sigmoid(v);
                2.0 * residual * s + residual * residual * SIGMOID_SLOPE * s * (1.0 - s)
            }
        }
    }

    pub fn value(&self, layout: &Layout) -> f64 {
        self.distances
            .records()
            .iter()
            .map(|r| Self::record_contribution(r, layout.distance(r.i, r.j)))
            .sum()
    }

    /// Analytic gradient, masked per spec.md §4.5: unmovable points keep
    /// their stress contribution but their gradient row is zeroed;
    /// unmovable-in-last-dimension points only lose their last coordinate.
    /// Disconnected points never appear in any record, so they fall out
    /// naturally with a zero row.
    pub fn gradient(&self, layout: &Layout) -> DMatrix<f64> {
        let d = layout.number_of_dimensions();
        let mut grad = DMatrix::zeros(self.number_of_points, d);
        for record in self.distances.records() {
            let xi = layout.point(record.i);
            let xj = layout.point(record.j);
            let diff = &xi - &xj;
            let dist = diff.norm();
            if dist == 0.0 {
                // Tie-break convention (spec.md §4.5): undefined direction, zero contribution.
                continue;
            }
            let scalar = Self::record_derivative(record, dist);
            let direction = diff / dist;
            for c in 0..d {
                grad[(record.i, c)] += scalar * direction[c];
                grad[(record.j, c)] -= scalar * direction[c];
            }
        }
        for &p in &self.unmovable_in_last_dimension {
            if d > 0 {
                grad[(p, d - 1)] = 0.0;
            }
        }
        for &p in &self.unmovable {
            for c in 0..d {
                grad[(p, c)] = 0.0;
            }
        }
        grad
    }

    pub fn value_and_gradient(&self, layout: &Layout) -> (f64, DMatrix<f64>) {
        (self.value(layout), self.gradient(layout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        column_bases::{ColumnBases, MinimumColumnBasis},
        table::TiterTable,
        table_distances::BuildOptions,
        titer::Titer,
    };

    fn build_stress(
        table: &TiterTable,
        antigens: usize,
        unmovable: HashSet<usize>,
        unmovable_in_last_dimension: HashSet<usize>,
    ) -> Stress {
        let cb = ColumnBases::compute(table, MinimumColumnBasis::None);
        let disconnected = HashSet::new();
        let avidity: Vec<f64> = Vec::new();
        let distances = TableDistances::build(
            table,
            &cb,
            antigens,
            &BuildOptions {
                disconnected: &disconnected,
                dodgy_titer_is_regular: false,
                mult_antigen_titer_until_column_adjust: false,
                avidity_adjusts: &avidity,
            },
        );
        Stress::new(
            distances,
            antigens + table.number_of_sera(),
            unmovable,
            unmovable_in_last_dimension,
        )
    }

    #[test]
    fn s3_stress_value_sanity() {
        // S3: two antigens, one serum, CB=3; A1-S target 3 (d=3), A2-S target 0 (d=0).
        let mut t = TiterTable::new_dense(2, 1);
        t.set_titer(0, 0, Titer::Regular(10)); // logged 0, target 3-0=3
        t.set_titer(1, 0, Titer::Regular(80)); // logged 3, target 3-3=0
        let stress = build_stress(&t, 2, HashSet::new(), HashSet::new());

        let layout = Layout::from_rows(vec![
            vec![0.0, 0.0], // antigen 1
            vec![3.0, 0.0], // antigen 2
            vec![3.0, 0.0], // serum
        ]);
        assert!((stress.value(&layout) - 0.0).abs() < 1e-9);
    }

    #[test]
    fn all_dont_care_table_has_zero_stress() {
        let t = TiterTable::new_dense(2, 2);
        let stress = build_stress(&t, 2, HashSet::new(), HashSet::new());
        let layout = Layout::zeros(4, 2);
        assert_eq!(stress.value(&layout), 0.0);
    }

    #[test]
    fn unmovable_points_keep_stress_but_zero_gradient() {
        let mut t = TiterTable::new_dense(1, 1);
        t.set_titer(0, 0, Titer::Regular(40));
        let mut unmovable = HashSet::new();
        unmovable.insert(0usize);
        let stress = build_stress(&t, 1, unmovable, HashSet::new());

        let layout = Layout::from_rows(vec![vec![0.0, 0.0], vec![5.0, 0.0]]);
        assert!(stress.value(&layout) > 0.0);
        let grad = stress.gradient(&layout);
        assert_eq!(grad[(0, 0)], 0.0);
        assert_eq!(grad[(0, 1)], 0.0);
        assert_ne!(grad[(1, 0)], 0.0);
    }

    #[test]
    fn unmovable_in_last_dimension_zeroes_only_last_coordinate() {
        let mut t = TiterTable::new_dense(1, 1);
        t.set_titer(0, 0, Titer::Regular(40));
        let mut fixed_last = HashSet::new();
        fixed_last.insert(0usize);
        let stress = build_stress(&t, 1, HashSet::new(), fixed_last);

        let layout = Layout::from_rows(vec![vec![1.0, 1.0], vec![5.0, 5.0]]);
        let grad = stress.gradient(&layout);
        assert_eq!(grad[(0, 1)], 0.0);
        assert_ne!(grad[(0, 0)], 0.0);
    }

    #[test]
    fn zero_distance_gradient_contribution_is_zero() {
        let mut t = TiterTable::new_dense(1, 1);
        t.set_titer(0, 0, Titer::Regular(40));
        let stress = build_stress(&t, 1, HashSet::new(), HashSet::new());
        let layout = Layout::from_rows(vec![vec![2.0, 2.0], vec![2.0, 2.0]]);
        let grad = stress.gradient(&layout);
        assert_eq!(grad[(0, 0)], 0.0);
        assert_eq!(grad[(1, 0)], 0.0);
    }

    #[test]
    fn gradient_matches_finite_difference() {
        let mut t = TiterTable::new_dense(2, 1);
        t.set_titer(0, 0, "<20".parse().unwrap());
        t.set_titer(1, 0, ">160".parse().unwrap());
        let stress = build_stress(&t, 2, HashSet::new(), HashSet::new());

        let layout = Layout::from_rows(vec![vec![0.3, -0.4], vec![1.2, 0.8], vec![2.1, -1.1]]);
        let grad = stress.gradient(&layout);
        let eps = 1e-6;
        for p in 0..3 {
            for c in 0..2 {
                let mut plus = layout.clone();
                let mut row = plus.point(p);
                row[c] += eps;
                plus.set_point(p, row.as_slice());
                let mut minus = layout.clone();
                let mut row = minus.point(p);
                row[c] -= eps;
                minus.set_point(p, row.as_slice());

                let numeric = (stress.value(&plus) - stress.value(&minus)) / (2.0 * eps);
                assert!(
                    (numeric - grad[(p, c)]).abs() < 1e-3,
                    "point {p} dim {c}: numeric {numeric} analytic {}",
                    grad[(p, c)]
                );
            }
        }
    }
}
