use nalgebra::{DMatrix, DVector};

/// `P x D` matrix of real coordinates (spec.md §3): one row per point in the
/// unified antigen-then-serum index space, `D` columns of coordinates.
///
/// A disconnected point's row may be all-`NaN`; nothing in `Stress` ever
/// reads it, since disconnected points are excluded at `TableDistances`
/// construction time.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    coords: DMatrix<f64>,
}

impl Layout {
    pub fn zeros(points: usize, dimensions: usize) -> Self {
        Self {
            coords: DMatrix::zeros(points, dimensions),
        }
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> Self {
        let points = rows.len();
        let dimensions = rows.first().map_or(0, Vec::len);
        let mut coords = DMatrix::zeros(points, dimensions);
        for (p, row) in rows.iter().enumerate() {
            for (d, &v) in row.iter().enumerate() {
                coords[(p, d)] = v;
            }
        }
        Self { coords }
    }

    pub fn number_of_points(&self) -> usize {
        self.coords.nrows()
    }

    pub fn number_of_dimensions(&self) -> usize {
        self.coords.ncols()
    }

    pub fn point(&self, p: usize) -> DVector<f64> {
        self.coords.row(p).transpose()
    }

    pub fn set_point(&mut self, p: usize, coords: &[f64]) {
        assert_eq!(coords.len(), self.number_of_dimensions());
        for (d, &v) in coords.iter().enumerate() {
            self.coords[(p, d)] = v;
        }
    }

    pub fn set_nan(&mut self, p: usize) {
        for d in 0..self.number_of_dimensions() {
            self.coords[(p, d)] = f64::NAN;
        }
    }

    pub fn is_nan_row(&self, p: usize) -> bool {
        (0..self.number_of_dimensions()).any(|d| self.coords[(p, d)].is_nan())
    }

    /// Euclidean distance between two points. `NaN` propagates: callers must
    /// never invoke this on a disconnected row.
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        (self.point(i) - self.point(j)).norm()
    }

    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.coords
    }

    pub fn as_matrix_mut(&mut self) -> &mut DMatrix<f64> {
        &mut self.coords
    }

    /// Principal-component projection onto the top `target_dimensions`
    /// components, used by dimension annealing (spec.md §4.6) between
    /// schedule steps. Rows that are all-`NaN` are excluded from the
    /// covariance computation and restored as `NaN` rows in the result.
    pub fn pca_reduce(&self, target_dimensions: usize) -> Self {
        let p = self.number_of_points();
        let d = self.number_of_dimensions();
        if target_dimensions >= d {
            return self.clone();
        }

        let connected: Vec<usize> = (0..p).filter(|&i| !self.is_nan_row(i)).collect();
        if connected.is_empty() {
            return Layout::zeros(p, target_dimensions);
        }

        let mut centered = DMatrix::zeros(connected.len(), d);
        for (row, &i) in connected.iter().enumerate() {
            for c in 0..d {
                centered[(row, c)] = self.coords[(i, c)];
            }
        }
        let mean = centered.row_mean();
        for mut row in centered.row_iter_mut() {
            row -= &mean;
        }

        let svd = centered.clone().svd(false, true);
        let v_t = svd.v_t.expect("svd requested right singular vectors");
        let components = v_t.rows(0, target_dimensions.min(v_t.nrows()));

        let mut out = Layout::zeros(p, target_dimensions);
        for &i in &connected {
            let row = self.coords.row(i) - &mean;
            let projected = &row * components.transpose();
            for c in 0..target_dimensions {
                out.coords[(i, c)] = projected[(0, c)];
            }
        }
        for i in 0..p {
            if !connected.contains(&i) {
                out.set_nan(i);
            }
        }
        out
    }
}
