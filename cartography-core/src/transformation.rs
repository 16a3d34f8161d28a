use nalgebra::{DMatrix, DVector};

use crate::layout::Layout;

/// An affine `D x D` transform (rotation/reflection, optionally scaled) plus
/// translation (spec.md §3). Identity by default; `Procrustes` and
/// `Projection::relax` are the only producers of a non-identity value.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformation {
    matrix: DMatrix<f64>,
    translation: DVector<f64>,
}

impl Transformation {
    pub fn identity(dimensions: usize) -> Self {
        Self {
            matrix: DMatrix::identity(dimensions, dimensions),
            translation: DVector::zeros(dimensions),
        }
    }

    pub fn new(matrix: DMatrix<f64>, translation: DVector<f64>) -> Self {
        assert_eq!(matrix.nrows(), matrix.ncols());
        assert_eq!(matrix.nrows(), translation.len());
        Self {
            matrix,
            translation,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.translation.len()
    }

    pub fn is_identity(&self) -> bool {
        self.matrix == DMatrix::identity(self.dimensions(), self.dimensions())
            && self.translation.iter().all(|&v| v == 0.0)
    }

    /// `true` if the linear part is orthonormal (rotation/reflection only,
    /// no scaling), within floating-point tolerance.
    pub fn is_orthonormal(&self) -> bool {
        let gram = self.matrix.transpose() * &self.matrix;
        let identity = DMatrix::identity(self.dimensions(), self.dimensions());
        (gram - identity).abs().max() < 1e-9
    }

    pub fn apply_point(&self, point: &DVector<f64>) -> DVector<f64> {
        self.matrix.transpose() * point + &self.translation
    }

    pub fn apply_layout(&self, layout: &Layout) -> Layout {
        let mut out = Layout::zeros(layout.number_of_points(), self.dimensions());
        for p in 0..layout.number_of_points() {
            if layout.is_nan_row(p) {
                out.set_nan(p);
                continue;
            }
            let transformed = self.apply_point(&layout.point(p));
            out.set_point(p, transformed.as_slice());
        }
        out
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn translation(&self) -> &DVector<f64> {
        &self.translation
    }
}
