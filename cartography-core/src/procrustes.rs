use nalgebra::{DMatrix, DVector};

use crate::{layout::Layout, transformation::Transformation};

/// Best rigid (optionally scaling) alignment of a secondary layout onto a
/// primary one over a set of common points (spec.md §4.10), grounded on
/// `original_source/cc/procrustes.cc`.
#[derive(Debug, Clone)]
pub struct ProcrustesResult {
    pub transformation: Transformation,
    pub rms_residual: f64,
    pub scale: f64,
}

fn stack_rows(layout: &Layout, indices: &[usize]) -> DMatrix<f64> {
    let dimensions = layout.number_of_dimensions();
    let mut m = DMatrix::zeros(indices.len(), dimensions);
    for (row, &i) in indices.iter().enumerate() {
        let point = layout.point(i);
        for c in 0..dimensions {
            m[(row, c)] = point[c];
        }
    }
    m
}

fn column_means(m: &DMatrix<f64>) -> DVector<f64> {
    m.row_mean().transpose()
}

fn center(m: &DMatrix<f64>, means: &DVector<f64>) -> DMatrix<f64> {
    let mut c = m.clone();
    for mut row in c.row_iter_mut() {
        for (i, v) in row.iter_mut().enumerate() {
            *v -= means[i];
        }
    }
    c
}

/// Aligns `secondary` onto `primary` over `common`, a list of
/// `(primary_index, secondary_index)` pairs into each layout respectively.
pub fn align(primary: &Layout, secondary: &Layout, common: &[(usize, usize)], scaling: bool) -> ProcrustesResult {
    assert!(!common.is_empty(), "procrustes needs at least one common point");
    let primary_indices: Vec<usize> = common.iter().map(|&(p, _)| p).collect();
    let secondary_indices: Vec<usize> = common.iter().map(|&(_, s)| s).collect();

    let x = stack_rows(primary, &primary_indices);
    let y = stack_rows(secondary, &secondary_indices);
    let mean_x = column_means(&x);
    let mean_y = column_means(&y);
    let xc = center(&x, &mean_x);
    let yc = center(&y, &mean_y);

    // SVD of Yc^T Xc = U S V^T; the rotation minimizing ||Xc - Yc T||_F is
    // T = U V^T (Schönemann 1966). The same T is optimal whether or not a
    // scale factor is also fit, so both branches share this SVD.
    let m = yc.transpose() * &xc;
    let svd = m.svd(true, true);
    let u = svd.u.expect("svd requested left singular vectors");
    let v_t = svd.v_t.expect("svd requested right singular vectors");
    let mut rotation = u * v_t;

    let mut scale = 1.0;
    if scaling {
        let numerator = (xc.transpose() * &yc * &rotation).trace();
        let denominator = (yc.transpose() * &yc).trace();
        if denominator.abs() > 1e-12 {
            scale = numerator / denominator;
        }
        rotation *= scale;
    }

    let translation = mean_x - rotation.transpose() * &mean_y;
    let transformation = Transformation::new(rotation, translation);

    let mut squared_error = 0.0;
    for &(p, s) in common {
        let predicted = transformation.apply_point(&secondary.point(s));
        squared_error += (primary.point(p) - predicted).norm_squared();
    }
    let rms_residual = (squared_error / common.len() as f64).sqrt();

    ProcrustesResult { transformation, rms_residual, scale }
}
