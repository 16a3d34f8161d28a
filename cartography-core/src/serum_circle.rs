use crate::{
    column_bases::ColumnBases,
    error::{Error, SerumCoverageReason},
    titer::Titer,
};

/// Theoretical coverage radius for one (serum, antigen) homologous pair
/// (spec.md §4.11): the titer-implied distance at which protection drops to
/// `fold` log2 units below the homologous titer.
pub fn theoretical_radius(column_bases: &ColumnBases, serum: usize, homologous_titer: Titer, fold: f64) -> crate::error::Result<f64> {
    if !homologous_titer.is_regular() {
        return Err(Error::SerumCoverageError {
            serum,
            reason: SerumCoverageReason::NonRegularHomologousTiter,
        });
    }
    let logged = homologous_titer.logged_for_column_bases();
    if logged - fold <= 0.0 {
        return Err(Error::SerumCoverageError {
            serum,
            reason: SerumCoverageReason::TiterTooLow,
        });
    }
    Ok(column_bases.column_basis(serum) + fold - logged)
}

#[derive(Debug, Clone)]
pub struct EmpiricalRadiusResult {
    /// Average of every candidate radius tied for the minimum mismatch
    /// count (spec.md §4.11: "if several radii tie, average them").
    pub radius: f64,
    pub mismatches: usize,
}

/// One antigen's titer-derived protection status and map distance from the
/// serum, as fed into `empirical_radius`.
pub struct AntigenSample {
    pub distance_from_serum: f64,
    pub titer: Titer,
}

/// Empirical coverage radius (spec.md §4.11): the radius that best
/// separates antigens the titer says are protected from those it does not,
/// measured against their actual map distance from the serum.
///
/// The protection boundary is anchored to the *homologous* antigen's
/// similarity, not the serum's column basis alone
/// (`original_source/cc/serum-circle.cc:122,128`): `final_similarity =
/// min(column_basis, logged)` for every titer, and the boundary is the
/// homologous antigen's `final_similarity` minus `fold`. This keeps
/// `empirical_radius` consistent with `theoretical_radius`, which is
/// homologous-titer-based throughout.
pub fn empirical_radius(
    column_bases: &ColumnBases,
    serum: usize,
    homologous_titer: Titer,
    samples: &[AntigenSample],
    fold: f64,
) -> crate::error::Result<EmpiricalRadiusResult> {
    if !homologous_titer.is_regular() {
        return Err(Error::SerumCoverageError {
            serum,
            reason: SerumCoverageReason::NonRegularHomologousTiter,
        });
    }
    let cb = column_bases.column_basis(serum);
    let homologous_similarity = cb.min(homologous_titer.logged_for_column_bases());
    let protection_boundary = homologous_similarity - fold;
    if protection_boundary < 1.0 {
        return Err(Error::SerumCoverageError {
            serum,
            reason: SerumCoverageReason::TiterTooLow,
        });
    }

    // (distance, final_similarity, is_regular) for every antigen actually
    // titrated against this serum, sorted closest-first.
    let mut considered: Vec<(f64, f64, bool)> = samples
        .iter()
        .filter(|s| !s.titer.is_dont_care())
        .map(|s| (s.distance_from_serum, cb.min(s.titer.logged_for_column_bases()), s.titer.is_regular()))
        .collect();
    considered.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

    let protected = |final_similarity: f64, is_regular: bool| -> bool {
        if is_regular {
            final_similarity >= protection_boundary
        } else {
            final_similarity > protection_boundary
        }
    };

    // Walk candidate radii closest-antigen-first: the closest antigen's own
    // distance, then the midpoint between each subsequent antigen and its
    // predecessor in sorted order (never a later antigen's raw distance
    // standalone), matching serum-circle.cc:158-162.
    let mut best_mismatches = usize::MAX;
    let mut sum_radii = 0.0;
    let mut num_radii = 0usize;
    let mut previous_distance: Option<f64> = None;

    for &(distance, _, _) in &considered {
        let radius = match previous_distance {
            None => distance,
            Some(previous) => (distance + previous) / 2.0,
        };
        let mut protected_outside = 0usize;
        let mut not_protected_inside = 0usize;
        for &(d, similarity, is_regular) in &considered {
            let inside = d <= radius;
            let is_protected = protected(similarity, is_regular);
            if is_protected && !inside {
                protected_outside += 1;
            } else if !is_protected && inside {
                not_protected_inside += 1;
            }
        }
        let mismatches = protected_outside + not_protected_inside;
        match mismatches.cmp(&best_mismatches) {
            std::cmp::Ordering::Less => {
                best_mismatches = mismatches;
                sum_radii = radius;
                num_radii = 1;
            }
            std::cmp::Ordering::Equal => {
                sum_radii += radius;
                num_radii += 1;
            }
            std::cmp::Ordering::Greater => {}
        }
        previous_distance = Some(distance);
    }

    let radius = if num_radii == 0 { 0.0 } else { sum_radii / num_radii as f64 };
    Ok(EmpiricalRadiusResult {
        radius,
        mismatches: if best_mismatches == usize::MAX { 0 } else { best_mismatches },
    })
}
