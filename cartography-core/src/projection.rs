use std::collections::HashSet;

use crate::{
    blobs::{Blobs, ErrorLines},
    column_bases::{ColumnBases, MinimumColumnBasis},
    layout::Layout,
    optimizer::{self, RelaxOptions},
    stress::Stress,
    table::TiterTable,
    table_distances::{BuildOptions, TableDistances},
    transformation::Transformation,
};

/// Whether `Projection::stress` may reuse a cached value (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recalculate {
    No,
    IfNecessary,
    Yes,
}

/// One candidate embedding of a chart's antigens and sera (spec.md §3, §4.7).
/// Holds everything `Stress`/`Optimizer` need except the chart's titer table
/// and column bases, which are passed in at call time rather than reached
/// for through an owned back-pointer (spec.md §9).
#[derive(Debug, Clone)]
pub struct Projection {
    layout: Layout,
    pub minimum_column_basis: MinimumColumnBasis,
    pub forced_column_bases: Option<ColumnBases>,
    pub transformation: Transformation,
    pub dodgy_titer_is_regular: bool,
    pub mult_antigen_titer_until_column_adjust: bool,
    pub stress_diff_to_stop: Option<f64>,
    unmovable: HashSet<usize>,
    disconnected: HashSet<usize>,
    unmovable_in_last_dimension: HashSet<usize>,
    auto_disconnected: HashSet<usize>,
    avidity_adjusts: Vec<f64>,
    stored_stress: Option<f64>,
    pub comment: Option<String>,
    pub cancelled: bool,
}

impl Projection {
    pub fn new(layout: Layout, minimum_column_basis: MinimumColumnBasis) -> Self {
        let dimensions = layout.number_of_dimensions();
        Self {
            layout,
            minimum_column_basis,
            forced_column_bases: None,
            transformation: Transformation::identity(dimensions),
            dodgy_titer_is_regular: false,
            mult_antigen_titer_until_column_adjust: false,
            stress_diff_to_stop: None,
            unmovable: HashSet::new(),
            disconnected: HashSet::new(),
            unmovable_in_last_dimension: HashSet::new(),
            auto_disconnected: HashSet::new(),
            avidity_adjusts: Vec::new(),
            stored_stress: None,
            comment: None,
            cancelled: false,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn set_layout(&mut self, layout: Layout) {
        self.layout = layout;
        self.stored_stress = None;
    }

    pub fn transformed_layout(&self) -> Layout {
        self.transformation.apply_layout(&self.layout)
    }

    pub fn unmovable(&self) -> &HashSet<usize> {
        &self.unmovable
    }
    pub fn set_unmovable(&mut self, points: HashSet<usize>) {
        self.unmovable = points;
    }

    pub fn disconnected(&self) -> &HashSet<usize> {
        &self.disconnected
    }
    pub fn set_disconnected(&mut self, points: HashSet<usize>) {
        self.disconnected = points;
        self.stored_stress = None;
    }

    pub fn unmovable_in_last_dimension(&self) -> &HashSet<usize> {
        &self.unmovable_in_last_dimension
    }
    pub fn set_unmovable_in_last_dimension(&mut self, points: HashSet<usize>) {
        self.unmovable_in_last_dimension = points;
    }

    pub fn auto_disconnected(&self) -> &HashSet<usize> {
        &self.auto_disconnected
    }

    pub fn avidity_adjusts(&self) -> &[f64] {
        &self.avidity_adjusts
    }
    pub fn set_avidity_adjusts(&mut self, adjusts: Vec<f64>) {
        self.avidity_adjusts = adjusts;
        self.stored_stress = None;
    }

    /// Disconnects every point with fewer than `threshold` regular titers
    /// (spec.md §4.6's auto-disconnect), recording which ones were added
    /// for this reason specifically (as opposed to caller-requested
    /// disconnects) so the projection can report it later.
    pub fn apply_auto_disconnect(&mut self, table: &TiterTable, threshold: usize) {
        for p in table.having_too_few_numeric_titers(threshold) {
            if self.disconnected.insert(p) {
                self.auto_disconnected.insert(p);
            }
        }
        self.stored_stress = None;
    }

    /// Exposes the stress model `relax`/`stress` build internally, so a
    /// caller that already knows which table/column-bases apply (i.e. a
    /// chart) can inspect it directly without duplicating the assembly.
    pub fn stress_model(&self, table: &TiterTable, column_bases: &ColumnBases, number_of_antigens: usize) -> Stress {
        self.build_stress(table, column_bases, number_of_antigens)
    }

    fn build_stress(&self, table: &TiterTable, column_bases: &ColumnBases, number_of_antigens: usize) -> Stress {
        let options = BuildOptions {
            disconnected: &self.disconnected,
            dodgy_titer_is_regular: self.dodgy_titer_is_regular,
            mult_antigen_titer_until_column_adjust: self.mult_antigen_titer_until_column_adjust,
            avidity_adjusts: &self.avidity_adjusts,
        };
        let distances = TableDistances::build(table, column_bases, number_of_antigens, &options);
        Stress::new(
            distances,
            self.layout.number_of_points(),
            self.unmovable.clone(),
            self.unmovable_in_last_dimension.clone(),
        )
    }

    pub fn stress(&mut self, table: &TiterTable, column_bases: &ColumnBases, number_of_antigens: usize, recalculate: Recalculate) -> f64 {
        match recalculate {
            Recalculate::No => self
                .stored_stress
                .unwrap_or_else(|| self.build_stress(table, column_bases, number_of_antigens).value(&self.layout)),
            Recalculate::IfNecessary => {
                if let Some(v) = self.stored_stress {
                    v
                } else {
                    let v = self.build_stress(table, column_bases, number_of_antigens).value(&self.layout);
                    self.stored_stress = Some(v);
                    v
                }
            }
            Recalculate::Yes => {
                let v = self.build_stress(table, column_bases, number_of_antigens).value(&self.layout);
                self.stored_stress = Some(v);
                v
            }
        }
    }

    /// Cheap probe used by `GridTest`: the stress the map would have if
    /// point `p` alone moved to `new_coords`, without mutating `self`.
    pub fn stress_with_moved_point(&self, table: &TiterTable, column_bases: &ColumnBases, number_of_antigens: usize, p: usize, new_coords: &[f64]) -> f64 {
        let mut layout = self.layout.clone();
        layout.set_point(p, new_coords);
        self.build_stress(table, column_bases, number_of_antigens).value(&layout)
    }

    /// Minimizes stress in place (spec.md §4.7). After this returns,
    /// `stored_stress` equals the stress of the resulting layout within FP
    /// tolerance, and `cancelled` reflects whether the run was cut short.
    pub fn relax(&mut self, table: &TiterTable, column_bases: &ColumnBases, number_of_antigens: usize, options: &RelaxOptions) {
        let stress = self.build_stress(table, column_bases, number_of_antigens);
        let outcome = optimizer::relax(&stress, self.layout.clone(), options, None);
        self.layout = outcome.layout;
        self.stored_stress = Some(outcome.stress);
        self.cancelled = outcome.cancelled;
    }

    pub fn blobs(&self, table: &TiterTable, column_bases: &ColumnBases, number_of_antigens: usize, points: &[usize], stress_diff: f64, number_of_directions: usize, precision: f64) -> Blobs {
        let stress = self.build_stress(table, column_bases, number_of_antigens);
        Blobs::compute(&stress, &self.layout, points, stress_diff, number_of_directions, precision)
    }

    pub fn error_lines(&self, table: &TiterTable, column_bases: &ColumnBases, number_of_antigens: usize) -> ErrorLines {
        let stress = self.build_stress(table, column_bases, number_of_antigens);
        ErrorLines::compute(&stress, &self.layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{optimizer::Precision, titer::Titer};

    fn two_point_table() -> TiterTable {
        let mut t = TiterTable::new_dense(1, 1);
        t.set_titer(0, 0, Titer::Regular(40));
        t
    }

    #[test]
    fn relax_updates_stored_stress_consistently() {
        let table = two_point_table();
        let cb = ColumnBases::compute(&table, MinimumColumnBasis::None);
        let layout = Layout::from_rows(vec![vec![0.0, 0.0], vec![10.0, 0.0]]);
        let mut projection = Projection::new(layout, MinimumColumnBasis::None);

        let options = RelaxOptions { precision: Precision::Fine, ..Default::default() };
        projection.relax(&table, &cb, 1, &options);

        let recomputed = projection.stress(&table, &cb, 1, Recalculate::Yes);
        assert!((projection.stress(&table, &cb, 1, Recalculate::No) - recomputed).abs() < 1e-9);
    }

    #[test]
    fn unmovable_point_is_bit_identical_after_relax() {
        let table = two_point_table();
        let cb = ColumnBases::compute(&table, MinimumColumnBasis::None);
        let layout = Layout::from_rows(vec![vec![0.0, 0.0], vec![10.0, 0.0]]);
        let mut projection = Projection::new(layout.clone(), MinimumColumnBasis::None);
        let mut unmovable = HashSet::new();
        unmovable.insert(0usize);
        projection.set_unmovable(unmovable);

        let options = RelaxOptions { precision: Precision::Fine, ..Default::default() };
        projection.relax(&table, &cb, 1, &options);

        assert_eq!(projection.layout().point(0), layout.point(0));
    }

    #[test]
    fn auto_disconnect_marks_sparse_points() {
        let table = two_point_table(); // antigen 0 has only 1 regular titer
        let layout = Layout::from_rows(vec![vec![0.0, 0.0], vec![1.0, 0.0]]);
        let mut projection = Projection::new(layout, MinimumColumnBasis::None);
        projection.apply_auto_disconnect(&table, 3);
        assert!(projection.disconnected().contains(&0));
        assert!(projection.auto_disconnected().contains(&0));
    }
}
