use std::collections::HashSet;

use crate::{column_bases::ColumnBases, table::TiterTable, titer::Titer};

/// Which branch of the stress objective a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiterKind {
    Regular,
    Less,
    More,
    Dodgy,
}

/// One `(point_i, point_j, target_distance)` fact the stress kernel folds
/// over (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceRecord {
    pub i: usize,
    pub j: usize,
    pub kind: TiterKind,
    pub target: f64,
}

/// Precomputed distance facts for one (Chart, Projection) pair, grouped by
/// titer kind so the stress kernel branches once per group rather than
/// once per cell.
#[derive(Debug, Clone, Default)]
pub struct TableDistances {
    records: Vec<DistanceRecord>,
}

pub struct BuildOptions<'a> {
    pub disconnected: &'a HashSet<usize>,
    pub dodgy_titer_is_regular: bool,
    pub mult_antigen_titer_until_column_adjust: bool,
    /// Per-point log-titer shifts, indexed by unified point index; empty
    /// means no avidity adjustment.
    pub avidity_adjusts: &'a [f64],
}

impl TableDistances {
    pub fn records(&self) -> &[DistanceRecord] {
        &self.records
    }

    pub fn by_kind(&self, kind: TiterKind) -> impl Iterator<Item = &DistanceRecord> {
        self.records.iter().filter(move |r| r.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Builds the distance table once per (Chart, Projection) at stress
    /// construction time (spec.md §4.4).
    pub fn build(
        table: &TiterTable,
        column_bases: &ColumnBases,
        number_of_antigens: usize,
        options: &BuildOptions,
    ) -> Self {
        let mut records = Vec::with_capacity(table.number_of_non_dont_cares());
        for (a, s, titer) in table.iter_non_dont_care() {
            let i = a;
            let j = number_of_antigens + s;
            if options.disconnected.contains(&i) || options.disconnected.contains(&j) {
                continue;
            }
            let kind = match titer {
                Titer::Regular(_) => TiterKind::Regular,
                Titer::LessThan(_) => TiterKind::Less,
                Titer::MoreThan(_) => TiterKind::More,
                Titer::Dodgy(_) => {
                    if options.dodgy_titer_is_regular {
                        TiterKind::Dodgy
                    } else {
                        continue;
                    }
                }
                Titer::DontCare => unreachable!("iter_non_dont_care excludes DontCare"),
            };
            let logged = match titer.logged() {
                Ok(v) => v,
                Err(_) => continue,
            };
            let mut target = column_bases.column_basis(s) - logged;
            if let Some(&alpha_i) = options.avidity_adjusts.get(i) {
                target -= alpha_i;
            }
            if let Some(&alpha_j) = options.avidity_adjusts.get(j) {
                target -= alpha_j;
            }
            if options.mult_antigen_titer_until_column_adjust && target < 0.0 {
                target = 0.0;
            }
            records.push(DistanceRecord {
                i,
                j,
                kind,
                target,
            });
        }
        Self { records }
    }
}
