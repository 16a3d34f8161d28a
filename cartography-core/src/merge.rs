use std::collections::HashSet;

use crate::{
    chart::{Chart, ChartInfo},
    column_bases::MinimumColumnBasis,
    common_match::CommonMatch,
    error::Result,
    optimizer::{Precision, RelaxOptions},
    procrustes,
    projection::{Projection, Recalculate},
    table::{Storage, TiterTable},
    titer::Titer,
};

/// How much of each chart's existing geometry a merge carries forward
/// (spec.md §4.12). Four behaviors cover the source's five-way typology;
/// its two "nothing moves" variants collapse into `Frozen` here (see
/// DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeType {
    /// Combine titer tables only; the merged chart starts with zero
    /// projections.
    TablesOnly,
    /// Procrustes-align the secondary's best projection onto the primary's,
    /// use that as a single starting layout, and fully re-relax every point.
    Incremental,
    /// Same starting layout, but every point that existed in the primary
    /// chart is held fixed; only points new to the secondary chart move.
    Overlay,
    /// Same starting layout, nothing is re-relaxed at all.
    Frozen,
}

/// `secondary_index -> merged_index` for one side (antigens or sera):
/// matched records keep the primary's index, unmatched records are
/// appended in secondary order.
fn build_index_map(primary_len: usize, secondary_len: usize, matches: &[CommonMatch]) -> (Vec<usize>, usize) {
    let mut secondary_to_merged = vec![None; secondary_len];
    for m in matches {
        secondary_to_merged[m.secondary] = Some(m.primary);
    }
    let mut merged_len = primary_len;
    for slot in secondary_to_merged.iter_mut() {
        if slot.is_none() {
            *slot = Some(merged_len);
            merged_len += 1;
        }
    }
    (secondary_to_merged.into_iter().map(|v| v.unwrap()).collect(), merged_len)
}

/// Expands one chart's titer table into merged-shape dense storage via
/// `antigen_map`/`serum_map`, leaving every other cell `DontCare`.
fn expand(table: &TiterTable, antigen_map: &[usize], serum_map: &[usize], merged_antigens: usize, merged_sera: usize) -> Storage {
    let mut rows = vec![vec![Titer::DontCare; merged_sera]; merged_antigens];
    for (a, s, titer) in table.iter_non_dont_care() {
        rows[antigen_map[a]][serum_map[s]] = titer;
    }
    Storage::Dense(rows)
}

/// Combines two charts' antigens, sera, and titer tables into one merged
/// chart, then (depending on `merge_type`) carries geometry forward from
/// each side's best existing projection (spec.md §4.12).
///
/// `antigen_matches`/`serum_matches` are common-point pairs in each chart's
/// own (not merged) indexing, typically from
/// [`crate::common_match::match_points`].
pub fn merge(primary: &Chart, secondary: &Chart, antigen_matches: &[CommonMatch], serum_matches: &[CommonMatch], merge_type: MergeType) -> Result<Chart> {
    let (antigen_map, merged_antigens_len) = build_index_map(primary.number_of_antigens(), secondary.number_of_antigens(), antigen_matches);
    let (serum_map, merged_sera_len) = build_index_map(primary.number_of_sera(), secondary.number_of_sera(), serum_matches);
    let primary_antigen_identity: Vec<usize> = (0..primary.number_of_antigens()).collect();
    let primary_serum_identity: Vec<usize> = (0..primary.number_of_sera()).collect();

    let mut merged_antigens = primary.antigens().to_vec();
    merged_antigens.resize_with(merged_antigens_len, Default::default);
    for (secondary_index, &merged_index) in antigen_map.iter().enumerate() {
        if merged_index >= primary.number_of_antigens() {
            merged_antigens[merged_index] = secondary.antigens()[secondary_index].clone();
        }
    }

    let mut merged_sera = primary.sera().to_vec();
    merged_sera.resize_with(merged_sera_len, Default::default);
    for (secondary_index, &merged_index) in serum_map.iter().enumerate() {
        if merged_index >= primary.number_of_sera() {
            merged_sera[merged_index] = secondary.sera()[secondary_index].clone();
        }
    }

    let primary_layer = expand(primary.table(), &primary_antigen_identity, &primary_serum_identity, merged_antigens_len, merged_sera_len);
    let secondary_layer = expand(secondary.table(), &antigen_map, &serum_map, merged_antigens_len, merged_sera_len);
    let table = TiterTable::merged_from_layers(merged_antigens_len, merged_sera_len, vec![primary_layer, secondary_layer])?;

    let mut info = ChartInfo { source_tables: primary.info.source_tables.clone(), ..primary.info.clone() };
    info.source_tables.extend(secondary.info.source_tables.iter().cloned());
    let mut chart = Chart::new(info, merged_antigens, merged_sera, table)?;

    if merge_type != MergeType::TablesOnly {
        if let (Some(primary_projection), Some(secondary_projection)) = (primary.projections().first(), secondary.projections().first()) {
            carry_geometry(&mut chart, primary, secondary, primary_projection, secondary_projection, &antigen_map, &serum_map, antigen_matches, serum_matches, merge_type);
        }
    }

    Ok(chart)
}

#[allow(clippy::too_many_arguments)]
fn carry_geometry(
    chart: &mut Chart,
    primary: &Chart,
    secondary: &Chart,
    primary_projection: &Projection,
    secondary_projection: &Projection,
    antigen_map: &[usize],
    serum_map: &[usize],
    antigen_matches: &[CommonMatch],
    serum_matches: &[CommonMatch],
    merge_type: MergeType,
) {
    let dimensions = primary_projection.layout().number_of_dimensions();
    if secondary_projection.layout().number_of_dimensions() != dimensions {
        log::warn!("skipping merge geometry carry-over: projections have different dimensionality");
        return;
    }

    let common: Vec<(usize, usize)> = antigen_matches
        .iter()
        .map(|m| (m.primary, m.secondary))
        .chain(serum_matches.iter().map(|m| (primary.number_of_antigens() + m.primary, secondary.number_of_antigens() + m.secondary)))
        .collect();
    if common.is_empty() {
        log::warn!("skipping merge geometry carry-over: no common points to align on");
        return;
    }

    let alignment = procrustes::align(primary_projection.layout(), secondary_projection.layout(), &common, false);

    let mut layout = crate::layout::Layout::zeros(chart.number_of_points(), dimensions);
    for a in 0..primary.number_of_antigens() {
        layout.set_point(a, primary_projection.layout().point(a).as_slice());
    }
    for s in 0..primary.number_of_sera() {
        layout.set_point(chart.number_of_antigens() + s, primary_projection.layout().point(primary.number_of_antigens() + s).as_slice());
    }
    for (secondary_index, &merged_index) in antigen_map.iter().enumerate() {
        if merged_index >= primary.number_of_antigens() {
            let aligned = alignment.transformation.apply_point(&secondary_projection.layout().point(secondary_index));
            layout.set_point(merged_index, aligned.as_slice());
        }
    }
    for (secondary_index, &merged_index) in serum_map.iter().enumerate() {
        if merged_index >= primary.number_of_sera() {
            let aligned = alignment.transformation.apply_point(&secondary_projection.layout().point(secondary.number_of_antigens() + secondary_index));
            layout.set_point(chart.number_of_antigens() + merged_index, aligned.as_slice());
        }
    }

    let mut template = Projection::new(layout, primary_projection.minimum_column_basis);
    template.comment = Some("merged".into());

    match merge_type {
        MergeType::TablesOnly => unreachable!("filtered out by caller"),
        MergeType::Frozen => {
            let column_bases = chart.column_bases_for_projection(&template);
            let antigens = chart.number_of_antigens();
            template.stress(chart.table(), &column_bases, antigens, Recalculate::Yes);
            chart.projections_mut().push(template);
        }
        MergeType::Incremental => {
            let column_bases = chart.column_bases_for_projection(&template);
            relax_in_place(chart, template, &column_bases);
        }
        MergeType::Overlay => {
            let mut unmovable = HashSet::new();
            for a in 0..primary.number_of_antigens() {
                unmovable.insert(a);
            }
            for s in 0..primary.number_of_sera() {
                unmovable.insert(chart.number_of_antigens() + s);
            }
            template.set_unmovable(unmovable);
            let column_bases = chart.column_bases_for_projection(&template);
            relax_in_place(chart, template, &column_bases);
        }
    }
    chart.sort_projections_by_stress();
}

fn relax_in_place(chart: &mut Chart, mut template: Projection, column_bases: &crate::column_bases::ColumnBases) {
    let antigens = chart.number_of_antigens();
    let options = RelaxOptions { precision: Precision::Fine, ..Default::default() };
    template.relax(chart.table(), column_bases, antigens, &options);
    chart.projections_mut().push(template);
}
