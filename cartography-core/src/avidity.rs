use rayon::prelude::*;

use crate::{
    chart::Chart,
    column_bases::ColumnBases,
    optimizer::RelaxOptions,
    procrustes,
    projection::{Projection, Recalculate},
    table::TiterTable,
};

/// Sweep bounds and step for avidity-adjustment estimation (spec.md §F1,
/// grounded on `original_source/cc/avidity-test.hh`'s `Settings`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    pub step: f64,
    pub min_adjust: f64,
    pub max_adjust: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            step: 1.0,
            min_adjust: -6.0,
            max_adjust: 6.0,
        }
    }
}

/// One swept adjustment value and how much re-relaxing with it moved
/// everything other than the antigen under test.
#[derive(Debug, Clone)]
pub struct PerAdjust {
    pub logged_adjust: f64,
    /// Procrustes rms residual between the original layout and the
    /// re-relaxed one, computed over every point except the test antigen:
    /// the "how much did the rest of the map have to move" signal the
    /// estimate minimizes (spec.md §F1).
    pub average_procrustes_distance_except_test_antigen: f64,
    pub distance_test_antigen_moved: f64,
    pub stress: f64,
}

#[derive(Debug, Clone)]
pub struct AntigenResult {
    pub antigen_no: usize,
    pub best_logged_adjust: f64,
    pub adjusts: Vec<PerAdjust>,
}

#[derive(Debug, Clone)]
pub struct Results {
    pub original_stress: f64,
    pub results: Vec<AntigenResult>,
}

fn sweep_values(settings: &Settings) -> Vec<f64> {
    assert!(settings.step > 0.0, "avidity sweep step must be positive");
    let mut values = Vec::new();
    let mut v = settings.min_adjust;
    while v <= settings.max_adjust + 1e-9 {
        values.push(v);
        v += settings.step;
    }
    values
}

/// One point of the sweep: relax a clone of `original` with `adjust`
/// applied to `antigen_no` alone, then Procrustes-compare against
/// `original` over every other point.
fn test_adjust(
    chart: &Chart,
    original: &Projection,
    table: &TiterTable,
    column_bases: &ColumnBases,
    antigen_no: usize,
    logged_adjust: f64,
    relax_options: &RelaxOptions,
) -> PerAdjust {
    let mut avidity = vec![0.0; chart.number_of_points()];
    avidity[antigen_no] = logged_adjust;

    let mut trial = original.clone();
    trial.set_avidity_adjusts(avidity);
    trial.relax(table, column_bases, chart.number_of_antigens(), relax_options);
    let stress = trial.stress(table, column_bases, chart.number_of_antigens(), Recalculate::IfNecessary);

    let common: Vec<(usize, usize)> = (0..chart.number_of_points())
        .filter(|&p| p != antigen_no)
        .map(|p| (p, p))
        .collect();
    let alignment = procrustes::align(original.layout(), trial.layout(), &common, false);

    let moved_test_antigen = {
        let aligned = alignment.transformation.apply_point(&trial.layout().point(antigen_no));
        (aligned - original.layout().point(antigen_no)).norm()
    };

    PerAdjust {
        logged_adjust,
        average_procrustes_distance_except_test_antigen: alignment.rms_residual,
        distance_test_antigen_moved: moved_test_antigen,
        stress,
    }
}

/// Estimates the avidity adjustment for a single antigen (spec.md §F1):
/// the swept value whose re-relax disturbs the rest of the map least.
pub fn test_antigen(chart: &Chart, projection_no: usize, antigen_no: usize, settings: &Settings, relax_options: &RelaxOptions) -> AntigenResult {
    let original = &chart.projections()[projection_no];
    let column_bases = chart.column_bases_for_projection(original);
    let table = chart.table();

    let adjusts: Vec<PerAdjust> = sweep_values(settings)
        .into_iter()
        .map(|adjust| test_adjust(chart, original, table, &column_bases, antigen_no, adjust, relax_options))
        .collect();

    let best_logged_adjust = adjusts
        .iter()
        .min_by(|a, b| a.average_procrustes_distance_except_test_antigen.partial_cmp(&b.average_procrustes_distance_except_test_antigen).unwrap())
        .map(|a| a.logged_adjust)
        .unwrap_or(0.0);

    AntigenResult {
        antigen_no,
        best_logged_adjust,
        adjusts,
    }
}

/// Estimates avidity adjustments for `antigens`, one sweep per antigen run
/// in parallel across worker threads (spec.md §5, §F1).
pub fn test_antigens(chart: &Chart, projection_no: usize, antigens: &[usize], settings: &Settings, relax_options: &RelaxOptions) -> Results {
    let original_stress = chart.projections()[projection_no].clone().stress(
        chart.table(),
        &chart.column_bases_for_projection(&chart.projections()[projection_no]),
        chart.number_of_antigens(),
        Recalculate::IfNecessary,
    );

    let results = antigens
        .par_iter()
        .map(|&antigen_no| test_antigen(chart, projection_no, antigen_no, settings, relax_options))
        .collect();

    Results { original_stress, results }
}

/// Estimates avidity adjustments for every antigen in the chart.
pub fn test_all(chart: &Chart, projection_no: usize, settings: &Settings, relax_options: &RelaxOptions) -> Results {
    let antigens: Vec<usize> = (0..chart.number_of_antigens()).collect();
    test_antigens(chart, projection_no, &antigens, settings, relax_options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{antigen::Antigen, antigen::Serum, chart::ChartInfo, column_bases::MinimumColumnBasis, layout::Layout, optimizer::Precision, titer::Titer};

    fn two_antigen_chart() -> Chart {
        let antigens = vec![Antigen { name: "A/ONE/1/2020".into(), ..Default::default() }, Antigen { name: "A/TWO/1/2020".into(), ..Default::default() }];
        let sera = vec![Serum { name: "A/ONE/1/2020".into(), ..Default::default() }];
        let mut table = TiterTable::new_dense(2, 1);
        table.set_titer(0, 0, Titer::Regular(40));
        table.set_titer(1, 0, Titer::Regular(160));
        let mut chart = Chart::new(ChartInfo::default(), antigens, sera, table).unwrap();

        let layout = Layout::from_rows(vec![vec![0.0, 0.0], vec![2.0, 0.0], vec![2.0, 0.0]]);
        let mut projection = Projection::new(layout, MinimumColumnBasis::None);
        let cb = chart.computed_column_bases(MinimumColumnBasis::None, true);
        projection.stress(chart.table(), &cb, 2, Recalculate::Yes);
        chart.projections_mut().push(projection);
        chart
    }

    #[test]
    fn sweep_values_cover_the_closed_interval() {
        let settings = Settings { step: 2.0, min_adjust: -4.0, max_adjust: 4.0 };
        let values = sweep_values(&settings);
        assert_eq!(values, vec![-4.0, -2.0, 0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_antigen_returns_one_entry_per_sweep_value() {
        let chart = two_antigen_chart();
        let settings = Settings { step: 3.0, min_adjust: -3.0, max_adjust: 3.0 };
        let options = RelaxOptions { precision: Precision::Rough, max_iterations: 200, ..Default::default() };
        let result = test_antigen(&chart, 0, 0, &settings, &options);
        assert_eq!(result.adjusts.len(), 3);
        assert!(result.adjusts.iter().all(|a| a.average_procrustes_distance_except_test_antigen >= 0.0));
    }

    #[test]
    fn test_all_covers_every_antigen() {
        let chart = two_antigen_chart();
        let settings = Settings { step: 6.0, min_adjust: -6.0, max_adjust: 6.0 };
        let options = RelaxOptions { precision: Precision::Rough, max_iterations: 200, ..Default::default() };
        let results = test_all(&chart, 0, &settings, &options);
        assert_eq!(results.results.len(), 2);
    }
}
