use rand::SeedableRng;
use rayon::prelude::*;

use crate::{
    chart::{Chart, ChartInfo},
    column_bases::{ColumnBases, MinimumColumnBasis},
    optimizer::{self, Method, MultiStartOptions, Precision},
    projection::{Projection, Recalculate},
};

/// Cross-validation sweep parameters (spec.md §4.14), grounded on
/// `original_source/cc/map-resolution-test.hh`'s `Parameters`.
#[derive(Debug, Clone)]
pub struct Parameters {
    pub dimensions: Vec<usize>,
    pub proportions_to_dont_care: Vec<f64>,
    pub number_of_random_replicates: usize,
    pub number_of_optimizations: usize,
    pub minimum_column_basis: MinimumColumnBasis,
    pub precision: Precision,
    pub relax_from_full_table: bool,
    pub column_bases_from_master: bool,
    pub seed: u64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            dimensions: vec![1, 2, 3, 4, 5],
            proportions_to_dont_care: vec![0.1, 0.2, 0.3],
            number_of_random_replicates: 25,
            number_of_optimizations: 100,
            minimum_column_basis: MinimumColumnBasis::None,
            precision: Precision::Rough,
            relax_from_full_table: false,
            column_bases_from_master: true,
            seed: 0,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn standard_deviation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn pearson_correlation(xs: &[f64], ys: &[f64]) -> f64 {
    let mx = mean(xs);
    let my = mean(ys);
    let mut cov = 0.0;
    let mut varx = 0.0;
    let mut vary = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        cov += (x - mx) * (y - my);
        varx += (x - mx).powi(2);
        vary += (y - my).powi(2);
    }
    if varx <= 0.0 || vary <= 0.0 {
        return 0.0;
    }
    cov / (varx.sqrt() * vary.sqrt())
}

/// One titer dropped for this replicate: which cell, and how far off the
/// best re-relaxed projection's predicted distance was from the master
/// distance computed from the un-dropped table (spec.md §4.14 step 4).
#[derive(Debug, Clone, Copy)]
pub struct PredictionErrorForTiter {
    pub antigen: usize,
    pub serum: usize,
    pub error: f64,
}

/// Per-replicate summary statistics over its dropped titers.
#[derive(Debug, Clone)]
pub struct Predictions {
    pub average_absolute_error: f64,
    pub sd_error: f64,
    pub correlation: f64,
    pub r_squared: f64,
    pub number_of_samples: usize,
}

#[derive(Debug, Clone)]
pub struct ReplicateStat {
    pub master_distances: Vec<f64>,
    pub predicted_distances: Vec<f64>,
    pub prediction_errors_for_titers: Vec<PredictionErrorForTiter>,
}

impl ReplicateStat {
    pub fn predictions(&self) -> Predictions {
        let errors: Vec<f64> = self.prediction_errors_for_titers.iter().map(|e| e.error).collect();
        let average_absolute_error = mean(&errors.iter().map(|e| e.abs()).collect::<Vec<_>>());
        let sd_error = standard_deviation(&errors);
        let correlation = pearson_correlation(&self.master_distances, &self.predicted_distances);
        Predictions {
            average_absolute_error,
            sd_error,
            correlation,
            r_squared: correlation * correlation,
            number_of_samples: errors.len(),
        }
    }
}

/// Mean +/- SD across replicates for one `(dimensions, proportion)` cell.
#[derive(Debug, Clone)]
pub struct PredictionsSummary {
    pub dimensions: usize,
    pub proportion_to_dont_care: f64,
    pub average_absolute_error_mean: f64,
    pub average_absolute_error_sd: f64,
    pub sd_error_mean: f64,
    pub sd_error_sd: f64,
    pub correlation_mean: f64,
    pub correlation_sd: f64,
    pub r_squared_mean: f64,
    pub r_squared_sd: f64,
    pub number_of_samples: usize,
}

#[derive(Debug, Clone)]
pub struct Results {
    pub summaries: Vec<PredictionsSummary>,
}

fn best_projection(chart: &Chart, dimensions: usize, parameters: &Parameters, seed: u64, starting: Option<&Projection>) -> Projection {
    let template = match starting {
        Some(start) => {
            let mut t = start.clone();
            t.minimum_column_basis = parameters.minimum_column_basis;
            if parameters.column_bases_from_master {
                t.forced_column_bases = start.forced_column_bases.clone();
            }
            t
        }
        None => {
            let layout = crate::layout::Layout::zeros(chart.number_of_points(), dimensions);
            Projection::new(layout, parameters.minimum_column_basis)
        }
    };

    let column_bases = chart.column_bases_for_projection(&template);
    let stress = template.stress_model(chart.table(), &column_bases, chart.number_of_antigens());
    let max_table_distance = optimizer::max_table_distance(chart.table(), &column_bases);
    let options = MultiStartOptions {
        attempts: parameters.number_of_optimizations,
        dimension_schedule: vec![dimensions],
        method: Method::ConjugateGradient,
        max_iterations: 2000,
        max_distance_multiplier: 2.0,
        seed,
    };
    let outcomes = optimizer::multi_start(&stress, chart.number_of_points(), max_table_distance, &options);

    let mut best: Option<(f64, Projection)> = None;
    for outcome in outcomes {
        let mut candidate = template.clone();
        candidate.set_layout(outcome.layout);
        let candidate_stress = candidate.stress(chart.table(), &column_bases, chart.number_of_antigens(), Recalculate::Yes);
        if best.as_ref().map(|(s, _)| candidate_stress < *s).unwrap_or(true) {
            best = Some((candidate_stress, candidate));
        }
    }
    best.expect("multi_start always produces at least one outcome for attempts > 0").1
}

/// Runs one `(dimensions, proportion, replicate)` cell of the sweep
/// (spec.md §4.14 steps 1-4).
fn run_replicate(master: &Chart, master_column_bases: &ColumnBases, dimensions: usize, proportion: f64, replicate_seed: u64, parameters: &Parameters) -> ReplicateStat {
    let mut rng = rand::rngs::SmallRng::seed_from_u64(replicate_seed);
    let (reduced_table, removed) = master.table().set_proportion_of_titers_to_dont_care(proportion, &mut rng);

    let mut chart = Chart::new(ChartInfo::default(), master.antigens().to_vec(), master.sera().to_vec(), reduced_table).expect("reduced table keeps the master's shape");
    if parameters.column_bases_from_master {
        chart.forced_column_bases = Some(master_column_bases.clone());
    }

    let starting = if parameters.relax_from_full_table {
        Some(best_projection(master, dimensions, parameters, replicate_seed ^ 0x5151, None))
    } else {
        None
    };
    let projection = best_projection(&chart, dimensions, parameters, replicate_seed, starting.as_ref());

    let layout = projection.layout();
    let mut master_distances = Vec::with_capacity(removed.len());
    let mut predicted_distances = Vec::with_capacity(removed.len());
    let mut prediction_errors_for_titers = Vec::with_capacity(removed.len());
    for (a, s, master_titer) in removed {
        if !master_titer.is_regular() {
            continue;
        }
        let predicted_distance = layout.distance(a, chart.number_of_antigens() + s);
        let master_distance = master_column_bases.column_basis(s) - master_titer.logged().expect("regular titer always loggable");
        prediction_errors_for_titers.push(PredictionErrorForTiter { antigen: a, serum: s, error: master_distance - predicted_distance });
        master_distances.push(master_distance);
        predicted_distances.push(predicted_distance);
    }

    ReplicateStat { master_distances, predicted_distances, prediction_errors_for_titers }
}

/// Runs the full cross-validation sweep (spec.md §4.14): for every
/// `(dimensions, proportion)` pair, `number_of_random_replicates`
/// independent titer-dropout replicates are relaxed and scored against the
/// master chart's own column bases and distances; replicates run in
/// parallel (spec.md §5).
pub fn run(master: &Chart, parameters: &Parameters) -> Results {
    let master_column_bases = master.computed_column_bases(parameters.minimum_column_basis, true);

    let cells: Vec<(usize, f64)> = parameters
        .dimensions
        .iter()
        .flat_map(|&d| parameters.proportions_to_dont_care.iter().map(move |&p| (d, p)))
        .collect();

    let summaries = cells
        .into_par_iter()
        .map(|(dimensions, proportion)| {
            let replicate_stats: Vec<ReplicateStat> = (0..parameters.number_of_random_replicates)
                .into_par_iter()
                .map(|replicate| {
                    let seed = parameters.seed ^ (dimensions as u64) << 32 ^ (proportion * 1_000_000.0) as u64 ^ replicate as u64;
                    run_replicate(master, &master_column_bases, dimensions, proportion, seed, parameters)
                })
                .collect();

            let predictions: Vec<Predictions> = replicate_stats.iter().map(ReplicateStat::predictions).collect();
            let errors: Vec<f64> = predictions.iter().map(|p| p.average_absolute_error).collect();
            let sds: Vec<f64> = predictions.iter().map(|p| p.sd_error).collect();
            let correlations: Vec<f64> = predictions.iter().map(|p| p.correlation).collect();
            let r2s: Vec<f64> = predictions.iter().map(|p| p.r_squared).collect();

            PredictionsSummary {
                dimensions,
                proportion_to_dont_care: proportion,
                average_absolute_error_mean: mean(&errors),
                average_absolute_error_sd: standard_deviation(&errors),
                sd_error_mean: mean(&sds),
                sd_error_sd: standard_deviation(&sds),
                correlation_mean: mean(&correlations),
                correlation_sd: standard_deviation(&correlations),
                r_squared_mean: mean(&r2s),
                r_squared_sd: standard_deviation(&r2s),
                number_of_samples: predictions.iter().map(|p| p.number_of_samples).sum(),
            }
        })
        .collect();

    Results { summaries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{antigen::Antigen, antigen::Serum, table::TiterTable, titer::Titer};

    fn sample_chart() -> Chart {
        let antigens: Vec<Antigen> = (0..6).map(|i| Antigen { name: format!("A/X{i}/1/2020"), ..Default::default() }).collect();
        let sera: Vec<Serum> = (0..4).map(|i| Serum { name: format!("S{i}"), ..Default::default() }).collect();
        let mut table = TiterTable::new_dense(6, 4);
        for a in 0..6 {
            for s in 0..4 {
                table.set_titer(a, s, Titer::Regular(10 * (1 << ((a + s) % 5))));
            }
        }
        Chart::new(ChartInfo::default(), antigens, sera, table).unwrap()
    }

    #[test]
    fn summaries_cover_every_requested_cell() {
        let chart = sample_chart();
        let parameters = Parameters {
            dimensions: vec![2],
            proportions_to_dont_care: vec![0.2],
            number_of_random_replicates: 2,
            number_of_optimizations: 3,
            seed: 11,
            ..Default::default()
        };
        let results = run(&chart, &parameters);
        assert_eq!(results.summaries.len(), 1);
        assert!(results.summaries[0].number_of_samples > 0);
    }

    #[test]
    fn predictions_report_finite_statistics() {
        let chart = sample_chart();
        let parameters = Parameters {
            dimensions: vec![2],
            proportions_to_dont_care: vec![0.3],
            number_of_random_replicates: 3,
            number_of_optimizations: 3,
            seed: 5,
            ..Default::default()
        };
        let results = run(&chart, &parameters);
        let summary = &results.summaries[0];
        assert!(summary.average_absolute_error_mean.is_finite());
        assert!(summary.correlation_mean.is_finite());
    }
}
