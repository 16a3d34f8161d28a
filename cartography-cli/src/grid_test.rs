use std::fs;

use clap::Args;

use cartography_core::{
    grid_test::{self, Classification, GridTestOptions},
    optimizer::{Precision, RelaxOptions},
};

use crate::error::CliError;

const MAX_ITERATIONS: usize = 10;

/// Runs GridTest over a projection's points (spec.md §4.9, §6).
#[derive(Debug, Args)]
pub struct GridTestArgs {
    /// Chart to read.
    pub input: String,
    /// Where to write the chart, if `--relax` moved any points.
    #[arg(long)]
    pub output: Option<String>,
    /// Grid spacing, in map units.
    #[arg(long, default_value_t = 0.01)]
    pub step: f64,
    /// Which projection to test (default: the best one).
    #[arg(long, default_value_t = 0)]
    pub projection: usize,
    /// Report only this point index instead of every point.
    #[arg(long)]
    pub point: Option<usize>,
    /// Iterate move-then-relax until no trapped/hemisphering point remains.
    #[arg(long)]
    pub relax: bool,
}

pub fn run(args: &GridTestArgs) -> Result<(), CliError> {
    let json = fs::read_to_string(&args.input)?;
    let mut chart = cartography_io::from_str(&json)?;

    if args.projection >= chart.projections().len() {
        return Err(CliError::Usage(format!("chart has no projection {}", args.projection)));
    }

    let options = GridTestOptions { step: args.step, ..Default::default() };
    let mut iteration = 0;
    loop {
        let column_bases = chart.column_bases_for_projection(&chart.projections()[args.projection]);
        let antigens = chart.number_of_antigens();
        let results = grid_test::run(&chart.projections()[args.projection], chart.table(), &column_bases, antigens, &options);

        for r in &results.results {
            if args.point.is_some_and(|p| p != r.point) {
                continue;
            }
            println!("{}\t{:?}\tcurrent={:.4}\tbest={:.4}\tmoved={:.4}", r.point, r.classification, r.current_stress, r.best_stress, r.distance_moved);
        }

        if !args.relax {
            break;
        }
        let trapped = results.results.iter().any(|r| matches!(r.classification, Classification::Trapped | Classification::Hemisphering));
        if !trapped || iteration >= MAX_ITERATIONS {
            break;
        }
        let relax_options = RelaxOptions { precision: Precision::Fine, ..Default::default() };
        let relaxed = grid_test::make_new_projection_and_relax(&chart.projections()[args.projection], &results, chart.table(), &column_bases, antigens, &relax_options);
        chart.projections_mut()[args.projection] = relaxed;
        iteration += 1;
    }

    if args.relax {
        chart.sort_projections_by_stress();
        if let Some(output) = &args.output {
            fs::write(output, cartography_io::to_string(&chart)?)?;
        }
    }
    Ok(())
}
