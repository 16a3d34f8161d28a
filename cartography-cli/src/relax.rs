use std::{collections::HashSet, fs};

use clap::Args;

use cartography_core::{
    column_bases::MinimumColumnBasis,
    optimizer::{Method, MultiStartOptions, Precision, RelaxOptions},
    projection::{Projection, Recalculate},
};

use crate::error::CliError;

fn parse_index_list(s: &str) -> Result<Vec<usize>, CliError> {
    s.split(',')
        .filter(|p| !p.is_empty())
        .map(|p| p.trim().parse::<usize>().map_err(|_| CliError::Usage(format!("not a point index: {p}"))))
        .collect()
}

fn parse_dimension_schedule(s: &str) -> Result<Vec<usize>, CliError> {
    let schedule = parse_index_list(s)?;
    if schedule.is_empty() {
        return Err(CliError::Usage("-d requires at least one dimension".into()));
    }
    Ok(schedule)
}

/// Runs multi-start optimization (spec.md §6).
#[derive(Debug, Args)]
pub struct RelaxArgs {
    /// Chart to read.
    pub input: String,
    /// Where to write the relaxed chart.
    #[arg(long)]
    pub output: String,
    /// Number of optimization attempts.
    #[arg(short = 'n', long, default_value_t = 100)]
    pub attempts: usize,
    /// Dimension annealing schedule, e.g. "5,4,3,2".
    #[arg(short = 'd', long, default_value = "2")]
    pub dimensions: String,
    /// Minimum column basis ("none", "log2:5", or a raw titer like "1280").
    #[arg(short = 'm', long, default_value = "none")]
    pub minimum_column_basis: String,
    /// Use rough gradient tolerance for every attempt (default).
    #[arg(long, conflicts_with = "fine")]
    pub rough: bool,
    /// After the attempts, re-optimize the best K at fine precision.
    #[arg(long, value_name = "K")]
    pub fine: Option<usize>,
    /// Optimization backend.
    #[arg(long, default_value = "alglib-cg")]
    pub method: String,
    /// Randomized starting layout spread, as a multiple of the maximum
    /// table distance.
    #[arg(long = "md", default_value_t = 2.0)]
    pub max_distance_multiplier: f64,
    /// Keep the chart's existing projections instead of replacing them.
    #[arg(long)]
    pub keep_projections: bool,
    /// Antigen point indices to mark disconnected before optimizing.
    #[arg(long = "disconnect-antigens")]
    pub disconnect_antigens: Option<String>,
    /// Serum point indices to mark disconnected before optimizing.
    #[arg(long = "disconnect-sera")]
    pub disconnect_sera: Option<String>,
    /// Don't auto-disconnect points with too few regular titers.
    #[arg(long)]
    pub no_disconnect_having_few_titers: bool,
    /// Size of the rayon worker pool (defaults to the number of cores).
    #[arg(long)]
    pub threads: Option<usize>,
    /// Seed for the deterministic per-attempt randomized starts.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

pub fn run(args: &RelaxArgs) -> Result<(), CliError> {
    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|e| CliError::Usage(format!("could not configure thread pool: {e}")))?;
    }

    let json = fs::read_to_string(&args.input)?;
    let mut chart = cartography_io::from_str(&json)?;

    let minimum_column_basis: MinimumColumnBasis = args
        .minimum_column_basis
        .parse()
        .map_err(|e: cartography_core::error::Error| CliError::Usage(e.to_string()))?;
    let method: Method = args.method.parse().map_err(|e: cartography_core::error::Error| CliError::Usage(e.to_string()))?;
    let dimension_schedule = parse_dimension_schedule(&args.dimensions)?;

    if !args.keep_projections {
        chart.projections_mut().clear();
    }

    let layout = cartography_core::layout::Layout::zeros(chart.number_of_points(), *dimension_schedule.last().unwrap());
    let mut template = Projection::new(layout, minimum_column_basis);

    let mut disconnected = HashSet::new();
    if let Some(list) = &args.disconnect_antigens {
        disconnected.extend(parse_index_list(list)?);
    }
    if let Some(list) = &args.disconnect_sera {
        let offset = chart.number_of_antigens();
        disconnected.extend(parse_index_list(list)?.into_iter().map(|s| offset + s));
    }
    template.set_disconnected(disconnected);

    let auto_disconnect_threshold = if args.no_disconnect_having_few_titers { None } else { Some(1) };

    let options = MultiStartOptions {
        attempts: args.attempts,
        dimension_schedule,
        method,
        max_iterations: 2000,
        max_distance_multiplier: args.max_distance_multiplier,
        seed: args.seed,
    };
    chart.relax(template, &options, auto_disconnect_threshold);

    if let Some(k) = args.fine {
        let fine_options = RelaxOptions { method, precision: Precision::Fine, max_iterations: 2000, deadline: None };
        let antigens = chart.number_of_antigens();
        let refine_count = k.min(chart.projections().len());
        for i in 0..refine_count {
            let column_bases = chart.column_bases_for_projection(&chart.projections()[i]);
            let mut projection = chart.projections()[i].clone();
            projection.relax(chart.table(), &column_bases, antigens, &fine_options);
            chart.projections_mut()[i] = projection;
        }
        chart.sort_projections_by_stress();
    }
    log::info!("{}", chart.description());
    if let Some(best) = chart.projections().first() {
        let stress = best.clone().stress(chart.table(), &chart.column_bases_for_projection(best), chart.number_of_antigens(), Recalculate::No);
        log::info!("best stress: {stress}");
    }

    fs::write(&args.output, cartography_io::to_string(&chart)?)?;
    Ok(())
}
