use std::fs;

use clap::Args;

use cartography_core::{common_match::{self, MatchLevel}, procrustes};

use crate::error::CliError;

/// Procrustes-aligns a chart's best projection onto a master chart's
/// (spec.md §4.10, §6).
#[derive(Debug, Args)]
pub struct ReorientArgs {
    /// Chart to align (its first projection's transformation is updated).
    pub input: String,
    /// Chart to align onto.
    #[arg(long)]
    pub master: String,
    /// Where to write the reoriented chart.
    #[arg(long)]
    pub output: String,
    /// Allow uniform scaling in the alignment.
    #[arg(long)]
    pub scaling: bool,
}

pub fn run(args: &ReorientArgs) -> Result<(), CliError> {
    let master = cartography_io::from_str(&fs::read_to_string(&args.master)?)?;
    let mut chart = cartography_io::from_str(&fs::read_to_string(&args.input)?)?;

    let master_projection = master.projections().first().ok_or_else(|| CliError::Usage("master chart has no projections".into()))?;
    if chart.projections().is_empty() {
        return Err(CliError::Usage("chart has no projections to reorient".into()));
    }

    let antigen_matches = common_match::match_points(master.antigens(), chart.antigens(), MatchLevel::Strict);
    let serum_matches = common_match::match_points(master.sera(), chart.sera(), MatchLevel::Strict);
    let common: Vec<(usize, usize)> = antigen_matches
        .iter()
        .map(|m| (m.primary, m.secondary))
        .chain(serum_matches.iter().map(|m| (master.number_of_antigens() + m.primary, chart.number_of_antigens() + m.secondary)))
        .collect();
    if common.is_empty() {
        return Err(CliError::Usage("no common antigens/sera between chart and master".into()));
    }

    let alignment = procrustes::align(master_projection.layout(), chart.projections()[0].layout(), &common, args.scaling);
    log::info!("rms residual: {}", alignment.rms_residual);
    chart.projections_mut()[0].transformation = alignment.transformation;

    fs::write(&args.output, cartography_io::to_string(&chart)?)?;
    Ok(())
}
