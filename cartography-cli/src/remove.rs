use std::fs;

use clap::Args;

use crate::error::CliError;

fn parse_index_list(s: &str) -> Result<Vec<usize>, CliError> {
    s.split(',')
        .filter(|p| !p.is_empty())
        .map(|p| p.trim().parse::<usize>().map_err(|_| CliError::Usage(format!("not a point index: {p}"))))
        .collect()
}

/// Removes antigens and/or sera from a chart (spec.md §6).
#[derive(Debug, Args)]
pub struct RemoveArgs {
    /// Chart to read.
    pub input: String,
    /// Where to write the edited chart.
    #[arg(long)]
    pub output: String,
    /// Comma-separated antigen indices to remove.
    #[arg(long, default_value = "")]
    pub antigens: String,
    /// Comma-separated serum indices to remove.
    #[arg(long, default_value = "")]
    pub sera: String,
}

pub fn run(args: &RemoveArgs) -> Result<(), CliError> {
    let mut chart = cartography_io::from_str(&fs::read_to_string(&args.input)?)?;
    let antigens = parse_index_list(&args.antigens)?;
    let sera = parse_index_list(&args.sera)?;
    chart.remove_antigens_sera(&antigens, &sera)?;
    log::info!("{}", chart.description());
    fs::write(&args.output, cartography_io::to_string(&chart)?)?;
    Ok(())
}
