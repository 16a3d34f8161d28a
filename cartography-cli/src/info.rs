use std::fs;

use clap::Args;

use cartography_core::column_bases::MinimumColumnBasis;

use crate::error::CliError;

/// Prints a chart's info block (spec.md §6).
#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Chart to read (cartography-io json).
    pub input: String,
    /// Print only the lab.
    #[arg(long)]
    pub lab: bool,
    /// Print only the virus.
    #[arg(long)]
    pub virus: bool,
    /// Print only the assay.
    #[arg(long)]
    pub assay: bool,
    /// Print only the antigen count.
    #[arg(long)]
    pub antigen_count: bool,
    /// Print only the serum count.
    #[arg(long)]
    pub serum_count: bool,
    /// Print computed column bases (one per serum).
    #[arg(long)]
    pub column_bases: bool,
    /// Print the recorded dates.
    #[arg(long)]
    pub dates: bool,
    /// Print the source table names.
    #[arg(long)]
    pub tables: bool,
}

pub fn run(args: &InfoArgs) -> Result<(), CliError> {
    let json = fs::read_to_string(&args.input)?;
    let chart = cartography_io::from_str(&json)?;

    let any_selected = args.lab || args.virus || args.assay || args.antigen_count || args.serum_count || args.column_bases || args.dates || args.tables;
    if !any_selected {
        println!("{}", chart.description());
        return Ok(());
    }
    if args.lab {
        println!("{}", chart.info.lab.as_deref().unwrap_or(""));
    }
    if args.virus {
        println!("{}", chart.info.virus.as_deref().unwrap_or(""));
    }
    if args.assay {
        println!("{}", chart.info.assay.as_deref().unwrap_or(""));
    }
    if args.antigen_count {
        println!("{}", chart.number_of_antigens());
    }
    if args.serum_count {
        println!("{}", chart.number_of_sera());
    }
    if args.column_bases {
        let bases = chart.computed_column_bases(MinimumColumnBasis::None, true);
        for serum in 0..chart.number_of_sera() {
            println!("{}\t{}", chart.sera()[serum].name, bases.column_basis(serum));
        }
    }
    if args.dates {
        for date in &chart.info.dates {
            println!("{date}");
        }
    }
    if args.tables {
        for table in &chart.info.source_tables {
            println!("{table}");
        }
    }
    Ok(())
}
