//! `chart` — the CLI surface over `cartography-core`/`cartography-io`
//! (spec.md §6): info, relax, grid-test, merge, reorient, and structural
//! edits, each a subcommand over the `cartography-io` json format.

mod error;
mod grid_test;
mod info;
mod merge;
mod relax;
mod remove;
mod reorient;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "chart", author, version, about = "Antigenic cartography chart toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Prints a chart's info block.
    Info(info::InfoArgs),
    /// Runs multi-start optimization.
    Relax(relax::RelaxArgs),
    /// Runs GridTest over a projection's points.
    GridTest(grid_test::GridTestArgs),
    /// Merges two charts.
    Merge(merge::MergeArgs),
    /// Procrustes-aligns a chart onto a master.
    Reorient(reorient::ReorientArgs),
    /// Removes antigens and/or sera from a chart.
    RemoveAntigensSera(remove::RemoveArgs),
}

fn dispatch(command: &Command) -> Result<(), CliError> {
    match command {
        Command::Info(args) => info::run(args),
        Command::Relax(args) => relax::run(args),
        Command::GridTest(args) => grid_test::run(args),
        Command::Merge(args) => merge::run(args),
        Command::Reorient(args) => reorient::run(args),
        Command::RemoveAntigensSera(args) => remove::run(args),
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            eprint!("{e}");
            return ExitCode::from(1);
        }
    };

    match dispatch(&cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {e}");
            ExitCode::from(2)
        }
    }
}
