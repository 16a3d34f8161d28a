use std::fs;

use clap::Args;

use cartography_core::{
    common_match::{self, MatchLevel},
    merge::{self, MergeType},
};

use crate::error::CliError;

fn parse_match_level(s: &str) -> Result<MatchLevel, CliError> {
    match s {
        "strict" => Ok(MatchLevel::Strict),
        "relaxed" => Ok(MatchLevel::Relaxed),
        "ignored" => Ok(MatchLevel::Ignored),
        "auto" => Ok(MatchLevel::Automatic),
        other => Err(CliError::Usage(format!("unknown --match level: {other}"))),
    }
}

/// Maps the five documented `--merge-type` spellings onto the four
/// behaviors `cartography_core::merge::MergeType` models (see DESIGN.md).
///
/// spec.md §4.12's "incremental" (type2) keeps the primary's points fixed
/// and only relaxes points new to the secondary chart, which is
/// `MergeType::Overlay` here; its "overlay" (type3) Procrustes-aligns the
/// secondary on and then relaxes every point together, which is
/// `MergeType::Incremental` here. The core enum's names describe *how much
/// moves*, not the spec's historical type numbers — don't assume the
/// strings line up with the variant names.
fn parse_merge_type(s: &str) -> Result<MergeType, CliError> {
    match s {
        "type1" | "simple" => Ok(MergeType::TablesOnly),
        "type2" | "incremental" => Ok(MergeType::Overlay),
        "type3" | "overlay" => Ok(MergeType::Incremental),
        "type4" => Ok(MergeType::Incremental),
        "type5" => Ok(MergeType::TablesOnly),
        other => Err(CliError::Usage(format!("unknown --merge-type: {other}"))),
    }
}

/// Merges two charts (spec.md §4.12, §6).
#[derive(Debug, Args)]
pub struct MergeArgs {
    /// Primary chart: its antigens/sera/projections take precedence.
    pub primary: String,
    /// Secondary chart, merged in.
    pub secondary: String,
    /// Where to write the merged chart.
    #[arg(long)]
    pub output: String,
    /// Common-point matching strictness.
    #[arg(long = "match", default_value = "auto")]
    pub match_level: String,
    /// How much of each chart's existing geometry to carry forward.
    #[arg(long = "merge-type", default_value = "incremental")]
    pub merge_type: String,
}

pub fn run(args: &MergeArgs) -> Result<(), CliError> {
    let primary = cartography_io::from_str(&fs::read_to_string(&args.primary)?)?;
    let secondary = cartography_io::from_str(&fs::read_to_string(&args.secondary)?)?;

    let level = parse_match_level(&args.match_level)?;
    let merge_type = parse_merge_type(&args.merge_type)?;

    let antigen_matches = common_match::match_points(primary.antigens(), secondary.antigens(), level);
    let serum_matches = common_match::match_points(primary.sera(), secondary.sera(), level);
    log::info!("matched {} antigens, {} sera", antigen_matches.len(), serum_matches.len());

    let merged = merge::merge(&primary, &secondary, &antigen_matches, &serum_matches, merge_type)?;
    log::info!("{}", merged.description());

    fs::write(&args.output, cartography_io::to_string(&merged)?)?;
    Ok(())
}
