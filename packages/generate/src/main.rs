#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI that joins crimes to nearby schools and writes the result as a
//! directory of CSV part files.

use std::path::PathBuf;

use clap::Parser;
use school_crime_cli_utils::IndicatifProgress;
use school_crime_generate::{PipelineConfig, STAGES};
use school_crime_source::locator::ConfiguredLocator;

#[derive(Parser)]
#[command(
    name = "school_crime_generate",
    about = "Join crimes to the schools whose H3 neighborhood contains them"
)]
struct Cli {
    /// Output directory (replaced if it exists)
    output: PathBuf,

    /// TOML config file; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let multi = school_crime_cli_utils::init_logger();

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let locator = ConfiguredLocator::new(config.dataset_paths()).with_env_overrides();

    let progress = IndicatifProgress::steps_bar(&multi, "Generating", STAGES);
    school_crime_generate::run(&config, &locator, &cli.output, &progress)?;

    Ok(())
}
