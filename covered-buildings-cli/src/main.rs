//! Covered Buildings CLI - command-line interface
//!
//! Resolves a file of building addresses to footprint polygons and UBIDs,
//! writing the covered building list as CSV and GeoJSON.

mod error;
mod run;

use std::error::Error as _;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use covered_buildings::cache::DEFAULT_MAX_DOWNLOADS;
use covered_buildings::ubid::DEFAULT_CODE_LENGTH;

#[derive(Debug, Parser)]
#[command(
    name = "covered-buildings",
    version,
    about = "Resolve building addresses to footprints and UBIDs"
)]
struct Cli {
    /// MapQuest API key used for batch geocoding
    #[arg(long, env = "MAPQUEST_API_KEY", hide_env_values = true)]
    mapquest_api_key: String,

    /// Input JSON file: an array of {street, city, state} records
    #[arg(long, default_value = "locations.json")]
    locations: PathBuf,

    /// Directory holding the dataset index and tile cache
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Directory for output files (defaults to the data directory)
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Identifier precision, in plus-code digits
    #[arg(long, default_value_t = DEFAULT_CODE_LENGTH)]
    code_length: usize,

    /// Maximum concurrent tile downloads
    #[arg(long, default_value_t = DEFAULT_MAX_DOWNLOADS)]
    max_downloads: usize,

    /// Alternative dataset index URL
    #[arg(long, hide = true)]
    index_url: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = run::RunConfig {
        out_dir: cli.out_dir.unwrap_or_else(|| cli.data_dir.clone()),
        locations: cli.locations,
        data_dir: cli.data_dir,
        api_key: cli.mapquest_api_key,
        code_length: cli.code_length,
        max_downloads: cli.max_downloads,
        index_url: cli.index_url,
    };

    match run::run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            let mut cause = e.source();
            while let Some(source) = cause {
                eprintln!("  caused by: {source}");
                cause = source.source();
            }
            ExitCode::FAILURE
        }
    }
}
