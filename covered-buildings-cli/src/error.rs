//! CLI error type.

use std::path::PathBuf;

use thiserror::Error;

use covered_buildings::geocode::GeocodeError;
use covered_buildings::output::OutputError;
use covered_buildings::transport::TransportError;
use covered_buildings::ResolveError;

#[derive(Debug, Error)]
pub enum CliError {
    /// The input locations file is missing or unreadable.
    #[error("cannot read locations file {path}")]
    Locations {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The locations file is not a JSON array of address records.
    #[error("invalid locations file {path}: {source}")]
    LocationsFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Geocode(#[from] GeocodeError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Writing an output file failed.
    #[error("cannot write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
