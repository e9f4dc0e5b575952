//! One-shot pipeline run: a locations file in, three output files out.
//!
//! Mirrors the covered-building-list workflow: geocode the addresses,
//! resolve each acceptable coordinate to a footprint, then write the CSV
//! plus the footprint and identifier-box GeoJSON variants.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use covered_buildings::geocode::{self, GeocodeRecord, Location, MapQuestGeocoder};
use covered_buildings::output::{self, BuildingRow};
use covered_buildings::pipeline::{ResolvedBuilding, Resolver, ResolverConfig};
use covered_buildings::transport::{ReqwestTransport, Transport};

use crate::error::CliError;

pub const CSV_FILE: &str = "covered-buildings.csv";
pub const GEOJSON_FILE: &str = "covered-buildings.geojson";
pub const UBID_GEOJSON_FILE: &str = "covered-buildings-ubid.geojson";

pub struct RunConfig {
    pub locations: PathBuf,
    pub data_dir: PathBuf,
    pub out_dir: PathBuf,
    pub api_key: String,
    pub code_length: usize,
    pub max_downloads: usize,
    pub index_url: Option<String>,
}

pub fn run(config: RunConfig) -> Result<(), CliError> {
    let locations = read_locations(&config.locations)?;
    info!(count = locations.len(), "loaded locations");

    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new()?);
    let geocoder = MapQuestGeocoder::new(Arc::clone(&transport), config.api_key.clone());
    let records = geocoder.geocode(&locations)?;
    let geocoded = records.iter().filter(|r| r.coordinate().is_some()).count();
    info!(
        total = records.len(),
        geocoded,
        "geocoding finished"
    );

    let mut resolver_config = ResolverConfig::new(config.data_dir.clone())
        .with_code_length(config.code_length)
        .with_max_downloads(config.max_downloads);
    if let Some(url) = &config.index_url {
        resolver_config = resolver_config.with_index_url(url);
    }
    let (resolver, _) = Resolver::new(resolver_config, transport)?;

    // Pull every needed tile down first so per-record resolution below is
    // pure cache hits.
    let points: Vec<(f64, f64)> = records.iter().filter_map(|r| r.coordinate()).collect();
    resolver.prefetch(&points);

    let rows: Vec<BuildingRow> = records
        .into_iter()
        .map(|record| {
            let resolved = record.coordinate().and_then(|(lat, lon)| {
                match resolver.resolve_point(lat, lon) {
                    Ok(building) => Some(building),
                    Err(e) => {
                        warn!(lat, lon, error = %e, "footprint resolution failed");
                        None
                    }
                }
            });
            to_row(record, resolved)
        })
        .collect();

    fs::create_dir_all(&config.out_dir).map_err(|source| CliError::Write {
        path: config.out_dir.clone(),
        source,
    })?;
    write_outputs(&config.out_dir, &rows)?;
    info!(rows = rows.len(), out_dir = %config.out_dir.display(), "wrote covered building list");
    Ok(())
}

/// Reads and normalizes the input address records.
pub fn read_locations(path: &Path) -> Result<Vec<Location>, CliError> {
    let text = fs::read_to_string(path).map_err(|source| CliError::Locations {
        path: path.to_path_buf(),
        source,
    })?;
    let mut locations: Vec<Location> =
        serde_json::from_str(&text).map_err(|source| CliError::LocationsFormat {
            path: path.to_path_buf(),
            source,
        })?;
    for location in &mut locations {
        location.street = geocode::normalize_street(&location.street);
    }
    Ok(locations)
}

/// Combines one geocoding record and its optional resolution into a row.
pub fn to_row(record: GeocodeRecord, resolved: Option<ResolvedBuilding>) -> BuildingRow {
    let mut row = BuildingRow {
        address: record.address,
        city: record.city,
        state: record.state,
        postal_code: record.postal_code,
        side_of_street: record.side_of_street,
        neighborhood: record.neighborhood,
        county: record.county,
        country: record.country,
        latitude: record.latitude,
        longitude: record.longitude,
        quality: record.quality,
        ..BuildingRow::default()
    };
    if let Some(building) = resolved {
        row.footprint_match = Some(building.match_kind);
        row.geometry = Some(building.footprint);
        row.height = building.height;
        row.ubid = Some(building.ubid);
    }
    row
}

fn write_outputs(out_dir: &Path, rows: &[BuildingRow]) -> Result<(), CliError> {
    let csv_path = out_dir.join(CSV_FILE);
    output::write_csv(writer(&csv_path)?, rows)?;

    let geojson_path = out_dir.join(GEOJSON_FILE);
    output::write_geojson(writer(&geojson_path)?, rows)?;

    let ubid_path = out_dir.join(UBID_GEOJSON_FILE);
    output::write_ubid_geojson(writer(&ubid_path)?, rows)?;
    Ok(())
}

fn writer(path: &Path) -> Result<BufWriter<File>, CliError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|source| CliError::Write {
            path: path.to_path_buf(),
            source,
        })
}
