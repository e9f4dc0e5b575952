//! Footprint dataset records and GeoJSONL parsing.
//!
//! A tile dataset is a gzipped, newline-delimited stream of GeoJSON
//! features, one building footprint per line, each with a polygon geometry
//! and an optional `height` property. A tile either parses as a whole or
//! fails as a whole: there is no partial-record recovery, because a
//! half-loaded tile would silently change which footprint is "nearest".

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use geo_types::{Geometry, Polygon};
use geojson::GeoJson;
use thiserror::Error;
use tracing::debug;

use crate::coord::TileId;

/// Raw height value meaning "unknown" in the source data.
pub const HEIGHT_SENTINEL: f64 = -1.0;

/// Errors from reading or parsing a tile dataset file.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Reading or decompressing the file failed.
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A line was not valid GeoJSON.
    #[error("invalid GeoJSON on line {line}")]
    Geojson {
        line: usize,
        #[source]
        source: geojson::Error,
    },

    /// A feature carried no geometry.
    #[error("feature on line {line} has no geometry")]
    MissingGeometry { line: usize },

    /// A record carried something other than a single polygon.
    #[error("unsupported geometry {kind} on line {line}, expected Polygon")]
    UnsupportedGeometry { line: usize, kind: &'static str },

    /// The cached file does not match the checksum recorded at download.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

/// One building footprint record.
#[derive(Debug, Clone)]
pub struct Footprint {
    /// Ground outline polygon, WGS84 lon/lat.
    pub geometry: Polygon<f64>,

    /// Building height in meters. The source's `-1` sentinel is normalized
    /// to `None` at parse time and never reported as a numeric height.
    pub height: Option<f64>,
}

/// All footprint records for one tile, in file order.
///
/// Loaded once per run, never mutated afterwards. File order matters: the
/// matcher's documented tie-breaks are defined in terms of it.
#[derive(Debug)]
pub struct TileDataset {
    tile: TileId,
    footprints: Vec<Footprint>,
}

impl TileDataset {
    /// The tile this dataset belongs to.
    pub fn tile(&self) -> TileId {
        self.tile
    }

    /// The footprints in dataset iteration order.
    pub fn footprints(&self) -> &[Footprint] {
        &self.footprints
    }

    pub fn len(&self) -> usize {
        self.footprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.footprints.is_empty()
    }

    /// Builds a dataset directly from records (used by tests and tools).
    pub fn from_footprints(tile: TileId, footprints: Vec<Footprint>) -> Self {
        Self { tile, footprints }
    }
}

/// Reads a gzipped GeoJSONL tile file.
pub fn read_gzipped(tile: TileId, path: &Path) -> Result<TileDataset, DatasetError> {
    let file = File::open(path).map_err(|e| DatasetError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let reader = BufReader::new(GzDecoder::new(file));

    let mut footprints = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| DatasetError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        footprints.push(parse_feature(&line, i + 1)?);
    }

    debug!(%tile, footprints = footprints.len(), "parsed tile dataset");
    Ok(TileDataset { tile, footprints })
}

/// Parses one GeoJSONL line into a footprint.
fn parse_feature(line: &str, line_no: usize) -> Result<Footprint, DatasetError> {
    let gj: GeoJson = line.parse().map_err(|e| DatasetError::Geojson {
        line: line_no,
        source: e,
    })?;

    let feature = match gj {
        GeoJson::Feature(f) => f,
        GeoJson::Geometry(_) => {
            return Err(DatasetError::UnsupportedGeometry {
                line: line_no,
                kind: "bare Geometry",
            })
        }
        GeoJson::FeatureCollection(_) => {
            return Err(DatasetError::UnsupportedGeometry {
                line: line_no,
                kind: "FeatureCollection",
            })
        }
    };

    let height = feature
        .properties
        .as_ref()
        .and_then(|p| p.get("height"))
        .and_then(|v| v.as_f64())
        .filter(|h| *h != HEIGHT_SENTINEL);

    let geometry = feature
        .geometry
        .ok_or(DatasetError::MissingGeometry { line: line_no })?;
    let geometry =
        Geometry::<f64>::try_from(geometry).map_err(|e| DatasetError::Geojson {
            line: line_no,
            source: e,
        })?;

    let polygon = match geometry {
        Geometry::Polygon(p) => p,
        other => {
            return Err(DatasetError::UnsupportedGeometry {
                line: line_no,
                kind: geometry_kind(&other),
            })
        }
    };

    Ok(Footprint {
        geometry: polygon,
        height,
    })
}

fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}
