//! Tabular and GeoJSON writers for covered-building results.
//!
//! The CSV column order is fixed; downstream consumers key on it. Geometry
//! is written as WKT in the CSV and as GeoJSON features otherwise. The
//! UBID variant re-derives each feature's geometry from its identifier's
//! decoded bounding box and interleaves it with the footprint feature so
//! the two can be compared side by side.

use std::io::{self, Write};

use geo_types::Polygon;
use geojson::{Feature, FeatureCollection, GeoJson};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::matcher::MatchKind;
use crate::ubid::{self, UbidError};

/// Fixed CSV column order.
pub const CSV_COLUMNS: [&str; 15] = [
    "address",
    "city",
    "state",
    "postal_code",
    "side_of_street",
    "neighborhood",
    "county",
    "country",
    "latitude",
    "longitude",
    "quality",
    "footprint_match",
    "geometry",
    "height",
    "ubid",
];

/// Errors from writing output files.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write output")]
    Io(#[from] io::Error),

    #[error("failed to serialize GeoJSON")]
    Json(#[from] serde_json::Error),

    /// A row carried an identifier that no longer decodes.
    #[error(transparent)]
    Identifier(#[from] UbidError),
}

/// One fully assembled output row. Address fields come from geocoding;
/// match fields are empty when the point never reached a footprint.
#[derive(Debug, Clone, Default)]
pub struct BuildingRow {
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub side_of_street: Option<String>,
    pub neighborhood: Option<String>,
    pub county: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub quality: String,
    pub footprint_match: Option<MatchKind>,
    pub geometry: Option<Polygon<f64>>,
    pub height: Option<f64>,
    pub ubid: Option<String>,
}

/// Writes all rows as CSV with the fixed column order.
pub fn write_csv<W: Write>(mut writer: W, rows: &[BuildingRow]) -> Result<(), OutputError> {
    writeln!(writer, "{}", CSV_COLUMNS.join(","))?;
    for row in rows {
        let fields = [
            text(&row.address),
            text(&row.city),
            text(&row.state),
            text(&row.postal_code),
            text(&row.side_of_street),
            text(&row.neighborhood),
            text(&row.county),
            text(&row.country),
            number(row.latitude),
            number(row.longitude),
            escape(&row.quality),
            row.footprint_match
                .map(|k| k.to_string())
                .unwrap_or_default(),
            row.geometry.as_ref().map(polygon_wkt).unwrap_or_default(),
            number(row.height),
            text(&row.ubid),
        ];
        writeln!(writer, "{}", fields.join(","))?;
    }
    Ok(())
}

/// Writes matched rows as a GeoJSON `FeatureCollection` of footprints.
/// Rows that never matched a footprint have no geometry and are skipped.
pub fn write_geojson<W: Write>(mut writer: W, rows: &[BuildingRow]) -> Result<(), OutputError> {
    let features = rows
        .iter()
        .filter_map(|row| {
            row.geometry
                .as_ref()
                .map(|polygon| feature(polygon, row))
        })
        .collect();
    write_collection(&mut writer, features)
}

/// Writes the identifier-comparison variant: for every matched row, one
/// feature whose geometry is the decoded identifier's bounding box,
/// immediately followed by the original footprint feature.
pub fn write_ubid_geojson<W: Write>(
    mut writer: W,
    rows: &[BuildingRow],
) -> Result<(), OutputError> {
    let mut features = Vec::new();
    for row in rows {
        let (Some(polygon), Some(code)) = (&row.geometry, &row.ubid) else {
            continue;
        };
        let area = ubid::decode(code)?;
        features.push(feature(&area.bounding_polygon(), row));
        features.push(feature(polygon, row));
    }
    write_collection(&mut writer, features)
}

fn write_collection<W: Write>(writer: &mut W, features: Vec<Feature>) -> Result<(), OutputError> {
    let collection = GeoJson::FeatureCollection(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    });
    serde_json::to_writer(&mut *writer, &collection)?;
    writer.write_all(b"\n")?;
    Ok(())
}

fn feature(polygon: &Polygon<f64>, row: &BuildingRow) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(polygon))),
        id: None,
        properties: Some(properties(row)),
        foreign_members: None,
    }
}

/// Non-geometry columns as GeoJSON feature properties.
fn properties(row: &BuildingRow) -> Map<String, Value> {
    let mut map = Map::new();
    let mut put = |key: &str, value: Value| {
        map.insert(key.to_string(), value);
    };
    put("address", opt_str(&row.address));
    put("city", opt_str(&row.city));
    put("state", opt_str(&row.state));
    put("postal_code", opt_str(&row.postal_code));
    put("side_of_street", opt_str(&row.side_of_street));
    put("neighborhood", opt_str(&row.neighborhood));
    put("county", opt_str(&row.county));
    put("country", opt_str(&row.country));
    put("latitude", opt_num(row.latitude));
    put("longitude", opt_num(row.longitude));
    put("quality", json!(row.quality));
    put(
        "footprint_match",
        row.footprint_match
            .map(|k| json!(k.to_string()))
            .unwrap_or(Value::Null),
    );
    put("height", opt_num(row.height));
    put("ubid", opt_str(&row.ubid));
    map
}

fn opt_str(value: &Option<String>) -> Value {
    value.as_deref().map(|s| json!(s)).unwrap_or(Value::Null)
}

fn opt_num(value: Option<f64>) -> Value {
    value.map(|n| json!(n)).unwrap_or(Value::Null)
}

fn text(value: &Option<String>) -> String {
    value.as_deref().map(escape).unwrap_or_default()
}

fn number(value: Option<f64>) -> String {
    value.map(|n| n.to_string()).unwrap_or_default()
}

/// Quotes a CSV field when it contains a delimiter, quote, or newline.
fn escape<S: AsRef<str>>(field: S) -> String {
    let field = field.as_ref();
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Renders a polygon as WKT, exterior ring first.
fn polygon_wkt(polygon: &Polygon<f64>) -> String {
    let ring = |coords: &[geo_types::Coord<f64>]| {
        let points: Vec<String> = coords.iter().map(|c| format!("{} {}", c.x, c.y)).collect();
        format!("({})", points.join(", "))
    };

    let mut rings = vec![ring(&polygon.exterior().0)];
    for interior in polygon.interiors() {
        rings.push(ring(&interior.0));
    }
    // WKT with embedded commas always needs CSV quoting downstream.
    escape(format!("POLYGON ({})", rings.join(", ")))
}
