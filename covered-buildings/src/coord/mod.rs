//! Coordinate conversion module
//!
//! Provides the conversion from geographic coordinates (latitude/longitude,
//! WGS84) to the Web Mercator tile grid used to shard the building footprint
//! dataset, and the quadkey-derived tile identifiers that key the remote
//! dataset index.

mod types;

pub use types::{
    CoordError, TileCoord, TileId, DATASET_ZOOM, MAX_LAT, MAX_LON, MAX_ZOOM, MIN_LAT, MIN_LON,
};

use std::f64::consts::PI;

/// Converts geographic coordinates to tile coordinates.
///
/// Implements the standard slippy-map tiling scheme, bit-for-bit compatible
/// with the scheme used to key the remote dataset index: any deviation would
/// silently break every downstream tile lookup.
///
/// Boundary convention: the projection floors, so a coordinate exactly on a
/// tile's east or south edge belongs to the tile east/south of the edge.
/// The extremes of the valid range clamp into the grid: longitude 180.0
/// lands in the last column and the south Mercator edge in the last row, so
/// the grid fully covers the valid range without overlap.
///
/// # Arguments
///
/// * `lat` - Latitude in degrees (-85.05112878 to 85.05112878)
/// * `lon` - Longitude in degrees (-180.0 to 180.0)
/// * `zoom` - Zoom level (0 to 18)
pub fn to_tile(lat: f64, lon: f64, zoom: u8) -> Result<TileCoord, CoordError> {
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(MIN_LON..=MAX_LON).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }

    let n = 2.0_f64.powi(zoom as i32);
    let max_index = (n as u32).saturating_sub(1);

    let x = (((lon + 180.0) / 360.0 * n) as u32).min(max_index);

    let lat_rad = lat * PI / 180.0;
    let y = ((((1.0 - lat_rad.tan().asinh() / PI) / 2.0) * n) as u32).min(max_index);

    Ok(TileCoord { x, y, zoom })
}

/// Converts tile coordinates back to geographic coordinates.
///
/// Returns the latitude/longitude of the tile's northwest corner.
pub fn tile_to_lat_lon(tile: &TileCoord) -> (f64, f64) {
    let n = 2.0_f64.powi(tile.zoom as i32);

    let lon = tile.x as f64 / n * 360.0 - 180.0;

    let y = tile.y as f64 / n;
    let lat_rad = (PI * (1.0 - 2.0 * y)).sinh().atan();
    let lat = lat_rad * 180.0 / PI;

    (lat, lon)
}

/// Convenience: the dataset tile identifier for a coordinate at zoom 9.
pub fn dataset_tile_id(lat: f64, lon: f64) -> Result<TileId, CoordError> {
    Ok(to_tile(lat, lon, DATASET_ZOOM)?.tile_id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denver_area_at_dataset_zoom() {
        // (-105.5, 40.0) lands in tile (105, 193) at zoom 9,
        // quadkey 023101003.
        let tile = to_tile(40.0, -105.5, 9).unwrap();
        assert_eq!(tile.x, 105);
        assert_eq!(tile.y, 193);
        assert_eq!(tile.tile_id(), TileId::from_raw(23101003));
    }

    #[test]
    fn test_santa_monica_at_dataset_zoom() {
        let tile = to_tile(34.01, -118.49, 9).unwrap();
        assert_eq!((tile.x, tile.y), (87, 204));
        assert_eq!(tile.tile_id(), TileId::from_raw(23012311));
    }

    #[test]
    fn test_new_york_city_at_dataset_zoom() {
        let id = dataset_tile_id(40.7128, -74.0060).unwrap();
        assert_eq!(id, TileId::from_raw(32010110));
    }

    #[test]
    fn test_boundary_assigned_east_and_south() {
        // Tile edges at zoom 9 fall every 360/512 = 0.703125 degrees of
        // longitude. A point exactly on an edge belongs to the east tile;
        // the equator row boundary belongs to the south tile.
        let on_edge = to_tile(0.0, 0.0, 9).unwrap();
        assert_eq!((on_edge.x, on_edge.y), (256, 256));

        let west_of_edge = to_tile(0.0, -0.703125, 9).unwrap();
        assert_eq!(west_of_edge.x, 255);

        let north_of_equator = to_tile(1e-9, 0.0, 9).unwrap();
        assert_eq!(north_of_equator.y, 255);
    }

    #[test]
    fn test_longitude_180_clamps_to_last_column() {
        let tile = to_tile(0.0, 180.0, 9).unwrap();
        assert_eq!(tile.x, 511);
    }

    #[test]
    fn test_invalid_latitude() {
        let result = to_tile(90.0, 0.0, 9);
        assert!(matches!(result, Err(CoordError::InvalidLatitude(_))));
    }

    #[test]
    fn test_invalid_longitude() {
        let result = to_tile(0.0, 181.0, 9);
        assert!(matches!(result, Err(CoordError::InvalidLongitude(_))));
    }

    #[test]
    fn test_invalid_zoom() {
        let result = to_tile(0.0, 0.0, 19);
        assert!(matches!(result, Err(CoordError::InvalidZoom(19))));
    }

    #[test]
    fn test_tile_to_lat_lon_northwest_corner() {
        let tile = TileCoord {
            x: 256,
            y: 256,
            zoom: 9,
        };
        let (lat, lon) = tile_to_lat_lon(&tile);
        assert!(lat.abs() < 1e-9, "northwest corner should sit on the equator");
        assert!(lon.abs() < 1e-9, "northwest corner should sit on the prime meridian");
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_tiling_deterministic(
                lat in MIN_LAT..MAX_LAT,
                lon in MIN_LON..MAX_LON,
            ) {
                // Same coordinate, same tile, same identifier.
                let a = to_tile(lat, lon, DATASET_ZOOM)?;
                let b = to_tile(lat, lon, DATASET_ZOOM)?;
                prop_assert_eq!(a, b);
                prop_assert_eq!(a.tile_id(), b.tile_id());
            }

            #[test]
            fn test_tile_coords_in_bounds(
                lat in MIN_LAT..MAX_LAT,
                lon in MIN_LON..MAX_LON,
                zoom in 0u8..=MAX_ZOOM,
            ) {
                let tile = to_tile(lat, lon, zoom)?;
                let max_tile = 2u32.pow(zoom as u32);
                prop_assert!(tile.x < max_tile);
                prop_assert!(tile.y < max_tile);
            }

            #[test]
            fn test_point_within_tile_bounds(
                // Strictly inside the Mercator range so the south-edge
                // clamp at exactly MIN_LAT does not apply.
                lat in -85.0..85.0f64,
                lon in MIN_LON..MAX_LON,
            ) {
                // Every coordinate inside a tile's bounds resolves to that
                // tile: the northwest corner of the resolved tile must be
                // north-west of (or on) the point, and the next tile's
                // corner past it.
                let tile = to_tile(lat, lon, DATASET_ZOOM)?;
                let (nw_lat, nw_lon) = tile_to_lat_lon(&tile);
                let (se_lat, se_lon) = tile_to_lat_lon(&TileCoord {
                    x: tile.x + 1,
                    y: tile.y + 1,
                    zoom: tile.zoom,
                });
                prop_assert!(nw_lon <= lon && lon < se_lon);
                prop_assert!(se_lat < lat && lat <= nw_lat);
            }

            #[test]
            fn test_quadkey_roundtrips_through_decimal(
                x in 0u32..512,
                y in 0u32..512,
            ) {
                // The decimal tile id re-rendered as digits equals the
                // quadkey with leading zeros stripped.
                let tile = TileCoord { x, y, zoom: DATASET_ZOOM };
                let qk = tile.quadkey();
                let id = tile.tile_id().to_string();
                prop_assert_eq!(qk.trim_start_matches('0'), if id == "0" { "" } else { id.as_str() });
            }
        }
    }
}
