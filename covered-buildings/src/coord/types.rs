//! Coordinate and tile identifier types.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use thiserror::Error;

/// Minimum latitude representable in Web Mercator (degrees).
pub const MIN_LAT: f64 = -85.05112878;

/// Maximum latitude representable in Web Mercator (degrees).
pub const MAX_LAT: f64 = 85.05112878;

/// Minimum longitude (degrees).
pub const MIN_LON: f64 = -180.0;

/// Maximum longitude (degrees). Exactly 180.0 clamps into the last column.
pub const MAX_LON: f64 = 180.0;

/// Maximum supported zoom level.
pub const MAX_ZOOM: u8 = 18;

/// The fixed zoom level at which the building footprint dataset is tiled.
pub const DATASET_ZOOM: u8 = 9;

/// Errors from coordinate conversion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    /// Latitude outside the Web Mercator range.
    #[error("latitude {0} outside valid range [{MIN_LAT}, {MAX_LAT}]")]
    InvalidLatitude(f64),

    /// Longitude outside [-180, 180].
    #[error("longitude {0} outside valid range [{MIN_LON}, {MAX_LON}]")]
    InvalidLongitude(f64),

    /// Zoom level beyond the supported maximum.
    #[error("zoom level {0} exceeds maximum {MAX_ZOOM}")]
    InvalidZoom(u8),
}

/// A slippy-map tile position at a given zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    /// Column (x) index, 0 at the antimeridian, increasing eastward.
    pub x: u32,
    /// Row (y) index, 0 at the north edge, increasing southward.
    pub y: u32,
    /// Zoom level.
    pub zoom: u8,
}

impl TileCoord {
    /// Returns the quadkey digit string for this tile.
    ///
    /// One base-4 digit per zoom level, most significant first: each digit
    /// interleaves one bit of x (value 1) and one bit of y (value 2).
    pub fn quadkey(&self) -> String {
        let mut qk = String::with_capacity(self.zoom as usize);
        for level in (1..=self.zoom).rev() {
            let mask = 1u32 << (level - 1);
            let mut digit = 0u8;
            if self.x & mask != 0 {
                digit += 1;
            }
            if self.y & mask != 0 {
                digit += 2;
            }
            qk.push((b'0' + digit) as char);
        }
        qk
    }

    /// Returns the canonical tile identifier.
    ///
    /// The identifier is the quadkey digit string read as a decimal integer,
    /// matching the `QuadKey` column of the remote dataset index. Leading
    /// zero digits drop out of the numeric form, so two distinct tiles never
    /// collide only because the decimal rendering is shorter.
    pub fn tile_id(&self) -> TileId {
        let mut id: u64 = 0;
        for level in (1..=self.zoom).rev() {
            let mask = 1u32 << (level - 1);
            let mut digit = 0u64;
            if self.x & mask != 0 {
                digit += 1;
            }
            if self.y & mask != 0 {
                digit += 2;
            }
            id = id * 10 + digit;
        }
        TileId(id)
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Canonical identifier of a dataset tile.
///
/// This is the decimal-integer form of a zoom-9 quadkey, the key space used
/// by the remote dataset index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(u64);

impl TileId {
    /// Wraps a raw decimal quadkey value.
    pub fn from_raw(id: u64) -> Self {
        TileId(id)
    }

    /// Returns the raw decimal quadkey value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TileId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(TileId)
    }
}
