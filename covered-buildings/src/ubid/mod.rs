//! Unique Building Identifier (UBID) encoding and decoding.
//!
//! A UBID names a building by the plus code of its footprint centroid plus
//! four non-negative extent counts, `<code>-<n>-<e>-<s>-<w>`, measuring how
//! many centroid-cell heights/widths the footprint's bounding box reaches
//! in each compass direction. The identifier is resolution-addressed: two
//! surveys of the same building at the same code length produce the same
//! string even when their vertex lists differ.

use geo::{BoundingRect, Centroid};
use geo_types::{polygon, Point, Polygon, Rect};
use thiserror::Error;

mod olc;

use olc::OlcError;

/// Conventional UBID precision: an 11-character plus code (10 digits and
/// the separator), roughly a 14m x 14m centroid cell.
pub const DEFAULT_CODE_LENGTH: usize = olc::PAIR_CODE_LENGTH;

/// Finest supported precision.
pub const MAX_CODE_LENGTH: usize = olc::MAX_CODE_LENGTH;

/// Errors from identifier encoding and decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UbidError {
    /// The string is not a well-formed identifier.
    #[error("invalid identifier {code:?}: {reason}")]
    InvalidIdentifier { code: String, reason: String },

    /// The requested precision is not encodable.
    #[error("invalid code length {0}")]
    InvalidCodeLength(usize),

    /// The footprint has no computable bounding box or centroid (empty or
    /// zero-area exterior ring).
    #[error("footprint has no computable bounds or centroid")]
    DegenerateGeometry,
}

/// The area an identifier decodes to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UbidArea {
    /// Southern edge of the expanded bounding box, degrees latitude.
    pub south: f64,
    /// Western edge, degrees longitude.
    pub west: f64,
    /// Northern edge, degrees latitude.
    pub north: f64,
    /// Eastern edge, degrees longitude.
    pub east: f64,
    /// Center of the centroid cell.
    pub centroid: Point<f64>,
    /// Digit count of the embedded plus code.
    pub code_length: usize,
}

impl UbidArea {
    /// The expanded bounding box as a rectangle.
    pub fn bounds(&self) -> Rect<f64> {
        Rect::new(
            geo_types::coord! { x: self.west, y: self.south },
            geo_types::coord! { x: self.east, y: self.north },
        )
    }

    /// The expanded bounding box as a closed polygon, clockwise from the
    /// northwest corner.
    pub fn bounding_polygon(&self) -> Polygon<f64> {
        polygon![
            (x: self.west, y: self.north),
            (x: self.east, y: self.north),
            (x: self.east, y: self.south),
            (x: self.west, y: self.south),
            (x: self.west, y: self.north),
        ]
    }
}

/// Encodes an identifier from a bounding box and centroid.
///
/// The centroid must lie within the box; extents that round below zero
/// (possible when the centroid hugs an edge of its cell) clamp to zero.
pub fn encode(
    bounds: &Rect<f64>,
    centroid: Point<f64>,
    code_length: usize,
) -> Result<String, UbidError> {
    let centroid_code = olc::encode(centroid.y(), centroid.x(), code_length)?;
    let cell = olc::decode(&centroid_code).map_err(|e| internal(&centroid_code, e))?;

    let ne_code = olc::encode(bounds.max().y, bounds.max().x, code_length)?;
    let sw_code = olc::encode(bounds.min().y, bounds.min().x, code_length)?;
    let ne = olc::decode(&ne_code).map_err(|e| internal(&ne_code, e))?;
    let sw = olc::decode(&sw_code).map_err(|e| internal(&sw_code, e))?;

    let north = extent((ne.north - cell.north) / cell.height());
    let east = extent((ne.east - cell.east) / cell.width());
    let south = extent((cell.south - sw.south) / cell.height());
    let west = extent((cell.west - sw.west) / cell.width());

    Ok(format!("{centroid_code}-{north}-{east}-{south}-{west}"))
}

/// Encodes an identifier for a footprint polygon.
pub fn encode_footprint(footprint: &Polygon<f64>, code_length: usize) -> Result<String, UbidError> {
    let bounds = footprint.bounding_rect().ok_or(UbidError::DegenerateGeometry)?;
    let centroid = footprint.centroid().ok_or(UbidError::DegenerateGeometry)?;
    encode(&bounds, centroid, code_length)
}

/// Decodes an identifier back into its expanded area.
pub fn decode(ubid: &str) -> Result<UbidArea, UbidError> {
    let parts: Vec<&str> = ubid.split('-').collect();
    if parts.len() != 5 {
        return Err(UbidError::InvalidIdentifier {
            code: ubid.to_string(),
            reason: format!("expected 5 dash-separated parts, got {}", parts.len()),
        });
    }

    let cell = olc::decode(parts[0]).map_err(|e| UbidError::InvalidIdentifier {
        code: ubid.to_string(),
        reason: e.to_string(),
    })?;

    let mut extents = [0u32; 4];
    for (slot, part) in extents.iter_mut().zip(&parts[1..]) {
        *slot = part.parse().map_err(|_| UbidError::InvalidIdentifier {
            code: ubid.to_string(),
            reason: format!("extent {part:?} is not a non-negative integer"),
        })?;
    }
    let [north, east, south, west] = extents.map(f64::from);

    let area = UbidArea {
        south: cell.south - south * cell.height(),
        west: cell.west - west * cell.width(),
        north: cell.north + north * cell.height(),
        east: cell.east + east * cell.width(),
        centroid: {
            let (lat, lng) = cell.center();
            Point::new(lng, lat)
        },
        code_length: cell.code_length,
    };

    // Extents large enough to push the box off the globe are nonsense.
    if area.south < -90.0 - 1e-9
        || area.north > 90.0 + 1e-9
        || area.west < -180.0 - 1e-9
        || area.east > 180.0 + 1e-9
    {
        return Err(UbidError::InvalidIdentifier {
            code: ubid.to_string(),
            reason: "decoded area extends beyond coordinate range".to_string(),
        });
    }
    Ok(area)
}

/// Rounds a cell-unit offset to its extent count, clamping at zero.
fn extent(units: f64) -> u64 {
    let rounded = units.round();
    if rounded < 0.0 {
        0
    } else {
        rounded as u64
    }
}

fn internal(code: &str, e: OlcError) -> UbidError {
    UbidError::InvalidIdentifier {
        code: code.to_string(),
        reason: e.to_string(),
    }
}

impl From<OlcError> for UbidError {
    fn from(e: OlcError) -> Self {
        match e {
            OlcError::InvalidCodeLength(n) => UbidError::InvalidCodeLength(n),
            OlcError::Malformed(reason) => UbidError::InvalidIdentifier {
                code: String::new(),
                reason: reason.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::coord;

    fn sample_rect() -> Rect<f64> {
        Rect::new(
            coord! { x: -122.001, y: 46.0 },
            coord! { x: -122.0, y: 46.001 },
        )
    }

    #[test]
    fn test_encode_known_identifier() {
        let ubid = encode(
            &sample_rect(),
            Point::new(-122.0005, 46.0005),
            DEFAULT_CODE_LENGTH,
        )
        .unwrap();
        assert_eq!(ubid, "84RV2X2X+6R-4-4-4-4");
    }

    #[test]
    fn test_encode_footprint_matches_rect_encoding() {
        let rect = sample_rect();
        let from_rect = encode(&rect, rect.center().into(), DEFAULT_CODE_LENGTH).unwrap();
        let from_polygon =
            encode_footprint(&rect.to_polygon(), DEFAULT_CODE_LENGTH).unwrap();
        assert_eq!(from_rect, from_polygon);
    }

    #[test]
    fn test_decode_known_identifier() {
        let area = decode("84RV2X2X+6R-4-4-4-4").unwrap();
        assert_eq!(area.code_length, 10);
        assert!((area.south - 45.999999999999886).abs() < 1e-9);
        assert!((area.west - -122.00100000000005).abs() < 1e-9);
        assert!((area.north - 46.001125000000116).abs() < 1e-9);
        assert!((area.east - -121.99987499999995).abs() < 1e-9);
        assert!((area.centroid.y() - 46.0005625).abs() < 1e-9);
        assert!((area.centroid.x() - -122.0004375).abs() < 1e-9);
    }

    #[test]
    fn test_decoded_area_contains_original_box() {
        let rect = sample_rect();
        let ubid = encode(&rect, rect.center().into(), DEFAULT_CODE_LENGTH).unwrap();
        let area = decode(&ubid).unwrap();
        // The expanded box covers the footprint box up to half a cell of
        // rounding slack on each edge.
        let slack = olc::latitude_precision(DEFAULT_CODE_LENGTH) / 2.0;
        assert!(area.south <= rect.min().y + slack);
        assert!(area.west <= rect.min().x + slack);
        assert!(area.north >= rect.max().y - slack);
        assert!(area.east >= rect.max().x - slack);
    }

    #[test]
    fn test_zero_extent_building_smaller_than_cell() {
        // A footprint much smaller than the centroid cell collapses to the
        // bare cell with zero extents.
        let rect = Rect::new(
            coord! { x: 10.0000001, y: 50.0000001 },
            coord! { x: 10.0000002, y: 50.0000002 },
        );
        let ubid = encode(&rect, rect.center().into(), DEFAULT_CODE_LENGTH).unwrap();
        assert!(ubid.ends_with("-0-0-0-0"), "got {ubid}");
    }

    #[test]
    fn test_bounding_polygon_is_closed_and_clockwise_from_northwest() {
        let area = decode("84RV2X2X+6R-4-4-4-4").unwrap();
        let ring = area.bounding_polygon();
        let coords: Vec<_> = ring.exterior().coords().copied().collect();
        assert_eq!(coords.len(), 5);
        assert_eq!(coords[0], coord! { x: area.west, y: area.north });
        assert_eq!(coords[1], coord! { x: area.east, y: area.north });
        assert_eq!(coords[2], coord! { x: area.east, y: area.south });
        assert_eq!(coords[3], coord! { x: area.west, y: area.south });
        assert_eq!(coords[4], coords[0]);
    }

    #[test]
    fn test_degenerate_footprint_rejected() {
        let empty = Polygon::new(geo_types::LineString::new(vec![]), vec![]);
        assert_eq!(
            encode_footprint(&empty, DEFAULT_CODE_LENGTH),
            Err(UbidError::DegenerateGeometry)
        );
    }

    #[test]
    fn test_invalid_code_length_surfaces() {
        let rect = sample_rect();
        assert_eq!(
            encode(&rect, rect.center().into(), 3),
            Err(UbidError::InvalidCodeLength(3))
        );
    }

    #[test]
    fn test_decode_rejects_malformed_identifiers() {
        for bad in [
            "84RV2X2X+6R",            // missing extents
            "84RV2X2X+6R-4-4-4",      // too few extents
            "84RV2X2X+6R-4-4-4-4-4",  // too many extents
            "84RV2X2X+6R-4-4-4-x",    // non-numeric extent
            "84RV2X2X+6R-4--4-4-4",   // negative extent splits into empty part
            "84RVZX2X+6R-4-4-4-4",    // invalid plus-code digit
            "84RV2X2X+6R-4000000-4-4-4", // pushes past the pole
        ] {
            let err = decode(bad).unwrap_err();
            assert!(
                matches!(err, UbidError::InvalidIdentifier { .. }),
                "expected {bad:?} to be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn test_roundtrip_centroid_stays_in_cell() {
        let rect = Rect::new(
            coord! { x: 174.7858, y: -41.2732 },
            coord! { x: 174.7861, y: -41.2729 },
        );
        for code_length in [8usize, 10, 11, 12] {
            let ubid = encode(&rect, rect.center().into(), code_length).unwrap();
            let area = decode(&ubid).unwrap();
            assert!(area.south <= area.centroid.y() && area.centroid.y() <= area.north);
            assert!(area.west <= area.centroid.x() && area.centroid.x() <= area.east);
            assert_eq!(area.code_length, code_length);
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_encode_decode_covers_centroid(
                lat in -80.0..80.0f64,
                lng in -170.0..170.0f64,
                half_h in 1e-6..0.01f64,
                half_w in 1e-6..0.01f64,
            ) {
                let rect = Rect::new(
                    coord! { x: lng - half_w, y: lat - half_h },
                    coord! { x: lng + half_w, y: lat + half_h },
                );
                let ubid = encode(&rect, Point::new(lng, lat), DEFAULT_CODE_LENGTH).unwrap();
                let area = decode(&ubid).unwrap();
                prop_assert!(area.south <= lat && lat <= area.north);
                prop_assert!(area.west <= lng && lng <= area.east);
            }

            #[test]
            fn test_longer_codes_tighten_the_area(
                lat in -80.0..80.0f64,
                lng in -170.0..170.0f64,
            ) {
                let rect = Rect::new(
                    coord! { x: lng - 0.0005, y: lat - 0.0005 },
                    coord! { x: lng + 0.0005, y: lat + 0.0005 },
                );
                let mut previous = f64::INFINITY;
                for code_length in [8usize, 10, 12, 15] {
                    let ubid = encode(&rect, Point::new(lng, lat), code_length).unwrap();
                    let area = decode(&ubid).unwrap();
                    let size = area.north - area.south;
                    // Finer centroid cells can only shrink the rounding
                    // slack around the fixed footprint box.
                    prop_assert!(size <= previous + 1e-9);
                    previous = size;
                }
            }
        }
    }
}
