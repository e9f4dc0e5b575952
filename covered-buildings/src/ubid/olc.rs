//! Open Location Code transcoding.
//!
//! Integer-based encode/decode of the fixed-alphabet plus-code grid, the
//! pair-code prefix and grid-refinement suffix that UBID strings are built
//! from. Internal to the `ubid` module: no other component constructs or
//! destructures these strings.
//!
//! Coordinates are scaled to integer grid units (1/25,000,000 degree of
//! latitude, 1/8,192,000 degree of longitude at full 15-digit precision) so
//! the digit arithmetic is exact; floats only appear at the degree
//! boundary.

use thiserror::Error;

/// The 20-character code alphabet.
const ALPHABET: &[u8; 20] = b"23456789CFGHJMPQRVWX";

/// Separator between the 8-character prefix and the refinement suffix.
const SEPARATOR: char = '+';

/// Position of the separator in a full code.
const SEPARATOR_POSITION: usize = 8;

/// Padding character for codes shorter than the separator position.
const PADDING: char = '0';

/// Digit count of a standard pair code (the conventional precision).
pub(super) const PAIR_CODE_LENGTH: usize = 10;

/// Maximum digit count (pair code plus five grid refinements).
pub(super) const MAX_CODE_LENGTH: usize = 15;

const GRID_CODE_LENGTH: usize = MAX_CODE_LENGTH - PAIR_CODE_LENGTH;
const GRID_ROWS: i64 = 5;
const GRID_COLUMNS: i64 = 4;
const LATITUDE_MAX: f64 = 90.0;
const LONGITUDE_MAX: f64 = 180.0;

/// Integer grid units per degree at full precision.
const LAT_PRECISION: i64 = 8000 * 3125; // 5^5 grid rows below the pairs
const LNG_PRECISION: i64 = 8000 * 1024; // 4^5 grid columns below the pairs

/// Grid units spanned by the finest pair digit.
const LAT_PAIR_UNIT: i64 = 3125;
const LNG_PAIR_UNIT: i64 = 1024;

/// Errors from code transcoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(super) enum OlcError {
    /// Requested precision is not encodable (too short, or an odd pair
    /// length).
    #[error("invalid code length {0}")]
    InvalidCodeLength(usize),

    /// The code string is not a valid full code.
    #[error("{0}")]
    Malformed(&'static str),
}

/// The grid cell a code decodes to, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct CodeArea {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
    pub code_length: usize,
}

impl CodeArea {
    /// Center point of the cell as (latitude, longitude).
    pub fn center(&self) -> (f64, f64) {
        (
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }

    /// Cell height in degrees of latitude.
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Cell width in degrees of longitude.
    pub fn width(&self) -> f64 {
        self.east - self.west
    }
}

/// Encodes a location at the given precision.
pub(super) fn encode(lat: f64, lng: f64, code_length: usize) -> Result<String, OlcError> {
    if code_length < 2 || (code_length < PAIR_CODE_LENGTH && code_length % 2 == 1) {
        return Err(OlcError::InvalidCodeLength(code_length));
    }
    let code_length = code_length.min(MAX_CODE_LENGTH);

    let mut lat = lat.clamp(-LATITUDE_MAX, LATITUDE_MAX);
    let lng = normalize_longitude(lng);
    // The north pole sits on a cell boundary: nudge it into the last row.
    if lat == LATITUDE_MAX {
        lat -= latitude_precision(code_length);
    }

    let mut lat_val = to_units(lat + LATITUDE_MAX, LAT_PRECISION);
    let mut lng_val = to_units(lng + LONGITUDE_MAX, LNG_PRECISION);

    // Digits are produced least significant first and reversed at the end.
    let mut digits: Vec<u8> = Vec::with_capacity(MAX_CODE_LENGTH);
    if code_length > PAIR_CODE_LENGTH {
        for _ in 0..GRID_CODE_LENGTH {
            let row = lat_val % GRID_ROWS;
            let col = lng_val % GRID_COLUMNS;
            digits.push(ALPHABET[(row * GRID_COLUMNS + col) as usize]);
            lat_val /= GRID_ROWS;
            lng_val /= GRID_COLUMNS;
        }
    } else {
        lat_val /= GRID_ROWS.pow(GRID_CODE_LENGTH as u32);
        lng_val /= GRID_COLUMNS.pow(GRID_CODE_LENGTH as u32);
    }
    for _ in 0..PAIR_CODE_LENGTH / 2 {
        digits.push(ALPHABET[(lng_val % 20) as usize]);
        digits.push(ALPHABET[(lat_val % 20) as usize]);
        lat_val /= 20;
        lng_val /= 20;
    }
    digits.reverse();

    let mut code = String::with_capacity(code_length + 1);
    if code_length >= SEPARATOR_POSITION {
        for (i, &b) in digits.iter().take(code_length).enumerate() {
            if i == SEPARATOR_POSITION {
                code.push(SEPARATOR);
            }
            code.push(b as char);
        }
        if code_length == SEPARATOR_POSITION {
            code.push(SEPARATOR);
        }
    } else {
        for &b in digits.iter().take(code_length) {
            code.push(b as char);
        }
        for _ in code_length..SEPARATOR_POSITION {
            code.push(PADDING);
        }
        code.push(SEPARATOR);
    }
    Ok(code)
}

/// Decodes a full code into its grid cell.
pub(super) fn decode(code: &str) -> Result<CodeArea, OlcError> {
    let upper = code.trim().to_ascii_uppercase();

    let sep_index = match upper.find(SEPARATOR) {
        Some(i) => i,
        None => return Err(OlcError::Malformed("missing separator")),
    };
    if upper.rfind(SEPARATOR) != Some(sep_index) {
        return Err(OlcError::Malformed("more than one separator"));
    }
    if sep_index != SEPARATOR_POSITION {
        return Err(OlcError::Malformed("separator not at a full-code position"));
    }

    let head = &upper[..sep_index];
    let tail = &upper[sep_index + 1..];
    if tail.len() == 1 {
        return Err(OlcError::Malformed("single digit after separator"));
    }

    // Padding may only appear as one contiguous run ending at the
    // separator, leaving at least one full pair, with nothing after.
    let unpadded = match head.find(PADDING) {
        Some(pad_start) => {
            if pad_start < 2 || pad_start % 2 == 1 {
                return Err(OlcError::Malformed("padding breaks a digit pair"));
            }
            if head[pad_start..].chars().any(|c| c != PADDING) {
                return Err(OlcError::Malformed("digits after padding"));
            }
            if !tail.is_empty() {
                return Err(OlcError::Malformed("suffix on a padded code"));
            }
            &head[..pad_start]
        }
        None => head,
    };

    let mut digits: Vec<i64> = Vec::with_capacity(MAX_CODE_LENGTH);
    for c in unpadded.chars().chain(tail.chars()) {
        match ALPHABET.iter().position(|&b| b as char == c) {
            Some(v) => digits.push(v as i64),
            None => return Err(OlcError::Malformed("character outside code alphabet")),
        }
    }
    // Extra precision beyond the supported maximum is ignored.
    digits.truncate(MAX_CODE_LENGTH);

    if digits[0] >= 9 {
        return Err(OlcError::Malformed("latitude digit out of range"));
    }
    if digits.len() > 1 && digits[1] >= 18 {
        return Err(OlcError::Malformed("longitude digit out of range"));
    }

    let mut lat_units: i64 = 0;
    let mut lng_units: i64 = 0;
    let pairs = digits.len().min(PAIR_CODE_LENGTH) / 2;
    for p in 0..pairs {
        let place = 20i64.pow((4 - p) as u32);
        lat_units += digits[2 * p] * LAT_PAIR_UNIT * place;
        lng_units += digits[2 * p + 1] * LNG_PAIR_UNIT * place;
    }
    let mut lat_cell = LAT_PAIR_UNIT * 20i64.pow((5 - pairs) as u32);
    let mut lng_cell = LNG_PAIR_UNIT * 20i64.pow((5 - pairs) as u32);

    if digits.len() > PAIR_CODE_LENGTH {
        for (j, &d) in digits[PAIR_CODE_LENGTH..].iter().enumerate() {
            let lat_place = GRID_ROWS.pow((GRID_CODE_LENGTH - 1 - j) as u32);
            let lng_place = GRID_COLUMNS.pow((GRID_CODE_LENGTH - 1 - j) as u32);
            lat_units += (d / GRID_COLUMNS) * lat_place;
            lng_units += (d % GRID_COLUMNS) * lng_place;
            lat_cell = lat_place;
            lng_cell = lng_place;
        }
    }

    Ok(CodeArea {
        south: lat_units as f64 / LAT_PRECISION as f64 - LATITUDE_MAX,
        west: lng_units as f64 / LNG_PRECISION as f64 - LONGITUDE_MAX,
        north: (lat_units + lat_cell) as f64 / LAT_PRECISION as f64 - LATITUDE_MAX,
        east: (lng_units + lng_cell) as f64 / LNG_PRECISION as f64 - LONGITUDE_MAX,
        code_length: digits.len(),
    })
}

/// Degrees of latitude spanned by one cell at the given precision.
pub(super) fn latitude_precision(code_length: usize) -> f64 {
    if code_length <= PAIR_CODE_LENGTH {
        20f64.powi(2 - (code_length as i32) / 2)
    } else {
        20f64.powi(-3) / 5f64.powi(code_length as i32 - PAIR_CODE_LENGTH as i32)
    }
}

/// Scales degrees to integer grid units. The multiply-round-divide keeps
/// values a hair below a cell boundary from landing in the next cell.
fn to_units(degrees: f64, precision: i64) -> i64 {
    ((degrees * precision as f64 * 1e6).round() as i64) / 1_000_000
}

fn normalize_longitude(mut lng: f64) -> f64 {
    while lng < -LONGITUDE_MAX {
        lng += 360.0;
    }
    while lng >= LONGITUDE_MAX {
        lng -= 360.0;
    }
    lng
}

#[cfg(test)]
mod tests {
    use super::*;

    // Vectors from the Open Location Code reference test data.
    #[test]
    fn test_encode_reference_vectors() {
        assert_eq!(encode(47.0000625, 8.0000625, 10).unwrap(), "8FVC2222+22");
        assert_eq!(encode(20.3701125, 2.782234375, 10).unwrap(), "7FG49QCJ+2V");
        assert_eq!(
            encode(20.3701125, 2.782234375, 11).unwrap(),
            "7FG49QCJ+2VX"
        );
        assert_eq!(
            encode(-41.2730625, 174.7859375, 10).unwrap(),
            "4VCPPQGP+Q9"
        );
    }

    #[test]
    fn test_encode_padded_code() {
        assert_eq!(encode(20.375, 2.775, 6).unwrap(), "7FG49Q00+");
    }

    #[test]
    fn test_encode_north_pole_clips_into_grid() {
        assert_eq!(encode(90.0, 1.0, 4).unwrap(), "CFX30000+");
    }

    #[test]
    fn test_encode_rejects_bad_lengths() {
        assert_eq!(encode(0.0, 0.0, 1), Err(OlcError::InvalidCodeLength(1)));
        assert_eq!(encode(0.0, 0.0, 9), Err(OlcError::InvalidCodeLength(9)));
        // Beyond the maximum clamps rather than failing.
        assert_eq!(encode(0.0, 0.0, 32).unwrap().len(), MAX_CODE_LENGTH + 1);
    }

    #[test]
    fn test_decode_reference_vector() {
        let area = decode("7FG49QCJ+2V").unwrap();
        assert!((area.south - 20.37).abs() < 1e-10);
        assert!((area.west - 2.782125).abs() < 1e-10);
        assert!((area.north - 20.370125).abs() < 1e-10);
        assert!((area.east - 2.78225).abs() < 1e-10);
        assert_eq!(area.code_length, 10);
    }

    #[test]
    fn test_decode_grid_refinement_vector() {
        let area = decode("7FG49QCJ+2VX").unwrap();
        assert!((area.south - 20.3701).abs() < 1e-10);
        assert!((area.north - 20.370125).abs() < 1e-10);
        assert_eq!(area.code_length, 11);
    }

    #[test]
    fn test_decode_padded_vector() {
        let area = decode("7FG49Q00+").unwrap();
        assert!((area.south - 20.35).abs() < 1e-10);
        assert!((area.west - 2.75).abs() < 1e-10);
        assert!((area.north - 20.40).abs() < 1e-10);
        assert!((area.east - 2.80).abs() < 1e-10);
    }

    #[test]
    fn test_decode_rejects_malformed_codes() {
        for bad in [
            "7FG49QCJ2V",    // no separator
            "7FG49+QCJ2V",   // separator too early (short code)
            "7FG49QCJ+2V+",  // duplicate separator
            "7FG49QAJ+2V",   // 'A' outside the alphabet
            "FFG49QCJ+2V",   // first latitude digit out of range
            "7XG49QCJ+2V",   // first longitude digit out of range
            "7FG49QCJ+2",    // single digit after separator
            "7FG00QCJ+",     // digits after padding
            "7FG49Q00+2V",   // suffix on a padded code
        ] {
            assert!(decode(bad).is_err(), "expected {bad:?} to be rejected");
        }
    }

    #[test]
    fn test_decode_is_case_insensitive() {
        assert_eq!(decode("7fg49qcj+2v").unwrap(), decode("7FG49QCJ+2V").unwrap());
    }

    #[test]
    fn test_latitude_precision_table() {
        assert_eq!(latitude_precision(2), 20.0);
        assert_eq!(latitude_precision(4), 1.0);
        assert_eq!(latitude_precision(6), 0.05);
        assert_eq!(latitude_precision(8), 0.0025);
        assert_eq!(latitude_precision(10), 0.000125);
        assert!((latitude_precision(11) - 0.000025).abs() < 1e-18);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn code_lengths() -> impl Strategy<Value = usize> {
            prop::sample::select(vec![4usize, 6, 8, 10, 11, 12, 13, 14, 15])
        }

        proptest! {
            #[test]
            fn test_roundtrip_contains_point(
                lat in -90.0..90.0f64,
                lng in -180.0..180.0f64,
                code_length in code_lengths(),
            ) {
                let code = encode(lat, lng, code_length).unwrap();
                let area = decode(&code).unwrap();
                // The decoded cell must contain the encoded point, modulo
                // the one-unit float slack at cell edges.
                let lat_slack = 1.0 / (8000.0 * 3125.0);
                let lng_slack = 1.0 / (8000.0 * 1024.0);
                prop_assert!(area.south - lat_slack <= lat && lat < area.north + lat_slack);
                prop_assert!(area.west - lng_slack <= lng && lng < area.east + lng_slack);
            }

            #[test]
            fn test_cell_size_matches_precision(
                lat in -89.0..89.0f64,
                lng in -179.0..179.0f64,
                code_length in code_lengths(),
            ) {
                let code = encode(lat, lng, code_length).unwrap();
                let area = decode(&code).unwrap();
                let expected = latitude_precision(code_length);
                prop_assert!((area.height() - expected).abs() < 1e-12);
            }

            #[test]
            fn test_longer_codes_never_grow(
                lat in -89.0..89.0f64,
                lng in -179.0..179.0f64,
            ) {
                let mut previous = f64::INFINITY;
                for code_length in [4usize, 6, 8, 10, 11, 12, 13, 14, 15] {
                    let area = decode(&encode(lat, lng, code_length).unwrap()).unwrap();
                    prop_assert!(area.height() <= previous);
                    previous = area.height();
                }
            }
        }
    }
}
