//! Point-to-footprint matching.
//!
//! The two-phase rule this module implements is the correctness-critical
//! core of the pipeline:
//!
//! 1. containment pass: the first footprint, in dataset iteration order,
//!    whose polygon the point intersects wins ([`MatchKind::Intersecting`]);
//! 2. nearest pass: with no containment, the footprint at minimum planar
//!    distance wins ([`MatchKind::Nearest`]), ties again broken by
//!    iteration order.
//!
//! Both tie-breaks are deliberate, documented behavior, not an
//! optimization: a spatial index that returned a different-but-also-valid
//! footprint would silently change outputs. Containment counts boundary
//! touches as intersecting, matching the source data pipeline's join
//! semantics.

use std::fmt;

use geo::{EuclideanDistance, Intersects};
use geo_types::Point;

use crate::dataset::{Footprint, TileDataset};

/// How a footprint was selected for a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// The point falls inside (or on the boundary of) the footprint.
    Intersecting,
    /// No footprint contains the point; the geometrically closest was
    /// chosen.
    Nearest,
}

impl fmt::Display for MatchKind {
    /// Renders the source pipeline's quality-report vocabulary.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchKind::Intersecting => write!(f, "intersection"),
            MatchKind::Nearest => write!(f, "closest"),
        }
    }
}

/// Result of matching one point against one tile dataset.
#[derive(Debug)]
pub struct FootprintMatch<'a> {
    /// The winning footprint.
    pub footprint: &'a Footprint,

    /// How it was selected.
    pub kind: MatchKind,

    /// Planar distance from the point to the footprint, in degrees.
    /// Zero for intersecting matches.
    pub distance_deg: f64,
}

/// Matches a point against a dataset.
///
/// Returns `None` only for an empty dataset; any non-empty dataset yields
/// exactly one match.
pub fn match_point<'a>(point: &Point<f64>, dataset: &'a TileDataset) -> Option<FootprintMatch<'a>> {
    let footprints = dataset.footprints();

    // Containment pass: first match in iteration order wins.
    for footprint in footprints {
        if footprint.geometry.intersects(point) {
            return Some(FootprintMatch {
                footprint,
                kind: MatchKind::Intersecting,
                distance_deg: 0.0,
            });
        }
    }

    // Nearest pass: strict less-than keeps the first of equal distances.
    let mut best: Option<(&Footprint, f64)> = None;
    for footprint in footprints {
        let distance = footprint.geometry.euclidean_distance(point);
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((footprint, distance));
        }
    }

    best.map(|(footprint, distance_deg)| FootprintMatch {
        footprint,
        kind: MatchKind::Nearest,
        distance_deg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::TileId;
    use geo_types::{polygon, Polygon};

    fn square(min_x: f64, min_y: f64, size: f64) -> Polygon<f64> {
        polygon![
            (x: min_x, y: min_y),
            (x: min_x + size, y: min_y),
            (x: min_x + size, y: min_y + size),
            (x: min_x, y: min_y + size),
            (x: min_x, y: min_y),
        ]
    }

    fn dataset(polygons: Vec<(Polygon<f64>, Option<f64>)>) -> TileDataset {
        TileDataset::from_footprints(
            TileId::from_raw(1),
            polygons
                .into_iter()
                .map(|(geometry, height)| Footprint { geometry, height })
                .collect(),
        )
    }

    #[test]
    fn test_point_inside_is_intersecting() {
        let ds = dataset(vec![
            (square(0.0, 0.0, 1.0), Some(10.0)),
            (square(5.0, 5.0, 1.0), None),
        ]);
        let m = match_point(&Point::new(0.5, 0.5), &ds).unwrap();
        assert_eq!(m.kind, MatchKind::Intersecting);
        assert_eq!(m.distance_deg, 0.0);
        assert_eq!(m.footprint.height, Some(10.0));
    }

    #[test]
    fn test_point_outside_takes_nearest() {
        // Point at (3, 0.5): distance 2 to the first square's east edge,
        // distance ~2.9 to the second square.
        let ds = dataset(vec![
            (square(0.0, 0.0, 1.0), Some(1.0)),
            (square(5.0, 0.0, 1.0), Some(2.0)),
        ]);
        let m = match_point(&Point::new(3.0, 0.5), &ds).unwrap();
        assert_eq!(m.kind, MatchKind::Nearest);
        assert_eq!(m.footprint.height, Some(1.0));
        assert!((m.distance_deg - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_nearest_reports_true_minimum_distance() {
        let ds = dataset(vec![
            (square(10.0, 10.0, 1.0), None),
            (square(0.0, 2.0, 1.0), None),
            (square(0.0, 7.0, 1.0), None),
        ]);
        let m = match_point(&Point::new(0.5, 0.0), &ds).unwrap();
        assert_eq!(m.kind, MatchKind::Nearest);
        assert!((m.distance_deg - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_containment_tie_takes_first_in_order() {
        // Two identical overlapping footprints: the first in dataset
        // order wins.
        let ds = dataset(vec![
            (square(0.0, 0.0, 1.0), Some(1.0)),
            (square(0.0, 0.0, 1.0), Some(2.0)),
        ]);
        let m = match_point(&Point::new(0.5, 0.5), &ds).unwrap();
        assert_eq!(m.footprint.height, Some(1.0));
    }

    #[test]
    fn test_nearest_tie_takes_first_in_order() {
        // Two squares equidistant from the point.
        let ds = dataset(vec![
            (square(2.0, 0.0, 1.0), Some(1.0)),
            (square(-3.0, 0.0, 1.0), Some(2.0)),
        ]);
        let m = match_point(&Point::new(0.0, 0.5), &ds).unwrap();
        assert_eq!(m.kind, MatchKind::Nearest);
        assert_eq!(m.footprint.height, Some(1.0));
    }

    #[test]
    fn test_boundary_touch_counts_as_intersecting() {
        let ds = dataset(vec![(square(0.0, 0.0, 1.0), None)]);
        let m = match_point(&Point::new(1.0, 0.5), &ds).unwrap();
        assert_eq!(m.kind, MatchKind::Intersecting);
    }

    #[test]
    fn test_empty_dataset_yields_no_match() {
        let ds = dataset(vec![]);
        assert!(match_point(&Point::new(0.0, 0.0), &ds).is_none());
    }

    #[test]
    fn test_match_kind_display() {
        assert_eq!(MatchKind::Intersecting.to_string(), "intersection");
        assert_eq!(MatchKind::Nearest.to_string(), "closest");
    }
}
