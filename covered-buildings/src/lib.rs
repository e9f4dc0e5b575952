//! Covered Buildings - building footprint resolution and UBID encoding
//!
//! This library resolves geographic point locations (typically geocoded
//! building addresses) to building footprint polygons from the globally
//! tiled Microsoft Building Footprints dataset, and derives a UBID
//! (Unique Building Identifier) string for each matched footprint.
//!
//! The pipeline for a single point:
//!
//! 1. [`coord`] maps the coordinate to the zoom-9 dataset tile (quadkey).
//! 2. [`index`] maps the tile to its remote dataset URL via the
//!    periodically refreshed `dataset-links.csv` index.
//! 3. [`cache`] downloads the tile's gzipped GeoJSONL file when stale and
//!    loads it into memory at most once per run.
//! 4. [`matcher`] picks the footprint containing the point, falling back
//!    to the geometrically nearest one.
//! 5. [`ubid`] encodes the footprint's bounding box and centroid into a
//!    UBID string, and decodes such strings back into geometry.
//!
//! [`pipeline::Resolver`] wires these together for batch processing;
//! [`geocode`] and [`output`] are the address-in / file-out adapters
//! around the core.

pub mod cache;
pub mod coord;
pub mod dataset;
mod error;
pub mod geocode;
pub mod index;
pub mod matcher;
pub mod output;
pub mod pipeline;
pub mod transport;
pub mod ubid;

pub use error::{ResolveError, ResolveResult};
