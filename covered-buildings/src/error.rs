//! Library-wide error taxonomy.
//!
//! Each variant distinguishes a recoverable-vs-fatal condition for the
//! caller: index refresh failures degrade to a stale local copy inside
//! [`crate::index::TileIndex::refresh`], while everything surfaced here is
//! fatal for the affected point or tile and carries enough context (tile
//! id, path, cause) to diagnose without re-running the pipeline.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::coord::{CoordError, TileId};
use crate::dataset::DatasetError;
use crate::transport::TransportError;
use crate::ubid::UbidError;

/// Result type for resolution operations.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Errors that can occur while resolving points to footprints.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The remote tile index could not be fetched and no local copy exists.
    #[error("tile index unavailable: {reason}")]
    IndexUnavailable { reason: String },

    /// The tile id has no row in the dataset index.
    #[error("tile {tile} not found in the dataset index")]
    TileNotIndexed { tile: TileId },

    /// The tile id has more than one row in the dataset index.
    #[error("tile {tile} has {count} index entries, expected exactly one")]
    AmbiguousIndexEntry { tile: TileId, count: usize },

    /// The tile's dataset file could not be decompressed or parsed.
    ///
    /// Fatal for every point in the tile; no partial-record recovery is
    /// attempted.
    #[error("failed to load tile {tile}")]
    TileLoadError {
        tile: TileId,
        #[source]
        source: DatasetError,
    },

    /// The tile loaded but contains no footprints to match against.
    #[error("tile {tile} contains no footprints")]
    NoFootprintsInTile { tile: TileId },

    /// A coordinate was outside the tiling scheme's valid range.
    #[error(transparent)]
    Coord(#[from] CoordError),

    /// An identifier could not be encoded or decoded.
    #[error(transparent)]
    Identifier(#[from] UbidError),

    /// An HTTP transfer failed.
    #[error(transparent)]
    Http(#[from] TransportError),

    /// A local filesystem operation failed.
    #[error("I/O error at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
