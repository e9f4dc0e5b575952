//! End-to-end resolution pipeline.
//!
//! [`Resolver`] wires the stages together: coordinate → tile id → cached
//! tile dataset → footprint match → identifier. Construction refreshes the
//! remote index once; resolution is then parallel at the point level, with
//! points in the same tile serializing only on that tile's first load.

use std::path::PathBuf;
use std::sync::Arc;

use geo_types::{Point, Polygon};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::cache::{TileCache, TileCacheConfig, DEFAULT_MAX_DOWNLOADS};
use crate::coord::{self, TileId};
use crate::error::{ResolveError, ResolveResult};
use crate::index::{IndexRefresh, TileIndex, DATASET_LINKS_URL};
use crate::matcher::{self, MatchKind};
use crate::transport::Transport;
use crate::ubid;

/// Subdirectory of the data directory holding downloaded tile files.
const TILE_SUBDIR: &str = "quadkeys";

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Root data directory; the index lands here, tiles in a subdirectory.
    pub data_dir: PathBuf,

    /// Remote index URL.
    pub index_url: String,

    /// Identifier precision (plus-code digit count).
    pub code_length: usize,

    /// Cap on concurrent tile downloads.
    pub max_downloads: usize,
}

impl ResolverConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            index_url: DATASET_LINKS_URL.to_string(),
            code_length: ubid::DEFAULT_CODE_LENGTH,
            max_downloads: DEFAULT_MAX_DOWNLOADS,
        }
    }

    pub fn with_index_url(mut self, url: impl Into<String>) -> Self {
        self.index_url = url.into();
        self
    }

    pub fn with_code_length(mut self, code_length: usize) -> Self {
        self.code_length = code_length;
        self
    }

    pub fn with_max_downloads(mut self, max_downloads: usize) -> Self {
        self.max_downloads = max_downloads;
        self
    }
}

/// One resolved building: the matched footprint and its identifier.
#[derive(Debug, Clone)]
pub struct ResolvedBuilding {
    /// Tile the footprint came from.
    pub tile: TileId,

    /// The matched footprint polygon.
    pub footprint: Polygon<f64>,

    /// Building height in meters, when the dataset knows it.
    pub height: Option<f64>,

    /// Whether the point was inside the footprint or merely closest to it.
    pub match_kind: MatchKind,

    /// Planar distance from the point to the footprint, in degrees. Zero
    /// for intersecting matches.
    pub distance_deg: f64,

    /// The building's identifier.
    pub ubid: String,
}

/// Pipeline front end. Owns the refreshed index and the tile cache for one
/// run; shared across worker threads by reference.
pub struct Resolver {
    cache: TileCache,
    code_length: usize,
}

impl Resolver {
    /// Builds a resolver, refreshing the tile index up front.
    ///
    /// Index refresh failures degrade to a cached local copy when one
    /// exists; the returned [`IndexRefresh`] says which path was taken.
    pub fn new(
        config: ResolverConfig,
        transport: Arc<dyn Transport>,
    ) -> ResolveResult<(Self, IndexRefresh)> {
        let (index, outcome) =
            TileIndex::refresh(transport.as_ref(), &config.data_dir, &config.index_url)?;
        info!(tiles = index.len(), ?outcome, "tile index ready");

        let cache_config = TileCacheConfig::new(config.data_dir.join(TILE_SUBDIR))
            .with_max_downloads(config.max_downloads);
        let cache = TileCache::new(cache_config, index, transport);

        Ok((
            Self {
                cache,
                code_length: config.code_length,
            },
            outcome,
        ))
    }

    /// The tile cache backing this resolver.
    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    /// Resolves a single point to a building.
    pub fn resolve_point(&self, lat: f64, lon: f64) -> ResolveResult<ResolvedBuilding> {
        let tile = coord::dataset_tile_id(lat, lon)?;
        let dataset = self.cache.load(tile)?;

        let point = Point::new(lon, lat);
        let matched = matcher::match_point(&point, &dataset)
            .ok_or(ResolveError::NoFootprintsInTile { tile })?;
        debug!(
            %tile,
            kind = %matched.kind,
            distance = matched.distance_deg,
            "matched footprint"
        );

        let ubid = ubid::encode_footprint(&matched.footprint.geometry, self.code_length)?;
        Ok(ResolvedBuilding {
            tile,
            footprint: matched.footprint.geometry.clone(),
            height: matched.footprint.height,
            match_kind: matched.kind,
            distance_deg: matched.distance_deg,
            ubid,
        })
    }

    /// Resolves all points in parallel, preserving input order.
    ///
    /// Per-point failures are returned in place and never abort the other
    /// points.
    pub fn resolve_all(
        &self,
        points: &[(f64, f64)],
    ) -> Vec<ResolveResult<ResolvedBuilding>> {
        points
            .par_iter()
            .map(|&(lat, lon)| self.resolve_point(lat, lon))
            .collect()
    }

    /// Downloads the tile files for all points ahead of resolution.
    ///
    /// Purely an optimization: failures are logged and left for
    /// [`Self::resolve_point`] to surface with full context. Returns the
    /// distinct tiles that were ensured.
    pub fn prefetch(&self, points: &[(f64, f64)]) -> Vec<TileId> {
        let mut tiles: Vec<TileId> = points
            .iter()
            .filter_map(|&(lat, lon)| coord::dataset_tile_id(lat, lon).ok())
            .collect();
        tiles.sort_unstable();
        tiles.dedup();

        let ensured: Vec<TileId> = tiles
            .par_iter()
            .filter_map(|&tile| match self.cache.ensure_local(tile) {
                Ok(_) => Some(tile),
                Err(e) => {
                    warn!(%tile, error = %e, "tile prefetch failed");
                    None
                }
            })
            .collect();
        info!(requested = tiles.len(), ensured = ensured.len(), "prefetched tiles");
        ensured
    }
}
