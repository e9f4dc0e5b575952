//! Local tile dataset cache.
//!
//! Two layers with one owner each:
//!
//! - on disk, `<directory>/<tile_id>.geojsonl.gz` plus a `.sha256` sidecar
//!   recorded at download time, refreshed across runs by a weak
//!   size-comparison check against the remote;
//! - in memory, each tile's parsed [`TileDataset`] behind a per-tile
//!   single-flight lock, loaded at most once per run and shared read-only
//!   afterwards.
//!
//! Concurrent downloads of *different* tiles proceed independently but are
//! capped by [`DownloadSlots`] so the dataset host is not treated as an
//! unthrottled resource.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::coord::TileId;
use crate::dataset::{self, DatasetError, TileDataset};
use crate::error::{ResolveError, ResolveResult};
use crate::index::TileIndex;
use crate::transport::Transport;

/// Buffer size for checksumming files (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Default cap on concurrent tile downloads.
pub const DEFAULT_MAX_DOWNLOADS: usize = 4;

/// Tile cache configuration.
#[derive(Debug, Clone)]
pub struct TileCacheConfig {
    /// Directory holding the downloaded tile files.
    pub directory: PathBuf,

    /// Maximum number of in-flight tile downloads.
    pub max_downloads: usize,
}

impl TileCacheConfig {
    pub fn new(directory: PathBuf) -> Self {
        Self {
            directory,
            max_downloads: DEFAULT_MAX_DOWNLOADS,
        }
    }

    /// Set the download concurrency cap.
    pub fn with_max_downloads(mut self, max_downloads: usize) -> Self {
        self.max_downloads = max_downloads.max(1);
        self
    }
}

/// Counting limiter for concurrent downloads.
struct DownloadSlots {
    available: Mutex<usize>,
    freed: Condvar,
}

impl DownloadSlots {
    fn new(count: usize) -> Self {
        Self {
            available: Mutex::new(count.max(1)),
            freed: Condvar::new(),
        }
    }

    fn acquire(&self) -> SlotGuard<'_> {
        let mut available = self.available.lock();
        while *available == 0 {
            self.freed.wait(&mut available);
        }
        *available -= 1;
        SlotGuard { slots: self }
    }
}

struct SlotGuard<'a> {
    slots: &'a DownloadSlots,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        *self.slots.available.lock() += 1;
        self.slots.freed.notify_one();
    }
}

/// Per-run cache of tile datasets.
///
/// Constructed once per run from a refreshed [`TileIndex`]; torn down at
/// run end. Never relies on ambient process-wide state.
pub struct TileCache {
    config: TileCacheConfig,
    index: TileIndex,
    transport: Arc<dyn Transport>,
    loaded: Mutex<HashMap<TileId, Arc<TileDataset>>>,
    flights: Mutex<HashMap<TileId, Arc<Mutex<()>>>>,
    slots: DownloadSlots,
}

impl TileCache {
    pub fn new(config: TileCacheConfig, index: TileIndex, transport: Arc<dyn Transport>) -> Self {
        let slots = DownloadSlots::new(config.max_downloads);
        Self {
            config,
            index,
            transport,
            loaded: Mutex::new(HashMap::new()),
            flights: Mutex::new(HashMap::new()),
            slots,
        }
    }

    /// The tile index backing this cache.
    pub fn index(&self) -> &TileIndex {
        &self.index
    }

    /// Local path of a tile's dataset file.
    pub fn tile_path(&self, tile: TileId) -> PathBuf {
        self.config.directory.join(format!("{}.geojsonl.gz", tile))
    }

    /// The per-tile flight lock, created on first use.
    fn flight(&self, tile: TileId) -> Arc<Mutex<()>> {
        Arc::clone(self.flights.lock().entry(tile).or_default())
    }

    /// Ensures the tile's dataset file is present locally and current.
    ///
    /// When a local copy exists, its size is compared against the remote's
    /// reported `Content-Length` and the download is skipped on a match.
    /// This is an optimistic, weak integrity check: enough to avoid
    /// redundant multi-megabyte downloads, not a cryptographic guarantee.
    /// Idempotent; repeating it is always safe.
    ///
    /// Concurrent calls for the same tile serialize on that tile's flight
    /// lock, so at most one download is ever in flight per tile; waiters
    /// re-check the local file once the first caller finishes and reuse it.
    pub fn ensure_local(&self, tile: TileId) -> ResolveResult<PathBuf> {
        let flight = self.flight(tile);
        let _in_flight = flight.lock();
        self.fetch_tile(tile)
    }

    /// Download-or-reuse body of [`Self::ensure_local`]. Callers must hold
    /// the tile's flight lock.
    fn fetch_tile(&self, tile: TileId) -> ResolveResult<PathBuf> {
        let url = self.index.url_for(tile)?;
        let path = self.tile_path(tile);

        if path.exists() {
            let local_len = fs::metadata(&path)
                .map_err(|e| ResolveError::Io {
                    path: path.clone(),
                    source: e,
                })?
                .len();

            match self.transport.head(url) {
                Ok(info) if info.content_length == Some(local_len) => {
                    debug!(%tile, bytes = local_len, "tile file up to date");
                    return Ok(path);
                }
                Ok(info) => {
                    debug!(
                        %tile,
                        local = local_len,
                        remote = ?info.content_length,
                        "tile file size mismatch, re-downloading"
                    );
                }
                Err(e) => {
                    // Remote unreachable but we have data: prefer the local
                    // copy over failing the whole tile.
                    warn!(%tile, error = %e, "tile freshness check failed, using local copy");
                    return Ok(path);
                }
            }
        }

        fs::create_dir_all(&self.config.directory).map_err(|e| ResolveError::Io {
            path: self.config.directory.clone(),
            source: e,
        })?;

        let _slot = self.slots.acquire();
        let body = self.transport.get(url)?;
        write_atomic(&path, &body)?;
        write_checksum_sidecar(&path, &body)?;
        info!(%tile, bytes = body.len(), "downloaded tile dataset");
        Ok(path)
    }

    /// Loads the tile's dataset, at most once per run.
    ///
    /// The first caller for a tile downloads (if needed), verifies, and
    /// parses it while holding that tile's flight lock; concurrent callers
    /// for the same tile block until the load completes, then share the
    /// parsed dataset. Callers for other tiles are unaffected.
    pub fn load(&self, tile: TileId) -> ResolveResult<Arc<TileDataset>> {
        if let Some(dataset) = self.loaded.lock().get(&tile) {
            return Ok(Arc::clone(dataset));
        }

        let flight = self.flight(tile);
        let _in_flight = flight.lock();

        // A concurrent caller may have finished the load while we waited.
        if let Some(dataset) = self.loaded.lock().get(&tile) {
            return Ok(Arc::clone(dataset));
        }

        let path = self.fetch_tile(tile)?;
        verify_checksum_sidecar(&path)
            .map_err(|source| ResolveError::TileLoadError { tile, source })?;
        let dataset = dataset::read_gzipped(tile, &path)
            .map_err(|source| ResolveError::TileLoadError { tile, source })?;
        info!(%tile, footprints = dataset.len(), "loaded tile dataset");

        let dataset = Arc::new(dataset);
        self.loaded.lock().insert(tile, Arc::clone(&dataset));
        Ok(dataset)
    }

    /// Number of datasets currently held in memory.
    pub fn loaded_count(&self) -> usize {
        self.loaded.lock().len()
    }
}

/// Writes via a temp file + rename so an interrupted download never leaves
/// a plausible-looking partial tile file behind.
fn write_atomic(path: &Path, contents: &[u8]) -> ResolveResult<()> {
    let tmp = path.with_extension("part");
    fs::write(&tmp, contents).map_err(|e| ResolveError::Io {
        path: tmp.clone(),
        source: e,
    })?;
    fs::rename(&tmp, path).map_err(|e| ResolveError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".sha256");
    path.with_file_name(name)
}

fn write_checksum_sidecar(path: &Path, contents: &[u8]) -> ResolveResult<()> {
    let digest = format!("{:x}", Sha256::digest(contents));
    let sidecar = sidecar_path(path);
    fs::write(&sidecar, digest).map_err(|e| ResolveError::Io {
        path: sidecar,
        source: e,
    })
}

/// Calculate the SHA-256 checksum of a file, streaming in 64KB chunks.
fn file_checksum(path: &Path) -> Result<String, DatasetError> {
    let mut file = File::open(path).map_err(|e| DatasetError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        let n = file.read(&mut buffer).map_err(|e| DatasetError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Verifies a tile file against its recorded checksum, when one exists.
///
/// Files that predate the sidecar (or whose sidecar was removed) are
/// accepted as-is; the size check in `ensure_local` already gates those.
fn verify_checksum_sidecar(path: &Path) -> Result<(), DatasetError> {
    let sidecar = sidecar_path(path);
    let expected = match fs::read_to_string(&sidecar) {
        Ok(s) => s.trim().to_string(),
        Err(_) => return Ok(()),
    };
    let actual = file_checksum(path)?;
    if actual != expected {
        return Err(DatasetError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}
