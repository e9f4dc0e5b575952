//! Tile dataset index: maps tile identifiers to remote dataset URLs.
//!
//! The index is a remote CSV (`dataset-links.csv`) with one row per tile.
//! [`TileIndex::refresh`] keeps a local copy that is re-downloaded only when
//! the transport-reported content fingerprint changes, so repeated runs do
//! not re-fetch an unchanged multi-megabyte file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::coord::TileId;
use crate::error::{ResolveError, ResolveResult};
use crate::transport::Transport;

/// Remote location of the global footprint dataset index.
pub const DATASET_LINKS_URL: &str =
    "https://minedbuildings.z5.web.core.windows.net/global-buildings/dataset-links.csv";

/// Local filename of the cached index.
pub const DATASET_LINKS_FILE: &str = "dataset-links.csv";

/// Sidecar filename recording the fingerprint of the cached index.
const DIGEST_SIDECAR: &str = "dataset-links.csv.digest";

/// Outcome of an index refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexRefresh {
    /// The remote fingerprint changed (or no local copy existed) and the
    /// index was downloaded.
    Downloaded,
    /// The local copy matches the remote fingerprint and was reused.
    Unchanged,
    /// The remote could not be reached; an existing local copy was reused.
    StaleLocal,
}

/// In-memory tile-to-URL index.
///
/// At most one entry per tile id is valid; duplicates are kept at parse
/// time and reported as [`ResolveError::AmbiguousIndexEntry`] on lookup,
/// since a duplicated row is a data-integrity error rather than something
/// to resolve silently.
#[derive(Debug)]
pub struct TileIndex {
    entries: HashMap<u64, Vec<String>>,
}

impl TileIndex {
    /// Refreshes the local index copy and parses it.
    ///
    /// Downloads only when the transport-reported digest differs from the
    /// digest recorded at the previous download; when the transport offers
    /// no digest, falls back to comparing sizes. A fetch failure degrades to
    /// a warning and the stale local copy when one exists, and to
    /// [`ResolveError::IndexUnavailable`] when none does.
    pub fn refresh(
        transport: &dyn Transport,
        directory: &Path,
        url: &str,
    ) -> ResolveResult<(Self, IndexRefresh)> {
        fs::create_dir_all(directory).map_err(|e| ResolveError::Io {
            path: directory.to_path_buf(),
            source: e,
        })?;

        let local = directory.join(DATASET_LINKS_FILE);
        let sidecar = directory.join(DIGEST_SIDECAR);

        let outcome = match transport.head(url) {
            Ok(info) => {
                if local.exists() && Self::is_fresh(&local, &sidecar, &info) {
                    debug!(path = %local.display(), "index fingerprint unchanged");
                    IndexRefresh::Unchanged
                } else {
                    match transport.get(url) {
                        Ok(body) => {
                            write_file(&local, &body)?;
                            match &info.digest {
                                Some(digest) => write_file(&sidecar, digest.as_bytes())?,
                                None => {
                                    // No fingerprint to record; drop any stale one.
                                    let _ = fs::remove_file(&sidecar);
                                }
                            }
                            info!(bytes = body.len(), url, "downloaded dataset index");
                            IndexRefresh::Downloaded
                        }
                        Err(e) if local.exists() => {
                            warn!(error = %e, path = %local.display(), "index download failed, using stale local copy");
                            IndexRefresh::StaleLocal
                        }
                        Err(e) => {
                            return Err(ResolveError::IndexUnavailable {
                                reason: e.to_string(),
                            })
                        }
                    }
                }
            }
            Err(e) if local.exists() => {
                warn!(error = %e, path = %local.display(), "index refresh failed, using stale local copy");
                IndexRefresh::StaleLocal
            }
            Err(e) => {
                return Err(ResolveError::IndexUnavailable {
                    reason: e.to_string(),
                })
            }
        };

        let index = Self::from_file(&local)?;
        Ok((index, outcome))
    }

    /// Parses an index from a local CSV file.
    pub fn from_file(path: &Path) -> ResolveResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| ResolveError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&text)
    }

    /// Parses the CSV text, locating the `QuadKey` and `Url` columns by
    /// header name. Rows with an unparseable quadkey are skipped with a
    /// warning rather than failing the whole index.
    pub fn parse(text: &str) -> ResolveResult<Self> {
        let mut lines = text.lines();
        let header = lines.next().unwrap_or("");
        let columns: Vec<&str> = header.split(',').map(str::trim).collect();

        let quadkey_col = columns.iter().position(|c| *c == "QuadKey");
        let url_col = columns.iter().position(|c| *c == "Url");
        let (quadkey_col, url_col) = match (quadkey_col, url_col) {
            (Some(q), Some(u)) => (q, u),
            _ => {
                return Err(ResolveError::IndexUnavailable {
                    reason: format!("index header missing QuadKey/Url columns: {:?}", header),
                })
            }
        };

        let mut entries: HashMap<u64, Vec<String>> = HashMap::new();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').collect();
            let (quadkey, url) = match (fields.get(quadkey_col), fields.get(url_col)) {
                (Some(q), Some(u)) => (q.trim(), u.trim()),
                _ => {
                    warn!(line, "skipping short index row");
                    continue;
                }
            };
            match quadkey.parse::<TileId>() {
                Ok(tile) => entries
                    .entry(tile.as_u64())
                    .or_default()
                    .push(url.to_string()),
                Err(_) => warn!(quadkey, "skipping index row with unparseable quadkey"),
            }
        }

        debug!(tiles = entries.len(), "parsed dataset index");
        Ok(Self { entries })
    }

    /// Looks up the dataset URL for a tile.
    pub fn url_for(&self, tile: TileId) -> ResolveResult<&str> {
        match self.entries.get(&tile.as_u64()) {
            None => Err(ResolveError::TileNotIndexed { tile }),
            Some(urls) if urls.len() == 1 => Ok(&urls[0]),
            Some(urls) => Err(ResolveError::AmbiguousIndexEntry {
                tile,
                count: urls.len(),
            }),
        }
    }

    /// Number of distinct tiles in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the index holds no tiles.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freshness check for the local copy against remote HEAD metadata.
    fn is_fresh(
        local: &Path,
        sidecar: &Path,
        info: &crate::transport::RemoteInfo,
    ) -> bool {
        if let Some(remote_digest) = &info.digest {
            return match fs::read_to_string(sidecar) {
                Ok(recorded) => recorded.trim() == remote_digest.trim(),
                Err(_) => false,
            };
        }
        // No transport digest: weak size comparison.
        match (info.content_length, fs::metadata(local)) {
            (Some(remote_len), Ok(meta)) => meta.len() == remote_len,
            _ => false,
        }
    }
}

fn write_file(path: &Path, contents: &[u8]) -> ResolveResult<()> {
    fs::write(path, contents).map_err(|e| ResolveError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Returns the local path of the cached index inside `directory`.
pub fn local_index_path(directory: &Path) -> PathBuf {
    directory.join(DATASET_LINKS_FILE)
}
