//! Map-tile cache with scan timestamps.
//!
//! Tiles are keyed `"x,y"`. A tile is fresh while its `last_scanned` stamp is
//! within the cache duration; stale tiles are rescanned by the lookup
//! actions rather than trusted.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::KnowledgeError;

/// Single tile-cache freshness window, in seconds.
pub const DEFAULT_TILE_CACHE_SECS: i64 = 180;

/// Content found on a scanned tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileContent {
    pub content_type: String,
    pub code: String,
}

/// One scanned tile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileRecord {
    pub x: i64,
    pub y: i64,
    pub content: Option<TileContent>,
    pub last_scanned: DateTime<Utc>,
}

/// Cache of scanned map tiles, persisted to `map.yaml`.
pub struct MapCache {
    tiles: Mutex<BTreeMap<String, TileRecord>>,
    path: Option<PathBuf>,
    cache_duration: Duration,
}

impl MapCache {
    pub fn new() -> Self {
        Self {
            tiles: Mutex::new(BTreeMap::new()),
            path: None,
            cache_duration: Duration::seconds(DEFAULT_TILE_CACHE_SECS),
        }
    }

    /// Attach a snapshot file; loads existing tiles leniently.
    pub fn with_path(path: impl Into<PathBuf>) -> Result<Self, KnowledgeError> {
        let path = path.into();
        let tiles = load_lenient(&path)?;
        Ok(Self {
            tiles: Mutex::new(tiles),
            path: Some(path),
            cache_duration: Duration::seconds(DEFAULT_TILE_CACHE_SECS),
        })
    }

    pub fn with_cache_duration(mut self, seconds: i64) -> Self {
        self.cache_duration = Duration::seconds(seconds);
        self
    }

    fn key(x: i64, y: i64) -> String {
        format!("{x},{y}")
    }

    /// Record a scan result and persist.
    pub fn record_scan(
        &self,
        x: i64,
        y: i64,
        content: Option<TileContent>,
    ) -> Result<(), KnowledgeError> {
        self.tiles.lock().insert(
            Self::key(x, y),
            TileRecord {
                x,
                y,
                content,
                last_scanned: Utc::now(),
            },
        );
        self.persist()
    }

    pub fn get(&self, x: i64, y: i64) -> Option<TileRecord> {
        self.tiles.lock().get(&Self::key(x, y)).cloned()
    }

    /// True iff the tile was scanned within the cache duration.
    pub fn is_tile_fresh(&self, x: i64, y: i64) -> bool {
        self.tiles
            .lock()
            .get(&Self::key(x, y))
            .is_some_and(|t| Utc::now() - t.last_scanned < self.cache_duration)
    }

    /// Tiles whose content code or type equals `what`, nearest first from
    /// `(x, y)`.
    pub fn find_content(&self, what: &str, x: i64, y: i64) -> Vec<TileRecord> {
        let tiles = self.tiles.lock();
        let mut found: Vec<TileRecord> = tiles
            .values()
            .filter(|t| {
                t.content
                    .as_ref()
                    .is_some_and(|c| c.code == what || c.content_type == what)
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            let da = (a.x - x).pow(2) + (a.y - y).pow(2);
            let db = (b.x - x).pow(2) + (b.y - y).pow(2);
            da.cmp(&db)
        });
        found
    }

    pub fn len(&self) -> usize {
        self.tiles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.lock().is_empty()
    }

    fn persist(&self) -> Result<(), KnowledgeError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let tiles = self.tiles.lock();
        let yaml = serde_yaml::to_string(&*tiles)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }
}

impl Default for MapCache {
    fn default() -> Self {
        Self::new()
    }
}

fn load_lenient(path: &Path) -> Result<BTreeMap<String, TileRecord>, KnowledgeError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let yaml = std::fs::read_to_string(path)?;
    if yaml.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let value: serde_yaml::Value = serde_yaml::from_str(&yaml)?;
    let mut tiles = BTreeMap::new();
    let Some(mapping) = value.as_mapping() else {
        warn!(path = %path.display(), "map snapshot is not a mapping, starting fresh");
        return Ok(tiles);
    };
    for (key, entry) in mapping {
        let Some(key) = key.as_str() else { continue };
        match serde_yaml::from_value::<TileRecord>(entry.clone()) {
            Ok(tile) => {
                tiles.insert(key.to_string(), tile);
            }
            Err(e) => warn!(key, error = %e, "dropping malformed map tile"),
        }
    }
    Ok(tiles)
}
