//! Age-bounded hostname cache persisted as a JSON file

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Entries that record when they were created
pub trait Timestamped {
    /// Creation time in Unix seconds
    fn timestamp(&self) -> f64;
}

/// Error type for cache persistence
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Writing the cache file failed
    #[error("failed to write cache file {}: {source}", path.display())]
    Io {
        /// File being written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Serializing cache contents failed
    #[error("failed to serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Current time in Unix seconds
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Hostname-keyed cache whose entries expire after a fixed lifetime.
///
/// Expiry is applied only by [`TimedCache::evict_expired`]; reads never
/// check entry age.
#[derive(Debug, Clone)]
pub struct TimedCache<V> {
    entries: BTreeMap<String, V>,
    ttl: Duration,
}

impl<V: Timestamped> TimedCache<V> {
    /// Create an empty cache
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: BTreeMap::new(),
            ttl,
        }
    }

    /// Entry lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a hostname
    pub fn get(&self, hostname: &str) -> Option<&V> {
        self.entries.get(hostname)
    }

    /// Whether a hostname has an entry
    pub fn contains(&self, hostname: &str) -> bool {
        self.entries.contains_key(hostname)
    }

    /// Insert an entry unless the hostname already has one.
    ///
    /// Returns `true` if the entry was inserted.
    pub fn set_if_absent(&mut self, hostname: impl Into<String>, value: V) -> bool {
        match self.entries.entry(hostname.into()) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    /// Remove every entry whose age at `now` is at least the lifetime.
    ///
    /// Returns the number of entries removed.
    pub fn evict_expired(&mut self, now: f64) -> usize {
        let ttl = self.ttl.as_secs_f64();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now - entry.timestamp() < ttl);
        before - self.entries.len()
    }

    /// Iterate entries in hostname order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
        self.entries.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> TimedCache<V>
where
    V: Timestamped + Serialize + DeserializeOwned,
{
    /// Load a cache file.
    ///
    /// A missing or unreadable file yields an empty cache.
    pub fn load(path: &Path, ttl: Duration) -> Self {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No cache file at {}, starting empty", path.display());
                return Self::new(ttl);
            }
            Err(e) => {
                warn!("Cannot read cache file {}: {}", path.display(), e);
                return Self::new(ttl);
            }
        };

        match serde_json::from_slice::<BTreeMap<String, V>>(&bytes) {
            Ok(entries) => Self { entries, ttl },
            Err(e) => {
                warn!("Ignoring corrupt cache file {}: {}", path.display(), e);
                Self::new(ttl)
            }
        }
    }

    /// Write the whole cache, replacing any existing file
    pub fn persist(&self, path: &Path) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(&self.entries)?;

        let mut tmp = OsString::from(path.as_os_str());
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let io_err = |source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        };
        fs::write(&tmp, bytes).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }
}
