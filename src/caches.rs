//! Centralized cache management for the pipeline
//!
//! This module provides a unified cache structure that owns the three
//! persisted caches (resolved addresses, failed resolutions, ASN mappings)
//! and moves them to and from their files in the cache directory.

use crate::cache::{unix_now, AsnCache, CacheError, FailedCache, ResolvedCache};
use crate::config::{ttl, CacheTtls};
use log::info;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// File name of the resolved-address cache
pub const RESOLVED_CACHE_FILE: &str = ".cache_ip";
/// File name of the failed-resolution cache
pub const FAILED_CACHE_FILE: &str = ".cache_no_ip";
/// File name of the ASN-mapping cache
pub const ASN_CACHE_FILE: &str = ".cache_asn";

/// Number of entries removed from each cache at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvictionStats {
    /// Entries dropped from the resolved-address cache
    pub resolved: usize,
    /// Entries dropped from the failed-resolution cache
    pub failed: usize,
    /// Entries dropped from the ASN-mapping cache
    pub asn: usize,
}

/// Container for all caches used by the pipeline.
///
/// Worker tasks only take read locks; the aggregation phase is the single
/// writer.
#[derive(Clone, Debug)]
pub struct Caches {
    /// Resolved-address cache
    pub resolved: Arc<RwLock<ResolvedCache>>,
    /// Failed-resolution cache
    pub failed: Arc<RwLock<FailedCache>>,
    /// ASN-mapping cache
    pub asn: Arc<RwLock<AsnCache>>,
}

impl Caches {
    /// Create a new set of caches with optional pre-initialized caches
    ///
    /// Any cache not provided will be created empty with the configured
    /// lifetime.
    pub fn new(
        resolved: Option<ResolvedCache>,
        failed: Option<FailedCache>,
        asn: Option<AsnCache>,
    ) -> Self {
        Self {
            resolved: Arc::new(RwLock::new(
                resolved.unwrap_or_else(|| ResolvedCache::new(ttl::resolved_ttl())),
            )),
            failed: Arc::new(RwLock::new(
                failed.unwrap_or_else(|| FailedCache::new(ttl::failed_ttl())),
            )),
            asn: Arc::new(RwLock::new(
                asn.unwrap_or_else(|| AsnCache::new(ttl::asn_ttl())),
            )),
        }
    }

    /// Load all three caches from `dir` with the lifetimes in effect;
    /// missing or corrupt files start empty
    pub fn load(dir: &Path) -> Self {
        Self::load_with_ttls(dir, &ttl::current())
    }

    /// Load all three caches from `dir` with explicit lifetimes
    pub fn load_with_ttls(dir: &Path, ttls: &CacheTtls) -> Self {
        Self::new(
            Some(ResolvedCache::load(
                &dir.join(RESOLVED_CACHE_FILE),
                ttls.resolved,
            )),
            Some(FailedCache::load(&dir.join(FAILED_CACHE_FILE), ttls.failed)),
            Some(AsnCache::load(&dir.join(ASN_CACHE_FILE), ttls.asn)),
        )
    }

    /// Load all caches from `dir` and drop entries that expired by now
    pub async fn load_and_prune(dir: &Path) -> (Self, EvictionStats) {
        Self::load_and_prune_with_ttls(dir, &ttl::current()).await
    }

    /// Like [`Caches::load_and_prune`] with explicit lifetimes
    pub async fn load_and_prune_with_ttls(dir: &Path, ttls: &CacheTtls) -> (Self, EvictionStats) {
        let caches = Self::load_with_ttls(dir, ttls);
        let stats = caches.evict_expired(unix_now()).await;
        (caches, stats)
    }

    /// Remove expired entries from every cache
    pub async fn evict_expired(&self, now: f64) -> EvictionStats {
        let stats = EvictionStats {
            resolved: self.resolved.write().await.evict_expired(now),
            failed: self.failed.write().await.evict_expired(now),
            asn: self.asn.write().await.evict_expired(now),
        };
        info!(
            "Cleanup: {} IPs, {} no-IPs, {} ASNs",
            stats.resolved, stats.failed, stats.asn
        );
        stats
    }

    /// Write all three caches to `dir`, replacing existing files
    pub async fn persist(&self, dir: &Path) -> Result<(), CacheError> {
        self.resolved
            .read()
            .await
            .persist(&dir.join(RESOLVED_CACHE_FILE))?;
        self.failed
            .read()
            .await
            .persist(&dir.join(FAILED_CACHE_FILE))?;
        self.asn.read().await.persist(&dir.join(ASN_CACHE_FILE))?;
        Ok(())
    }
}

impl Default for Caches {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}
