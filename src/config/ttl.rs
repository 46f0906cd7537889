//! Cache lifetimes with compile-time defaults and a runtime override
//!
//! Each persisted cache has its own time-to-live. Defaults are defined as
//! constants; a process may install different values once at startup.

use once_cell::sync::OnceCell;
use std::time::Duration;

/// Default lifetime of resolved-address entries in seconds (one hour)
pub const DEFAULT_RESOLVED_TTL_SECS: u64 = 60 * 60;
/// Default lifetime of failed-resolution entries in seconds (three hours)
pub const DEFAULT_FAILED_TTL_SECS: u64 = 3 * 60 * 60;
/// Default lifetime of ASN-mapping entries in seconds (six hours)
pub const DEFAULT_ASN_TTL_SECS: u64 = 6 * 60 * 60;

/// Lifetimes of the three persisted caches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTtls {
    /// Resolved-address cache lifetime
    pub resolved: Duration,
    /// Failed-resolution cache lifetime
    pub failed: Duration,
    /// ASN-mapping cache lifetime
    pub asn: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            resolved: Duration::from_secs(DEFAULT_RESOLVED_TTL_SECS),
            failed: Duration::from_secs(DEFAULT_FAILED_TTL_SECS),
            asn: Duration::from_secs(DEFAULT_ASN_TTL_SECS),
        }
    }
}

// Runtime override storage - set once at program startup
static OVERRIDE_CONFIG: OnceCell<CacheTtls> = OnceCell::new();

/// Lifetime of resolved-address entries
pub fn resolved_ttl() -> Duration {
    OVERRIDE_CONFIG
        .get()
        .map(|c| c.resolved)
        .unwrap_or_else(|| Duration::from_secs(DEFAULT_RESOLVED_TTL_SECS))
}

/// Lifetime of failed-resolution entries
pub fn failed_ttl() -> Duration {
    OVERRIDE_CONFIG
        .get()
        .map(|c| c.failed)
        .unwrap_or_else(|| Duration::from_secs(DEFAULT_FAILED_TTL_SECS))
}

/// Lifetime of ASN-mapping entries
pub fn asn_ttl() -> Duration {
    OVERRIDE_CONFIG
        .get()
        .map(|c| c.asn)
        .unwrap_or_else(|| Duration::from_secs(DEFAULT_ASN_TTL_SECS))
}

/// All three lifetimes currently in effect
pub fn current() -> CacheTtls {
    OVERRIDE_CONFIG.get().cloned().unwrap_or_default()
}

/// Install process-wide cache lifetimes.
///
/// Returns the rejected value if lifetimes were already installed.
pub fn set_config(config: CacheTtls) -> Result<(), CacheTtls> {
    OVERRIDE_CONFIG.set(config)
}

/// Whether custom lifetimes have been installed
pub fn is_custom_config_set() -> bool {
    OVERRIDE_CONFIG.get().is_some()
}
