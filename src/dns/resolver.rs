//! Hostname resolution with a resolved-address cache short-circuit

use super::lookup::{AddressLookup, DnsError, ResolvedAddrs};
use crate::cache::ResolvedCache;
use log::debug;
use std::sync::Arc;

/// Resolves hostnames to their IPv4 and IPv6 addresses.
///
/// Cached hostnames are answered without touching the network. A name
/// that does not exist resolves to no addresses; every other lookup
/// failure is returned to the caller.
#[derive(Debug, Clone)]
pub struct HostnameResolver {
    lookup: Arc<dyn AddressLookup>,
}

impl HostnameResolver {
    /// Create a resolver on top of an address lookup
    pub fn new(lookup: Arc<dyn AddressLookup>) -> Self {
        Self { lookup }
    }

    /// Resolve `hostname`, consulting `cache` first
    pub async fn resolve(
        &self,
        hostname: &str,
        cache: &ResolvedCache,
    ) -> Result<ResolvedAddrs, DnsError> {
        if let Some(entry) = cache.get(hostname) {
            debug!("Resolved-address cache hit for {hostname}");
            return Ok(ResolvedAddrs {
                v4: entry.v4.clone(),
                v6: entry.v6.clone(),
            });
        }

        match self.lookup.lookup(hostname).await {
            Ok(addrs) => Ok(addrs),
            Err(DnsError::NotFound(_)) => {
                debug!("No addresses for {hostname}");
                Ok(ResolvedAddrs::default())
            }
            Err(e) => Err(e),
        }
    }
}
