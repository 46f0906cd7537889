//! ASN resolution for a hostname's addresses

use crate::cache::AsnCache;
use crate::dns::ResolvedAddrs;
use crate::ranges::{IpRange, RangeTable};
use log::debug;
use std::net::IpAddr;
use std::sync::Arc;

/// Finds the ranges a hostname's addresses belong to, using one table per
/// address family.
#[derive(Debug, Clone, Default)]
pub struct AsnResolver {
    v4: Option<Arc<RangeTable>>,
    v6: Option<Arc<RangeTable>>,
}

impl AsnResolver {
    /// Create a resolver from the available tables
    pub fn new(v4: Option<Arc<RangeTable>>, v6: Option<Arc<RangeTable>>) -> Self {
        Self { v4, v6 }
    }

    /// Whether at least one family has a table
    pub fn has_tables(&self) -> bool {
        self.v4.is_some() || self.v6.is_some()
    }

    /// Ranges containing a single address; empty if its family has no table
    pub fn lookup(&self, ip: IpAddr) -> Vec<IpRange> {
        let table = match ip {
            IpAddr::V4(_) => self.v4.as_deref(),
            IpAddr::V6(_) => self.v6.as_deref(),
        };
        table.map(|t| t.find(ip)).unwrap_or_default()
    }

    /// Ranges for every address of `hostname`.
    ///
    /// A cached mapping wins over the tables. Otherwise the per-address
    /// results are concatenated in address order, duplicates included.
    pub fn resolve(&self, hostname: &str, addrs: &ResolvedAddrs, cache: &AsnCache) -> Vec<IpRange> {
        if let Some(entry) = cache.get(hostname) {
            debug!("ASN cache hit for {hostname}");
            return entry.ranges.clone();
        }
        addrs.iter().flat_map(|ip| self.lookup(ip)).collect()
    }
}
