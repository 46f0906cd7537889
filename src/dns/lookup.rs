//! Forward DNS lookups for both address families

use async_trait::async_trait;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::{ResolveError, TokioResolver};
use log::warn;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

/// Error type for forward DNS operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DnsError {
    /// The name does not exist or has no address records
    #[error("name not found: {0}")]
    NotFound(String),

    /// Any other resolution failure (timeouts, unreachable servers, ...)
    #[error("DNS resolution failed for {hostname}: {reason}")]
    Lookup {
        /// Name being resolved
        hostname: String,
        /// Resolver error text
        reason: String,
    },
}

/// Addresses found for one hostname
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAddrs {
    /// IPv4 addresses in resolver order
    pub v4: Vec<Ipv4Addr>,
    /// IPv6 addresses in resolver order
    pub v6: Vec<Ipv6Addr>,
}

impl ResolvedAddrs {
    /// Split a mixed address list by family, keeping order
    pub fn from_addrs(addrs: impl IntoIterator<Item = IpAddr>) -> Self {
        let mut resolved = Self::default();
        for addr in addrs {
            match addr {
                IpAddr::V4(v4) => resolved.v4.push(v4),
                IpAddr::V6(v6) => resolved.v6.push(v6),
            }
        }
        resolved
    }

    /// Total number of addresses
    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    /// Whether no address was found
    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }

    /// All addresses, IPv4 first
    pub fn iter(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.v4
            .iter()
            .copied()
            .map(IpAddr::V4)
            .chain(self.v6.iter().copied().map(IpAddr::V6))
    }
}

/// Source of forward address records
#[async_trait]
pub trait AddressLookup: Send + Sync + std::fmt::Debug {
    /// Resolve the A and AAAA records of `hostname`
    async fn lookup(&self, hostname: &str) -> Result<ResolvedAddrs, DnsError>;
}

/// Address lookup backed by a hickory resolver
#[derive(Debug, Clone)]
pub struct HickoryLookup {
    resolver: Arc<TokioResolver>,
}

impl HickoryLookup {
    /// Wrap an existing resolver
    pub fn new(resolver: Arc<TokioResolver>) -> Self {
        Self { resolver }
    }

    /// Use the system resolver configuration, falling back to Cloudflare
    /// if it cannot be read
    pub fn system() -> Self {
        match TokioResolver::builder_tokio() {
            Ok(builder) => Self::new(Arc::new(builder.build())),
            Err(e) => {
                warn!("Cannot read system resolver configuration ({e}), using Cloudflare");
                Self::new(Arc::new(create_default_resolver()))
            }
        }
    }
}

impl Default for HickoryLookup {
    fn default() -> Self {
        Self::new(Arc::new(create_default_resolver()))
    }
}

fn is_name_unknown(err: &ResolveError) -> bool {
    err.is_nx_domain() || err.is_no_records_found()
}

#[async_trait]
impl AddressLookup for HickoryLookup {
    async fn lookup(&self, hostname: &str) -> Result<ResolvedAddrs, DnsError> {
        let failed = |e: ResolveError| DnsError::Lookup {
            hostname: hostname.to_string(),
            reason: e.to_string(),
        };

        let v4 = match self.resolver.ipv4_lookup(hostname).await {
            Ok(lookup) => lookup.iter().map(|a| a.0).collect(),
            Err(e) if is_name_unknown(&e) => Vec::new(),
            Err(e) => return Err(failed(e)),
        };
        let v6 = match self.resolver.ipv6_lookup(hostname).await {
            Ok(lookup) => lookup.iter().map(|aaaa| aaaa.0).collect(),
            Err(e) if is_name_unknown(&e) => Vec::new(),
            Err(e) => return Err(failed(e)),
        };

        Ok(ResolvedAddrs { v4, v6 })
    }
}

/// Create a default DNS resolver
pub fn create_default_resolver() -> TokioResolver {
    TokioResolver::builder_with_config(
        ResolverConfig::cloudflare(),
        TokioConnectionProvider::default(),
    )
    .build()
}
