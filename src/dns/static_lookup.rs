//! In-memory address table for offline runs and tests

use super::lookup::{AddressLookup, DnsError, ResolvedAddrs};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Address lookup answered from a fixed hostname table.
///
/// Hostnames missing from the table are reported as not found. Every call
/// is counted, so callers can verify whether a lookup happened at all.
#[derive(Debug, Default)]
pub struct StaticLookup {
    hosts: HashMap<String, Vec<IpAddr>>,
    failures: HashMap<String, String>,
    calls: AtomicUsize,
}

impl StaticLookup {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hostname with its addresses
    pub fn with_host(mut self, hostname: impl Into<String>, addrs: Vec<IpAddr>) -> Self {
        self.hosts.insert(hostname.into(), addrs);
        self
    }

    /// Make lookups of `hostname` fail with a resolver error
    pub fn with_failure(mut self, hostname: impl Into<String>, reason: impl Into<String>) -> Self {
        self.failures.insert(hostname.into(), reason.into());
        self
    }

    /// Read a JSON object mapping hostnames to address lists
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read(path)?;
        let hosts: HashMap<String, Vec<IpAddr>> = serde_json::from_slice(&data)?;
        Ok(Self {
            hosts,
            ..Self::default()
        })
    }

    /// Number of lookups performed so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Reset the lookup counter
    pub fn reset_calls(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl AddressLookup for StaticLookup {
    async fn lookup(&self, hostname: &str) -> Result<ResolvedAddrs, DnsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(reason) = self.failures.get(hostname) {
            return Err(DnsError::Lookup {
                hostname: hostname.to_string(),
                reason: reason.clone(),
            });
        }
        self.hosts
            .get(hostname)
            .map(|addrs| ResolvedAddrs::from_addrs(addrs.iter().copied()))
            .ok_or_else(|| DnsError::NotFound(hostname.to_string()))
    }
}
