//! Entry types stored in the three persisted caches

use super::timed::{TimedCache, Timestamped};
use crate::ranges::IpRange;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Addresses a hostname resolved to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpEntry {
    /// IPv4 addresses in resolver order
    pub v4: Vec<Ipv4Addr>,
    /// IPv6 addresses in resolver order
    pub v6: Vec<Ipv6Addr>,
    /// Creation time in Unix seconds
    pub timestamp: f64,
}

/// Marker for a hostname that failed to resolve, stored as a bare timestamp
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailedEntry {
    /// Time of the failed attempt in Unix seconds
    pub timestamp: f64,
}

/// Ranges a hostname's addresses fell into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsnEntry {
    /// Matched ranges, one per address hit
    #[serde(rename = "asn")]
    pub ranges: Vec<IpRange>,
    /// Creation time in Unix seconds
    pub timestamp: f64,
}

impl Timestamped for IpEntry {
    fn timestamp(&self) -> f64 {
        self.timestamp
    }
}

impl Timestamped for FailedEntry {
    fn timestamp(&self) -> f64 {
        self.timestamp
    }
}

impl Timestamped for AsnEntry {
    fn timestamp(&self) -> f64 {
        self.timestamp
    }
}

/// Hostname → resolved addresses
pub type ResolvedCache = TimedCache<IpEntry>;
/// Hostname → time of failed resolution
pub type FailedCache = TimedCache<FailedEntry>;
/// Hostname → matched ASN ranges
pub type AsnCache = TimedCache<AsnEntry>;
