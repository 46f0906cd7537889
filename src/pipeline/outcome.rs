//! Aggregated results of a pipeline run

use crate::instances::Instance;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Instance skipped because its addresses map to several hosters
#[derive(Debug, Clone, Serialize)]
pub struct AmbiguousSkip {
    /// The skipped instance
    pub instance: Instance,
    /// Hoster ids the addresses mapped to
    pub hosters: BTreeSet<String>,
    /// Organization names of every matched range
    pub org_names: BTreeSet<String>,
}

/// Instance skipped because its organization name maps to no hoster
#[derive(Debug, Clone, Serialize)]
pub struct UnmappedSkip {
    /// The skipped instance
    pub instance: Instance,
    /// Organization name that could not be mapped
    pub org_name: String,
}

/// Skipped instances, partitioned by reason
#[derive(Debug, Clone, Default, Serialize)]
pub struct SkipReport {
    /// No addresses, including hostnames still in the failed-resolution cache
    pub no_ip: Vec<Instance>,
    /// Addresses found but none inside an assigned range
    pub no_asn: Vec<Instance>,
    /// Addresses spread over more than one hoster
    pub ambiguous: Vec<AmbiguousSkip>,
    /// Organization name could not be mapped
    pub unmapped: Vec<UnmappedSkip>,
}

impl SkipReport {
    /// Total number of skipped instances
    pub fn total(&self) -> usize {
        self.no_ip.len() + self.no_asn.len() + self.ambiguous.len() + self.unmapped.len()
    }
}

/// A batch abandoned because a lookup failed with something other than
/// "name not found"
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    /// Hostnames of the abandoned batch
    pub hostnames: Vec<String>,
    /// Error that aborted the batch
    pub error: String,
}

/// A hoster id derived from a network handle rather than the known table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveredHoster {
    /// Organization names that produced the id
    pub org_names: BTreeSet<String>,
    /// Number of matched ranges that produced the id, repeats included
    pub occurrences: usize,
}

impl DiscoveredHoster {
    /// Record one more range producing this id
    pub fn record(&mut self, org_name: &str) {
        self.org_names.insert(org_name.to_string());
        self.occurrences += 1;
    }
}

/// Everything a run produced for downstream reporting
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineOutcome {
    /// Hoster id → accepted hostnames
    pub hosters: BTreeMap<String, BTreeSet<String>>,
    /// Accepted instances by hostname
    pub accepted: BTreeMap<String, Instance>,
    /// Skipped instances by reason
    pub skipped: SkipReport,
    /// Hoster ids derived from network handles
    pub discovered_hosters: BTreeMap<String, DiscoveredHoster>,
    /// Batches lost to resolver failures
    pub failed_batches: Vec<BatchFailure>,
    /// Known fake instances that were ignored
    pub fixtures_ignored: usize,
}

impl PipelineOutcome {
    /// Hoster id an accepted hostname was assigned to
    pub fn hoster_of(&self, hostname: &str) -> Option<&str> {
        self.hosters
            .iter()
            .find(|(_, hostnames)| hostnames.contains(hostname))
            .map(|(hoster, _)| hoster.as_str())
    }
}
