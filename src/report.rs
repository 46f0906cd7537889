//! Summaries derived from a pipeline outcome and the caches

use crate::cache::{AsnCache, ResolvedCache};
use crate::pipeline::PipelineOutcome;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

/// Totals for one hoster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HosterSummary {
    /// Hoster id
    pub hoster: String,
    /// Accepted instances hosted there
    pub instances: usize,
    /// Registered users across those instances
    pub users: u64,
    /// Active users across those instances, missing counts as 0
    pub active_users: u64,
    /// Percentage of all accepted instances
    pub instance_share: f64,
    /// Percentage of all users on accepted instances
    pub user_share: f64,
}

/// Per-hoster totals, largest hoster by instance count first.
///
/// Ties are ordered by hoster id.
pub fn summarize(outcome: &PipelineOutcome) -> Vec<HosterSummary> {
    let total_instances = outcome.accepted.len();
    let total_users: u64 = outcome.accepted.values().map(|i| i.users).sum();

    let mut summaries: Vec<HosterSummary> = outcome
        .hosters
        .iter()
        .map(|(hoster, hostnames)| {
            let instances = hostnames
                .iter()
                .filter_map(|hostname| outcome.accepted.get(hostname));
            let (users, active_users) = instances.fold((0u64, 0u64), |(users, active), i| {
                (users + i.users, active + i.active_users.unwrap_or(0))
            });
            HosterSummary {
                hoster: hoster.clone(),
                instances: hostnames.len(),
                users,
                active_users,
                instance_share: percentage(hostnames.len() as f64, total_instances as f64),
                user_share: percentage(users as f64, total_users as f64),
            }
        })
        .collect();

    summaries.sort_by(|a, b| b.instances.cmp(&a.instances).then_with(|| a.hoster.cmp(&b.hoster)));
    summaries
}

fn percentage(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        part * 100.0 / total
    } else {
        0.0
    }
}

/// An address serving several hostnames
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharedAddress {
    /// The shared address
    pub address: IpAddr,
    /// Organization name of the range containing it, if known
    pub as_name: Option<String>,
    /// Hostnames resolving to it
    pub hostnames: BTreeSet<String>,
}

/// Addresses that at least `min_hostnames` cached hostnames resolve to.
///
/// Most shared first; ties are ordered by address.
pub fn shared_addresses(
    resolved: &ResolvedCache,
    asn: &AsnCache,
    min_hostnames: usize,
) -> Vec<SharedAddress> {
    let mut by_address: BTreeMap<IpAddr, BTreeSet<String>> = BTreeMap::new();
    for (hostname, entry) in resolved.iter() {
        let addrs = entry
            .v4
            .iter()
            .copied()
            .map(IpAddr::V4)
            .chain(entry.v6.iter().copied().map(IpAddr::V6));
        for addr in addrs {
            by_address.entry(addr).or_default().insert(hostname.clone());
        }
    }

    let mut shared: Vec<SharedAddress> = by_address
        .into_iter()
        .filter(|(_, hostnames)| hostnames.len() >= min_hostnames)
        .map(|(address, hostnames)| {
            let as_name = hostnames.iter().find_map(|hostname| {
                asn.get(hostname)?
                    .ranges
                    .iter()
                    .find(|range| range.contains(address))
                    .map(|range| range.name.clone())
            });
            SharedAddress {
                address,
                as_name,
                hostnames,
            }
        })
        .collect();

    shared.sort_by(|a, b| {
        b.hostnames
            .len()
            .cmp(&a.hostnames.len())
            .then_with(|| a.address.cmp(&b.address))
    });
    shared
}
