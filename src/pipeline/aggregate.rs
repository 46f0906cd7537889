//! Single-threaded folding of worker results into caches and hoster sets

use super::outcome::{AmbiguousSkip, PipelineOutcome, UnmappedSkip};
use super::worker::WorkerResult;
use crate::cache::{AsnCache, AsnEntry, FailedCache, FailedEntry, IpEntry, ResolvedCache};
use crate::hoster::{HosterMapper, HosterMatch};
use crate::instances::Instance;
use log::debug;
use std::collections::{BTreeSet, HashMap};

/// Folds worker results into the outcome.
///
/// Holds exclusive access to all three caches, so it only exists once
/// every worker has finished.
pub struct Aggregator<'a> {
    resolved: &'a mut ResolvedCache,
    failed: &'a mut FailedCache,
    asn: &'a mut AsnCache,
    mapper: &'a HosterMapper,
    instances: HashMap<String, Instance>,
    now: f64,
    outcome: PipelineOutcome,
}

impl<'a> Aggregator<'a> {
    /// Create an aggregator continuing `outcome`, stamping cache entries
    /// with `now`
    pub fn new(
        resolved: &'a mut ResolvedCache,
        failed: &'a mut FailedCache,
        asn: &'a mut AsnCache,
        mapper: &'a HosterMapper,
        instances: &[Instance],
        now: f64,
        outcome: PipelineOutcome,
    ) -> Self {
        Self {
            resolved,
            failed,
            asn,
            mapper,
            instances: instances
                .iter()
                .map(|instance| (instance.name.clone(), instance.clone()))
                .collect(),
            now,
            outcome,
        }
    }

    /// Classify one worker result
    pub fn absorb(&mut self, result: WorkerResult) {
        let instance = self
            .instances
            .get(&result.hostname)
            .cloned()
            .unwrap_or_else(|| Instance::new(result.hostname.clone(), 0));

        if result.addrs.is_empty() {
            self.failed
                .set_if_absent(result.hostname, FailedEntry { timestamp: self.now });
            self.outcome.skipped.no_ip.push(instance);
            return;
        }

        if result.ranges.is_empty() {
            self.outcome.skipped.no_asn.push(instance);
            return;
        }

        let matches: Vec<HosterMatch> = result
            .ranges
            .iter()
            .map(|range| self.mapper.map(&range.name))
            .collect();
        for (range, hoster) in result.ranges.iter().zip(&matches) {
            if let HosterMatch::Discovered(id) = hoster {
                self.outcome
                    .discovered_hosters
                    .entry(id.clone())
                    .or_default()
                    .record(&range.name);
            }
        }

        let candidates: BTreeSet<Option<&str>> = matches.iter().map(HosterMatch::id).collect();
        if candidates.len() > 1 {
            debug!("{} maps to {} hosters", result.hostname, candidates.len());
            self.outcome.skipped.ambiguous.push(AmbiguousSkip {
                instance,
                hosters: candidates.into_iter().flatten().map(str::to_string).collect(),
                org_names: result.ranges.iter().map(|range| range.name.clone()).collect(),
            });
            return;
        }

        let Some(hoster) = candidates.into_iter().next().flatten().map(str::to_string) else {
            self.outcome.skipped.unmapped.push(UnmappedSkip {
                instance,
                org_name: result.ranges[0].name.clone(),
            });
            return;
        };

        self.resolved.set_if_absent(
            result.hostname.clone(),
            IpEntry {
                v4: result.addrs.v4,
                v6: result.addrs.v6,
                timestamp: self.now,
            },
        );
        self.asn.set_if_absent(
            result.hostname.clone(),
            AsnEntry {
                ranges: result.ranges,
                timestamp: self.now,
            },
        );
        self.outcome
            .hosters
            .entry(hoster)
            .or_default()
            .insert(result.hostname.clone());
        self.outcome.accepted.insert(result.hostname, instance);
    }

    /// Finish aggregation and hand back the outcome
    pub fn finish(self) -> PipelineOutcome {
        self.outcome
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dns::ResolvedAddrs;
    use crate::ranges::IpRange;
    use std::net::IpAddr;
    use std::time::Duration;

    struct Fixture {
        resolved: ResolvedCache,
        failed: FailedCache,
        asn: AsnCache,
        mapper: HosterMapper,
        instances: Vec<Instance>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                resolved: ResolvedCache::new(Duration::from_secs(3600)),
                failed: FailedCache::new(Duration::from_secs(3 * 3600)),
                asn: AsnCache::new(Duration::from_secs(6 * 3600)),
                mapper: HosterMapper::default(),
                instances: vec![Instance::new("a.example", 500)],
            }
        }

        fn absorb(&mut self, results: Vec<WorkerResult>) -> PipelineOutcome {
            let mut aggregator = Aggregator::new(
                &mut self.resolved,
                &mut self.failed,
                &mut self.asn,
                &self.mapper,
                &self.instances,
                1_000.0,
                PipelineOutcome::default(),
            );
            for result in results {
                aggregator.absorb(result);
            }
            aggregator.finish()
        }
    }

    fn range(name: &str) -> IpRange {
        IpRange {
            name: name.to_string(),
            asn: 64500,
            country: "US".to_string(),
            start: "192.0.2.0".parse().unwrap(),
            end: "192.0.2.255".parse().unwrap(),
        }
    }

    fn result(ranges: Vec<IpRange>) -> WorkerResult {
        let addr: IpAddr = "192.0.2.10".parse().unwrap();
        WorkerResult {
            hostname: "a.example".to_string(),
            addrs: ResolvedAddrs::from_addrs([addr]),
            ranges,
        }
    }

    #[test]
    fn test_accepts_single_hoster() {
        let mut fixture = Fixture::new();
        let outcome = fixture.absorb(vec![result(vec![range("CLOUDFLARENET")])]);

        assert_eq!(outcome.hoster_of("a.example"), Some("cloudflare"));
        assert_eq!(outcome.accepted["a.example"].users, 500);
        assert!(fixture.resolved.contains("a.example"));
        assert_eq!(fixture.asn.get("a.example").unwrap().ranges.len(), 1);
        assert_eq!(fixture.asn.get("a.example").unwrap().timestamp, 1_000.0);
    }

    #[test]
    fn test_no_addresses_marks_failed() {
        let mut fixture = Fixture::new();
        let outcome = fixture.absorb(vec![WorkerResult {
            hostname: "a.example".to_string(),
            addrs: ResolvedAddrs::default(),
            ranges: vec![],
        }]);

        assert_eq!(outcome.skipped.no_ip.len(), 1);
        assert!(fixture.failed.contains("a.example"));
        assert!(fixture.resolved.is_empty());
    }

    #[test]
    fn test_no_ranges_is_no_asn() {
        let mut fixture = Fixture::new();
        let outcome = fixture.absorb(vec![result(vec![])]);

        assert_eq!(outcome.skipped.no_asn.len(), 1);
        assert!(fixture.failed.is_empty());
        assert!(fixture.resolved.is_empty());
        assert!(fixture.asn.is_empty());
    }

    #[test]
    fn test_two_hosters_is_ambiguous() {
        let mut fixture = Fixture::new();
        let outcome = fixture.absorb(vec![result(vec![
            range("CLOUDFLARENET"),
            range("HETZNER-AS"),
        ])]);

        assert!(outcome.hosters.is_empty());
        let skip = &outcome.skipped.ambiguous[0];
        assert_eq!(
            skip.hosters.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["cloudflare", "hetzner"]
        );
        assert!(skip.org_names.contains("HETZNER-AS"));
        assert!(fixture.asn.is_empty());
    }

    #[test]
    fn test_mapped_plus_unmapped_is_ambiguous() {
        let mut fixture = Fixture::new();
        let outcome = fixture.absorb(vec![result(vec![
            range("CLOUDFLARENET"),
            range("small hosting company"),
        ])]);

        let skip = &outcome.skipped.ambiguous[0];
        assert_eq!(skip.hosters.len(), 1);
        assert_eq!(skip.org_names.len(), 2);
    }

    #[test]
    fn test_same_hoster_twice_is_accepted() {
        let mut fixture = Fixture::new();
        let outcome = fixture.absorb(vec![result(vec![
            range("AMAZON-02 Amazon Technologies Inc."),
            range("Amazon Data Services NoVa"),
        ])]);
        assert_eq!(outcome.hoster_of("a.example"), Some("amazon"));
    }

    #[test]
    fn test_unmapped_keeps_first_org_name() {
        let mut fixture = Fixture::new();
        let outcome = fixture.absorb(vec![result(vec![range("small hosting company")])]);

        assert_eq!(outcome.skipped.unmapped[0].org_name, "small hosting company");
        assert!(outcome.accepted.is_empty());
    }

    #[test]
    fn test_discovered_hoster_is_recorded() {
        let mut fixture = Fixture::new();
        let outcome = fixture.absorb(vec![result(vec![range("FASTLY - Fastly, Inc.")])]);

        assert_eq!(outcome.hoster_of("a.example"), Some("fastly"));
        let fastly = &outcome.discovered_hosters["fastly"];
        assert!(fastly.org_names.contains("FASTLY - Fastly, Inc."));
        assert_eq!(fastly.occurrences, 1);
    }

    #[test]
    fn test_discovered_hoster_counts_repeats() {
        let mut fixture = Fixture::new();
        fixture.instances.push(Instance::new("b.example", 10));
        let mut second = result(vec![range("FASTLY - Fastly, Inc.")]);
        second.hostname = "b.example".to_string();

        let outcome = fixture.absorb(vec![result(vec![range("FASTLY - Fastly, Inc.")]), second]);
        let fastly = &outcome.discovered_hosters["fastly"];
        assert_eq!(fastly.org_names.len(), 1);
        assert_eq!(fastly.occurrences, 2);
    }

    #[test]
    fn test_existing_cache_entries_are_kept() {
        let mut fixture = Fixture::new();
        fixture.resolved.set_if_absent(
            "a.example",
            IpEntry {
                v4: vec!["198.51.100.1".parse().unwrap()],
                v6: vec![],
                timestamp: 10.0,
            },
        );

        fixture.absorb(vec![result(vec![range("CLOUDFLARENET")])]);
        let entry = fixture.resolved.get("a.example").unwrap();
        assert_eq!(entry.timestamp, 10.0);
        assert_eq!(entry.v4, vec!["198.51.100.1".parse::<std::net::Ipv4Addr>().unwrap()]);
    }
}
