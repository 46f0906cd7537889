//! Concurrent hostname-to-hoster pipeline
//!
//! A run goes through four phases:
//!
//! 1. the instance list is ordered by user count and truncated,
//! 2. hostnames still in the failed-resolution cache and known fake
//!    instances are filtered out without touching the network,
//! 3. the remaining hostnames are batched and resolved by a fixed pool of
//!    worker tasks,
//! 4. once every worker has finished, results are folded into the caches
//!    and the per-hoster sets by a single aggregator.
//!
//! Workers only ever read the caches. All writes happen in phase 4.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod outcome;
pub mod worker;

pub use aggregate::Aggregator;
pub use config::{PipelineConfig, PipelineConfigBuilder, DEFAULT_FIXTURE_PREFIXES};
pub use error::PipelineError;
pub use outcome::{
    AmbiguousSkip, BatchFailure, DiscoveredHoster, PipelineOutcome, SkipReport, UnmappedSkip,
};
pub use worker::{Batch, Progress, Worker, WorkerOutput, WorkerResult};

use crate::cache::unix_now;
use crate::caches::Caches;
use crate::hoster::HosterMapper;
use crate::instances::{select_top, Instance};
use crate::services::Services;
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// State of one pipeline: configuration, shared services and caches
pub struct Pipeline {
    config: PipelineConfig,
    services: Arc<Services>,
    caches: Caches,
    mapper: HosterMapper,
}

impl Pipeline {
    /// Create a pipeline with the default hoster table
    pub fn new(config: PipelineConfig, services: Services, caches: Caches) -> Self {
        Self {
            config,
            services: Arc::new(services),
            caches,
            mapper: HosterMapper::default(),
        }
    }

    /// Replace the hoster mapper
    #[must_use]
    pub fn with_mapper(mut self, mapper: HosterMapper) -> Self {
        self.mapper = mapper;
        self
    }

    /// The caches this pipeline reads and updates
    pub fn caches(&self) -> &Caches {
        &self.caches
    }

    /// The pipeline configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Map every selected instance to a hoster
    pub async fn run(&self, instances: Vec<Instance>) -> Result<PipelineOutcome, PipelineError> {
        self.config.validate().map_err(PipelineError::Config)?;

        let selected = select_top(instances, self.config.limit);
        info!("Processing {} instances", selected.len());

        let mut outcome = PipelineOutcome::default();
        let mut pending = Vec::with_capacity(selected.len());
        {
            let failed = self.caches.failed.read().await;
            for instance in &selected {
                if self.config.is_fixture(&instance.name) {
                    debug!("Ignoring fake instance {}", instance.name);
                    outcome.fixtures_ignored += 1;
                } else if failed.contains(&instance.name) {
                    debug!("Failed-resolution cache hit for {}", instance.name);
                    outcome.skipped.no_ip.push(instance.clone());
                } else {
                    pending.push(instance.name.clone());
                }
            }
        }

        let progress = Progress::new(pending.len() + outcome.skipped.no_ip.len());
        progress.advance(outcome.skipped.no_ip.len());

        let batches = Batch::split(&pending, self.config.batch_size);
        info!(
            "Resolving {} hostnames in {} batches with {} workers",
            pending.len(),
            batches.len(),
            self.config.workers
        );
        let output = self.dispatch(batches, progress).await?;

        let mut resolved = self.caches.resolved.write().await;
        let mut failed = self.caches.failed.write().await;
        let mut asn = self.caches.asn.write().await;

        outcome.failed_batches = output.failures;
        let mut aggregator = Aggregator::new(
            &mut resolved,
            &mut failed,
            &mut asn,
            &self.mapper,
            &selected,
            unix_now(),
            outcome,
        );
        for result in output.results {
            aggregator.absorb(result);
        }
        let outcome = aggregator.finish();

        info!(
            "Mapped {} instances to {} hosters, skipped {}, {} failed batches",
            outcome.accepted.len(),
            outcome.hosters.len(),
            outcome.skipped.total(),
            outcome.failed_batches.len()
        );
        Ok(outcome)
    }

    /// Feed batches to the worker pool and wait for it to drain
    async fn dispatch(
        &self,
        batches: Vec<Batch>,
        progress: Progress,
    ) -> Result<WorkerOutput, PipelineError> {
        let (tx, rx) = mpsc::channel(self.config.workers * 2);
        let queue = Arc::new(Mutex::new(rx));

        let feeder = tokio::spawn(async move {
            for batch in batches {
                if tx.send(batch).await.is_err() {
                    break;
                }
            }
        });

        let mut workers: FuturesUnordered<JoinHandle<WorkerOutput>> = (0..self.config.workers)
            .map(|id| {
                let worker = Worker::new(
                    id,
                    Arc::clone(&self.services),
                    self.caches.clone(),
                    progress.clone(),
                    Arc::clone(&queue),
                );
                tokio::spawn(worker.run())
            })
            .collect();

        let mut ticker = tokio::time::interval(self.config.progress_interval);
        // The first tick completes immediately
        ticker.tick().await;

        let mut output = WorkerOutput::default();
        loop {
            tokio::select! {
                joined = workers.next() => match joined {
                    Some(Ok(part)) => output.merge(part),
                    Some(Err(e)) => {
                        feeder.abort();
                        for handle in workers.iter() {
                            handle.abort();
                        }
                        return Err(e.into());
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    info!("Progress: {}/{}", progress.completed(), progress.total());
                }
            }
        }
        feeder.await?;

        info!("Progress: {}/{}", progress.completed(), progress.total());
        Ok(output)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::asn::AsnResolver;
    use crate::cache::FailedEntry;
    use crate::dns::{AddressLookup, DnsError, ResolvedAddrs, StaticLookup};
    use crate::ranges::RangeTable;
    use async_trait::async_trait;
    use std::net::IpAddr;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    const TABLE: &str = "\
1.0.0.0\t1.0.0.255\t13335\tUS\tCLOUDFLARENET
5.9.0.0\t5.9.255.255\t24940\tDE\tHETZNER-AS
";

    fn services(lookup: Arc<StaticLookup>) -> Services {
        let table = RangeTable::from_reader(TABLE.as_bytes(), 1000).unwrap();
        Services::new(lookup, AsnResolver::new(Some(Arc::new(table)), None))
    }

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_run_maps_hosters() {
        let lookup = Arc::new(
            StaticLookup::new()
                .with_host("cf.example", vec![addr("1.0.0.10")])
                .with_host("hz.example", vec![addr("5.9.1.1")]),
        );
        let pipeline = Pipeline::new(
            PipelineConfig::default(),
            services(lookup),
            Caches::default(),
        );

        let outcome = pipeline
            .run(vec![
                Instance::new("cf.example", 10),
                Instance::new("hz.example", 20),
            ])
            .await
            .unwrap();

        assert_eq!(outcome.hoster_of("cf.example"), Some("cloudflare"));
        assert_eq!(outcome.hoster_of("hz.example"), Some("hetzner"));
        assert!(pipeline.caches().resolved.read().await.contains("cf.example"));
    }

    #[tokio::test]
    async fn test_prefilter_skips_network() {
        let lookup = Arc::new(StaticLookup::new().with_host("cf.example", vec![addr("1.0.0.10")]));
        let caches = Caches::default();
        caches
            .failed
            .write()
            .await
            .set_if_absent("cf.example", FailedEntry { timestamp: unix_now() });
        let pipeline = Pipeline::new(
            PipelineConfig::default(),
            services(Arc::clone(&lookup)),
            caches,
        );

        let outcome = pipeline
            .run(vec![
                Instance::new("cf.example", 10),
                Instance::new("you-think-your-fake-numbers-are-funny.example", 1_000_000),
            ])
            .await
            .unwrap();

        assert_eq!(lookup.calls(), 0);
        assert_eq!(outcome.skipped.no_ip.len(), 1);
        assert_eq!(outcome.fixtures_ignored, 1);
        assert!(outcome.accepted.is_empty());
    }

    #[tokio::test]
    async fn test_many_batches_with_one_worker() {
        let mut lookup = StaticLookup::new();
        let mut instances = Vec::new();
        for i in 0..25 {
            let name = format!("h{i}.example");
            lookup = lookup.with_host(name.clone(), vec![addr("1.0.0.10")]);
            instances.push(Instance::new(name, i));
        }
        let config = PipelineConfig::builder()
            .workers(1)
            .batch_size(4)
            .limit(0)
            .build()
            .unwrap();
        let pipeline = Pipeline::new(config, services(Arc::new(lookup)), Caches::default());

        let outcome = pipeline.run(instances).await.unwrap();
        assert_eq!(outcome.hosters["cloudflare"].len(), 25);
    }

    /// Sets its flag when the future holding it is dropped
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    /// Panics on `boom.example`, never answers for anything else
    #[derive(Debug)]
    struct PanickingLookup {
        dropped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl AddressLookup for PanickingLookup {
        async fn lookup(&self, hostname: &str) -> Result<ResolvedAddrs, DnsError> {
            if hostname == "boom.example" {
                panic!("lookup crashed");
            }
            let _flag = DropFlag(Arc::clone(&self.dropped));
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_worker_panic_stops_other_workers() {
        let dropped = Arc::new(AtomicBool::new(false));
        let lookup = Arc::new(PanickingLookup {
            dropped: Arc::clone(&dropped),
        });
        let table = RangeTable::from_reader(TABLE.as_bytes(), 1000).unwrap();
        let services = Services::new(lookup, AsnResolver::new(Some(Arc::new(table)), None));
        let config = PipelineConfig::builder()
            .workers(2)
            .batch_size(1)
            .build()
            .unwrap();
        let pipeline = Pipeline::new(config, services, Caches::default());

        let err = pipeline
            .run(vec![
                Instance::new("boom.example", 20),
                Instance::new("stuck.example", 10),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Worker(_)));

        // Aborted tasks are dropped the next time the runtime polls them
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(dropped.load(Ordering::SeqCst));
    }
}
