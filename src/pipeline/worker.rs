//! Worker tasks resolving batches of hostnames

use super::outcome::BatchFailure;
use crate::caches::Caches;
use crate::dns::{DnsError, ResolvedAddrs};
use crate::ranges::IpRange;
use crate::services::Services;
use log::{debug, error};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Hostnames processed together by one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Hostnames in dispatch order
    pub hostnames: Vec<String>,
}

impl Batch {
    /// Split hostnames into batches of at most `size`
    pub fn split(hostnames: &[String], size: usize) -> Vec<Batch> {
        hostnames
            .chunks(size.max(1))
            .map(|chunk| Batch {
                hostnames: chunk.to_vec(),
            })
            .collect()
    }

    /// Number of hostnames in the batch
    pub fn len(&self) -> usize {
        self.hostnames.len()
    }

    /// Whether the batch is empty
    pub fn is_empty(&self) -> bool {
        self.hostnames.is_empty()
    }
}

/// What a worker found for one hostname
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerResult {
    /// Hostname that was resolved
    pub hostname: String,
    /// Addresses it resolved to
    pub addrs: ResolvedAddrs,
    /// Ranges those addresses fell into
    pub ranges: Vec<IpRange>,
}

/// Count of hostnames handled so far, shared between dispatcher and
/// workers
#[derive(Debug, Clone)]
pub struct Progress {
    completed: Arc<AtomicUsize>,
    total: usize,
}

impl Progress {
    /// Create a counter expecting `total` hostnames
    pub fn new(total: usize) -> Self {
        Self {
            completed: Arc::new(AtomicUsize::new(0)),
            total,
        }
    }

    /// Record `count` more hostnames as handled
    pub fn advance(&self, count: usize) {
        self.completed.fetch_add(count, Ordering::Relaxed);
    }

    /// Hostnames handled so far
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Hostnames expected in total
    pub fn total(&self) -> usize {
        self.total
    }
}

/// Everything one worker produced before the queue ran dry
#[derive(Debug, Default)]
pub struct WorkerOutput {
    /// One result per hostname of every completed batch
    pub results: Vec<WorkerResult>,
    /// Batches aborted by a resolver failure
    pub failures: Vec<BatchFailure>,
}

impl WorkerOutput {
    /// Fold another worker's output into this one
    pub fn merge(&mut self, other: WorkerOutput) {
        self.results.extend(other.results);
        self.failures.extend(other.failures);
    }
}

/// Shared receiving end of the batch queue
pub type BatchQueue = Arc<Mutex<mpsc::Receiver<Batch>>>;

/// A worker pulling batches from the shared queue until it closes
pub struct Worker {
    id: usize,
    services: Arc<Services>,
    caches: Caches,
    progress: Progress,
    queue: BatchQueue,
}

impl Worker {
    /// Create a worker
    pub fn new(
        id: usize,
        services: Arc<Services>,
        caches: Caches,
        progress: Progress,
        queue: BatchQueue,
    ) -> Self {
        Self {
            id,
            services,
            caches,
            progress,
            queue,
        }
    }

    /// Process batches until the queue is closed and empty
    pub async fn run(self) -> WorkerOutput {
        let mut output = WorkerOutput::default();
        loop {
            let next = self.queue.lock().await.recv().await;
            let Some(batch) = next else {
                break;
            };

            match self.process(&batch).await {
                Ok(results) => output.results.extend(results),
                Err(e) => {
                    error!("Worker {} abandoned a batch of {}: {}", self.id, batch.len(), e);
                    output.failures.push(BatchFailure {
                        hostnames: batch.hostnames.clone(),
                        error: e.to_string(),
                    });
                }
            }
            self.progress.advance(batch.len());
        }
        debug!("Worker {} finished", self.id);
        output
    }

    /// Resolve every hostname of a batch in order.
    ///
    /// The first lookup failure abandons the whole batch.
    async fn process(&self, batch: &Batch) -> Result<Vec<WorkerResult>, DnsError> {
        let resolved_cache = self.caches.resolved.read().await;
        let asn_cache = self.caches.asn.read().await;

        let mut results = Vec::with_capacity(batch.len());
        for hostname in &batch.hostnames {
            let addrs = self
                .services
                .resolver
                .resolve(hostname, &resolved_cache)
                .await?;
            let ranges = if addrs.is_empty() {
                Vec::new()
            } else {
                self.services.asn.resolve(hostname, &addrs, &asn_cache)
            };
            results.push(WorkerResult {
                hostname: hostname.clone(),
                addrs,
                ranges,
            });
        }
        Ok(results)
    }
}
