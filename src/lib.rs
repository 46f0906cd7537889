//! hostmap - map instance hostnames to their hosting providers
//!
//! This library resolves hostnames through DNS, looks the addresses up in
//! bulk IP-range-to-ASN tables and folds the organization names into
//! canonical hoster ids, keeping three age-bounded caches across runs.
//!
//! # Example
//!
//! ```no_run
//! use hostmap::{Caches, Pipeline, PipelineConfig, Services, HickoryLookup};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = PipelineConfig::default();
//! let services = Services::from_range_files(
//!     Arc::new(HickoryLookup::system()),
//!     Some(Path::new("ip2asn-v4.tsv")),
//!     None,
//!     &config,
//! )?;
//! let (caches, _) = Caches::load_and_prune(&config.cache_dir).await;
//! let instances = hostmap::load_instances(Path::new("instances.json"))?;
//!
//! let pipeline = Pipeline::new(config, services, caches);
//! let outcome = pipeline.run(instances).await?;
//! for summary in hostmap::summarize(&outcome) {
//!     println!("{}: {}", summary.hoster, summary.instances);
//! }
//! # Ok(())
//! # }
//! ```

pub mod asn;
pub mod cache;
pub mod caches;
pub mod config;
pub mod dns;
pub mod hoster;
pub mod instances;
pub mod pipeline;
pub mod ranges;
pub mod report;
pub mod services;

// Re-export core types for library users
pub use asn::AsnResolver;
pub use caches::{Caches, EvictionStats};
pub use dns::{AddressLookup, DnsError, HickoryLookup, HostnameResolver, StaticLookup};
pub use hoster::{HosterMapper, HosterMatch};
pub use instances::{load_instances, select_top, Instance, InstanceError};
pub use pipeline::{Pipeline, PipelineConfig, PipelineError, PipelineOutcome};
pub use ranges::{IpRange, RangeError, RangeTable};
pub use report::{shared_addresses, summarize, HosterSummary, SharedAddress};
pub use services::Services;
