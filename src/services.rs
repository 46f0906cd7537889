//! Service container shared by pipeline workers
//!
//! Bundles the read-only collaborators every worker needs: hostname
//! resolution and the range-table ASN resolver. Services are immutable
//! after construction, so workers share them behind an `Arc` without
//! locking.

use crate::asn::AsnResolver;
use crate::dns::{AddressLookup, HostnameResolver};
use crate::pipeline::{PipelineConfig, PipelineError};
use crate::ranges::{self, RangeTable};
use log::info;
use std::path::Path;
use std::sync::Arc;

/// Container for the services used by pipeline workers
#[derive(Clone, Debug)]
pub struct Services {
    /// Hostname → address resolution
    pub resolver: HostnameResolver,
    /// Address → ASN range resolution
    pub asn: AsnResolver,
}

impl Services {
    /// Create services from an address lookup and loaded range tables
    pub fn new(lookup: Arc<dyn AddressLookup>, asn: AsnResolver) -> Self {
        Self {
            resolver: HostnameResolver::new(lookup),
            asn,
        }
    }

    /// Load the IPv4 and/or IPv6 range files and build the services.
    ///
    /// At least one range file is required; a missing or malformed file
    /// aborts setup.
    pub fn from_range_files(
        lookup: Arc<dyn AddressLookup>,
        ipv4: Option<&Path>,
        ipv6: Option<&Path>,
        config: &PipelineConfig,
    ) -> Result<Self, PipelineError> {
        if ipv4.is_none() && ipv6.is_none() {
            return Err(PipelineError::NoRangeTables);
        }

        let load = |path: Option<&Path>| -> Result<Option<Arc<RangeTable>>, PipelineError> {
            let Some(path) = path else {
                return Ok(None);
            };
            let table = ranges::load_or_parse(path, &config.cache_dir, config.bucket_size)?;
            info!(
                "Loaded {} ranges in {} buckets from {}",
                table.len(),
                table.bucket_count(),
                path.display()
            );
            Ok(Some(Arc::new(table)))
        };

        let asn = AsnResolver::new(load(ipv4)?, load(ipv6)?);
        Ok(Self::new(lookup, asn))
    }
}
