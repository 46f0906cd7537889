//! hostmap - map instance hostnames to their hosting providers.
//!
//! This is the command-line interface for the hostmap library.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use hostmap::config::{ttl, CacheTtls};
use hostmap::{
    shared_addresses, summarize, AddressLookup, Caches, EvictionStats, HickoryLookup,
    HosterSummary, Pipeline, PipelineConfig, PipelineOutcome, Services, SharedAddress,
    StaticLookup,
};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Addresses shared by more hostnames than this are listed in the report
const SHARED_ADDRESS_THRESHOLD: usize = 10;

/// Get the version string for hostmap
fn get_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(env!("CARGO_PKG_VERSION"), "-UNRELEASED")
    } else {
        env!("CARGO_PKG_VERSION")
    }
}

/// Command-line arguments for the hoster mapping tool.
#[derive(Parser, Debug)]
#[clap(author, version, about = "Map fediverse instances to their hosting providers", long_about = None)]
struct Args {
    /// IPv4 range-to-ASN table (TSV, optionally gzipped)
    #[clap(long)]
    asn_ipv4: Option<PathBuf>,

    /// IPv6 range-to-ASN table (TSV, optionally gzipped)
    #[clap(long)]
    asn_ipv6: Option<PathBuf>,

    /// Instance list JSON ({"instances": [...]})
    #[clap(long)]
    instances_list: PathBuf,

    /// Keep only the N largest instances by users, 0 for all
    #[clap(short, long, default_value_t = 30)]
    limit: usize,

    /// Number of resolver workers
    #[clap(short, long, default_value_t = 4)]
    workers: usize,

    /// Hostnames handed to a worker at a time
    #[clap(long, default_value_t = 10)]
    batch_size: usize,

    /// Directory holding the persisted caches
    #[clap(long, default_value = ".")]
    cache_dir: PathBuf,

    /// Lifetime of resolved-address cache entries in seconds
    #[clap(long)]
    ttl_ip: Option<u64>,

    /// Lifetime of failed-resolution cache entries in seconds
    #[clap(long)]
    ttl_no_ip: Option<u64>,

    /// Lifetime of ASN-mapping cache entries in seconds
    #[clap(long)]
    ttl_asn: Option<u64>,

    /// Resolve hostnames from a JSON table instead of DNS
    #[clap(long)]
    hosts: Option<PathBuf>,

    /// Output results in JSON format
    #[clap(long)]
    json: bool,

    /// Enable verbose output (use -vv for debug logging)
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// JSON output structure for a whole run
#[derive(Debug, serde::Serialize)]
struct JsonOutput<'a> {
    version: String,
    evicted: EvictionStats,
    summary: Vec<HosterSummary>,
    shared_addresses: Vec<SharedAddress>,
    outcome: &'a PipelineOutcome,
}

/// Cache lifetimes from the command line, defaults for unset flags
fn cache_ttls(args: &Args) -> Option<CacheTtls> {
    if args.ttl_ip.is_none() && args.ttl_no_ip.is_none() && args.ttl_asn.is_none() {
        return None;
    }
    let defaults = CacheTtls::default();
    Some(CacheTtls {
        resolved: args.ttl_ip.map_or(defaults.resolved, Duration::from_secs),
        failed: args.ttl_no_ip.map_or(defaults.failed, Duration::from_secs),
        asn: args.ttl_asn.map_or(defaults.asn, Duration::from_secs),
    })
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to create Tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(async_main(args)) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn async_main(args: Args) -> Result<()> {
    let config = PipelineConfig::builder()
        .workers(args.workers)
        .batch_size(args.batch_size)
        .limit(args.limit)
        .cache_dir(&args.cache_dir)
        .build()
        .map_err(|e| anyhow::anyhow!("Invalid configuration - {}", e))?;

    if let Some(ttls) = cache_ttls(&args) {
        info!("Using cache lifetimes {:?}", ttls);
        ttl::set_config(ttls).map_err(|_| anyhow::anyhow!("cache lifetimes already set"))?;
    }

    let lookup: Arc<dyn AddressLookup> = match &args.hosts {
        Some(path) => Arc::new(
            StaticLookup::from_json_file(path)
                .with_context(|| format!("cannot read hosts table {}", path.display()))?,
        ),
        None => Arc::new(HickoryLookup::system()),
    };

    let services = Services::from_range_files(
        lookup,
        args.asn_ipv4.as_deref(),
        args.asn_ipv6.as_deref(),
        &config,
    )?;
    let instances = hostmap::load_instances(&args.instances_list)
        .with_context(|| format!("loading {}", args.instances_list.display()))?;
    info!("Read {} instances", instances.len());

    let (caches, evicted) = Caches::load_and_prune(&config.cache_dir).await;
    let cache_dir = config.cache_dir.clone();
    let pipeline = Pipeline::new(config, services, caches);
    let outcome = pipeline.run(instances).await?;

    pipeline
        .caches()
        .persist(&cache_dir)
        .await
        .context("saving caches")?;

    let summary = summarize(&outcome);
    let shared = {
        let resolved = pipeline.caches().resolved.read().await;
        let asn = pipeline.caches().asn.read().await;
        shared_addresses(&resolved, &asn, SHARED_ADDRESS_THRESHOLD + 1)
    };

    if args.json {
        let output = JsonOutput {
            version: get_version().to_string(),
            evicted,
            summary,
            shared_addresses: shared,
            outcome: &outcome,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        display_text_results(&outcome, &summary, &shared);
    }
    Ok(())
}

/// Display results in text format
fn display_text_results(
    outcome: &PipelineOutcome,
    summary: &[HosterSummary],
    shared: &[SharedAddress],
) {
    let skipped = &outcome.skipped;
    println!(
        "Skipped {} instances: {} without address, {} without ASN, {} ambiguous, {} unmapped",
        skipped.total(),
        skipped.no_ip.len(),
        skipped.no_asn.len(),
        skipped.ambiguous.len(),
        skipped.unmapped.len()
    );
    if outcome.fixtures_ignored > 0 {
        println!("Ignored {} fake instances", outcome.fixtures_ignored);
    }

    for skip in &skipped.ambiguous {
        let hosters: Vec<&str> = skip.hosters.iter().map(String::as_str).collect();
        println!(
            "Ambiguous: {} ({} users) -> {}",
            skip.instance.name,
            skip.instance.users,
            hosters.join(", ")
        );
    }
    for skip in &skipped.unmapped {
        println!(
            "Unmapped: {} ({} users) -> {}",
            skip.instance.name, skip.instance.users, skip.org_name
        );
    }
    for (id, discovered) in &outcome.discovered_hosters {
        if discovered.occurrences > 1 {
            let names: Vec<&str> = discovered.org_names.iter().map(String::as_str).collect();
            println!(
                "Discovered hoster {} ({} ranges): {}",
                id,
                discovered.occurrences,
                names.join(" | ")
            );
        }
    }
    for failure in &outcome.failed_batches {
        println!(
            "Failed batch of {}: {}",
            failure.hostnames.len(),
            failure.error
        );
    }

    println!();
    println!(
        "{:<20} {:>9} {:>7} {:>12} {:>7} {:>12}",
        "hoster", "instances", "%", "users", "%", "active"
    );
    for row in summary {
        println!(
            "{:<20} {:>9} {:>6.2}% {:>12} {:>6.2}% {:>12}",
            row.hoster,
            row.instances,
            row.instance_share,
            row.users,
            row.user_share,
            row.active_users
        );
    }

    if !shared.is_empty() {
        println!();
        for address in shared {
            println!(
                "{} ({}) serves {} hostnames",
                address.address,
                address.as_name.as_deref().unwrap_or("unknown AS"),
                address.hostnames.len()
            );
        }
    }
}
