//! Persisted, age-bounded caches

pub mod entries;
pub mod timed;

pub use entries::{AsnCache, AsnEntry, FailedCache, FailedEntry, IpEntry, ResolvedCache};
pub use timed::{unix_now, CacheError, TimedCache, Timestamped};
