//! Forward DNS resolution of instance hostnames

pub mod lookup;
pub mod resolver;
pub mod static_lookup;

pub use lookup::{create_default_resolver, AddressLookup, DnsError, HickoryLookup, ResolvedAddrs};
pub use resolver::HostnameResolver;
pub use static_lookup::StaticLookup;
