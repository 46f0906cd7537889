//! Process-wide configuration

pub mod ttl;

pub use ttl::CacheTtls;
