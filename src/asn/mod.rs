//! ASN (Autonomous System Number) resolution against local range tables

pub mod resolver;

pub use resolver::AsnResolver;
