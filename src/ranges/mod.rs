//! IP-range-to-ASN tables

pub mod store;
pub mod table;

pub use store::{content_digest, load_or_parse, parsed_cache_path};
pub use table::{Bucket, IpRange, RangeError, RangeRow, RangeTable, DEFAULT_BUCKET_SIZE};
