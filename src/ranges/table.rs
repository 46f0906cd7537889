//! Bucketed range table built from a pre-sorted TSV range file
//!
//! Rows are grouped in source order into fixed-size buckets keyed by the
//! start address of their first row. A lookup narrows the search to the
//! one bucket whose key is the greatest key not above the address, then
//! scans only that bucket.

use log::debug;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::net::IpAddr;
use std::path::PathBuf;

/// Number of rows held by one bucket unless configured otherwise
pub const DEFAULT_BUCKET_SIZE: usize = 1000;

/// Errors raised while building or loading a range table
#[derive(Debug, thiserror::Error)]
pub enum RangeError {
    /// The range file does not exist
    #[error("range file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Reading the range file failed
    #[error("I/O error reading range data: {0}")]
    Io(#[from] std::io::Error),

    /// A row could not be parsed
    #[error("malformed range row at line {line}: {reason}")]
    Parse {
        /// 1-based line number in the source file
        line: usize,
        /// What was wrong with the row
        reason: String,
    },

    /// A parsed-table cache blob could not be decoded
    #[error("corrupt parsed range table: {0}")]
    Corrupt(String),
}

/// An address range announced by one autonomous system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IpRange {
    /// Organization name registered for the AS (e.g. "CLOUDFLARENET")
    pub name: String,
    /// Autonomous System Number, 0 for unassigned space
    pub asn: u32,
    /// Two-letter country code
    pub country: String,
    /// First address of the range
    pub start: IpAddr,
    /// Last address of the range
    pub end: IpAddr,
}

impl IpRange {
    /// Whether `ip` lies strictly between `start` and `end`.
    ///
    /// The boundary addresses themselves never match.
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.start < ip && ip < self.end
    }

    /// Whether the range belongs to a real AS
    pub fn is_assigned(&self) -> bool {
        self.asn != 0
    }
}

/// One row of a range file, addresses kept as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeRow {
    /// Start address text
    pub start: String,
    /// End address text
    pub end: String,
    /// Autonomous System Number
    pub asn: u32,
    /// Country code
    pub country: String,
    /// Organization name
    pub name: String,
}

impl RangeRow {
    /// Parse a tab-separated `start, end, asn, country, org` row.
    ///
    /// Columns past the fifth are ignored.
    pub fn parse(line: &str, line_no: usize) -> Result<Self, RangeError> {
        let malformed = |reason: String| RangeError::Parse {
            line: line_no,
            reason,
        };

        let mut fields = line.trim_end_matches(['\r', '\n']).split('\t');
        let mut column = |what: &str| {
            fields
                .next()
                .ok_or_else(|| malformed(format!("missing {what} column")))
        };

        let start = column("start")?;
        let end = column("end")?;
        let asn = column("asn")?;
        let country = column("country")?;
        let name = column("org")?;

        for addr in [start, end] {
            addr.parse::<IpAddr>()
                .map_err(|_| malformed(format!("invalid address '{addr}'")))?;
        }
        let asn = asn
            .trim()
            .parse::<u32>()
            .map_err(|_| malformed(format!("invalid ASN '{asn}'")))?;

        Ok(Self {
            start: start.to_string(),
            end: end.to_string(),
            asn,
            country: country.to_string(),
            name: name.to_string(),
        })
    }

    /// Convert to structured addresses, `None` if either address is invalid
    pub fn to_range(&self) -> Option<IpRange> {
        Some(IpRange {
            name: self.name.clone(),
            asn: self.asn,
            country: self.country.clone(),
            start: self.start.parse().ok()?,
            end: self.end.parse().ok()?,
        })
    }
}

/// A contiguous run of rows keyed by its first start address
#[derive(Debug)]
pub struct Bucket {
    key: IpAddr,
    rows: Vec<RangeRow>,
    converted: OnceCell<Vec<IpRange>>,
}

impl Bucket {
    /// Build a bucket from rows, keyed by the first row's start address.
    pub(crate) fn with_key(key: &str, rows: Vec<RangeRow>) -> Result<Self, RangeError> {
        let key = key
            .parse()
            .map_err(|_| RangeError::Corrupt(format!("invalid bucket key '{key}'")))?;
        Ok(Self {
            key,
            rows,
            converted: OnceCell::new(),
        })
    }

    /// The bucket's key (start address of its first row)
    pub fn key(&self) -> IpAddr {
        self.key
    }

    /// Rows in source order
    pub fn rows(&self) -> &[RangeRow] {
        &self.rows
    }

    /// Rows converted to structured ranges, converted on first use.
    ///
    /// Concurrent first callers block on one conversion; the result is
    /// shared afterwards.
    fn ranges(&self) -> &[IpRange] {
        self.converted.get_or_init(|| {
            debug!(
                "Converting bucket {} ({} rows) to structured addresses",
                self.key,
                self.rows.len()
            );
            self.rows.iter().filter_map(RangeRow::to_range).collect()
        })
    }

    fn is_converted(&self) -> bool {
        self.converted.get().is_some()
    }
}

impl PartialEq for Bucket {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.rows == other.rows
    }
}

/// Ordered bucket index over one address family's range file
#[derive(Debug, PartialEq)]
pub struct RangeTable {
    buckets: Vec<Bucket>,
}

impl RangeTable {
    /// Parse TSV rows from a reader into buckets of `bucket_size` rows.
    ///
    /// Input order is kept as-is. Empty lines are ignored; any other row
    /// that fails to parse aborts the build.
    pub fn from_reader<R: BufRead>(reader: R, bucket_size: usize) -> Result<Self, RangeError> {
        let bucket_size = bucket_size.max(1);
        let mut buckets = Vec::new();
        let mut current: Vec<RangeRow> = Vec::with_capacity(bucket_size);

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            current.push(RangeRow::parse(&line, idx + 1)?);
            if current.len() == bucket_size {
                buckets.push(Self::seal(std::mem::take(&mut current))?);
            }
        }
        if !current.is_empty() {
            buckets.push(Self::seal(current)?);
        }

        Ok(Self { buckets })
    }

    /// Assemble a table from already-ordered buckets
    pub(crate) fn from_buckets(buckets: Vec<Bucket>) -> Self {
        Self { buckets }
    }

    fn seal(rows: Vec<RangeRow>) -> Result<Bucket, RangeError> {
        let key = rows[0].start.clone();
        Bucket::with_key(&key, rows)
    }

    /// Find every assigned range in the candidate bucket that strictly
    /// contains `ip`.
    ///
    /// Ranges that begin in an earlier bucket are not consulted.
    pub fn find(&self, ip: IpAddr) -> Vec<IpRange> {
        let Some(bucket) = self.locate(ip) else {
            return Vec::new();
        };
        bucket
            .ranges()
            .iter()
            .filter(|range| range.is_assigned() && range.contains(ip))
            .cloned()
            .collect()
    }

    /// The last bucket whose key is not greater than `ip`
    fn locate(&self, ip: IpAddr) -> Option<&Bucket> {
        let idx = self.buckets.partition_point(|bucket| bucket.key <= ip);
        idx.checked_sub(1).map(|i| &self.buckets[i])
    }

    /// Buckets in key order
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// Number of buckets
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Total number of rows across all buckets
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.rows.len()).sum()
    }

    /// Whether the table holds no rows
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Number of buckets already converted to structured addresses
    pub fn converted_buckets(&self) -> usize {
        self.buckets.iter().filter(|b| b.is_converted()).count()
    }
}
