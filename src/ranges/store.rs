//! Loading range files with a content-addressed parse cache
//!
//! Parsing a full range file takes a while, so the parsed bucket list is
//! stored next to the other caches as gzip-compressed JSON, named after the
//! SHA-1 digest of the source file's bytes. A changed source file hashes to
//! a different name, so stale blobs are simply never found.

use super::table::{Bucket, RangeError, RangeRow, RangeTable};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Read size used while hashing source files
const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// On-disk form of a parsed table
#[derive(Debug, Serialize, Deserialize)]
struct StoredTable {
    buckets: Vec<StoredBucket>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredBucket {
    key: String,
    rows: Vec<RangeRow>,
}

/// Hex SHA-1 digest of a file's bytes
pub fn content_digest(path: &Path) -> Result<String, RangeError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Location of the parsed-table cache for a given source digest
pub fn parsed_cache_path(cache_dir: &Path, digest: &str) -> PathBuf {
    cache_dir.join(format!(".asnfile_cached_{digest}.gz"))
}

/// Parse a range file, reading through gzip when the name ends in `.gz`
pub fn parse_file(path: &Path, bucket_size: usize) -> Result<RangeTable, RangeError> {
    let file = File::open(path)?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        RangeTable::from_reader(BufReader::new(GzDecoder::new(file)), bucket_size)
    } else {
        RangeTable::from_reader(BufReader::new(file), bucket_size)
    }
}

/// Load a range table, reusing the parsed cache in `cache_dir` if one
/// exists for the file's current contents.
///
/// An unreadable cache blob counts as a miss. Failing to write a fresh
/// blob is logged and otherwise ignored.
pub fn load_or_parse(
    path: &Path,
    cache_dir: &Path,
    bucket_size: usize,
) -> Result<RangeTable, RangeError> {
    if !path.exists() {
        return Err(RangeError::NotFound(path.to_path_buf()));
    }

    let digest = content_digest(path)?;
    let cached = parsed_cache_path(cache_dir, &digest);

    if cached.exists() {
        match read_parsed(&cached) {
            Ok(table) => {
                debug!("Using cached parse of {} ({})", path.display(), digest);
                return Ok(table);
            }
            Err(e) => warn!(
                "Ignoring unreadable parsed range cache {}: {}",
                cached.display(),
                e
            ),
        }
    }

    info!("Parsing entries in range file {}", path.display());
    let table = parse_file(path, bucket_size)?;
    info!(
        "Parsed {} ranges into {} buckets",
        table.len(),
        table.bucket_count()
    );

    match write_parsed(&cached, &table) {
        Ok(()) => info!("Persisted parsed range cache {}", cached.display()),
        Err(e) => warn!(
            "Could not persist parsed range cache {}: {}",
            cached.display(),
            e
        ),
    }

    Ok(table)
}

fn read_parsed(path: &Path) -> Result<RangeTable, RangeError> {
    let decoder = GzDecoder::new(BufReader::new(File::open(path)?));
    let stored: StoredTable =
        serde_json::from_reader(decoder).map_err(|e| RangeError::Corrupt(e.to_string()))?;

    let buckets = stored
        .buckets
        .into_iter()
        .map(|bucket| Bucket::with_key(&bucket.key, bucket.rows))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RangeTable::from_buckets(buckets))
}

fn write_parsed(path: &Path, table: &RangeTable) -> Result<(), RangeError> {
    let stored = StoredTable {
        buckets: table
            .buckets()
            .iter()
            .map(|bucket| StoredBucket {
                key: bucket.key().to_string(),
                rows: bucket.rows().to_vec(),
            })
            .collect(),
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(path)?), Compression::default());
    serde_json::to_writer(&mut encoder, &stored).map_err(|e| RangeError::Corrupt(e.to_string()))?;
    encoder.finish()?.flush()?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ROWS: &str = "\
1.0.0.0\t1.0.0.255\t13335\tUS\tCLOUDFLARENET
1.0.4.0\t1.0.7.255\t38803\tAU\tGTELECOM-AUSTRALIA
1.0.16.0\t1.0.31.255\t2519\tJP\tVECTANT ARTERIA Networks Corporation
";

    fn write_source(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_digest_tracks_content() {
        let dir = TempDir::new().unwrap();
        let a = write_source(&dir, "a.tsv", ROWS);
        let b = write_source(&dir, "b.tsv", ROWS);
        let c = write_source(&dir, "c.tsv", "1.0.0.0\t1.0.0.255\t1\tUS\tX\n");

        let digest = content_digest(&a).unwrap();
        assert_eq!(digest.len(), 40);
        assert_eq!(digest, content_digest(&b).unwrap());
        assert_ne!(digest, content_digest(&c).unwrap());
    }

    #[test]
    fn test_parse_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "ip2asn-v4.tsv", ROWS);

        let parsed = load_or_parse(&source, dir.path(), 2).unwrap();
        let digest = content_digest(&source).unwrap();
        assert!(parsed_cache_path(dir.path(), &digest).exists());

        let loaded = load_or_parse(&source, dir.path(), 2).unwrap();
        assert_eq!(parsed, loaded);
        assert_eq!(loaded.bucket_count(), 2);
        assert_eq!(loaded.find("1.0.0.10".parse().unwrap())[0].asn, 13335);
    }

    #[test]
    fn test_cached_blob_is_preferred_over_source() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "v4.tsv", ROWS);
        let first = load_or_parse(&source, dir.path(), 1000).unwrap();

        // A cache hit keeps the stored bucket layout even if the caller now
        // asks for a different bucket size
        let second = load_or_parse(&source, dir.path(), 1).unwrap();
        assert_eq!(first, second);
        assert_eq!(second.bucket_count(), 1);
    }

    #[test]
    fn test_corrupt_blob_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "v4.tsv", ROWS);
        let digest = content_digest(&source).unwrap();
        fs::write(parsed_cache_path(dir.path(), &digest), b"not gzip at all").unwrap();

        let table = load_or_parse(&source, dir.path(), 1000).unwrap();
        assert_eq!(table.len(), 3);

        // The corrupt blob was replaced by a good one
        assert!(read_parsed(&parsed_cache_path(dir.path(), &digest)).is_ok());
    }

    #[test]
    fn test_gzip_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ip2asn-v4.tsv.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(ROWS.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let table = parse_file(&path, 1000).unwrap();
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_missing_source_is_fatal() {
        let dir = TempDir::new().unwrap();
        let result = load_or_parse(&dir.path().join("absent.tsv"), dir.path(), 1000);
        assert!(matches!(result, Err(RangeError::NotFound(_))));
    }
}
