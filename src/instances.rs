//! Instance list input
//!
//! Instance directories report counts either as JSON numbers or as numeric
//! strings, and `active_users` is null for instances that stopped
//! reporting. Both forms are accepted here.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

/// Error type for reading the instance list
#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    /// The file could not be read
    #[error("cannot read instance list: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a valid instance list
    #[error("invalid instance list: {0}")]
    Format(#[from] serde_json::Error),
}

/// One fediverse instance as listed by the instance directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Hostname of the instance
    pub name: String,
    /// Registered users
    #[serde(deserialize_with = "count")]
    pub users: u64,
    /// Recently active users, if reported
    #[serde(default, deserialize_with = "optional_count")]
    pub active_users: Option<u64>,
    /// Number of posts
    #[serde(default, deserialize_with = "count")]
    pub statuses: u64,
    /// Number of federated peers
    #[serde(default, deserialize_with = "count")]
    pub connections: u64,
    /// Whether the instance is reachable over IPv6
    #[serde(default)]
    pub ipv6: bool,
}

impl Instance {
    /// Minimal instance with only a name and user count
    pub fn new(name: impl Into<String>, users: u64) -> Self {
        Self {
            name: name.into(),
            users,
            active_users: None,
            statuses: 0,
            connections: 0,
            ipv6: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InstanceList {
    instances: Vec<Instance>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Count {
    Number(u64),
    Text(String),
}

fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match Count::deserialize(deserializer)? {
        Count::Number(n) => Ok(n),
        Count::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn optional_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    match Option::<Count>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Count::Number(n)) => Ok(Some(n)),
        Some(Count::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Count::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Parse a `{"instances": [...]}` document
pub fn parse_instances(data: &[u8]) -> Result<Vec<Instance>, InstanceError> {
    let list: InstanceList = serde_json::from_slice(data)?;
    Ok(list.instances)
}

/// Read an instance list file
pub fn load_instances(path: &Path) -> Result<Vec<Instance>, InstanceError> {
    parse_instances(&std::fs::read(path)?)
}

/// Order instances by user count, largest first, and keep the top `limit`.
///
/// A limit of 0 keeps every instance. Ties keep their input order.
pub fn select_top(mut instances: Vec<Instance>, limit: usize) -> Vec<Instance> {
    instances.sort_by(|a, b| b.users.cmp(&a.users));
    if limit > 0 {
        instances.truncate(limit);
    }
    instances
}
