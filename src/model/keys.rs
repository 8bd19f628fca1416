//! Key types and ledger key encoding
//!
//! Defines the canonical string forms shared by the ledger and the
//! discovery cache. A partition key is the pipe-joined rendering of the
//! partition key columns in declared order; a row ledger key appends the
//! clustering key rendering with another pipe.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical partition key: column values joined with '|' in declared order
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Build from an already-joined canonical string
    pub fn new<S: Into<String>>(key: S) -> Self {
        Self(key.into())
    }

    /// Join rendered column values in declared order
    pub fn from_components(components: &[String]) -> Self {
        Self(components.join("|"))
    }

    /// Canonical string form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the canonical string
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PartitionKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for PartitionKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// Row-level primary key: partition key plus clustering key rendering
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrimaryKey {
    pub partition_key: PartitionKey,
    pub clustering_key: String,
}

impl PrimaryKey {
    pub fn new(partition_key: PartitionKey, clustering_key: impl Into<String>) -> Self {
        Self {
            partition_key,
            clustering_key: clustering_key.into(),
        }
    }
}

/// Partition-identity record: a partition attributed to the tile that found it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionIdent {
    pub tile: u32,
    pub partition_key: PartitionKey,
}

impl PartitionIdent {
    pub fn new(tile: u32, partition_key: PartitionKey) -> Self {
        Self {
            tile,
            partition_key,
        }
    }
}

/// Encode a partition-identity key: "{tile}|{partition_key}"
pub fn encode_ident_key(tile: u32, partition_key: &PartitionKey) -> Vec<u8> {
    format!("{}|{}", tile, partition_key).into_bytes()
}

/// Decode a partition-identity key
///
/// The tile prefix never contains a pipe, so the split happens at the
/// first one; everything after belongs to the partition key.
pub fn decode_ident_key(key: &[u8]) -> Option<PartitionIdent> {
    let text = std::str::from_utf8(key).ok()?;
    let (tile, pk) = text.split_once('|')?;
    let tile = tile.parse::<u32>().ok()?;
    Some(PartitionIdent::new(tile, PartitionKey::new(pk)))
}

/// Encode a partition key as a row-set key (UTF-8 bytes)
pub fn encode_set_key(partition_key: &PartitionKey) -> Vec<u8> {
    partition_key.as_str().as_bytes().to_vec()
}

/// Decode a row-set key back into a partition key
pub fn decode_set_key(key: &[u8]) -> Result<PartitionKey, std::string::FromUtf8Error> {
    String::from_utf8(key.to_vec()).map(PartitionKey::new)
}

/// Encode a per-row timing key: "{partition_key}|{clustering_key}"
pub fn encode_row_key(partition_key: &PartitionKey, clustering_key: &str) -> Vec<u8> {
    format!("{}|{}", partition_key, clustering_key).into_bytes()
}
