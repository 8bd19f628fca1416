//! Error types for tile-reconciler
//!
//! Comprehensive error hierarchy covering:
//! - Durable ledger (RocksDB) errors
//! - Discovery cache (Redis) errors
//! - Source store errors
//! - Codec and compression errors
//! - Configuration errors

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for tile-reconciler
#[derive(Error, Debug)]
pub enum ReconcilerError {
    /// Ledger storage errors
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Discovery cache errors (Redis)
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Source store errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Codec errors
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Compression errors
    #[error("Compression error: {0}")]
    Compression(#[from] CompressionError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Interrupted by signal
    #[error("Operation interrupted by signal")]
    Interrupted,
}

/// Durable ledger errors
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Underlying RocksDB failure
    #[error("RocksDB error: {0}")]
    Rocks(#[from] rocksdb::Error),

    /// Stored value failed to encode/decode
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// A clustering key is present in the partition's key set but has no
    /// timing record. The ledger is corrupt; never skipped or repaired.
    #[error("Missing timing record for row '{row_key}' in partition '{partition_key}'")]
    MissingTimingRecord {
        partition_key: String,
        row_key: String,
    },

    /// Snapshot copy failed
    #[error("Snapshot of '{path}' failed: {reason}")]
    SnapshotFailed { path: PathBuf, reason: String },
}

/// Discovery cache (Redis) errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Redis connection failed
    #[error("Failed to connect to Redis at '{url}': {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// A value the protocol requires is missing
    #[error("Expected cache value missing for key '{key}'")]
    Missing { key: String },

    /// Chunk counter holds a non-numeric value
    #[error("Invalid chunk counter for key '{key}': '{value}'")]
    InvalidCounter { key: String, value: String },

    /// Redis error
    #[error("Redis error: {0}")]
    Redis(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Redis(err.to_string())
    }
}

/// Source store errors
#[derive(Error, Debug)]
pub enum SourceError {
    /// Range or point query failed
    #[error("Source query failed: {0}")]
    QueryFailed(String),

    /// Source did not answer in time
    #[error("Source query timed out")]
    Timeout,

    /// A declared partition key column is absent from a result row
    #[error("Column '{name}' missing from source row")]
    MissingColumn { name: String },

    /// Column type has no key rendering
    #[error("Unsupported type '{type_name}' for column '{name}'")]
    UnsupportedType { name: String, type_name: String },
}

/// Codec errors for the compact key-set and chunk formats
#[derive(Error, Debug)]
pub enum CodecError {
    /// Encoding failed
    #[error("Encode failed: {0}")]
    Encode(String),

    /// Payload is malformed; treated as fatal by callers
    #[error("Decode failed: {0}")]
    Decode(String),
}

/// Compression errors for chunk payloads
#[derive(Error, Debug)]
pub enum CompressionError {
    /// zstd compression failed
    #[error("Compression failed: {0}")]
    CompressFailed(String),

    /// zstd decompression failed
    #[error("Decompression failed: {0}")]
    DecompressFailed(String),

    /// Payload does not start with the zstd magic bytes
    #[error("Data is not zstd-compressed ({size} bytes)")]
    NotCompressed { size: usize },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Tile index out of range
    #[error("Invalid tile {tile}: must be less than tile count {tiles}")]
    InvalidTile { tile: u32, tiles: u32 },

    /// Tile count must be positive
    #[error("Invalid tile count: {0}")]
    InvalidTileCount(u32),

    /// Batch size must be positive
    #[error("Invalid token batch size: {0}")]
    InvalidBatchSize(i64),

    /// Flush capacity must be positive
    #[error("Invalid flush capacity: {0}")]
    InvalidFlushCapacity(usize),

    /// Invalid Redis URL
    #[error("Invalid Redis URL: {0}")]
    InvalidRedisUrl(String),

    /// Storage root unusable
    #[error("Invalid storage root '{path}': {reason}")]
    InvalidStorageRoot { path: PathBuf, reason: String },

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ReconcilerError>;

/// Result type for ledger operations
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Result type for cache operations
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Result type for source operations
pub type SourceResult<T> = std::result::Result<T, SourceError>;
