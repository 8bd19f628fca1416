//! tile-reconciler - Partition reconciliation for tiled token-range replication
//!
//! Keeps a durable per-tile ledger of synchronized partitions in step with a
//! source database, coordinating through a shared discovery cache so that
//! many tiles can divide one token space between them.
//!
//! # Architecture
//!
//! A run has two stages:
//!
//! ## Stage 1: Scan and compare
//! - The tiler assigns token ranges round-robin across tiles and splits each
//!   range into bounded sub-batches
//! - Every scanned row's partition key is checked against the discovery cache
//! - Unseen keys are stamped into the cache, recorded in the local ledger,
//!   and buffered; full buffers flush to the cache as compressed, densely
//!   numbered chunks per tile
//!
//! ## Stage 2: Scan and remove
//! - Previously flushed chunks are pulled back out and every key re-validated
//!   against the source
//! - Vanished partitions are evicted from the cache, the owning chunk, and
//!   the ledger; emptied chunks drop the per-tile chunk counter
//!
//! # Scaling
//!
//! Each tile is owned by exactly one process. Add tiles to divide the token
//! space further; all tiles share one cache and keep independent ledgers.

pub mod cache;
pub mod codec;
pub mod compress;
pub mod config;
pub mod discovery;
pub mod error;
pub mod ledger;
pub mod model;
pub mod source;
pub mod tiler;

pub use config::{CliArgs, ReconcilerConfig};
pub use discovery::{PartitionDiscoveryTask, RunProgress, RunStats};
pub use error::{ReconcilerError, Result};
