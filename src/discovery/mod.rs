//! Partition discovery orchestration
//!
//! Drives range scanning, partition-key comparison against the discovery
//! cache, ledger synchronization on discovery, and the deletion
//! reconciliation pass over previously cached keys.

mod task;

pub use task::{PartitionDiscoveryTask, RunProgress, RunStats};
