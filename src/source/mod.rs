//! Source database access
//!
//! Discovery only ever asks the source four questions: what are the token
//! ranges, which columns form the partition key, which rows fall inside a
//! token range, and does a given partition still exist. `SourceStore`
//! captures exactly that surface so the orchestrator can run against a
//! real cluster or the in-memory stand-in.

mod fixture;
mod memory;

pub use fixture::{build_source, load_fixture, FixtureRow, SourceFixture};
pub use memory::InMemorySource;

use crate::error::SourceResult;
use crate::model::{ColumnSpec, PartitionKey, SourceRow};
use crate::tiler::TokenRange;

use async_trait::async_trait;

#[async_trait]
pub trait SourceStore: Send + Sync {
    /// All token ranges of the source keyspace
    async fn token_ranges(&self) -> SourceResult<Vec<TokenRange>>;

    /// Declared partition-key columns for the replicated table, in
    /// declaration order
    async fn partition_key_columns(&self) -> SourceResult<Vec<ColumnSpec>>;

    /// Rows whose token falls inside the inclusive range, projected to
    /// the given columns
    async fn scan_partition_keys(
        &self,
        columns: &[ColumnSpec],
        range: TokenRange,
    ) -> SourceResult<Vec<SourceRow>>;

    /// Point lookup: does the partition still hold at least one row
    async fn partition_exists(
        &self,
        key: &PartitionKey,
        columns: &[ColumnSpec],
    ) -> SourceResult<bool>;
}
