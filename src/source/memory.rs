//! In-memory source for tests and local runs

use crate::error::SourceResult;
use crate::model::{ColumnSpec, PartitionKey, SourceRow};
use crate::source::SourceStore;
use crate::tiler::TokenRange;

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Token-addressed row set with the same query surface as a real cluster.
///
/// Rows are held as `(token, row)` pairs; range scans filter on the token,
/// existence probes compare extracted partition keys. Rows can be removed
/// while the store is shared to simulate partitions vanishing between
/// discovery passes.
pub struct InMemorySource {
    columns: Vec<ColumnSpec>,
    ranges: Vec<TokenRange>,
    rows: Mutex<Vec<(i64, SourceRow)>>,
}

impl InMemorySource {
    pub fn new(columns: Vec<ColumnSpec>, ranges: Vec<TokenRange>) -> Self {
        Self {
            columns,
            ranges,
            rows: Mutex::new(Vec::new()),
        }
    }

    /// Add one row at the given token
    pub async fn insert(&self, token: i64, row: SourceRow) {
        self.rows.lock().await.push((token, row));
    }

    /// Drop every row belonging to the partition; returns how many went
    pub async fn remove_partition(&self, key: &PartitionKey) -> usize {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        let columns = self.columns.clone();
        rows.retain(|(_, row)| {
            row.partition_key(&columns)
                .map(|k| k != *key)
                .unwrap_or(true)
        });
        before - rows.len()
    }

    pub async fn row_count(&self) -> usize {
        self.rows.lock().await.len()
    }
}

#[async_trait]
impl SourceStore for InMemorySource {
    async fn token_ranges(&self) -> SourceResult<Vec<TokenRange>> {
        Ok(self.ranges.clone())
    }

    async fn partition_key_columns(&self) -> SourceResult<Vec<ColumnSpec>> {
        Ok(self.columns.clone())
    }

    async fn scan_partition_keys(
        &self,
        _columns: &[ColumnSpec],
        range: TokenRange,
    ) -> SourceResult<Vec<SourceRow>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .filter(|(token, _)| range.contains(*token))
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn partition_exists(
        &self,
        key: &PartitionKey,
        columns: &[ColumnSpec],
    ) -> SourceResult<bool> {
        let rows = self.rows.lock().await;
        for (_, row) in rows.iter() {
            if row.partition_key(columns)? == *key {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
