//! Core data models for the reconciliation ledger and discovery protocol

use crate::error::{SourceError, SourceResult};
use crate::model::keys::PartitionKey;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current time as microseconds since the epoch (ledger timestamps)
pub fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

/// Current time as milliseconds since the epoch (cache discovery timestamps)
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Identity of a partition within a keyspace/table, attributed to a tile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionMetadata {
    pub tile: u32,
    pub keyspace: String,
    pub table: String,
    pub partition_key: PartitionKey,
}

impl PartitionMetadata {
    pub fn new(
        tile: u32,
        keyspace: impl Into<String>,
        table: impl Into<String>,
        partition_key: impl Into<PartitionKey>,
    ) -> Self {
        Self {
            tile,
            keyspace: keyspace.into(),
            table: table.into(),
            partition_key: partition_key.into(),
        }
    }
}

/// A synchronized row: its keys plus the run/write timestamps to record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowMetadata {
    pub tile: u32,
    pub keyspace: String,
    pub table: String,
    pub partition_key: PartitionKey,
    pub clustering_key: String,
    /// Reconciliation run that observed the row (epoch micros)
    pub last_run: i64,
    /// Source write time of the row (epoch micros)
    pub write_time: i64,
}

impl RowMetadata {
    pub fn new(
        tile: u32,
        keyspace: impl Into<String>,
        table: impl Into<String>,
        partition_key: PartitionKey,
        clustering_key: impl Into<String>,
        last_run: i64,
        write_time: i64,
    ) -> Self {
        Self {
            tile,
            keyspace: keyspace.into(),
            table: table.into(),
            partition_key,
            clustering_key: clustering_key.into(),
            last_run,
            write_time,
        }
    }

    /// The timing record stored against this row
    pub fn timestamps(&self) -> RowTimestamps {
        RowTimestamps {
            last_run: self.last_run,
            write_time: self.write_time,
        }
    }
}

/// Per-row timing record stored in the ledger with bincode serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowTimestamps {
    pub last_run: i64,
    pub write_time: i64,
}

impl RowTimestamps {
    /// Serialize to bytes using bincode
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// A row read back from the ledger: clustering key plus its timing record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowEntry {
    pub clustering_key: String,
    pub last_run: i64,
    pub write_time: i64,
}

impl RowEntry {
    pub fn new(clustering_key: impl Into<String>, last_run: i64, write_time: i64) -> Self {
        Self {
            clustering_key: clustering_key.into(),
            last_run,
            write_time,
        }
    }
}

/// Declared partition key column: name plus source type name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub type_name: String,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Typed column value from the source, rendered deterministically into
/// partition key components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnValue {
    Text(String),
    Int(i32),
    Bigint(i64),
    Double(f64),
    Boolean(bool),
    Uuid(uuid::Uuid),
    /// Epoch milliseconds, rendered as a decimal string
    Timestamp(i64),
}

impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnValue::Text(v) => write!(f, "{}", v),
            ColumnValue::Int(v) => write!(f, "{}", v),
            ColumnValue::Bigint(v) => write!(f, "{}", v),
            ColumnValue::Double(v) => write!(f, "{}", v),
            ColumnValue::Boolean(v) => write!(f, "{}", v),
            ColumnValue::Uuid(v) => write!(f, "{}", v),
            ColumnValue::Timestamp(v) => write!(f, "{}", v),
        }
    }
}

/// One row returned by a source scan: named, typed column values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRow {
    pub columns: Vec<(String, ColumnValue)>,
}

impl SourceRow {
    pub fn new(columns: Vec<(String, ColumnValue)>) -> Self {
        Self { columns }
    }

    /// Look up a column value by name
    pub fn get(&self, name: &str) -> Option<&ColumnValue> {
        self.columns
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, value)| value)
    }

    /// Render one declared column into its key component
    pub fn key_component(&self, spec: &ColumnSpec) -> SourceResult<String> {
        self.get(&spec.name)
            .map(|value| value.to_string())
            .ok_or_else(|| SourceError::MissingColumn {
                name: spec.name.clone(),
            })
    }

    /// Build the canonical partition key from the declared columns in order
    pub fn partition_key(&self, specs: &[ColumnSpec]) -> SourceResult<PartitionKey> {
        let mut components = Vec::with_capacity(specs.len());
        for spec in specs {
            components.push(self.key_component(spec)?);
        }
        Ok(PartitionKey::from_components(&components))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_timestamps_serialization() {
        let ts = RowTimestamps {
            last_run: 1_700_000_000_000_000,
            write_time: 1_699_999_999_000_000,
        };
        let bytes = ts.to_bytes().unwrap();
        let decoded = RowTimestamps::from_bytes(&bytes).unwrap();
        assert_eq!(ts, decoded);
    }

    #[test]
    fn test_column_value_rendering() {
        assert_eq!(ColumnValue::Text("abc".into()).to_string(), "abc");
        assert_eq!(ColumnValue::Bigint(-42).to_string(), "-42");
        assert_eq!(ColumnValue::Boolean(true).to_string(), "true");
        assert_eq!(ColumnValue::Timestamp(1700000000000).to_string(), "1700000000000");
    }

    #[test]
    fn test_partition_key_from_declared_columns() {
        let row = SourceRow::new(vec![
            ("region".to_string(), ColumnValue::Text("eu-west-1".into())),
            ("device_id".to_string(), ColumnValue::Bigint(42)),
        ]);
        let specs = vec![
            ColumnSpec::new("region", "text"),
            ColumnSpec::new("device_id", "bigint"),
        ];
        let pk = row.partition_key(&specs).unwrap();
        assert_eq!(pk.as_str(), "eu-west-1|42");
    }

    #[test]
    fn test_partition_key_follows_declared_order() {
        let row = SourceRow::new(vec![
            ("b".to_string(), ColumnValue::Int(2)),
            ("a".to_string(), ColumnValue::Int(1)),
        ]);
        let specs = vec![ColumnSpec::new("a", "int"), ColumnSpec::new("b", "int")];
        assert_eq!(row.partition_key(&specs).unwrap().as_str(), "1|2");
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let row = SourceRow::new(vec![]);
        let specs = vec![ColumnSpec::new("region", "text")];
        assert!(matches!(
            row.partition_key(&specs),
            Err(SourceError::MissingColumn { .. })
        ));
    }
}
