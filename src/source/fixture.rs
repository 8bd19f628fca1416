//! JSON source fixtures for local runs
//!
//! A production deployment plugs its own client in behind `SourceStore`;
//! fixtures give the binary a runnable source for local cycles and
//! validation. A fixture lists the token ranges, the declared
//! partition-key columns, and token-addressed rows:
//!
//! ```json
//! {
//!   "ranges": [{ "start": 0, "end": 999 }],
//!   "columns": [{ "name": "id", "type_name": "text" }],
//!   "rows": [{ "token": 42, "values": { "id": "42" } }]
//! }
//! ```
//!
//! Row values are decoded by each column's declared type name, the same
//! typed extraction a driver would perform.

use crate::error::{Result, SourceError, SourceResult};
use crate::model::{ColumnSpec, ColumnValue, SourceRow};
use crate::source::InMemorySource;
use crate::tiler::TokenRange;

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Parsed fixture file
#[derive(Debug, Deserialize)]
pub struct SourceFixture {
    /// Token ranges of the fixture keyspace
    pub ranges: Vec<TokenRange>,
    /// Declared partition-key columns, in declaration order
    pub columns: Vec<ColumnSpec>,
    /// Token-addressed rows
    #[serde(default)]
    pub rows: Vec<FixtureRow>,
}

/// One fixture row: a token plus named raw values
#[derive(Debug, Deserialize)]
pub struct FixtureRow {
    pub token: i64,
    pub values: BTreeMap<String, serde_json::Value>,
}

/// Load a fixture file into an in-memory source
pub async fn load_fixture(path: &Path) -> Result<InMemorySource> {
    let raw = std::fs::read_to_string(path)?;
    let fixture: SourceFixture = serde_json::from_str(&raw).map_err(|e| {
        SourceError::QueryFailed(format!("fixture '{}' failed to parse: {}", path.display(), e))
    })?;
    build_source(fixture).await
}

/// Materialize a parsed fixture as an in-memory source
pub async fn build_source(fixture: SourceFixture) -> Result<InMemorySource> {
    let source = InMemorySource::new(fixture.columns.clone(), fixture.ranges);
    for row in &fixture.rows {
        let mut columns = Vec::with_capacity(fixture.columns.len());
        for spec in &fixture.columns {
            let value = row
                .values
                .get(&spec.name)
                .ok_or_else(|| SourceError::MissingColumn {
                    name: spec.name.clone(),
                })?;
            columns.push((
                spec.name.clone(),
                decode_value(&spec.name, &spec.type_name, value)?,
            ));
        }
        source.insert(row.token, SourceRow::new(columns)).await;
    }
    Ok(source)
}

/// Typed extraction of one raw value by its declared column type
fn decode_value(
    name: &str,
    type_name: &str,
    value: &serde_json::Value,
) -> SourceResult<ColumnValue> {
    let unsupported = || SourceError::UnsupportedType {
        name: name.to_string(),
        type_name: type_name.to_string(),
    };

    match type_name.to_ascii_lowercase().as_str() {
        "text" | "varchar" | "ascii" => value
            .as_str()
            .map(|s| ColumnValue::Text(s.to_string()))
            .ok_or_else(unsupported),
        "int" | "smallint" | "tinyint" => value
            .as_i64()
            .map(|v| ColumnValue::Int(v as i32))
            .ok_or_else(unsupported),
        "bigint" | "counter" => value.as_i64().map(ColumnValue::Bigint).ok_or_else(unsupported),
        "double" | "float" => value.as_f64().map(ColumnValue::Double).ok_or_else(unsupported),
        "boolean" => value.as_bool().map(ColumnValue::Boolean).ok_or_else(unsupported),
        "uuid" | "timeuuid" => value
            .as_str()
            .and_then(|s| uuid::Uuid::parse_str(s).ok())
            .map(ColumnValue::Uuid)
            .ok_or_else(unsupported),
        "timestamp" => value
            .as_i64()
            .map(ColumnValue::Timestamp)
            .ok_or_else(unsupported),
        _ => Err(unsupported()),
    }
}
