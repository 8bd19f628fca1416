//! Data models shared across the ledger, cache, and discovery task
//!
//! - `keys`: partition/primary key types and ledger key encodings
//! - `types`: metadata records, timing values, typed source columns

pub mod keys;
pub mod types;

pub use keys::{
    decode_ident_key, decode_set_key, encode_ident_key, encode_row_key, encode_set_key,
    PartitionIdent, PartitionKey, PrimaryKey,
};
pub use types::{
    now_micros, now_millis, ColumnSpec, ColumnValue, PartitionMetadata, RowEntry, RowMetadata,
    RowTimestamps, SourceRow,
};
