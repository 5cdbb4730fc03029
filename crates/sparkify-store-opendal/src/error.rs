//! Error type for `sparkify-store-opendal`.

use arrow::datatypes::DataType;
use sparkify_core::table::TableName;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] sparkify_core::Error),

  #[error("storage error: {0}")]
  Storage(#[from] opendal::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("arrow error: {0}")]
  Arrow(#[from] arrow::error::ArrowError),

  #[error("parquet error: {0}")]
  Parquet(#[from] parquet::errors::ParquetError),

  #[error("invalid glob: {0}")]
  Glob(#[from] glob::PatternError),

  /// The table has no `_SUCCESS` marker: it was never written, or its last
  /// write did not finish.
  #[error("table {0} has not been committed")]
  TableNotCommitted(TableName),

  #[error("invalid partition segment {segment:?} in {path}")]
  Partition { path: String, segment: String },

  #[error("column {column} has unexpected type {found}")]
  ArrowType { column: String, found: DataType },

  /// A blocking encode/decode task panicked or was cancelled.
  #[error("blocking task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
