//! Error types for `sparkify-core`.

use thiserror::Error;

use crate::table::{ColumnType, TableName};

#[derive(Debug, Error)]
pub enum Error {
  #[error("{table}: expected {expected} columns, got {actual}")]
  ColumnCount {
    table:    TableName,
    expected: usize,
    actual:   usize,
  },

  #[error("{table}.{column}: expected a {expected:?} value")]
  ColumnType {
    table:    TableName,
    column:   &'static str,
    expected: ColumnType,
  },

  #[error("{table}.{column} must not be null")]
  NullValue {
    table:  TableName,
    column: &'static str,
  },

  #[error("storage gateway error: {0}")]
  Gateway(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
