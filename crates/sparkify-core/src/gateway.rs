//! The `StorageGateway` trait.
//!
//! The pipeline reads raw records and writes finished tables only through this
//! trait. Backends (e.g. `sparkify-store-opendal`) decide on the storage
//! service and the file formats.

use std::future::Future;

use serde::de::DeserializeOwned;

use crate::table::TableRow;

/// Abstraction over the record source and the table sink.
///
/// All methods return `Send` futures so the pipeline can run on a
/// multi-threaded tokio runtime.
pub trait StorageGateway: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Read every record in every input object whose path matches `glob`.
  ///
  /// Objects are read in sorted path order and records keep their order
  /// within an object. A line that cannot be decoded becomes `R::default()`.
  fn read_records<'a, R>(
    &'a self,
    glob: &'a str,
  ) -> impl Future<Output = Result<Vec<R>, Self::Error>> + Send + 'a
  where
    R: DeserializeOwned + Default + Send + 'static;

  /// Replace the stored contents of `T::TABLE` with `rows`.
  ///
  /// The table counts as committed only once the whole write has finished.
  fn write_table<T: TableRow>(
    &self,
    rows: Vec<T>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Read back a committed table. Fails if `T::TABLE` was never committed.
  fn read_table<T: TableRow>(
    &self,
  ) -> impl Future<Output = Result<Vec<T>, Self::Error>> + Send + '_;
}
