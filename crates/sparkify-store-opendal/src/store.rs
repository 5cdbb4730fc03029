//! [`OpendalGateway`]: the OpenDAL implementation of [`StorageGateway`].

use std::path::Path;

use bytes::Bytes;
use futures::{StreamExt as _, TryStreamExt as _, stream};
use glob::{MatchOptions, Pattern};
use opendal::{ErrorKind, Operator};
use serde::de::DeserializeOwned;
use sparkify_core::{
  gateway::StorageGateway,
  table::{TableRow, Value},
};

use crate::{Error, Result, encode};

/// Marker written after every data file of a table; its presence is what
/// makes a table readable.
pub const SUCCESS_MARKER: &str = "_SUCCESS";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
  case_sensitive:              true,
  require_literal_separator:   true,
  require_literal_leading_dot: false,
};

// ─── Operators ───────────────────────────────────────────────────────────────

/// An operator rooted at a local directory.
pub fn fs_operator(root: impl AsRef<Path>) -> Result<Operator> {
  let root = std::path::absolute(root.as_ref())?;
  let builder = opendal::services::Fs::default().root(&root.to_string_lossy());
  Ok(Operator::new(builder)?.finish())
}

/// Connection settings for an S3 bucket.
#[derive(Debug, Clone, Default)]
pub struct S3Options {
  pub bucket:            String,
  /// Key prefix inside the bucket. Empty for the bucket root.
  pub root:              String,
  pub region:            Option<String>,
  /// Custom endpoint for S3-compatible services.
  pub endpoint:          Option<String>,
  pub access_key_id:     Option<String>,
  pub secret_access_key: Option<String>,
}

/// An operator rooted inside an S3 bucket.
///
/// Credentials left unset are resolved by OpenDAL from the environment.
pub fn s3_operator(options: &S3Options) -> Result<Operator> {
  let mut builder = opendal::services::S3::default().bucket(&options.bucket);
  if !options.root.is_empty() {
    builder = builder.root(&options.root);
  }
  if let Some(region) = options.region.as_deref() {
    builder = builder.region(region);
  }
  if let Some(endpoint) = options.endpoint.as_deref() {
    builder = builder.endpoint(endpoint);
  }
  if let Some(key) = options.access_key_id.as_deref() {
    builder = builder.access_key_id(key);
  }
  if let Some(secret) = options.secret_access_key.as_deref() {
    builder = builder.secret_access_key(secret);
  }
  Ok(Operator::new(builder)?.finish())
}

// ─── Gateway ─────────────────────────────────────────────────────────────────

/// Limits on concurrent object I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayOptions {
  /// Objects fetched at once while reading input records or table files.
  pub read_concurrency:  usize,
  /// Partition files uploaded at once while writing a table.
  pub write_concurrency: usize,
}

impl Default for GatewayOptions {
  fn default() -> Self {
    Self {
      read_concurrency:  16,
      write_concurrency: 8,
    }
  }
}

/// Reads JSON-lines input from one operator and keeps Parquet tables in
/// another.
///
/// Cloning is cheap; operators are reference-counted.
#[derive(Debug, Clone)]
pub struct OpendalGateway {
  input:   Operator,
  output:  Operator,
  options: GatewayOptions,
}

impl OpendalGateway {
  pub fn new(input: Operator, output: Operator) -> Self {
    Self { input, output, options: GatewayOptions::default() }
  }

  pub fn with_options(mut self, options: GatewayOptions) -> Self {
    self.options = options;
    self
  }

  /// Input and output both on the local filesystem.
  pub fn local(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<Self> {
    Ok(Self::new(fs_operator(input)?, fs_operator(output)?))
  }

  /// Every file under `prefix`, in sorted path order.
  async fn list_files(op: &Operator, prefix: &str) -> Result<Vec<String>> {
    let mut paths = Vec::new();
    let mut lister = op.lister_with(prefix).recursive(true).await?;
    while let Some(entry) = lister.try_next().await? {
      if entry.metadata().is_file() {
        paths.push(entry.path().to_string());
      }
    }
    paths.sort();
    Ok(paths)
  }

  /// Fetch `paths` with bounded concurrency, keeping their order.
  async fn read_all(&self, op: &Operator, paths: Vec<String>) -> Result<Vec<(String, Bytes)>> {
    stream::iter(paths)
      .map(|path| async move {
        let data = op.read(&path).await?;
        tracing::debug!(path = %path, bytes = data.len(), "read object");
        Ok::<_, Error>((path, data.to_bytes()))
      })
      .buffered(self.options.read_concurrency.max(1))
      .try_collect()
      .await
  }
}

/// Directory to list for `glob`: everything up to the last `/` before the
/// first wildcard.
fn list_root(glob: &str) -> &str {
  let literal = glob.find(['*', '?', '[']).map_or(glob, |i| &glob[..i]);
  match literal.rfind('/') {
    Some(i) => &glob[..=i],
    None => "/",
  }
}

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Decode each non-blank line of `bytes` as one record. A leading UTF-8 byte
/// order mark is skipped.
fn parse_lines<R>(path: &str, bytes: &[u8], out: &mut Vec<R>)
where
  R: DeserializeOwned + Default,
{
  let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
  for (idx, line) in bytes.split(|b| *b == b'\n').enumerate() {
    let line = line.trim_ascii();
    if line.is_empty() {
      continue;
    }
    match serde_json::from_slice(line) {
      Ok(record) => out.push(record),
      Err(err) => {
        tracing::warn!(path, line = idx + 1, error = %err, "unreadable record, keeping it empty");
        out.push(R::default());
      }
    }
  }
}

impl StorageGateway for OpendalGateway {
  type Error = Error;

  async fn read_records<'a, R>(&'a self, glob: &'a str) -> Result<Vec<R>>
  where
    R: DeserializeOwned + Default + Send + 'static,
  {
    let glob = glob.trim_start_matches('/');
    let pattern = Pattern::new(glob)?;
    let paths: Vec<String> = Self::list_files(&self.input, list_root(glob))
      .await?
      .into_iter()
      .filter(|p| pattern.matches_with(p, MATCH_OPTIONS))
      .collect();
    tracing::debug!(glob, files = paths.len(), "matched input objects");

    let mut records = Vec::new();
    for (path, bytes) in self.read_all(&self.input, paths).await? {
      parse_lines(&path, &bytes, &mut records);
    }
    Ok(records)
  }

  async fn write_table<T: TableRow>(&self, rows: Vec<T>) -> Result<()> {
    let table = T::TABLE;
    let cells: Vec<Vec<Value>> = rows.into_iter().map(TableRow::into_values).collect();
    let files = tokio::task::spawn_blocking(move || encode::encode_table(table, cells)).await??;

    let dir = format!("{table}/");
    self.output.remove_all(&dir).await?;

    let count = files.len();
    stream::iter(files.into_iter().map(Ok::<_, Error>))
      .try_for_each_concurrent(self.options.write_concurrency.max(1), |(path, bytes)| {
        async move {
          self.output.write(&path, bytes).await?;
          tracing::debug!(path = %path, "wrote partition file");
          Ok::<_, Error>(())
        }
      })
      .await?;

    self
      .output
      .write(&format!("{dir}{SUCCESS_MARKER}"), Vec::<u8>::new())
      .await?;
    tracing::debug!(%table, files = count, "committed table");
    Ok(())
  }

  async fn read_table<T: TableRow>(&self) -> Result<Vec<T>> {
    let table = T::TABLE;
    let dir = format!("{table}/");
    match self.output.stat(&format!("{dir}{SUCCESS_MARKER}")).await {
      Ok(_) => {}
      Err(err) if err.kind() == ErrorKind::NotFound => {
        return Err(Error::TableNotCommitted(table));
      }
      Err(err) => return Err(err.into()),
    }

    let paths: Vec<String> = Self::list_files(&self.output, &dir)
      .await?
      .into_iter()
      .filter(|p| p.ends_with(".parquet"))
      .collect();
    let files = self.read_all(&self.output, paths).await?;

    let rows = tokio::task::spawn_blocking(move || -> Result<Vec<T>> {
      let mut rows = Vec::new();
      for (path, bytes) in files {
        for cells in encode::decode_file(table, &path, bytes)? {
          rows.push(T::from_values(cells)?);
        }
      }
      Ok(rows)
    })
    .await??;
    tracing::debug!(%table, rows = rows.len(), "read table");
    Ok(rows)
  }
}
