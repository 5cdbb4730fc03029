//! Configuration for the `sparkify-etl` binary.
//!
//! Settings come from a TOML file merged with `SPARKIFY_`-prefixed
//! environment variables, where `__` separates nested keys
//! (`SPARKIFY_OUTPUT__ROOT=/data/lake`).

use std::path::{Path, PathBuf};

use opendal::Operator;
use serde::Deserialize;
use sparkify_core::pipeline::Layout;
use sparkify_store_opendal::{
  GatewayOptions, OpendalGateway, S3Options, fs_operator, s3_operator,
};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Where a dataset lives.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageLocation {
  /// A local directory. A leading `~` is expanded.
  Fs { root: PathBuf },
  S3 {
    bucket:   String,
    #[serde(default)]
    root:     String,
    #[serde(default = "default_region")]
    region:   String,
    /// Custom endpoint for S3-compatible services.
    #[serde(default)]
    endpoint: Option<String>,
  },
}

/// Access keys for S3 locations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AwsCredentials {
  pub access_key_id:     Option<String>,
  pub secret_access_key: Option<String>,
}

/// Runtime configuration, deserialised from `etl.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EtlConfig {
  pub input:             StorageLocation,
  pub output:            StorageLocation,
  #[serde(default = "default_song_glob")]
  pub song_glob:         String,
  #[serde(default = "default_log_glob")]
  pub log_glob:          String,
  #[serde(default)]
  pub aws:               AwsCredentials,
  #[serde(default = "default_read_concurrency")]
  pub read_concurrency:  usize,
  #[serde(default = "default_write_concurrency")]
  pub write_concurrency: usize,
}

fn default_region() -> String { "us-west-2".to_string() }

fn default_song_glob() -> String { Layout::default().song_glob }

fn default_log_glob() -> String { Layout::default().log_glob }

fn default_read_concurrency() -> usize { GatewayOptions::default().read_concurrency }

fn default_write_concurrency() -> usize { GatewayOptions::default().write_concurrency }

impl EtlConfig {
  /// Read `path` (if it exists) and the `SPARKIFY_*` environment.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("SPARKIFY")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()?;
    Self::from_config(settings)
  }

  pub fn from_config(settings: config::Config) -> Result<Self, config::ConfigError> {
    settings.try_deserialize()
  }

  pub fn layout(&self) -> Layout {
    Layout {
      song_glob: self.song_glob.clone(),
      log_glob:  self.log_glob.clone(),
    }
  }

  pub fn gateway_options(&self) -> GatewayOptions {
    GatewayOptions {
      read_concurrency:  self.read_concurrency,
      write_concurrency: self.write_concurrency,
    }
  }

  /// Open the input and output locations.
  ///
  /// Access keys missing from the configuration fall back to the standard
  /// `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` variables.
  pub fn gateway(&self) -> sparkify_store_opendal::Result<OpendalGateway> {
    let aws = self.aws.clone().or_else(|key| std::env::var(key).ok());
    Ok(
      OpendalGateway::new(self.input.operator(&aws)?, self.output.operator(&aws)?)
        .with_options(self.gateway_options()),
    )
  }
}

impl AwsCredentials {
  /// Fill unset keys by looking up their conventional variable names.
  pub fn or_else(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
    Self {
      access_key_id:     self.access_key_id.or_else(|| lookup("AWS_ACCESS_KEY_ID")),
      secret_access_key: self
        .secret_access_key
        .or_else(|| lookup("AWS_SECRET_ACCESS_KEY")),
    }
  }
}

impl StorageLocation {
  pub fn operator(&self, aws: &AwsCredentials) -> sparkify_store_opendal::Result<Operator> {
    match self {
      Self::Fs { root } => fs_operator(expand_tilde(root)),
      Self::S3 { bucket, root, region, endpoint } => s3_operator(&S3Options {
        bucket:            bucket.clone(),
        root:              root.clone(),
        region:            Some(region.clone()),
        endpoint:          endpoint.clone(),
        access_key_id:     aws.access_key_id.clone(),
        secret_access_key: aws.secret_access_key.clone(),
      }),
    }
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use config::{Config, File, FileFormat};

  use super::*;

  fn parse(toml: &str) -> Result<EtlConfig, config::ConfigError> {
    let settings = Config::builder()
      .add_source(File::from_str(toml, FileFormat::Toml))
      .build()?;
    EtlConfig::from_config(settings)
  }

  #[test]
  fn minimal_config_uses_defaults() {
    let cfg = parse(
      r#"
        [input]
        kind = "fs"
        root = "data"

        [output]
        kind = "fs"
        root = "~/lake"
      "#,
    )
    .unwrap();
    assert_eq!(cfg.input, StorageLocation::Fs { root: PathBuf::from("data") });
    assert_eq!(cfg.layout(), Layout::default());
    assert_eq!(cfg.gateway_options(), GatewayOptions::default());
    assert_eq!(cfg.aws, AwsCredentials::default());
  }

  #[test]
  fn s3_location_fills_region_and_root() {
    let cfg = parse(
      r#"
        song_glob = "song_data/A/*/*/*.json"
        write_concurrency = 2

        [input]
        kind = "s3"
        bucket = "udacity-dend"

        [output]
        kind = "s3"
        bucket = "my-lake"
        root = "sparkify/"
        endpoint = "http://localhost:9000"

        [aws]
        access_key_id = "AKIA"
        secret_access_key = "secret"
      "#,
    )
    .unwrap();
    assert_eq!(cfg.input, StorageLocation::S3 {
      bucket:   "udacity-dend".to_string(),
      root:     String::new(),
      region:   "us-west-2".to_string(),
      endpoint: None,
    });
    assert_eq!(cfg.layout().song_glob, "song_data/A/*/*/*.json");
    assert_eq!(cfg.layout().log_glob, Layout::default().log_glob);
    assert_eq!(cfg.write_concurrency, 2);
    assert_eq!(cfg.aws.access_key_id.as_deref(), Some("AKIA"));

    let op = cfg.output.operator(&cfg.aws).unwrap();
    assert_eq!(op.info().scheme(), opendal::Scheme::S3);
  }

  #[test]
  fn missing_location_is_an_error() {
    let err = parse(
      r#"
        [input]
        kind = "fs"
        root = "data"
      "#,
    );
    assert!(err.is_err());
  }

  #[test]
  fn unknown_kind_is_an_error() {
    let err = parse(
      r#"
        [input]
        kind = "ftp"
        root = "data"

        [output]
        kind = "fs"
        root = "lake"
      "#,
    );
    assert!(err.is_err());
  }

  #[test]
  fn credentials_fall_back_to_lookup() {
    let configured = AwsCredentials {
      access_key_id:     Some("from-file".to_string()),
      secret_access_key: None,
    };
    let filled = configured.or_else(|key| Some(format!("env:{key}")));
    assert_eq!(filled.access_key_id.as_deref(), Some("from-file"));
    assert_eq!(filled.secret_access_key.as_deref(), Some("env:AWS_SECRET_ACCESS_KEY"));
  }

  #[test]
  fn tilde_is_expanded_from_home() {
    let Ok(home) = std::env::var("HOME") else {
      return;
    };
    assert_eq!(expand_tilde(Path::new("~/lake")), PathBuf::from(home).join("lake"));
    assert_eq!(expand_tilde(Path::new("/abs/lake")), PathBuf::from("/abs/lake"));
  }
}
