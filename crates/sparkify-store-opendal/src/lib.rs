//! OpenDAL backend for the Sparkify storage gateway.
//!
//! Input records are read as JSON lines from any [`opendal::Operator`]; output
//! tables are written as Hive-partitioned, Snappy-compressed Parquet files.
//! Parquet encoding and decoding run on tokio's blocking pool so large
//! tables do not stall the async runtime.

mod encode;
mod partition;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{GatewayOptions, OpendalGateway, S3Options, fs_operator, s3_operator};
