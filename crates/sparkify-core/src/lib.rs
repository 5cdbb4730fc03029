//! Core schemas and transforms for the Sparkify data-lake pipeline.
//!
//! This crate is deliberately free of storage and format dependencies. It
//! turns raw catalog and activity records into the five star-schema tables
//! and talks to the outside world only through [`gateway::StorageGateway`].

pub mod activity;
pub mod catalog;
pub mod error;
pub mod gateway;
pub mod pipeline;
pub mod record;
pub mod songplays;
pub mod table;

pub use error::{Error, Result};
