//! Tabular data access, schema validation, and analytical transforms for
//! visualization frontends.
//!
//! The crate is a renderer-agnostic core: it loads tabular data from
//! delimited files or a document store, caches it behind a repository,
//! validates and coerces column types, runs analytical models over the
//! numeric columns, and shapes the results into serializable chart data.
//! Drawing is the embedding application's job.

pub mod chart;
pub mod data;
pub mod error;
pub mod models;
pub mod registry;

pub use error::{DataError, Result};
