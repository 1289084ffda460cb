//! Sqlite persistence for the production pipeline.
//!
//! Everything derived (aggregates) is replaced whole-group in a transaction,
//! so the database can always be rebuilt from the raw rows it also keeps.

pub mod db;
pub mod error;
pub mod types;

pub use db::Store;
pub use error::StoreError;
pub use types::{AggregateFilter, AggregateRow, Goal, PercentageTarget, RowKind};
