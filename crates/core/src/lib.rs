//! Core types shared across the pipeline.
//!
//! Pure data crate: months, products, agent identities, raw production rows.
//! No IO, no storage dependencies.

pub mod agent;
pub mod month;
pub mod product;
pub mod record;

pub use agent::{Agent, AgentRef, AgentStatus, CarrierIdents};
pub use month::Month;
pub use product::{IngestContext, Product, ProductTotals};
pub use record::{RawProductionRecord, RowWarning, UploadBatch};
