//! Carrier schema registry.
//!
//! Declarative catalog mapping each carrier to its expected file slots,
//! header hints, and column-to-field mappings, per ingestion context.
//! Pure data + validation; ingestion logic lives in `prodgrid-ingest`.

pub mod error;
pub mod registry;

pub use error::SchemaError;
pub use registry::{
    AmountRule, CarrierSchema, CategoryOverride, ContextSchema, FileSlot, ProductFormula,
    SchemaRegistry,
};
