use std::fmt;

use prodgrid_core::{IngestContext, Month, Product};
use prodgrid_ingest::IngestError;
use prodgrid_schema::SchemaError;
use prodgrid_store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    Schema(SchemaError),
    Ingest(IngestError),
    Store(StoreError),
    /// The (carrier, month, context) key already has a batch and the caller
    /// did not ask to overwrite it.
    DuplicateKeyConflict { carrier_id: i64, month: Month, context: IngestContext },
    UnknownAgent(i64),
    /// A single monthly percentage target outside 0..=100.
    PercentageOutOfRange { month: u32, product: Product, percent: f64 },
    /// Yearly percentage targets for one product summing past 100.
    CumulativeOverflow { product: Product, total: f64 },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Schema(e) => write!(f, "{e}"),
            EngineError::Ingest(e) => write!(f, "{e}"),
            EngineError::Store(e) => write!(f, "{e}"),
            EngineError::DuplicateKeyConflict { carrier_id, month, context } => write!(
                f,
                "carrier {carrier_id} already has a {context} batch for {month}"
            ),
            EngineError::UnknownAgent(id) => write!(f, "no agent with id {id}"),
            EngineError::PercentageOutOfRange { month, product, percent } => write!(
                f,
                "month {month}, product {product}: percentage {percent} outside 0..=100"
            ),
            EngineError::CumulativeOverflow { product, total } => {
                write!(f, "product {product}: yearly percentages sum to {total}, over 100")
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<SchemaError> for EngineError {
    fn from(e: SchemaError) -> Self {
        EngineError::Schema(e)
    }
}

impl From<IngestError> for EngineError {
    fn from(e: IngestError) -> Self {
        EngineError::Ingest(e)
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Store(e)
    }
}
