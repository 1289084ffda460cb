use std::fmt;

use prodgrid_core::IngestContext;

#[derive(Debug)]
pub enum SchemaError {
    /// TOML parse / deserialization error.
    Parse(String),
    /// Registry validation error (duplicate carrier, bad slot, etc.).
    Validation(String),
    /// No registry entry for this carrier id.
    UnknownCarrier(i64),
    /// Carrier exists but has no schema for the requested context.
    MissingContext { carrier_id: i64, context: IngestContext },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "registry parse error: {msg}"),
            Self::Validation(msg) => write!(f, "registry validation error: {msg}"),
            Self::UnknownCarrier(id) => write!(f, "unknown carrier: {id}"),
            Self::MissingContext { carrier_id, context } => {
                write!(f, "carrier {carrier_id} has no {context} schema")
            }
        }
    }
}

impl std::error::Error for SchemaError {}
