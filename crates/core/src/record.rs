use serde::{Deserialize, Serialize};

use crate::month::Month;
use crate::product::{IngestContext, Product};

// ---------------------------------------------------------------------------
// Raw rows
// ---------------------------------------------------------------------------

/// One ingested spreadsheet row, retained verbatim so every aggregate stays
/// re-derivable from raw data plus the current agent mappings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawProductionRecord {
    pub carrier_id: i64,
    pub month: Month,
    /// Carrier-specific agent identifier exactly as it appeared in the file.
    pub agent_ident: String,
    pub product: Product,
    pub amount: f64,
    pub batch_id: String,
}

// ---------------------------------------------------------------------------
// Upload batches
// ---------------------------------------------------------------------------

/// Records that a (carrier, month, context) slot has been ingested. Blocks
/// duplicate uploads and scopes deletes; raw rows hang off `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadBatch {
    pub id: String,
    pub carrier_id: i64,
    pub month: Month,
    pub context: IngestContext,
    pub row_count: usize,
    pub uploaded_at: String,
}

// ---------------------------------------------------------------------------
// Row warnings
// ---------------------------------------------------------------------------

/// A non-fatal condition noticed while ingesting. Rows may be skipped but
/// the file keeps processing; warnings are surfaced to the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowWarning {
    /// Amount cell could not be read as a number; the row was skipped.
    UnparseableAmount { slot: String, row: usize, value: String },
    /// Two agents claim the same carrier identifier; first match wins.
    AmbiguousIdentifier { carrier_id: i64, ident: String, agent_ids: Vec<i64> },
    /// Direct-agents row named a carrier that is not in the master list.
    UnknownCarrierName { row: usize, name: String },
}

impl std::fmt::Display for RowWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowWarning::UnparseableAmount { slot, row, value } => {
                write!(f, "slot '{slot}', row {row}: cannot parse amount '{value}'")
            }
            RowWarning::AmbiguousIdentifier { carrier_id, ident, agent_ids } => {
                write!(
                    f,
                    "carrier {carrier_id}: identifier '{ident}' claimed by agents {agent_ids:?}"
                )
            }
            RowWarning::UnknownCarrierName { row, name } => {
                write!(f, "row {row}: unknown carrier name '{name}'")
            }
        }
    }
}
