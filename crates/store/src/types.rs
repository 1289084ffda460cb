use prodgrid_core::{AgentRef, IngestContext, Month, Product, ProductTotals};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Aggregate rows
// ---------------------------------------------------------------------------

/// What a persisted aggregate row represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    /// Production of one resolved agent ref.
    Agent,
    /// Rollup of one category's agent rows.
    Subtotal,
    /// Rollup of the whole (carrier, month, context) group.
    Grand,
}

impl RowKind {
    pub fn as_i64(&self) -> i64 {
        match self {
            RowKind::Agent => 0,
            RowKind::Subtotal => 1,
            RowKind::Grand => 2,
        }
    }

    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(RowKind::Agent),
            1 => Some(RowKind::Subtotal),
            2 => Some(RowKind::Grand),
            _ => None,
        }
    }
}

/// One persisted aggregate row. Agent rows carry a ref and their rollup
/// category; subtotal rows carry only the category; the grand row carries
/// neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub carrier_id: i64,
    pub month: Month,
    pub context: IngestContext,
    pub kind: RowKind,
    pub agent_ref: Option<AgentRef>,
    pub category: Option<String>,
    pub totals: ProductTotals,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Optional filters for aggregate queries. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AggregateFilter {
    pub carrier_id: Option<i64>,
    pub month: Option<Month>,
    pub context: Option<IngestContext>,
    pub agent_ref: Option<AgentRef>,
    pub category: Option<String>,
    pub kind: Option<RowKind>,
}

// ---------------------------------------------------------------------------
// Goals and percentage targets
// ---------------------------------------------------------------------------

/// Annual goal for one agent and product.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub agent_id: i64,
    pub year: i32,
    pub product: Product,
    pub amount: f64,
}

/// One month's company-wide share of the annual goals, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentageTarget {
    pub year: i32,
    pub month: u32,
    pub product: Product,
    pub percent: f64,
}
