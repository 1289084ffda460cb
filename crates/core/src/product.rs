use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

/// Canonical product categories. The first four belong to the production
/// (life) line; `Elementary` is the elementary line's single category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Product {
    Pension,
    Risk,
    Financial,
    PensionTransfer,
    Elementary,
}

impl Product {
    pub const ALL: [Product; 5] = [
        Product::Pension,
        Product::Risk,
        Product::Financial,
        Product::PensionTransfer,
        Product::Elementary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Product::Pension => "pension",
            Product::Risk => "risk",
            Product::Financial => "financial",
            Product::PensionTransfer => "pension_transfer",
            Product::Elementary => "elementary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pension" => Some(Product::Pension),
            "risk" => Some(Product::Risk),
            "financial" => Some(Product::Financial),
            "pension_transfer" => Some(Product::PensionTransfer),
            "elementary" => Some(Product::Elementary),
            _ => None,
        }
    }

    /// Products that belong to an ingestion context.
    pub fn for_context(context: IngestContext) -> &'static [Product] {
        match context {
            IngestContext::Production => &Product::ALL[..4],
            IngestContext::Elementary => &Product::ALL[4..],
        }
    }
}

impl std::fmt::Display for Product {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Ingestion context
// ---------------------------------------------------------------------------

/// Which product line a carrier file belongs to. The same carrier can require
/// a different file count and column mapping per context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestContext {
    Production,
    Elementary,
}

impl IngestContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestContext::Production => "production",
            IngestContext::Elementary => "elementary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "production" => Some(IngestContext::Production),
            "elementary" => Some(IngestContext::Elementary),
            _ => None,
        }
    }
}

impl std::fmt::Display for IngestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Per-product totals
// ---------------------------------------------------------------------------

/// One amount per product. Aggregate rows, goals, and targets all carry this
/// shape; unused products stay at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductTotals {
    pub pension: f64,
    pub risk: f64,
    pub financial: f64,
    pub pension_transfer: f64,
    pub elementary: f64,
}

impl ProductTotals {
    pub fn get(&self, product: Product) -> f64 {
        match product {
            Product::Pension => self.pension,
            Product::Risk => self.risk,
            Product::Financial => self.financial,
            Product::PensionTransfer => self.pension_transfer,
            Product::Elementary => self.elementary,
        }
    }

    pub fn add(&mut self, product: Product, amount: f64) {
        match product {
            Product::Pension => self.pension += amount,
            Product::Risk => self.risk += amount,
            Product::Financial => self.financial += amount,
            Product::PensionTransfer => self.pension_transfer += amount,
            Product::Elementary => self.elementary += amount,
        }
    }

    pub fn add_all(&mut self, other: &ProductTotals) {
        for p in Product::ALL {
            self.add(p, other.get(p));
        }
    }

    /// Sum across every product. Used by the conservation checks.
    pub fn total(&self) -> f64 {
        Product::ALL.iter().map(|p| self.get(*p)).sum()
    }

    pub fn is_zero(&self) -> bool {
        Product::ALL.iter().all(|p| self.get(*p) == 0.0)
    }
}
