use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use prodgrid_core::{IngestContext, Product};

use crate::error::SchemaError;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Declarative carrier catalog. Pure data: which files each carrier delivers
/// per ingestion context, where the agent identifier and amounts live, and
/// how raw product names map to canonical categories. Adding a carrier is a
/// registry edit, never an ingestion-code change.
#[derive(Debug)]
pub struct SchemaRegistry {
    carriers: BTreeMap<i64, CarrierSchema>,
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default, rename = "carrier")]
    carriers: Vec<CarrierSchema>,
}

impl SchemaRegistry {
    pub fn from_toml(input: &str) -> Result<Self, SchemaError> {
        let file: RegistryFile =
            toml::from_str(input).map_err(|e| SchemaError::Parse(e.to_string()))?;
        let mut carriers = BTreeMap::new();
        for carrier in file.carriers {
            if carriers.insert(carrier.id, carrier).is_some() {
                return Err(SchemaError::Validation("duplicate carrier id".into()));
            }
        }
        let registry = Self { carriers };
        registry.validate()?;
        Ok(registry)
    }

    pub fn from_path(path: &Path) -> Result<Self, SchemaError> {
        let input = std::fs::read_to_string(path)
            .map_err(|e| SchemaError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_toml(&input)
    }

    /// Pure lookup: the slot list + column maps for one carrier and context.
    pub fn schema_for(
        &self,
        carrier_id: i64,
        context: IngestContext,
    ) -> Result<&ContextSchema, SchemaError> {
        let carrier = self
            .carriers
            .get(&carrier_id)
            .ok_or(SchemaError::UnknownCarrier(carrier_id))?;
        carrier
            .context(context)
            .ok_or(SchemaError::MissingContext { carrier_id, context })
    }

    pub fn carrier(&self, carrier_id: i64) -> Result<&CarrierSchema, SchemaError> {
        self.carriers
            .get(&carrier_id)
            .ok_or(SchemaError::UnknownCarrier(carrier_id))
    }

    /// Match a carrier by display name or alias. Used by the direct-agents
    /// workbook, which names carriers in free text.
    pub fn carrier_by_name(&self, name: &str) -> Option<&CarrierSchema> {
        let name = name.trim();
        self.carriers
            .values()
            .find(|c| c.name == name || c.aliases.iter().any(|a| a == name))
    }

    pub fn carriers(&self) -> impl Iterator<Item = &CarrierSchema> {
        self.carriers.values()
    }

    fn validate(&self) -> Result<(), SchemaError> {
        for carrier in self.carriers.values() {
            if carrier.name.trim().is_empty() {
                return Err(SchemaError::Validation(format!(
                    "carrier {}: empty name",
                    carrier.id
                )));
            }
            for (context, schema) in [
                (IngestContext::Production, carrier.production.as_ref()),
                (IngestContext::Elementary, carrier.elementary.as_ref()),
            ] {
                let Some(schema) = schema else { continue };
                schema.validate(carrier.id, context)?;
            }
            if carrier.production.is_none() && carrier.elementary.is_none() {
                return Err(SchemaError::Validation(format!(
                    "carrier {}: no context schemas",
                    carrier.id
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Carrier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CarrierSchema {
    pub id: i64,
    pub name: String,
    /// Alternate spellings (often the non-Latin display name).
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub production: Option<ContextSchema>,
    #[serde(default)]
    pub elementary: Option<ContextSchema>,
    /// Rollup overrides for departments that category alone cannot split.
    #[serde(default)]
    pub category_overrides: Vec<CategoryOverride>,
}

impl CarrierSchema {
    pub fn context(&self, context: IngestContext) -> Option<&ContextSchema> {
        match context {
            IngestContext::Production => self.production.as_ref(),
            IngestContext::Elementary => self.elementary.as_ref(),
        }
    }
}

/// Splits one ambiguous department by inspector when building category
/// subtotal rows for this carrier.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryOverride {
    pub department: String,
    pub inspector: String,
    pub category: String,
}

// ---------------------------------------------------------------------------
// Context schema + slots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ContextSchema {
    #[serde(rename = "slot")]
    pub slots: Vec<FileSlot>,
}

impl ContextSchema {
    pub fn required_slots(&self) -> impl Iterator<Item = &FileSlot> {
        self.slots.iter().filter(|s| s.required)
    }

    fn validate(&self, carrier_id: i64, context: IngestContext) -> Result<(), SchemaError> {
        if self.slots.is_empty() {
            return Err(SchemaError::Validation(format!(
                "carrier {carrier_id}: {context} schema has no slots"
            )));
        }
        if self.required_slots().next().is_none() {
            return Err(SchemaError::Validation(format!(
                "carrier {carrier_id}: {context} schema needs at least one required slot"
            )));
        }
        let mut labels: Vec<&str> = self.slots.iter().map(|s| s.label.as_str()).collect();
        labels.sort_unstable();
        labels.dedup();
        if labels.len() != self.slots.len() {
            return Err(SchemaError::Validation(format!(
                "carrier {carrier_id}: duplicate slot label in {context} schema"
            )));
        }
        let allowed = Product::for_context(context);
        for slot in &self.slots {
            for product in slot.rule.products() {
                if !allowed.contains(&product) {
                    return Err(SchemaError::Validation(format!(
                        "carrier {carrier_id}, slot '{}': product {product} not valid for {context}",
                        slot.label
                    )));
                }
            }
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

/// One expected file (or sheet) within a carrier's submission.
#[derive(Debug, Clone, Deserialize)]
pub struct FileSlot {
    pub label: String,
    /// Text locating the slot: matched against sheet names and first-row
    /// header cells, verbatim (headers are often non-Latin).
    pub header_hint: String,
    #[serde(default = "default_true")]
    pub required: bool,
    /// Whether this slot may match a sheet already claimed by an earlier one
    /// (one physical sheet answering two slots).
    #[serde(default)]
    pub allow_shared_sheet: bool,
    /// Header text of the agent-identifier column.
    pub agent_column: String,
    /// Header text of a column carrying the embedded period marker
    /// (`YYYY-MM`, `MM/YYYY`, or a bare month number).
    #[serde(default)]
    pub period_column: Option<String>,
    pub rule: AmountRule,
}

// ---------------------------------------------------------------------------
// Amount rules
// ---------------------------------------------------------------------------

/// How a slot's rows turn into per-product amounts.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AmountRule {
    /// One amount column, one fixed product.
    Single { column: String, product: Product },
    /// A product-name column classifies each row's amount; unmapped or
    /// excluded product names are skipped.
    Classified {
        product_column: String,
        amount_column: String,
        classes: BTreeMap<String, Product>,
        #[serde(default)]
        exclude: Vec<String>,
    },
    /// Fixed per-product column formulas: sum `add`, minus sum `subtract`.
    Formulas { formulas: Vec<ProductFormula> },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductFormula {
    pub product: Product,
    pub add: Vec<String>,
    #[serde(default)]
    pub subtract: Vec<String>,
}

impl AmountRule {
    /// Every product this rule can emit.
    pub fn products(&self) -> Vec<Product> {
        let mut products = match self {
            AmountRule::Single { product, .. } => vec![*product],
            AmountRule::Classified { classes, .. } => classes.values().copied().collect(),
            AmountRule::Formulas { formulas } => formulas.iter().map(|f| f.product).collect(),
        };
        products.sort_unstable();
        products.dedup();
        products
    }

    /// Column headers this rule needs resolved, beyond the agent column.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            AmountRule::Single { column, .. } => vec![column.as_str()],
            AmountRule::Classified { product_column, amount_column, .. } => {
                vec![product_column.as_str(), amount_column.as_str()]
            }
            AmountRule::Formulas { formulas } => formulas
                .iter()
                .flat_map(|f| f.add.iter().chain(f.subtract.iter()))
                .map(String::as_str)
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
