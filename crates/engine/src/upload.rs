use std::collections::BTreeMap;

use chrono::Utc;
use uuid::Uuid;

use prodgrid_core::{
    AgentRef, IngestContext, Month, Product, ProductTotals, RawProductionRecord, RowWarning,
    UploadBatch,
};
use prodgrid_ingest::{extract_files, parse_direct, read_workbook_bytes};
use prodgrid_schema::SchemaRegistry;
use prodgrid_store::Store;

use crate::aggregate::{aggregate_group, build_rows};
use crate::error::EngineError;
use crate::resolve::NameIndex;

/// Result of one carrier-file upload.
#[derive(Debug, serde::Serialize)]
pub struct UploadOutcome {
    pub batch: UploadBatch,
    pub warnings: Vec<RowWarning>,
    pub slots_matched: Vec<String>,
}

/// Ingest one carrier submission end to end: classify every provided file
/// against the registry, persist the union of their rows as one batch, then
/// rebuild the aggregate group. An existing batch for the same (carrier,
/// month, context) key blocks the upload unless `overwrite` is set; a failed
/// submission leaves the key's prior state untouched.
pub fn ingest_workbook(
    store: &mut Store,
    registry: &SchemaRegistry,
    carrier_id: i64,
    month: Month,
    context: IngestContext,
    files: &[Vec<u8>],
    overwrite: bool,
) -> Result<UploadOutcome, EngineError> {
    let schema = registry.schema_for(carrier_id, context)?;
    let carrier = registry.carrier(carrier_id)?;

    if !overwrite && store.batch_for(carrier_id, month, context)?.is_some() {
        return Err(EngineError::DuplicateKeyConflict { carrier_id, month, context });
    }

    let mut workbooks = Vec::with_capacity(files.len());
    for bytes in files {
        workbooks.push(read_workbook_bytes(bytes)?);
    }
    let batch_id = Uuid::new_v4().to_string();
    let extracted = extract_files(schema, carrier_id, month, &batch_id, &workbooks)?;

    let batch = UploadBatch {
        id: batch_id,
        carrier_id,
        month,
        context,
        row_count: extracted.records.len(),
        uploaded_at: Utc::now().to_rfc3339(),
    };
    store.record_batch(&batch, &extracted.records)?;

    let agents = store.agents()?;
    let (rows, resolve_warnings) =
        aggregate_group(carrier, month, context, &extracted.records, &agents);
    store.replace_aggregates(carrier_id, month, context, &rows)?;

    let mut warnings = extracted.warnings;
    warnings.extend(resolve_warnings);
    Ok(UploadOutcome { batch, warnings, slots_matched: extracted.slots_matched })
}

/// Result of a direct-business upload, which can span several carriers.
#[derive(Debug, serde::Serialize)]
pub struct DirectOutcome {
    pub batches: Vec<UploadBatch>,
    pub warnings: Vec<RowWarning>,
}

/// Ingest the hand-maintained direct-business workbook. Rows name agents
/// and carriers in free text; each named carrier gets an elementary-line
/// batch for the month, resolved against agent display names.
pub fn ingest_direct(
    store: &mut Store,
    registry: &SchemaRegistry,
    month: Month,
    bytes: &[u8],
    overwrite: bool,
) -> Result<DirectOutcome, EngineError> {
    let sheets = read_workbook_bytes(bytes)?;
    let parsed = parse_direct(&sheets)?;
    let mut warnings = parsed.warnings;

    // Group rows by resolved carrier; unknown carrier names are warned and
    // skipped rather than failing the file.
    let mut by_carrier: BTreeMap<i64, Vec<(usize, String, f64)>> = BTreeMap::new();
    for row in &parsed.rows {
        match registry.carrier_by_name(&row.carrier_name) {
            Some(carrier) => by_carrier
                .entry(carrier.id)
                .or_default()
                .push((row.row, row.agent_name.clone(), row.amount)),
            None => warnings.push(RowWarning::UnknownCarrierName {
                row: row.row,
                name: row.carrier_name.clone(),
            }),
        }
    }

    let context = IngestContext::Elementary;
    if !overwrite {
        for carrier_id in by_carrier.keys() {
            if store.batch_for(*carrier_id, month, context)?.is_some() {
                return Err(EngineError::DuplicateKeyConflict {
                    carrier_id: *carrier_id,
                    month,
                    context,
                });
            }
        }
    }

    let agents = store.agents()?;
    let name_index = NameIndex::build(&agents);
    let mut batches = Vec::new();

    for (carrier_id, rows) in by_carrier {
        let carrier = registry.carrier(carrier_id)?;
        let batch_id = Uuid::new_v4().to_string();

        let records: Vec<RawProductionRecord> = rows
            .iter()
            .map(|(_, agent_name, amount)| RawProductionRecord {
                carrier_id,
                month,
                agent_ident: agent_name.clone(),
                product: Product::Elementary,
                amount: *amount,
                batch_id: batch_id.clone(),
            })
            .collect();

        let batch = UploadBatch {
            id: batch_id,
            carrier_id,
            month,
            context,
            row_count: records.len(),
            uploaded_at: Utc::now().to_rfc3339(),
        };
        store.record_batch(&batch, &records)?;

        let mut folded: BTreeMap<AgentRef, ProductTotals> = BTreeMap::new();
        for record in &records {
            let (agent_ref, warning) = name_index.resolve(&record.agent_ident, carrier_id);
            if let Some(w) = warning {
                if !warnings.contains(&w) {
                    warnings.push(w);
                }
            }
            folded.entry(agent_ref).or_default().add(record.product, record.amount);
        }
        let agg_rows =
            build_rows(carrier_id, month, context, &folded, &agents, &carrier.category_overrides);
        store.replace_aggregates(carrier_id, month, context, &agg_rows)?;
        batches.push(batch);
    }

    Ok(DirectOutcome { batches, warnings })
}
