use std::collections::BTreeSet;

use prodgrid_core::{Agent, IngestContext, Month, RowWarning};
use prodgrid_schema::SchemaRegistry;
use prodgrid_store::Store;

use crate::aggregate::aggregate_group;
use crate::error::EngineError;

/// Rebuild counts for one ingestion line.
#[derive(Debug, Default, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRebuild {
    pub months_re_aggregated: usize,
    pub aggregations_deleted: usize,
}

/// What a mapping edit touched: per line, how many (carrier, month) groups
/// were rebuilt and how many stale aggregate rows the rebuilds replaced.
/// The production line serializes as `lifeInsurance`.
#[derive(Debug, Default, PartialEq, serde::Serialize)]
pub struct ReaggregationReport {
    #[serde(rename = "lifeInsurance")]
    pub production: ContextRebuild,
    pub elementary: ContextRebuild,
    pub warnings: Vec<RowWarning>,
}

/// Save an agent and rebuild every aggregate group its identifier lists can
/// influence: any carrier holding a non-empty list in the old or the new
/// version, on either line, across every uploaded month. Raw rows are never
/// touched, so amounts only move between buckets.
pub fn save_agent(
    store: &mut Store,
    registry: &SchemaRegistry,
    agent: &Agent,
) -> Result<ReaggregationReport, EngineError> {
    let old = store.agent(agent.id)?;
    let affected = affected_carriers(old.as_ref(), Some(agent));
    store.upsert_agent(agent)?;
    rebuild_affected(store, registry, &affected)
}

/// Delete an agent and rebuild the groups it was mapped into; its rows fall
/// back to the carriers' unmapped buckets.
pub fn remove_agent(
    store: &mut Store,
    registry: &SchemaRegistry,
    agent_id: i64,
) -> Result<ReaggregationReport, EngineError> {
    let old = store.agent(agent_id)?.ok_or(EngineError::UnknownAgent(agent_id))?;
    let affected = affected_carriers(Some(&old), None);
    store.delete_agent(agent_id)?;
    rebuild_affected(store, registry, &affected)
}

/// Rebuild one (carrier, month, context) aggregate group from its stored
/// raw rows and the current agent list. Returns the stale row count the
/// replace removed alongside any resolution warnings.
pub fn rebuild_group(
    store: &mut Store,
    registry: &SchemaRegistry,
    carrier_id: i64,
    month: Month,
    context: IngestContext,
) -> Result<(usize, Vec<RowWarning>), EngineError> {
    let Some(batch) = store.batch_for(carrier_id, month, context)? else {
        return Ok((0, Vec::new()));
    };
    let carrier = registry.carrier(carrier_id)?;
    let records = store.raw_rows_for_batch(&batch.id)?;
    let agents = store.agents()?;
    let (rows, warnings) = aggregate_group(carrier, month, context, &records, &agents);
    let deleted = store.replace_aggregates(carrier_id, month, context, &rows)?;
    Ok((deleted, warnings))
}

fn affected_carriers(
    old: Option<&Agent>,
    new: Option<&Agent>,
) -> Vec<(IngestContext, i64)> {
    let mut affected: BTreeSet<(u8, i64)> = BTreeSet::new();
    for agent in [old, new].into_iter().flatten() {
        for (tag, context) in
            [(0u8, IngestContext::Production), (1u8, IngestContext::Elementary)]
        {
            for (carrier_id, _) in agent.idents.line(context) {
                if !agent.idents.idents_for(*carrier_id, context).is_empty() {
                    affected.insert((tag, *carrier_id));
                }
            }
        }
    }
    affected
        .into_iter()
        .map(|(tag, carrier_id)| {
            let context =
                if tag == 0 { IngestContext::Production } else { IngestContext::Elementary };
            (context, carrier_id)
        })
        .collect()
}

fn rebuild_affected(
    store: &mut Store,
    registry: &SchemaRegistry,
    affected: &[(IngestContext, i64)],
) -> Result<ReaggregationReport, EngineError> {
    let mut report = ReaggregationReport::default();
    for (context, carrier_id) in affected {
        // Identifier lists can reference carriers the registry no longer
        // knows; those have no batches to rebuild.
        if registry.carrier(*carrier_id).is_err() {
            continue;
        }
        let months = store.months_with_batches(*carrier_id, *context)?;
        for month in months {
            let (deleted, warnings) =
                rebuild_group(store, registry, *carrier_id, month, *context)?;
            let line = match context {
                IngestContext::Production => &mut report.production,
                IngestContext::Elementary => &mut report.elementary,
            };
            line.months_re_aggregated += 1;
            line.aggregations_deleted += deleted;
            report.warnings.extend(warnings);
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use prodgrid_core::{
        AgentRef, AgentStatus, CarrierIdents, Product, RawProductionRecord, UploadBatch,
    };
    use prodgrid_store::{AggregateFilter, RowKind};

    const REGISTRY: &str = r#"
[[carrier]]
id = 7
name = "C7"

[[carrier.production.slot]]
label = "policies"
header_hint = "Policies"
agent_column = "Agent No"

[carrier.production.slot.rule]
type = "single"
column = "Premium"
product = "risk"

[[carrier]]
id = 3
name = "C3"

[[carrier.production.slot]]
label = "policies"
header_hint = "Policies"
agent_column = "Agent No"

[carrier.production.slot.rule]
type = "single"
column = "Premium"
product = "risk"
"#;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::from_toml(REGISTRY).unwrap()
    }

    fn month(s: &str) -> Month {
        Month::parse(s).unwrap()
    }

    fn agent(id: i64, production: &[(i64, &str)]) -> Agent {
        let mut idents = CarrierIdents::default();
        for (carrier, list) in production {
            idents.production.insert(*carrier, (*list).to_string());
        }
        Agent {
            id,
            name: format!("Agent {id}"),
            department: Some("North".into()),
            category: None,
            inspector: None,
            status: AgentStatus::Active,
            idents,
        }
    }

    fn seed(store: &mut Store, carrier_id: i64, m: &str, records: &[(&str, f64)]) {
        let registry = registry();
        let batch_id = format!("batch-{carrier_id}-{m}");
        let records: Vec<RawProductionRecord> = records
            .iter()
            .map(|(ident, amount)| RawProductionRecord {
                carrier_id,
                month: month(m),
                agent_ident: (*ident).to_string(),
                product: Product::Risk,
                amount: *amount,
                batch_id: batch_id.clone(),
            })
            .collect();
        let batch = UploadBatch {
            id: batch_id,
            carrier_id,
            month: month(m),
            context: IngestContext::Production,
            row_count: records.len(),
            uploaded_at: Utc::now().to_rfc3339(),
        };
        store.record_batch(&batch, &records).unwrap();
        rebuild_group(store, &registry, carrier_id, month(m), IngestContext::Production).unwrap();
    }

    fn risk_for(store: &Store, agent_ref: AgentRef) -> f64 {
        store
            .aggregates(&AggregateFilter {
                agent_ref: Some(agent_ref),
                kind: Some(RowKind::Agent),
                ..Default::default()
            })
            .unwrap()
            .iter()
            .map(|r| r.totals.risk)
            .sum()
    }

    #[test]
    fn mapping_edit_moves_amounts_out_of_unmapped() {
        let mut store = Store::open_in_memory().unwrap();
        let registry = registry();
        seed(&mut store, 7, "2024-03", &[("1001", 100.0), ("9999", 40.0)]);

        assert_eq!(risk_for(&store, AgentRef::Unmapped { carrier_id: 7 }), 140.0);

        let report = save_agent(&mut store, &registry, &agent(1, &[(7, "1001")])).unwrap();
        assert_eq!(report.production.months_re_aggregated, 1);
        // The seeded group held one unmapped row plus its grand total.
        assert_eq!(report.production.aggregations_deleted, 2);
        assert_eq!(report.elementary, ContextRebuild::default());
        assert_eq!(risk_for(&store, AgentRef::Agent { id: 1 }), 100.0);
        assert_eq!(risk_for(&store, AgentRef::Unmapped { carrier_id: 7 }), 40.0);
    }

    #[test]
    fn edit_rebuilds_old_and_new_carriers_across_months() {
        let mut store = Store::open_in_memory().unwrap();
        let registry = registry();
        seed(&mut store, 7, "2024-03", &[("1001", 100.0)]);
        seed(&mut store, 7, "2024-04", &[("1001", 60.0)]);
        seed(&mut store, 3, "2024-03", &[("5005", 30.0)]);

        save_agent(&mut store, &registry, &agent(1, &[(7, "1001")])).unwrap();
        assert_eq!(risk_for(&store, AgentRef::Agent { id: 1 }), 160.0);

        // Moving the agent from carrier 7 to carrier 3 must rebuild both:
        // two months on carrier 7 plus one on carrier 3.
        let report = save_agent(&mut store, &registry, &agent(1, &[(3, "5005")])).unwrap();
        assert_eq!(report.production.months_re_aggregated, 3);
        assert!(report.production.aggregations_deleted > 0);
        assert_eq!(risk_for(&store, AgentRef::Agent { id: 1 }), 30.0);
        assert_eq!(risk_for(&store, AgentRef::Unmapped { carrier_id: 7 }), 160.0);
    }

    #[test]
    fn rebuild_conserves_grand_totals() {
        let mut store = Store::open_in_memory().unwrap();
        let registry = registry();
        seed(&mut store, 7, "2024-03", &[("1001", 100.0), ("2002", 50.0)]);

        let grand_before = store
            .aggregates(&AggregateFilter { kind: Some(RowKind::Grand), ..Default::default() })
            .unwrap()[0]
            .totals;
        save_agent(&mut store, &registry, &agent(1, &[(7, "1001")])).unwrap();
        let grand_after = store
            .aggregates(&AggregateFilter { kind: Some(RowKind::Grand), ..Default::default() })
            .unwrap()[0]
            .totals;
        assert_eq!(grand_before, grand_after);
    }

    #[test]
    fn removing_agent_returns_rows_to_unmapped() {
        let mut store = Store::open_in_memory().unwrap();
        let registry = registry();
        seed(&mut store, 7, "2024-03", &[("1001", 100.0)]);
        save_agent(&mut store, &registry, &agent(1, &[(7, "1001")])).unwrap();
        assert_eq!(risk_for(&store, AgentRef::Agent { id: 1 }), 100.0);

        let report = remove_agent(&mut store, &registry, 1).unwrap();
        assert_eq!(report.production.months_re_aggregated, 1);
        assert_eq!(risk_for(&store, AgentRef::Unmapped { carrier_id: 7 }), 100.0);
        assert!(store.agent(1).unwrap().is_none());

        assert!(matches!(
            remove_agent(&mut store, &registry, 1),
            Err(EngineError::UnknownAgent(1))
        ));
    }

    #[test]
    fn unknown_registry_carrier_in_lists_is_skipped() {
        let mut store = Store::open_in_memory().unwrap();
        let registry = registry();
        let report = save_agent(&mut store, &registry, &agent(1, &[(99, "1")])).unwrap();
        assert_eq!(report, ReaggregationReport::default());
    }
}
