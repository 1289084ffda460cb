use std::collections::{BTreeMap, BTreeSet};

use prodgrid_core::{
    Agent, AgentRef, IngestContext, Month, ProductTotals, RawProductionRecord, RowWarning,
};
use prodgrid_schema::{CarrierSchema, CategoryOverride};
use prodgrid_store::{AggregateRow, RowKind};

use crate::resolve::IdentIndex;

/// Resolve and sum raw rows into per-ref product totals. Ambiguity warnings
/// are deduplicated per identifier, not repeated per row.
pub fn fold(
    records: &[RawProductionRecord],
    index: &IdentIndex,
) -> (BTreeMap<AgentRef, ProductTotals>, Vec<RowWarning>) {
    let mut totals: BTreeMap<AgentRef, ProductTotals> = BTreeMap::new();
    let mut warnings = Vec::new();
    let mut warned: BTreeSet<String> = BTreeSet::new();

    for record in records {
        let (agent_ref, warning) = index.resolve(&record.agent_ident);
        if let Some(w) = warning {
            if warned.insert(record.agent_ident.trim().to_string()) {
                warnings.push(w);
            }
        }
        totals.entry(agent_ref).or_default().add(record.product, record.amount);
    }

    (totals, warnings)
}

/// Turn folded totals into the persisted aggregate group: one row per agent
/// ref, one subtotal per category, and a grand row covering everything. The
/// unmapped bucket counts toward the grand row but never toward a category,
/// so the grand total always equals the sum of the raw amounts.
pub fn build_rows(
    carrier_id: i64,
    month: Month,
    context: IngestContext,
    folded: &BTreeMap<AgentRef, ProductTotals>,
    agents: &[Agent],
    overrides: &[CategoryOverride],
) -> Vec<AggregateRow> {
    let mut rows = Vec::new();
    let mut subtotals: BTreeMap<String, ProductTotals> = BTreeMap::new();
    let mut grand = ProductTotals::default();

    for (agent_ref, totals) in folded {
        let category = match agent_ref {
            AgentRef::Agent { id } => agents
                .iter()
                .find(|a| a.id == *id)
                .and_then(|a| category_for(a, overrides)),
            AgentRef::Unmapped { .. } => None,
        };
        if let Some(category) = &category {
            subtotals.entry(category.clone()).or_default().add_all(totals);
        }
        grand.add_all(totals);
        rows.push(AggregateRow {
            carrier_id,
            month,
            context,
            kind: RowKind::Agent,
            agent_ref: Some(*agent_ref),
            category,
            totals: *totals,
        });
    }

    for (category, totals) in subtotals {
        rows.push(AggregateRow {
            carrier_id,
            month,
            context,
            kind: RowKind::Subtotal,
            agent_ref: None,
            category: Some(category),
            totals,
        });
    }

    rows.push(AggregateRow {
        carrier_id,
        month,
        context,
        kind: RowKind::Grand,
        agent_ref: None,
        category: None,
        totals: grand,
    });

    rows
}

/// Rollup category for one agent under a carrier's overrides. An override
/// splits an ambiguous department by inspector; otherwise the agent's own
/// category (or department) stands.
fn category_for(agent: &Agent, overrides: &[CategoryOverride]) -> Option<String> {
    if let (Some(department), Some(inspector)) = (&agent.department, &agent.inspector) {
        for o in overrides {
            if o.department == *department && o.inspector == *inspector {
                return Some(o.category.clone());
            }
        }
    }
    agent.rollup_category().map(str::to_string)
}

/// Convenience wrapper used by uploads and rebuilds alike.
pub fn aggregate_group(
    carrier: &CarrierSchema,
    month: Month,
    context: IngestContext,
    records: &[RawProductionRecord],
    agents: &[Agent],
) -> (Vec<AggregateRow>, Vec<RowWarning>) {
    let index = IdentIndex::build(agents, carrier.id, context);
    let (folded, warnings) = fold(records, &index);
    let rows = build_rows(carrier.id, month, context, &folded, agents, &carrier.category_overrides);
    (rows, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prodgrid_core::{AgentStatus, CarrierIdents, Product};

    fn month(s: &str) -> Month {
        Month::parse(s).unwrap()
    }

    fn agent(id: i64, department: &str, idents: &str) -> Agent {
        let mut lists = CarrierIdents::default();
        lists.production.insert(7, idents.to_string());
        Agent {
            id,
            name: format!("Agent {id}"),
            department: Some(department.into()),
            category: None,
            inspector: None,
            status: AgentStatus::Active,
            idents: lists,
        }
    }

    fn record(ident: &str, product: Product, amount: f64) -> RawProductionRecord {
        RawProductionRecord {
            carrier_id: 7,
            month: month("2024-03"),
            agent_ident: ident.into(),
            product,
            amount,
            batch_id: "b1".into(),
        }
    }

    fn rows_for(records: &[RawProductionRecord], agents: &[Agent]) -> Vec<AggregateRow> {
        let index = IdentIndex::build(agents, 7, IngestContext::Production);
        let (folded, _) = fold(records, &index);
        build_rows(7, month("2024-03"), IngestContext::Production, &folded, agents, &[])
    }

    #[test]
    fn grand_total_conserves_raw_sum() {
        let agents = vec![agent(1, "North", "1001"), agent(2, "South", "2002")];
        let records = vec![
            record("1001", Product::Risk, 120.0),
            record("1001", Product::Pension, 30.0),
            record("2002", Product::Risk, 50.0),
            record("9999", Product::Financial, 77.0),
        ];
        let rows = rows_for(&records, &agents);
        let raw_sum: f64 = records.iter().map(|r| r.amount).sum();
        let grand = rows.iter().find(|r| r.kind == RowKind::Grand).unwrap();
        assert_eq!(grand.totals.total(), raw_sum);

        let agent_sum: f64 = rows
            .iter()
            .filter(|r| r.kind == RowKind::Agent)
            .map(|r| r.totals.total())
            .sum();
        assert_eq!(agent_sum, raw_sum);
    }

    #[test]
    fn unmapped_rows_count_in_grand_not_subtotals() {
        let agents = vec![agent(1, "North", "1001")];
        let records = vec![
            record("1001", Product::Risk, 100.0),
            record("9999", Product::Risk, 40.0),
        ];
        let rows = rows_for(&records, &agents);

        let north = rows
            .iter()
            .find(|r| r.kind == RowKind::Subtotal && r.category.as_deref() == Some("North"))
            .unwrap();
        assert_eq!(north.totals.risk, 100.0);

        let unmapped = rows
            .iter()
            .find(|r| r.agent_ref == Some(AgentRef::Unmapped { carrier_id: 7 }))
            .unwrap();
        assert_eq!(unmapped.totals.risk, 40.0);
        assert!(unmapped.category.is_none());

        let grand = rows.iter().find(|r| r.kind == RowKind::Grand).unwrap();
        assert_eq!(grand.totals.risk, 140.0);
    }

    #[test]
    fn multiple_idents_sum_into_one_agent_row() {
        let agents = vec![agent(1, "North", "1001, 1002")];
        let records = vec![
            record("1001", Product::Risk, 60.0),
            record("1002", Product::Risk, 40.0),
        ];
        let rows = rows_for(&records, &agents);
        let agent_rows: Vec<_> = rows.iter().filter(|r| r.kind == RowKind::Agent).collect();
        assert_eq!(agent_rows.len(), 1);
        assert_eq!(agent_rows[0].totals.risk, 100.0);
    }

    #[test]
    fn ambiguity_warns_once_per_ident() {
        let agents = vec![agent(1, "North", "1001"), agent(2, "South", "1001")];
        let index = IdentIndex::build(&agents, 7, IngestContext::Production);
        let records = vec![
            record("1001", Product::Risk, 10.0),
            record("1001", Product::Risk, 20.0),
        ];
        let (folded, warnings) = fold(&records, &index);
        assert_eq!(warnings.len(), 1);
        assert_eq!(folded[&AgentRef::Agent { id: 1 }].risk, 30.0);
    }

    #[test]
    fn override_splits_department_by_inspector() {
        let mut a = agent(1, "Mixed", "1001");
        a.inspector = Some("Rivka".into());
        let mut b = agent(2, "Mixed", "2002");
        b.inspector = Some("Dan".into());
        let agents = vec![a, b];
        let overrides = vec![CategoryOverride {
            department: "Mixed".into(),
            inspector: "Rivka".into(),
            category: "Employees".into(),
        }];

        let index = IdentIndex::build(&agents, 7, IngestContext::Production);
        let records = vec![
            record("1001", Product::Risk, 10.0),
            record("2002", Product::Risk, 20.0),
        ];
        let (folded, _) = fold(&records, &index);
        let rows =
            build_rows(7, month("2024-03"), IngestContext::Production, &folded, &agents, &overrides);

        let categories: Vec<_> = rows
            .iter()
            .filter(|r| r.kind == RowKind::Subtotal)
            .map(|r| (r.category.clone().unwrap(), r.totals.risk))
            .collect();
        assert_eq!(categories, vec![("Employees".into(), 10.0), ("Mixed".into(), 20.0)]);
    }

    #[test]
    fn explicit_category_beats_department() {
        let mut a = agent(1, "North", "1001");
        a.category = Some("VIP".into());
        let rows = rows_for(&[record("1001", Product::Risk, 5.0)], &[a]);
        assert!(rows
            .iter()
            .any(|r| r.kind == RowKind::Subtotal && r.category.as_deref() == Some("VIP")));
    }
}
