use std::collections::BTreeMap;

use prodgrid_core::{Agent, AgentRef, IngestContext, Month, RowWarning};
use prodgrid_store::Store;

use crate::error::EngineError;

/// Maps raw carrier identifiers to canonical agents for one (carrier,
/// context) pair. Built fresh from the current agent list before every
/// aggregation, so mapping edits take effect on the next rebuild.
pub struct IdentIndex {
    carrier_id: i64,
    map: BTreeMap<String, Vec<i64>>,
}

impl IdentIndex {
    pub fn build(agents: &[Agent], carrier_id: i64, context: IngestContext) -> Self {
        let mut map: BTreeMap<String, Vec<i64>> = BTreeMap::new();
        for agent in agents {
            for ident in agent.idents.idents_for(carrier_id, context) {
                let ids = map.entry(ident.to_string()).or_default();
                if !ids.contains(&agent.id) {
                    ids.push(agent.id);
                }
            }
        }
        for ids in map.values_mut() {
            ids.sort_unstable();
        }
        Self { carrier_id, map }
    }

    /// Resolve one raw identifier. Unknown identifiers land in the carrier's
    /// unmapped bucket; an identifier claimed by several agents resolves to
    /// the lowest agent id with a warning attached.
    pub fn resolve(&self, ident: &str) -> (AgentRef, Option<RowWarning>) {
        match self.map.get(ident.trim()) {
            None => (AgentRef::Unmapped { carrier_id: self.carrier_id }, None),
            Some(ids) if ids.len() == 1 => (AgentRef::Agent { id: ids[0] }, None),
            Some(ids) => (
                AgentRef::Agent { id: ids[0] },
                Some(RowWarning::AmbiguousIdentifier {
                    carrier_id: self.carrier_id,
                    ident: ident.trim().to_string(),
                    agent_ids: ids.clone(),
                }),
            ),
        }
    }
}

/// Maps agent display names to ids. The direct-business workbook names
/// agents in free text rather than by carrier identifier.
pub struct NameIndex {
    map: BTreeMap<String, Vec<i64>>,
}

impl NameIndex {
    pub fn build(agents: &[Agent]) -> Self {
        let mut map: BTreeMap<String, Vec<i64>> = BTreeMap::new();
        for agent in agents {
            map.entry(agent.name.trim().to_string()).or_default().push(agent.id);
        }
        for ids in map.values_mut() {
            ids.sort_unstable();
        }
        Self { map }
    }

    pub fn resolve(&self, name: &str, carrier_id: i64) -> (AgentRef, Option<RowWarning>) {
        match self.map.get(name.trim()) {
            None => (AgentRef::Unmapped { carrier_id }, None),
            Some(ids) if ids.len() == 1 => (AgentRef::Agent { id: ids[0] }, None),
            Some(ids) => (
                AgentRef::Agent { id: ids[0] },
                Some(RowWarning::AmbiguousIdentifier {
                    carrier_id,
                    ident: name.trim().to_string(),
                    agent_ids: ids.clone(),
                }),
            ),
        }
    }
}

/// One raw identifier currently resolving to an unmapped bucket, with the
/// production waiting behind it.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct UnmappedIdent {
    pub carrier_id: i64,
    pub month: Month,
    pub context: IngestContext,
    pub ident: String,
    pub total: f64,
    pub rows: usize,
}

/// Summarise the raw identifiers that do not resolve to any agent, per
/// (carrier, month, identifier). Narrows to one carrier, month or line when
/// asked. Mapping one of these identifiers onto an agent moves the listed
/// amounts out of the bucket on the next cascade.
pub fn unmapped_idents(
    store: &Store,
    carrier_id: Option<i64>,
    month: Option<Month>,
    context: Option<IngestContext>,
) -> Result<Vec<UnmappedIdent>, EngineError> {
    let agents = store.agents()?;
    let mut out: Vec<UnmappedIdent> = Vec::new();
    for batch in store.batches(context)? {
        if carrier_id.is_some_and(|id| batch.carrier_id != id)
            || month.is_some_and(|m| batch.month != m)
        {
            continue;
        }
        let index = IdentIndex::build(&agents, batch.carrier_id, batch.context);
        let mut per_ident: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for record in store.raw_rows_for_batch(&batch.id)? {
            let (resolved, _) = index.resolve(&record.agent_ident);
            if matches!(resolved, AgentRef::Unmapped { .. }) {
                let cell = per_ident.entry(record.agent_ident.trim().to_string()).or_default();
                cell.0 += record.amount;
                cell.1 += 1;
            }
        }
        for (ident, (total, rows)) in per_ident {
            out.push(UnmappedIdent {
                carrier_id: batch.carrier_id,
                month: batch.month,
                context: batch.context,
                ident,
                total,
                rows,
            });
        }
    }
    Ok(out)
}
