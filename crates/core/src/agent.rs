use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::product::IngestContext;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Inactive,
    Independent,
    FormerEmployee,
    FormerIndependent,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Inactive => "inactive",
            AgentStatus::Independent => "independent",
            AgentStatus::FormerEmployee => "former_employee",
            AgentStatus::FormerIndependent => "former_independent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(AgentStatus::Active),
            "inactive" => Some(AgentStatus::Inactive),
            "independent" => Some(AgentStatus::Independent),
            "former_employee" => Some(AgentStatus::FormerEmployee),
            "former_independent" => Some(AgentStatus::FormerIndependent),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Carrier identifier lists
// ---------------------------------------------------------------------------

/// Raw carrier-specific identifier lists for one agent, keyed by carrier id.
/// Each value is the stored comma-separated list; production and elementary
/// lines are tracked separately because carriers issue distinct numbers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CarrierIdents {
    #[serde(default)]
    pub production: BTreeMap<i64, String>,
    #[serde(default)]
    pub elementary: BTreeMap<i64, String>,
}

impl CarrierIdents {
    pub fn line(&self, context: IngestContext) -> &BTreeMap<i64, String> {
        match context {
            IngestContext::Production => &self.production,
            IngestContext::Elementary => &self.elementary,
        }
    }

    pub fn line_mut(&mut self, context: IngestContext) -> &mut BTreeMap<i64, String> {
        match context {
            IngestContext::Production => &mut self.production,
            IngestContext::Elementary => &mut self.elementary,
        }
    }

    /// Split one stored list into trimmed, non-empty identifiers.
    pub fn split_list(list: &str) -> Vec<&str> {
        list.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
    }

    /// Identifiers this agent holds for a carrier on one line.
    pub fn idents_for(&self, carrier_id: i64, context: IngestContext) -> Vec<&str> {
        self.line(context)
            .get(&carrier_id)
            .map(|list| Self::split_list(list))
            .unwrap_or_default()
    }

    /// Carrier membership is derived: an agent belongs to a carrier exactly
    /// when some line holds a non-empty identifier list for it.
    pub fn has_mapping(&self, carrier_id: i64) -> bool {
        !self.idents_for(carrier_id, IngestContext::Production).is_empty()
            || !self.idents_for(carrier_id, IngestContext::Elementary).is_empty()
    }

    /// Carriers with a non-empty identifier list on either line.
    pub fn mapped_carriers(&self) -> Vec<i64> {
        let mut carriers: Vec<i64> = self
            .production
            .iter()
            .chain(self.elementary.iter())
            .filter(|(_, list)| !Self::split_list(list).is_empty())
            .map(|(carrier, _)| *carrier)
            .collect();
        carriers.sort_unstable();
        carriers.dedup();
        carriers
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// Canonical agent identity. Stable across carriers; the carrier-specific
/// raw numbers live in `idents`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: i64,
    pub name: String,
    pub department: Option<String>,
    pub category: Option<String>,
    pub inspector: Option<String>,
    pub status: AgentStatus,
    #[serde(default)]
    pub idents: CarrierIdents,
}

impl Agent {
    /// Category used by the rollup rows: the explicit category when set,
    /// otherwise the department.
    pub fn rollup_category(&self) -> Option<&str> {
        self.category.as_deref().or(self.department.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Agent reference
// ---------------------------------------------------------------------------

/// Resolution result for one raw identifier: either a canonical agent or the
/// carrier-scoped unmapped bucket. Unknown identifiers are never dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentRef {
    Agent { id: i64 },
    Unmapped { carrier_id: i64 },
}

impl AgentRef {
    /// Stable storage key: `agent:<id>` or `unmapped:<carrier>`.
    pub fn storage_key(&self) -> String {
        match self {
            AgentRef::Agent { id } => format!("agent:{id}"),
            AgentRef::Unmapped { carrier_id } => format!("unmapped:{carrier_id}"),
        }
    }

    pub fn from_storage_key(key: &str) -> Option<Self> {
        let (kind, id) = key.split_once(':')?;
        let id = id.parse().ok()?;
        match kind {
            "agent" => Some(AgentRef::Agent { id }),
            "unmapped" => Some(AgentRef::Unmapped { carrier_id: id }),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentRef::Agent { id } => write!(f, "agent {id}"),
            AgentRef::Unmapped { carrier_id } => write!(f, "UNMAPPED_{carrier_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_with_idents(production: &[(i64, &str)]) -> Agent {
        let mut idents = CarrierIdents::default();
        for (carrier, list) in production {
            idents.production.insert(*carrier, (*list).to_string());
        }
        Agent {
            id: 1,
            name: "Agent".into(),
            department: Some("North".into()),
            category: None,
            inspector: None,
            status: AgentStatus::Active,
            idents,
        }
    }

    #[test]
    fn split_trims_and_drops_empties() {
        assert_eq!(CarrierIdents::split_list(" 1001 , 1002 ,,1003 "), vec!["1001", "1002", "1003"]);
        assert!(CarrierIdents::split_list("  ,").is_empty());
    }

    #[test]
    fn membership_is_derived_from_idents() {
        let agent = agent_with_idents(&[(7, "1001,1002"), (3, "  ")]);
        assert!(agent.idents.has_mapping(7));
        assert!(!agent.idents.has_mapping(3), "blank list is no membership");
        assert!(!agent.idents.has_mapping(5));
        assert_eq!(agent.idents.mapped_carriers(), vec![7]);
    }

    #[test]
    fn elementary_line_counts_for_membership() {
        let mut agent = agent_with_idents(&[]);
        agent.idents.elementary.insert(4, "E-77".into());
        assert!(agent.idents.has_mapping(4));
        assert!(agent.idents.idents_for(4, IngestContext::Production).is_empty());
    }

    #[test]
    fn storage_key_roundtrip() {
        for r in [AgentRef::Agent { id: 42 }, AgentRef::Unmapped { carrier_id: 7 }] {
            assert_eq!(AgentRef::from_storage_key(&r.storage_key()), Some(r));
        }
        assert_eq!(AgentRef::from_storage_key("bogus:1"), None);
    }

    #[test]
    fn rollup_category_falls_back_to_department() {
        let mut agent = agent_with_idents(&[]);
        assert_eq!(agent.rollup_category(), Some("North"));
        agent.category = Some("Employees".into());
        assert_eq!(agent.rollup_category(), Some("Employees"));
    }
}
