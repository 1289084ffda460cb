use std::collections::BTreeMap;

use prodgrid_core::{Month, Product, ProductTotals};
use prodgrid_store::{AggregateFilter, PercentageTarget, RowKind, Store};

use crate::error::EngineError;

const PCT_EPSILON: f64 = 1e-9;

/// Validate and persist the company-wide monthly percentage targets for a
/// year. Each value must sit in 0..=100, and per product the year's values
/// may not sum past 100: a product's months can never promise more than the
/// whole annual goal.
pub fn set_percentages(
    store: &mut Store,
    year: i32,
    targets: &[PercentageTarget],
) -> Result<(), EngineError> {
    for t in targets {
        if !(0.0..=100.0).contains(&t.percent) || !t.percent.is_finite() {
            return Err(EngineError::PercentageOutOfRange {
                month: t.month,
                product: t.product,
                percent: t.percent,
            });
        }
    }
    for product in Product::ALL {
        let total: f64 =
            targets.iter().filter(|t| t.product == product).map(|t| t.percent).sum();
        if total > 100.0 + PCT_EPSILON {
            return Err(EngineError::CumulativeOverflow { product, total });
        }
    }
    store.replace_percentages(year, targets)?;
    Ok(())
}

/// Running percentage sums for a product over months 1..=12. A month with
/// no entry of its own reports `None` instead of the carried-forward sum;
/// the running total still advances underneath.
pub fn cumulative_schedule(targets: &[PercentageTarget], product: Product) -> [Option<f64>; 12] {
    let mut schedule = [None; 12];
    let mut running = 0.0;
    for m in 1..=12u32 {
        let own: f64 = targets
            .iter()
            .filter(|t| t.product == product && t.month == m)
            .map(|t| t.percent)
            .sum();
        running += own;
        if own != 0.0 {
            schedule[(m - 1) as usize] = Some(running);
        }
    }
    schedule
}

/// One product's achievement figures for one agent and month. `target` and
/// `achievement` stay empty unless the product is gated in: both a positive
/// annual goal for the agent and a positive company-wide percentage for the
/// month.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ProductAchievement {
    pub product: Product,
    pub goal: f64,
    pub percent: f64,
    pub actual: f64,
    pub target: Option<f64>,
    pub achievement: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AgentAchievement {
    pub agent_id: i64,
    pub name: String,
    pub products: Vec<ProductAchievement>,
    /// Rollups over gated products only.
    pub target_total: f64,
    pub actual_total: f64,
    pub achievement: Option<f64>,
}

/// One product cell on a category or grand rollup row. Sums only members
/// gated in for the product.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RollupProduct {
    pub product: Product,
    pub target: f64,
    pub actual: f64,
    pub achievement: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RollupAchievement {
    /// `None` marks the grand-total row.
    pub category: Option<String>,
    pub products: Vec<RollupProduct>,
    pub target_total: f64,
    pub actual_total: f64,
    pub achievement: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AchievementReport {
    pub agents: Vec<AgentAchievement>,
    pub categories: Vec<RollupAchievement>,
    pub grand: RollupAchievement,
}

/// The monthly achievement report: every agent, every product, actuals from
/// the aggregate rows across all carriers and both lines, with category and
/// grand rollups over the gated cells.
pub fn achievement(store: &Store, month: Month) -> Result<AchievementReport, EngineError> {
    let agents = store.agents()?;
    let goals = store.goals_for_year(month.year)?;
    let percentages = store.percentages_for_year(month.year)?;

    let month_rows = store.aggregates(&AggregateFilter {
        month: Some(month),
        kind: Some(RowKind::Agent),
        ..Default::default()
    })?;

    let mut agent_rows = Vec::new();
    let mut category_cells: BTreeMap<String, BTreeMap<Product, (f64, f64)>> = BTreeMap::new();
    let mut grand_cells: BTreeMap<Product, (f64, f64)> = BTreeMap::new();
    for agent in &agents {
        let mut actuals = ProductTotals::default();
        for row in &month_rows {
            if row.agent_ref == Some(prodgrid_core::AgentRef::Agent { id: agent.id }) {
                actuals.add_all(&row.totals);
            }
        }

        let mut products = Vec::new();
        let mut target_total = 0.0;
        let mut actual_total = 0.0;
        for product in Product::ALL {
            let goal = goals
                .iter()
                .find(|g| g.agent_id == agent.id && g.product == product)
                .map(|g| g.amount)
                .unwrap_or(0.0);
            let percent = percentages
                .iter()
                .find(|t| t.month == month.month && t.product == product)
                .map(|t| t.percent)
                .unwrap_or(0.0);
            let actual = actuals.get(product);

            let (target, pct_achieved) = if goal > 0.0 && percent > 0.0 {
                let target = goal * percent / 100.0;
                target_total += target;
                actual_total += actual;
                if let Some(category) = agent.rollup_category() {
                    let cell = category_cells
                        .entry(category.to_string())
                        .or_default()
                        .entry(product)
                        .or_insert((0.0, 0.0));
                    cell.0 += target;
                    cell.1 += actual;
                }
                let cell = grand_cells.entry(product).or_insert((0.0, 0.0));
                cell.0 += target;
                cell.1 += actual;
                (Some(target), Some(actual / target * 100.0))
            } else {
                (None, None)
            };
            products.push(ProductAchievement {
                product,
                goal,
                percent,
                actual,
                target,
                achievement: pct_achieved,
            });
        }

        let total_achievement =
            (target_total > 0.0).then(|| actual_total / target_total * 100.0);
        agent_rows.push(AgentAchievement {
            agent_id: agent.id,
            name: agent.name.clone(),
            products,
            target_total,
            actual_total,
            achievement: total_achievement,
        });
    }

    let categories = category_cells
        .into_iter()
        .map(|(category, cells)| rollup_row(Some(category), &cells))
        .collect();
    let grand = rollup_row(None, &grand_cells);
    Ok(AchievementReport { agents: agent_rows, categories, grand })
}

fn rollup_row(
    category: Option<String>,
    cells: &BTreeMap<Product, (f64, f64)>,
) -> RollupAchievement {
    let mut products = Vec::new();
    let mut target_total = 0.0;
    let mut actual_total = 0.0;
    for product in Product::ALL {
        let (target, actual) = cells.get(&product).copied().unwrap_or((0.0, 0.0));
        target_total += target;
        actual_total += actual;
        products.push(RollupProduct {
            product,
            target,
            actual,
            achievement: (target > 0.0).then(|| actual / target * 100.0),
        });
    }
    RollupAchievement {
        category,
        products,
        target_total,
        actual_total,
        achievement: (target_total > 0.0).then(|| actual_total / target_total * 100.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prodgrid_core::{Agent, AgentRef, AgentStatus, CarrierIdents, IngestContext};
    use prodgrid_store::AggregateRow;

    fn month(s: &str) -> Month {
        Month::parse(s).unwrap()
    }

    fn target(m: u32, product: Product, pct: f64) -> PercentageTarget {
        PercentageTarget { year: 2024, month: m, product, percent: pct }
    }

    fn seed_agent(store: &mut Store, id: i64, name: &str) {
        store
            .upsert_agent(&Agent {
                id,
                name: name.into(),
                department: None,
                category: None,
                inspector: None,
                status: AgentStatus::Active,
                idents: CarrierIdents::default(),
            })
            .unwrap();
    }

    fn seed_actual(store: &mut Store, carrier_id: i64, m: &str, agent_id: i64, product: Product, amount: f64) {
        let mut totals = ProductTotals::default();
        totals.add(product, amount);
        store
            .replace_aggregates(
                carrier_id,
                month(m),
                IngestContext::Production,
                &[AggregateRow {
                    carrier_id,
                    month: month(m),
                    context: IngestContext::Production,
                    kind: RowKind::Agent,
                    agent_ref: Some(AgentRef::Agent { id: agent_id }),
                    category: None,
                    totals,
                }],
            )
            .unwrap();
    }

    #[test]
    fn rejects_out_of_range_percent() {
        let mut store = Store::open_in_memory().unwrap();
        for bad in [-1.0, 101.0, f64::NAN] {
            let err =
                set_percentages(&mut store, 2024, &[target(3, Product::Risk, bad)]).unwrap_err();
            assert!(matches!(err, EngineError::PercentageOutOfRange { .. }), "{bad} accepted");
        }
    }

    #[test]
    fn rejects_yearly_sum_over_100() {
        let mut store = Store::open_in_memory().unwrap();
        let targets: Vec<_> = (1..=12).map(|m| target(m, Product::Risk, 9.0)).collect();
        let err = set_percentages(&mut store, 2024, &targets).unwrap_err();
        match err {
            EngineError::CumulativeOverflow { product, total } => {
                assert_eq!(product, Product::Risk);
                assert_eq!(total, 108.0);
            }
            other => panic!("expected overflow, got {other}"),
        }
    }

    #[test]
    fn caps_apply_per_product_and_exactly_100_passes() {
        let mut store = Store::open_in_memory().unwrap();
        let mut targets: Vec<_> = (1..=10).map(|m| target(m, Product::Risk, 10.0)).collect();
        targets.extend((1..=12).map(|m| target(m, Product::Pension, 8.0)));
        set_percentages(&mut store, 2024, &targets).unwrap();
        assert_eq!(store.percentages_for_year(2024).unwrap().len(), 22);
    }

    #[test]
    fn cumulative_hides_months_without_their_own_entry() {
        // 20% in January, nothing in February, 30% in March: February shows
        // no cumulative, March carries the running 50%.
        let targets =
            vec![target(1, Product::Risk, 20.0), target(3, Product::Risk, 30.0)];
        let schedule = cumulative_schedule(&targets, Product::Risk);
        assert_eq!(schedule[0], Some(20.0));
        assert_eq!(schedule[1], None);
        assert_eq!(schedule[2], Some(50.0));
        assert_eq!(schedule[11], None);
        assert_eq!(cumulative_schedule(&targets, Product::Pension), [None; 12]);
    }

    #[test]
    fn achievement_worked_example() {
        // Annual goal 1200, 10% scheduled for March, 90 produced: 75%.
        let mut store = Store::open_in_memory().unwrap();
        seed_agent(&mut store, 1, "Agent One");
        store.replace_goals(1, 2024, &[(Product::Risk, 1200.0)]).unwrap();
        set_percentages(&mut store, 2024, &[target(3, Product::Risk, 10.0)]).unwrap();
        seed_actual(&mut store, 7, "2024-03", 1, Product::Risk, 90.0);

        let report = achievement(&store, month("2024-03")).unwrap();
        assert_eq!(report.agents.len(), 1);
        let risk =
            report.agents[0].products.iter().find(|p| p.product == Product::Risk).unwrap();
        assert_eq!(risk.target, Some(120.0));
        assert_eq!(risk.actual, 90.0);
        assert_eq!(risk.achievement, Some(75.0));
        assert_eq!(report.agents[0].achievement, Some(75.0));

        // One gated agent, no category: the grand row mirrors the agent.
        assert!(report.categories.is_empty());
        assert_eq!(report.grand.target_total, 120.0);
        assert_eq!(report.grand.actual_total, 90.0);
        assert_eq!(report.grand.achievement, Some(75.0));
    }

    #[test]
    fn ungated_products_report_no_target() {
        let mut store = Store::open_in_memory().unwrap();
        seed_agent(&mut store, 1, "Agent One");
        // Goal without a percentage for the month, and production without
        // either: both stay ungated.
        store.replace_goals(1, 2024, &[(Product::Risk, 1200.0)]).unwrap();
        seed_actual(&mut store, 7, "2024-03", 1, Product::Pension, 500.0);

        let report = achievement(&store, month("2024-03")).unwrap();
        let by_product = &report.agents[0].products;
        for p in by_product {
            assert_eq!(p.target, None, "{} should be ungated", p.product);
            assert_eq!(p.achievement, None);
        }
        let pension = by_product.iter().find(|p| p.product == Product::Pension).unwrap();
        assert_eq!(pension.actual, 500.0, "actuals still reported");
        assert_eq!(report.agents[0].achievement, None);
        assert_eq!(report.agents[0].actual_total, 0.0, "ungated actuals stay out of rollups");
        assert_eq!(report.grand.actual_total, 0.0);
        assert_eq!(report.grand.achievement, None);
    }

    #[test]
    fn schedule_is_company_wide_across_agents() {
        // The monthly schedule is set once for the year; every agent with a
        // positive goal is gated by it, not only the first.
        let mut store = Store::open_in_memory().unwrap();
        seed_agent(&mut store, 1, "Agent One");
        seed_agent(&mut store, 2, "Agent Two");
        store.replace_goals(1, 2024, &[(Product::Risk, 1200.0)]).unwrap();
        store.replace_goals(2, 2024, &[(Product::Risk, 1200.0)]).unwrap();
        set_percentages(&mut store, 2024, &[target(3, Product::Risk, 10.0)]).unwrap();

        let report = achievement(&store, month("2024-03")).unwrap();
        for agent in &report.agents {
            let risk = agent.products.iter().find(|p| p.product == Product::Risk).unwrap();
            assert_eq!(risk.target, Some(120.0), "agent {} ungated", agent.agent_id);
            assert_eq!(risk.percent, 10.0);
        }
        assert_eq!(report.grand.target_total, 240.0);
    }

    #[test]
    fn actuals_sum_across_carriers() {
        let mut store = Store::open_in_memory().unwrap();
        seed_agent(&mut store, 1, "Agent One");
        store.replace_goals(1, 2024, &[(Product::Risk, 1000.0)]).unwrap();
        set_percentages(&mut store, 2024, &[target(3, Product::Risk, 20.0)]).unwrap();
        seed_actual(&mut store, 7, "2024-03", 1, Product::Risk, 120.0);
        seed_actual(&mut store, 3, "2024-03", 1, Product::Risk, 80.0);

        let report = achievement(&store, month("2024-03")).unwrap();
        let risk =
            report.agents[0].products.iter().find(|p| p.product == Product::Risk).unwrap();
        assert_eq!(risk.actual, 200.0);
        assert_eq!(risk.achievement, Some(100.0));
    }

    #[test]
    fn category_rollups_sum_gated_members() {
        let mut store = Store::open_in_memory().unwrap();
        for (id, name) in [(1, "Agent One"), (2, "Agent Two")] {
            seed_agent(&mut store, id, name);
            let mut agent = store.agent(id).unwrap().unwrap();
            agent.category = Some("North".into());
            store.upsert_agent(&agent).unwrap();
            store.replace_goals(id, 2024, &[(Product::Risk, 1000.0)]).unwrap();
        }
        set_percentages(&mut store, 2024, &[target(3, Product::Risk, 10.0)]).unwrap();
        seed_actual(&mut store, 7, "2024-03", 1, Product::Risk, 80.0);
        seed_actual(&mut store, 3, "2024-03", 2, Product::Risk, 70.0);

        let report = achievement(&store, month("2024-03")).unwrap();
        assert_eq!(report.categories.len(), 1);
        let north = &report.categories[0];
        assert_eq!(north.category.as_deref(), Some("North"));
        assert_eq!(north.target_total, 200.0);
        assert_eq!(north.actual_total, 150.0);
        assert_eq!(north.achievement, Some(75.0));
        assert_eq!(report.grand.target_total, 200.0);
    }
}
