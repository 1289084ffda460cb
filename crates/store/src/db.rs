use std::path::Path;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use prodgrid_core::{
    Agent, AgentRef, AgentStatus, CarrierIdents, IngestContext, Month, Product, ProductTotals,
    RawProductionRecord, UploadBatch,
};

use crate::error::StoreError;
use crate::types::{AggregateFilter, AggregateRow, Goal, PercentageTarget, RowKind};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS agents (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    department TEXT,
    category TEXT,
    inspector TEXT,
    status TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS agent_idents (
    agent_id INTEGER NOT NULL,
    carrier_id INTEGER NOT NULL,
    context TEXT NOT NULL,         -- production | elementary
    idents TEXT NOT NULL,          -- comma-separated raw identifier list
    PRIMARY KEY (agent_id, carrier_id, context)
);

CREATE TABLE IF NOT EXISTS upload_batches (
    id TEXT PRIMARY KEY,
    carrier_id INTEGER NOT NULL,
    month TEXT NOT NULL,           -- YYYY-MM
    context TEXT NOT NULL,
    row_count INTEGER NOT NULL,
    uploaded_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS ux_batches_key
    ON upload_batches (carrier_id, month, context);

CREATE TABLE IF NOT EXISTS raw_rows (
    batch_id TEXT NOT NULL,
    carrier_id INTEGER NOT NULL,
    month TEXT NOT NULL,
    agent_ident TEXT NOT NULL,
    product TEXT NOT NULL,
    amount REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_raw_batch ON raw_rows (batch_id);

CREATE TABLE IF NOT EXISTS aggregates (
    carrier_id INTEGER NOT NULL,
    month TEXT NOT NULL,
    context TEXT NOT NULL,
    row_kind INTEGER NOT NULL,     -- 0=agent, 1=subtotal, 2=grand
    agent_ref TEXT,                -- agent:<id> | unmapped:<carrier>, kind 0 only
    category TEXT,
    pension REAL NOT NULL DEFAULT 0,
    risk REAL NOT NULL DEFAULT 0,
    financial REAL NOT NULL DEFAULT 0,
    pension_transfer REAL NOT NULL DEFAULT 0,
    elementary REAL NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS ix_agg_key ON aggregates (carrier_id, month, context);
CREATE INDEX IF NOT EXISTS ix_agg_ref ON aggregates (agent_ref);

CREATE TABLE IF NOT EXISTS goals (
    agent_id INTEGER NOT NULL,
    year INTEGER NOT NULL,
    product TEXT NOT NULL,
    amount REAL NOT NULL,
    PRIMARY KEY (agent_id, year, product)
);

CREATE TABLE IF NOT EXISTS percentages (
    year INTEGER NOT NULL,
    month INTEGER NOT NULL,
    product TEXT NOT NULL,
    percent REAL NOT NULL,
    PRIMARY KEY (year, month, product)
);
"#;

/// Sqlite-backed store for agents, upload batches, raw rows, aggregates,
/// goals and percentage targets. One connection; callers serialize access.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Store { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Store { conn })
    }

    // -----------------------------------------------------------------------
    // Agents
    // -----------------------------------------------------------------------

    /// Insert or replace one agent together with its identifier lists.
    /// Lists that are blank after trimming are not stored.
    pub fn upsert_agent(&mut self, agent: &Agent) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO agents (id, name, department, category, inspector, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                agent.id,
                &agent.name,
                agent.department.as_deref(),
                agent.category.as_deref(),
                agent.inspector.as_deref(),
                agent.status.as_str(),
            ],
        )?;
        tx.execute("DELETE FROM agent_idents WHERE agent_id = ?1", params![agent.id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO agent_idents (agent_id, carrier_id, context, idents)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for context in [IngestContext::Production, IngestContext::Elementary] {
                for (carrier_id, list) in agent.idents.line(context) {
                    if CarrierIdents::split_list(list).is_empty() {
                        continue;
                    }
                    stmt.execute(params![agent.id, carrier_id, context.as_str(), list])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn agent(&self, id: i64) -> Result<Option<Agent>, StoreError> {
        let head = self
            .conn
            .query_row(
                "SELECT name, department, category, inspector, status
                 FROM agents WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;
        let Some((name, department, category, inspector, status)) = head else {
            return Ok(None);
        };
        let status = AgentStatus::parse(&status).ok_or_else(|| StoreError::CorruptRow {
            table: "agents",
            detail: format!("status {status:?}"),
        })?;
        let mut agent =
            Agent { id, name, department, category, inspector, status, idents: CarrierIdents::default() };
        self.load_idents(std::slice::from_mut(&mut agent))?;
        Ok(Some(agent))
    }

    pub fn agents(&self) -> Result<Vec<Agent>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, department, category, inspector, status FROM agents ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;
        let mut agents = Vec::new();
        for row in rows {
            let (id, name, department, category, inspector, status) = row?;
            let status = AgentStatus::parse(&status).ok_or_else(|| StoreError::CorruptRow {
                table: "agents",
                detail: format!("status {status:?}"),
            })?;
            agents.push(Agent {
                id,
                name,
                department,
                category,
                inspector,
                status,
                idents: CarrierIdents::default(),
            });
        }
        self.load_idents(&mut agents)?;
        Ok(agents)
    }

    fn load_idents(&self, agents: &mut [Agent]) -> Result<(), StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT agent_id, carrier_id, context, idents FROM agent_idents")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        for row in rows {
            let (agent_id, carrier_id, context, list) = row?;
            let context = IngestContext::parse(&context).ok_or_else(|| StoreError::CorruptRow {
                table: "agent_idents",
                detail: format!("context {context:?}"),
            })?;
            if let Some(agent) = agents.iter_mut().find(|a| a.id == agent_id) {
                agent.idents.line_mut(context).insert(carrier_id, list);
            }
        }
        Ok(())
    }

    /// Remove an agent, its identifier lists and its goals. Percentage
    /// targets are company-wide and survive. Aggregates are left to the
    /// caller, who rebuilds the affected groups.
    pub fn delete_agent(&mut self, id: i64) -> Result<bool, StoreError> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute("DELETE FROM agents WHERE id = ?1", params![id])?;
        tx.execute("DELETE FROM agent_idents WHERE agent_id = ?1", params![id])?;
        tx.execute("DELETE FROM goals WHERE agent_id = ?1", params![id])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    // -----------------------------------------------------------------------
    // Upload batches and raw rows
    // -----------------------------------------------------------------------

    pub fn batch_for(
        &self,
        carrier_id: i64,
        month: Month,
        context: IngestContext,
    ) -> Result<Option<UploadBatch>, StoreError> {
        self.conn
            .query_row(
                "SELECT id, row_count, uploaded_at FROM upload_batches
                 WHERE carrier_id = ?1 AND month = ?2 AND context = ?3",
                params![carrier_id, month.to_string(), context.as_str()],
                |row| {
                    Ok(UploadBatch {
                        id: row.get(0)?,
                        carrier_id,
                        month,
                        context,
                        row_count: row.get::<_, i64>(1)? as usize,
                        uploaded_at: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
    }

    /// Record a batch with its raw rows atomically, replacing any earlier
    /// batch for the same (carrier, month, context) key.
    pub fn record_batch(
        &mut self,
        batch: &UploadBatch,
        records: &[RawProductionRecord],
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM raw_rows WHERE batch_id IN
               (SELECT id FROM upload_batches
                WHERE carrier_id = ?1 AND month = ?2 AND context = ?3)",
            params![batch.carrier_id, batch.month.to_string(), batch.context.as_str()],
        )?;
        tx.execute(
            "DELETE FROM upload_batches
             WHERE carrier_id = ?1 AND month = ?2 AND context = ?3",
            params![batch.carrier_id, batch.month.to_string(), batch.context.as_str()],
        )?;
        tx.execute(
            "INSERT INTO upload_batches (id, carrier_id, month, context, row_count, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &batch.id,
                batch.carrier_id,
                batch.month.to_string(),
                batch.context.as_str(),
                batch.row_count as i64,
                &batch.uploaded_at,
            ],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO raw_rows (batch_id, carrier_id, month, agent_ident, product, amount)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for r in records {
                stmt.execute(params![
                    &r.batch_id,
                    r.carrier_id,
                    r.month.to_string(),
                    &r.agent_ident,
                    r.product.as_str(),
                    r.amount,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete batches with their raw rows and derived aggregate groups for
    /// one month on one line. `carrier_id` scopes the delete to one carrier;
    /// `None` covers every carrier uploaded for that month. Returns the raw
    /// row and aggregate row counts removed.
    pub fn delete_batches(
        &mut self,
        carrier_id: Option<i64>,
        month: Month,
        context: IngestContext,
    ) -> Result<(usize, usize), StoreError> {
        let tx = self.conn.transaction()?;
        let raw_deleted = tx.execute(
            "DELETE FROM raw_rows WHERE batch_id IN
               (SELECT id FROM upload_batches
                WHERE month = ?1 AND context = ?2
                  AND (?3 IS NULL OR carrier_id = ?3))",
            params![month.to_string(), context.as_str(), carrier_id],
        )?;
        tx.execute(
            "DELETE FROM upload_batches
             WHERE month = ?1 AND context = ?2 AND (?3 IS NULL OR carrier_id = ?3)",
            params![month.to_string(), context.as_str(), carrier_id],
        )?;
        let agg_deleted = tx.execute(
            "DELETE FROM aggregates
             WHERE month = ?1 AND context = ?2 AND (?3 IS NULL OR carrier_id = ?3)",
            params![month.to_string(), context.as_str(), carrier_id],
        )?;
        tx.commit()?;
        Ok((raw_deleted, agg_deleted))
    }

    pub fn batches(&self, context: Option<IngestContext>) -> Result<Vec<UploadBatch>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, carrier_id, month, context, row_count, uploaded_at
             FROM upload_batches
             WHERE ?1 IS NULL OR context = ?1
             ORDER BY month, carrier_id, context",
        )?;
        let rows = stmt.query_map(params![context.map(|c| c.as_str())], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;
        let mut batches = Vec::new();
        for row in rows {
            let (id, carrier_id, month, context, row_count, uploaded_at) = row?;
            batches.push(UploadBatch {
                id,
                carrier_id,
                month: parse_month("upload_batches", &month)?,
                context: parse_context("upload_batches", &context)?,
                row_count: row_count as usize,
                uploaded_at,
            });
        }
        Ok(batches)
    }

    /// Months for which a carrier has an uploaded batch on one line, in
    /// chronological order. Drives re-aggregation after mapping edits.
    pub fn months_with_batches(
        &self,
        carrier_id: i64,
        context: IngestContext,
    ) -> Result<Vec<Month>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT month FROM upload_batches
             WHERE carrier_id = ?1 AND context = ?2 ORDER BY month",
        )?;
        let rows =
            stmt.query_map(params![carrier_id, context.as_str()], |row| row.get::<_, String>(0))?;
        let mut months = Vec::new();
        for row in rows {
            months.push(parse_month("upload_batches", &row?)?);
        }
        Ok(months)
    }

    pub fn raw_rows_for_batch(&self, batch_id: &str) -> Result<Vec<RawProductionRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT carrier_id, month, agent_ident, product, amount
             FROM raw_rows WHERE batch_id = ?1",
        )?;
        let rows = stmt.query_map(params![batch_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, f64>(4)?,
            ))
        })?;
        let mut records = Vec::new();
        for row in rows {
            let (carrier_id, month, agent_ident, product, amount) = row?;
            records.push(RawProductionRecord {
                carrier_id,
                month: parse_month("raw_rows", &month)?,
                agent_ident,
                product: parse_product("raw_rows", &product)?,
                amount,
                batch_id: batch_id.to_string(),
            });
        }
        Ok(records)
    }

    // -----------------------------------------------------------------------
    // Aggregates
    // -----------------------------------------------------------------------

    /// Replace the whole aggregate group for one (carrier, month, context)
    /// key in a single transaction. Re-running with the same rows is a no-op
    /// in effect. Returns how many stale rows the replace removed.
    pub fn replace_aggregates(
        &mut self,
        carrier_id: i64,
        month: Month,
        context: IngestContext,
        rows: &[AggregateRow],
    ) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM aggregates
             WHERE carrier_id = ?1 AND month = ?2 AND context = ?3",
            params![carrier_id, month.to_string(), context.as_str()],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO aggregates
                   (carrier_id, month, context, row_kind, agent_ref, category,
                    pension, risk, financial, pension_transfer, elementary)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for r in rows {
                stmt.execute(params![
                    carrier_id,
                    month.to_string(),
                    context.as_str(),
                    r.kind.as_i64(),
                    r.agent_ref.as_ref().map(AgentRef::storage_key),
                    r.category.as_deref(),
                    r.totals.pension,
                    r.totals.risk,
                    r.totals.financial,
                    r.totals.pension_transfer,
                    r.totals.elementary,
                ])?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }

    pub fn aggregates(&self, filter: &AggregateFilter) -> Result<Vec<AggregateRow>, StoreError> {
        let mut sql = String::from(
            "SELECT carrier_id, month, context, row_kind, agent_ref, category,
                    pension, risk, financial, pension_transfer, elementary
             FROM aggregates WHERE 1=1",
        );
        let mut args: Vec<rusqlite::types::Value> = Vec::new();
        if let Some(carrier_id) = filter.carrier_id {
            sql.push_str(&format!(" AND carrier_id = ?{}", args.len() + 1));
            args.push(carrier_id.into());
        }
        if let Some(month) = filter.month {
            sql.push_str(&format!(" AND month = ?{}", args.len() + 1));
            args.push(month.to_string().into());
        }
        if let Some(context) = filter.context {
            sql.push_str(&format!(" AND context = ?{}", args.len() + 1));
            args.push(context.as_str().to_string().into());
        }
        if let Some(agent_ref) = &filter.agent_ref {
            sql.push_str(&format!(" AND agent_ref = ?{}", args.len() + 1));
            args.push(agent_ref.storage_key().into());
        }
        if let Some(category) = &filter.category {
            sql.push_str(&format!(" AND category = ?{}", args.len() + 1));
            args.push(category.clone().into());
        }
        if let Some(kind) = filter.kind {
            sql.push_str(&format!(" AND row_kind = ?{}", args.len() + 1));
            args.push(kind.as_i64().into());
        }
        sql.push_str(" ORDER BY month, carrier_id, context, row_kind, agent_ref");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                [
                    row.get::<_, f64>(6)?,
                    row.get::<_, f64>(7)?,
                    row.get::<_, f64>(8)?,
                    row.get::<_, f64>(9)?,
                    row.get::<_, f64>(10)?,
                ],
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (carrier_id, month, context, kind, agent_ref, category, amounts) = row?;
            let kind = RowKind::from_i64(kind).ok_or_else(|| StoreError::CorruptRow {
                table: "aggregates",
                detail: format!("row_kind {kind}"),
            })?;
            let agent_ref = match agent_ref {
                Some(key) => Some(AgentRef::from_storage_key(&key).ok_or_else(|| {
                    StoreError::CorruptRow { table: "aggregates", detail: format!("agent_ref {key:?}") }
                })?),
                None => None,
            };
            out.push(AggregateRow {
                carrier_id,
                month: parse_month("aggregates", &month)?,
                context: parse_context("aggregates", &context)?,
                kind,
                agent_ref,
                category,
                totals: ProductTotals {
                    pension: amounts[0],
                    risk: amounts[1],
                    financial: amounts[2],
                    pension_transfer: amounts[3],
                    elementary: amounts[4],
                },
            });
        }
        Ok(out)
    }

    /// Agent rows sitting in an unmapped bucket, across all groups.
    pub fn unmapped_aggregates(&self) -> Result<Vec<AggregateRow>, StoreError> {
        let rows = self.aggregates(&AggregateFilter { kind: Some(RowKind::Agent), ..Default::default() })?;
        Ok(rows
            .into_iter()
            .filter(|r| matches!(r.agent_ref, Some(AgentRef::Unmapped { .. })))
            .collect())
    }

    // -----------------------------------------------------------------------
    // Goals
    // -----------------------------------------------------------------------

    /// Replace one agent's goals for a year.
    pub fn replace_goals(
        &mut self,
        agent_id: i64,
        year: i32,
        goals: &[(Product, f64)],
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM goals WHERE agent_id = ?1 AND year = ?2",
            params![agent_id, year],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO goals (agent_id, year, product, amount) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (product, amount) in goals {
                stmt.execute(params![agent_id, year, product.as_str(), amount])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn goals_for_year(&self, year: i32) -> Result<Vec<Goal>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT agent_id, product, amount FROM goals WHERE year = ?1 ORDER BY agent_id",
        )?;
        let rows = stmt.query_map(params![year], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, f64>(2)?))
        })?;
        let mut goals = Vec::new();
        for row in rows {
            let (agent_id, product, amount) = row?;
            goals.push(Goal { agent_id, year, product: parse_product("goals", &product)?, amount });
        }
        Ok(goals)
    }

    pub fn goal(&self, agent_id: i64, year: i32, product: Product) -> Result<Option<f64>, StoreError> {
        self.conn
            .query_row(
                "SELECT amount FROM goals WHERE agent_id = ?1 AND year = ?2 AND product = ?3",
                params![agent_id, year, product.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)
    }

    // -----------------------------------------------------------------------
    // Percentage targets
    // -----------------------------------------------------------------------

    /// Replace the company-wide monthly percentage targets for a year.
    pub fn replace_percentages(
        &mut self,
        year: i32,
        targets: &[PercentageTarget],
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM percentages WHERE year = ?1", params![year])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO percentages (year, month, product, percent)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for t in targets {
                stmt.execute(params![year, t.month, t.product.as_str(), t.percent])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn percentages_for_year(&self, year: i32) -> Result<Vec<PercentageTarget>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT month, product, percent FROM percentages
             WHERE year = ?1 ORDER BY month",
        )?;
        let rows = stmt.query_map(params![year], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, f64>(2)?))
        })?;
        let mut targets = Vec::new();
        for row in rows {
            let (month, product, percent) = row?;
            targets.push(PercentageTarget {
                year,
                month: month as u32,
                product: parse_product("percentages", &product)?,
                percent,
            });
        }
        Ok(targets)
    }
}

fn parse_month(table: &'static str, s: &str) -> Result<Month, StoreError> {
    Month::parse(s)
        .ok_or_else(|| StoreError::CorruptRow { table, detail: format!("month {s:?}") })
}

fn parse_context(table: &'static str, s: &str) -> Result<IngestContext, StoreError> {
    IngestContext::parse(s)
        .ok_or_else(|| StoreError::CorruptRow { table, detail: format!("context {s:?}") })
}

fn parse_product(table: &'static str, s: &str) -> Result<Product, StoreError> {
    Product::parse(s)
        .ok_or_else(|| StoreError::CorruptRow { table, detail: format!("product {s:?}") })
}
