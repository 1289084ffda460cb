use std::collections::BTreeMap;

use prodgrid_core::{Month, Product, RawProductionRecord, RowWarning};
use prodgrid_schema::{AmountRule, ContextSchema, FileSlot};

use crate::error::IngestError;
use crate::workbook::{Cell, SheetData};

/// How many leading rows of a sheet are scanned for a slot's header hint.
const HINT_SCAN_ROWS: usize = 10;

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ExtractOutput {
    pub records: Vec<RawProductionRecord>,
    pub warnings: Vec<RowWarning>,
    /// Labels of the slots that matched a sheet, in schema order.
    pub slots_matched: Vec<String>,
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Classify one workbook against a carrier's context schema and extract raw
/// production rows for the declared month.
///
/// Required slots must match a sheet; optional slots that match nothing are
/// simply absent from the output. Column positions are resolved by header
/// text. Rows with unparseable amounts become warnings, never failures; a
/// period column that never agrees with the declared month fails the whole
/// file with both periods attached.
pub fn extract(
    schema: &ContextSchema,
    carrier_id: i64,
    month: Month,
    batch_id: &str,
    sheets: &[SheetData],
) -> Result<ExtractOutput, IngestError> {
    extract_union(schema, carrier_id, month, batch_id, &[sheets])
}

/// Classify a multi-file submission: each workbook is scanned in turn, every
/// slot binds to the first sheet that matches it across the files, and the
/// output is the union of all matched slots' rows. A required slot only
/// fails the submission when no provided file carries it.
pub fn extract_files(
    schema: &ContextSchema,
    carrier_id: i64,
    month: Month,
    batch_id: &str,
    files: &[Vec<SheetData>],
) -> Result<ExtractOutput, IngestError> {
    let refs: Vec<&[SheetData]> = files.iter().map(Vec::as_slice).collect();
    extract_union(schema, carrier_id, month, batch_id, &refs)
}

fn extract_union(
    schema: &ContextSchema,
    carrier_id: i64,
    month: Month,
    batch_id: &str,
    files: &[&[SheetData]],
) -> Result<ExtractOutput, IngestError> {
    let mut out = ExtractOutput::default();
    let mut matched = vec![false; schema.slots.len()];

    for sheets in files {
        let mut claimed: Vec<usize> = Vec::new();
        for (slot_idx, slot) in schema.slots.iter().enumerate() {
            if matched[slot_idx] {
                continue;
            }
            let Some(sheet_idx) = find_sheet(sheets, slot, &claimed) else {
                continue;
            };
            claimed.push(sheet_idx);
            extract_slot(slot, &sheets[sheet_idx], carrier_id, month, batch_id, &mut out)?;
            matched[slot_idx] = true;
            out.slots_matched.push(slot.label.clone());
        }
    }

    for (slot, matched) in schema.slots.iter().zip(&matched) {
        if slot.required && !matched {
            return Err(IngestError::MissingRequiredSlot {
                slot: slot.label.clone(),
                hint: slot.header_hint.clone(),
            });
        }
    }

    Ok(out)
}

/// A slot matches a sheet when the hint appears in the sheet name or in a
/// cell of the first few rows. Sheets claimed by an earlier slot are skipped
/// unless the slot explicitly allows sharing.
fn find_sheet(sheets: &[SheetData], slot: &FileSlot, claimed: &[usize]) -> Option<usize> {
    sheets.iter().enumerate().position(|(idx, sheet)| {
        if claimed.contains(&idx) && !slot.allow_shared_sheet {
            return false;
        }
        if sheet.name.contains(&slot.header_hint) {
            return true;
        }
        sheet.rows.iter().take(HINT_SCAN_ROWS).any(|row| {
            row.iter()
                .any(|cell| matches!(cell, Cell::Text(s) if s.contains(&slot.header_hint)))
        })
    })
}

fn extract_slot(
    slot: &FileSlot,
    sheet: &SheetData,
    carrier_id: i64,
    month: Month,
    batch_id: &str,
    out: &mut ExtractOutput,
) -> Result<(), IngestError> {
    // The header row is wherever the agent column's header text lives;
    // carriers move it around and reorder columns between deliveries.
    let header_row = sheet
        .rows
        .iter()
        .position(|row| row.iter().any(|c| cell_is_header(c, &slot.agent_column)))
        .ok_or_else(|| IngestError::MissingColumn {
            slot: slot.label.clone(),
            column: slot.agent_column.clone(),
        })?;

    let headers = &sheet.rows[header_row];
    let col = |name: &str| -> Result<usize, IngestError> {
        headers
            .iter()
            .position(|c| cell_is_header(c, name))
            .ok_or_else(|| IngestError::MissingColumn {
                slot: slot.label.clone(),
                column: name.to_string(),
            })
    };

    let agent_idx = col(&slot.agent_column)?;
    let period_idx = match &slot.period_column {
        Some(name) => Some(col(name)?),
        None => None,
    };
    let mut rule_idx: BTreeMap<&str, usize> = BTreeMap::new();
    for name in slot.rule.columns() {
        rule_idx.insert(name, col(name)?);
    }

    let mut periods_seen = 0usize;
    let mut rows_kept = 0usize;
    let mut detected: Option<String> = None;

    for (row_no, row) in sheet.rows.iter().enumerate().skip(header_row + 1) {
        // Period filter: YTD-cumulative files carry every month of the year;
        // only rows stamped with the declared month belong to this upload.
        if let Some(pi) = period_idx {
            let cell = row.get(pi).unwrap_or(&Cell::Empty);
            match read_period(cell, month) {
                PeriodCell::Blank => continue,
                PeriodCell::Matches => {}
                PeriodCell::Other(repr) => {
                    periods_seen += 1;
                    detected.get_or_insert(repr);
                    continue;
                }
            }
            periods_seen += 1;
        }

        let Some(agent_ident) = row.get(agent_idx).and_then(Cell::as_text) else {
            continue;
        };

        let before = out.records.len();
        apply_rule(slot, &rule_idx, row, row_no, &agent_ident, carrier_id, month, batch_id, out);
        if out.records.len() > before {
            rows_kept += 1;
        }
    }

    // Every stamped row carried some other period: the workbook is for a
    // different month than the operator declared.
    if periods_seen > 0 && rows_kept == 0 {
        if let Some(detected) = detected {
            return Err(IngestError::ColumnPeriodMismatch { declared: month, detected });
        }
    }

    Ok(())
}

fn cell_is_header(cell: &Cell, name: &str) -> bool {
    matches!(cell, Cell::Text(s) if s.trim() == name)
}

#[allow(clippy::too_many_arguments)]
fn apply_rule(
    slot: &FileSlot,
    rule_idx: &BTreeMap<&str, usize>,
    row: &[Cell],
    row_no: usize,
    agent_ident: &str,
    carrier_id: i64,
    month: Month,
    batch_id: &str,
    out: &mut ExtractOutput,
) {
    let mut push = |product: Product, amount: f64| {
        if amount != 0.0 {
            out.records.push(RawProductionRecord {
                carrier_id,
                month,
                agent_ident: agent_ident.to_string(),
                product,
                amount,
                batch_id: batch_id.to_string(),
            });
        }
    };

    // Amount cells: empty means no production, a number is taken as-is, and
    // text that fails to parse is a skipped-row warning.
    let amount_at = |name: &str, warnings: &mut Vec<RowWarning>| -> Option<f64> {
        let cell = row.get(rule_idx[name]).unwrap_or(&Cell::Empty);
        if cell.is_empty() {
            return None;
        }
        match cell.as_number() {
            Some(n) => Some(n),
            None => {
                warnings.push(RowWarning::UnparseableAmount {
                    slot: slot.label.clone(),
                    row: row_no + 1,
                    value: cell.as_text().unwrap_or_default(),
                });
                None
            }
        }
    };

    match &slot.rule {
        AmountRule::Single { column, product } => {
            if let Some(amount) = amount_at(column, &mut out.warnings) {
                push(*product, amount);
            }
        }
        AmountRule::Classified { product_column, amount_column, classes, exclude } => {
            let Some(name) = row.get(rule_idx[product_column.as_str()]).and_then(Cell::as_text)
            else {
                return;
            };
            if exclude.iter().any(|e| *e == name) {
                return;
            }
            let Some(product) = classes.get(&name) else {
                // Product names outside the class map are out of scope for
                // this carrier (the registry lists what counts).
                return;
            };
            if let Some(amount) = amount_at(amount_column, &mut out.warnings) {
                push(*product, amount);
            }
        }
        AmountRule::Formulas { formulas } => {
            for formula in formulas {
                let mut sum = 0.0;
                let mut any = false;
                for name in &formula.add {
                    if let Some(n) = amount_at(name, &mut out.warnings) {
                        sum += n;
                        any = true;
                    }
                }
                for name in &formula.subtract {
                    if let Some(n) = amount_at(name, &mut out.warnings) {
                        sum -= n;
                        any = true;
                    }
                }
                if any {
                    push(formula.product, sum);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Period markers
// ---------------------------------------------------------------------------

enum PeriodCell {
    Blank,
    Matches,
    Other(String),
}

/// Read a period marker cell. Accepted encodings: `YYYY-MM`, `MM/YYYY`, a
/// bare month number 1-12 (year taken from the declaration), or `YYYYMM`.
fn read_period(cell: &Cell, declared: Month) -> PeriodCell {
    let detected = match cell {
        Cell::Empty => return PeriodCell::Blank,
        Cell::Number(n) => {
            let n = *n;
            if n.fract() != 0.0 {
                return PeriodCell::Blank;
            }
            let n = n as i64;
            if (1..=12).contains(&n) {
                Month::new(declared.year, n as u32)
            } else if (190001..=999912).contains(&n) {
                Month::new((n / 100) as i32, (n % 100) as u32)
            } else {
                None
            }
        }
        Cell::Text(s) => parse_period_text(s.trim(), declared),
    };

    match detected {
        None => PeriodCell::Blank,
        Some(m) if m == declared => PeriodCell::Matches,
        Some(m) => PeriodCell::Other(m.to_string()),
    }
}

fn parse_period_text(s: &str, declared: Month) -> Option<Month> {
    if let Some(m) = Month::parse(s) {
        return Some(m);
    }
    // MM/YYYY
    if let Some((mm, yyyy)) = s.split_once('/') {
        if mm.len() <= 2 && yyyy.len() == 4 {
            return Month::new(yyyy.parse().ok()?, mm.parse().ok()?);
        }
    }
    // Bare month number as text
    if let Ok(n) = s.parse::<u32>() {
        if (1..=12).contains(&n) {
            return Month::new(declared.year, n);
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
