use prodgrid_core::RowWarning;

use crate::error::IngestError;
use crate::workbook::{Cell, SheetData};

/// Column headers of the hand-maintained direct-business workbook. The file
/// is produced in-house, so the headers are fixed rather than configurable.
const AGENT_HEADER: &str = "סוכן";
const CARRIER_HEADER: &str = "חברה";
const AMOUNT_HEADER: &str = "סה\"כ להעברה";

/// One row of the direct-business workbook. The carrier is named in free
/// text and still needs resolving against the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectRow {
    /// 1-based sheet row, kept for warnings raised downstream.
    pub row: usize,
    pub agent_name: String,
    pub carrier_name: String,
    pub amount: f64,
}

#[derive(Debug, Default)]
pub struct DirectOutput {
    pub rows: Vec<DirectRow>,
    pub warnings: Vec<RowWarning>,
}

/// Parse the direct-business workbook: first sheet, header row located by
/// the agent column, one amount per row. Zero and blank amounts are skipped.
pub fn parse_direct(sheets: &[SheetData]) -> Result<DirectOutput, IngestError> {
    let sheet = sheets.first().ok_or(IngestError::EmptyWorkbook)?;

    let header_row = sheet
        .rows
        .iter()
        .position(|row| row.iter().any(|c| header_eq(c, AGENT_HEADER)))
        .ok_or_else(|| IngestError::MissingColumn {
            slot: "direct".to_string(),
            column: AGENT_HEADER.to_string(),
        })?;

    let headers = &sheet.rows[header_row];
    let col = |name: &str| -> Result<usize, IngestError> {
        headers
            .iter()
            .position(|c| header_eq(c, name))
            .ok_or_else(|| IngestError::MissingColumn {
                slot: "direct".to_string(),
                column: name.to_string(),
            })
    };
    let agent_idx = col(AGENT_HEADER)?;
    let carrier_idx = col(CARRIER_HEADER)?;
    let amount_idx = col(AMOUNT_HEADER)?;

    let mut out = DirectOutput::default();
    for (row_no, row) in sheet.rows.iter().enumerate().skip(header_row + 1) {
        let Some(agent_name) = row.get(agent_idx).and_then(Cell::as_text) else {
            continue;
        };
        let Some(carrier_name) = row.get(carrier_idx).and_then(Cell::as_text) else {
            continue;
        };
        let cell = row.get(amount_idx).unwrap_or(&Cell::Empty);
        if cell.is_empty() {
            continue;
        }
        let Some(amount) = cell.as_number() else {
            out.warnings.push(RowWarning::UnparseableAmount {
                slot: "direct".to_string(),
                row: row_no + 1,
                value: cell.as_text().unwrap_or_default(),
            });
            continue;
        };
        if amount == 0.0 {
            continue;
        }
        out.rows.push(DirectRow { row: row_no + 1, agent_name, carrier_name, amount });
    }

    Ok(out)
}

fn header_eq(cell: &Cell, name: &str) -> bool {
    matches!(cell, Cell::Text(s) if s.trim() == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Cell {
        Cell::Text(s.into())
    }

    fn sheet(rows: Vec<Vec<Cell>>) -> SheetData {
        SheetData { name: "גיליון1".into(), rows }
    }

    #[test]
    fn parses_rows_below_header() {
        let s = sheet(vec![
            vec![t("עסקים ישירים")],
            vec![t("סוכן"), t("חברה"), t("סה\"כ להעברה")],
            vec![t("כהן דוד"), t("הראל"), Cell::Number(1500.0)],
            vec![t("לוי שרה"), t("מגדל"), Cell::Number(0.0)],
            vec![t("מזרחי יוסי"), t("כלל"), t("?")],
        ]);
        let out = parse_direct(&[s]).unwrap();
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].agent_name, "כהן דוד");
        assert_eq!(out.rows[0].carrier_name, "הראל");
        assert_eq!(out.rows[0].amount, 1500.0);
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn missing_amount_column_fails() {
        let s = sheet(vec![vec![t("סוכן"), t("חברה")]]);
        let err = parse_direct(&[s]).unwrap_err();
        assert!(matches!(err, IngestError::MissingColumn { ref column, .. } if column == AMOUNT_HEADER));
    }

    #[test]
    fn empty_workbook_fails() {
        assert!(matches!(parse_direct(&[]), Err(IngestError::EmptyWorkbook)));
    }
}
