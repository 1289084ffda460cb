use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Reader};

use crate::error::IngestError;

// ---------------------------------------------------------------------------
// Normalized workbook
// ---------------------------------------------------------------------------

/// A cell after import. Formatting is irrelevant to ingestion; only text and
/// numbers survive.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Text content, with numbers rendered the way identifiers appear in
    /// files (integers without a decimal point).
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    None
                } else {
                    Some(s.to_string())
                }
            }
            Cell::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    Some(format!("{}", *n as i64))
                } else {
                    Some(format!("{n}"))
                }
            }
        }
    }

    /// Numeric content. Text numbers are accepted with thousands separators
    /// stripped; anything else is `None`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Empty => None,
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => {
                let cleaned = s.replace(',', "");
                let cleaned = cleaned.trim();
                if cleaned.is_empty() {
                    None
                } else {
                    cleaned.parse().ok()
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SheetData {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

impl SheetData {
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows.get(row).and_then(|r| r.get(col)).unwrap_or(&Cell::Empty)
    }
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

/// Import every sheet of a workbook file (xlsx, xlsb, xls).
pub fn read_workbook(path: &Path) -> Result<Vec<SheetData>, IngestError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| IngestError::OpenWorkbook(e.to_string()))?;
    read_sheets(&mut workbook)
}

/// Import a workbook from an in-memory buffer (the multipart upload path).
pub fn read_workbook_bytes(bytes: &[u8]) -> Result<Vec<SheetData>, IngestError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| IngestError::OpenWorkbook(e.to_string()))?;
    read_sheets(&mut workbook)
}

fn read_sheets<R: Reader<RS>, RS: std::io::Read + std::io::Seek>(
    workbook: &mut R,
) -> Result<Vec<SheetData>, IngestError>
where
    R::Error: std::fmt::Display,
{
    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    if sheet_names.is_empty() {
        return Err(IngestError::EmptyWorkbook);
    }

    let mut sheets = Vec::with_capacity(sheet_names.len());
    for name in &sheet_names {
        let range = workbook
            .worksheet_range(name)
            .map_err(|e| IngestError::OpenWorkbook(format!("sheet '{name}': {e}")))?;

        let mut rows = Vec::new();
        for row in range.rows() {
            let cells: Vec<Cell> = row.iter().map(convert_cell).collect();
            rows.push(cells);
        }
        sheets.push(SheetData { name: name.clone(), rows });
    }
    Ok(sheets)
}

fn convert_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => {
            if s.trim().is_empty() {
                Cell::Empty
            } else {
                Cell::Text(s.clone())
            }
        }
        Data::Float(n) => Cell::Number(*n),
        Data::Int(n) => Cell::Number(*n as f64),
        Data::Bool(b) => Cell::Text(if *b { "TRUE" } else { "FALSE" }.into()),
        Data::Error(e) => Cell::Text(format!("#{e:?}")),
        // Dates arrive as serials; period columns are parsed from text forms,
        // so a serial stays numeric here.
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_cell_text_form() {
        assert_eq!(Cell::Number(1001.0).as_text().as_deref(), Some("1001"));
        assert_eq!(Cell::Number(10.5).as_text().as_deref(), Some("10.5"));
        assert_eq!(Cell::Text("  A-7 ".into()).as_text().as_deref(), Some("A-7"));
        assert_eq!(Cell::Text("   ".into()).as_text(), None);
    }

    #[test]
    fn text_numbers_parse_with_separators() {
        assert_eq!(Cell::Text("12,340.5".into()).as_number(), Some(12340.5));
        assert_eq!(Cell::Text("abc".into()).as_number(), None);
        assert_eq!(Cell::Empty.as_number(), None);
    }

    #[test]
    fn out_of_range_cell_reads_empty() {
        let sheet = SheetData { name: "S".into(), rows: vec![vec![Cell::Number(1.0)]] };
        assert!(sheet.cell(5, 5).is_empty());
        assert_eq!(sheet.cell(0, 0).as_number(), Some(1.0));
    }
}
