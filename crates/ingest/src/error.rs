use std::fmt;

use prodgrid_core::Month;

#[derive(Debug)]
pub enum IngestError {
    /// Workbook could not be opened or read.
    OpenWorkbook(String),
    /// Workbook contains no sheets.
    EmptyWorkbook,
    /// A required slot matched no sheet in the workbook.
    MissingRequiredSlot { slot: String, hint: String },
    /// A matched sheet is missing a mapped column header.
    MissingColumn { slot: String, column: String },
    /// The workbook's embedded period disagrees with the declared month.
    /// Both periods are surfaced so the operator can correct the upload.
    ColumnPeriodMismatch { declared: Month, detected: String },
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenWorkbook(msg) => write!(f, "cannot open workbook: {msg}"),
            Self::EmptyWorkbook => write!(f, "workbook contains no sheets"),
            Self::MissingRequiredSlot { slot, hint } => {
                write!(f, "required slot '{slot}': no sheet matches '{hint}'")
            }
            Self::MissingColumn { slot, column } => {
                write!(f, "slot '{slot}': missing column '{column}'")
            }
            Self::ColumnPeriodMismatch { declared, detected } => {
                write!(f, "declared month {declared} but file contains {detected}")
            }
        }
    }
}

impl std::error::Error for IngestError {}
