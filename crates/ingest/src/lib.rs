//! Workbook reading and row extraction.
//!
//! A carrier delivery arrives as an Excel workbook; the registry describes
//! which sheets to expect and how to read amounts out of them. This crate
//! turns bytes into normalized production rows and keeps every skipped row
//! accounted for as a warning.

pub mod classify;
pub mod direct;
pub mod error;
pub mod workbook;

pub use classify::{extract, extract_files, ExtractOutput};
pub use direct::{parse_direct, DirectOutput, DirectRow};
pub use error::IngestError;
pub use workbook::{read_workbook, read_workbook_bytes, Cell, SheetData};
