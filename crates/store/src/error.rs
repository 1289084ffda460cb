use std::fmt;

/// Storage failures. Sqlite errors are carried as-is; the corrupt-row
/// variants cover data that no current writer produces.
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    /// A stored month, product, context, status or agent-ref string failed
    /// to parse back.
    CorruptRow { table: &'static str, detail: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "sqlite: {e}"),
            StoreError::CorruptRow { table, detail } => {
                write!(f, "corrupt row in {table}: {detail}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}
