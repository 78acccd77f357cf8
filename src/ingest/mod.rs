//! Spreadsheet ingestion: header resolution, cell coercion and identity-based upsert.

pub mod coerce;
pub mod columns;
pub mod importer;
pub mod report;
pub mod schema;
pub mod sheet;
pub mod upsert;

pub use columns::{resolve_columns, ColumnMap, HeaderResolution};
pub use importer::*;
pub use report::*;
pub use schema::{schema_for, EntitySchema, FieldKind, FieldSpec};
pub use sheet::{read_workbook, Cell, Sheet};
pub use upsert::*;

use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Could not read workbook: {0}")]
    Workbook(String),

    #[error("Workbook contains no readable sheets")]
    NoSheets,

    #[error("Row {row}: neither a valid GUID nor a business key")]
    MissingNaturalKey { row: usize },
}

impl From<rusqlite::Error> for IngestError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(DatabaseError::Sqlite(e))
    }
}
