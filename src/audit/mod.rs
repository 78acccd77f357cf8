//! Field-level audit trail: diffing, user edits and history backfill.

pub mod backfill;
pub mod tracker;
pub mod user_edit;

pub use backfill::backfill_history;
pub use tracker::{diff_snapshots, normalize_value, record_changes, ChangeOrigin, FieldDiff};
pub use user_edit::{edit_field, EditOutcome};

use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Unknown field '{field}' for {entity_type}")]
    UnknownField { entity_type: String, field: String },

    #[error("Field '{0}' is maintained by the system and cannot be edited")]
    ReadOnlyField(String),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("User edits require a non-empty actor")]
    MissingActor,
}

impl From<rusqlite::Error> for AuditError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(DatabaseError::Sqlite(e))
    }
}
