//! Command-line surface: argument definitions and dispatch.
//!
//! Each command is a thin wrapper over a library operation and returns a
//! serializable report that the binary prints as JSON.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::audit::{backfill_history, edit_field, AuditError};
use crate::config::IngestConfig;
use crate::db::{count_field_changes, get_entity, list_field_changes, DatabaseError};
use crate::ingest::{ingest_file, IngestError, IngestReport, UpsertOptions};
use crate::linking::relink_unresolved;
use crate::models::enums::EntityType;
use crate::status::{classify_entity, reclassify_all, resolve_entity_type, status_label, AliasError, RuleError};

#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("Status spellings are inconsistent: {0}")]
    Alias(#[from] AliasError),

    #[error("Classification rules are inconsistent: {0}")]
    Rule(#[from] RuleError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not render output: {0}")]
    Json(#[from] serde_json::Error),
}

/// Value of `edit` that clears the field.
pub const CLEAR_MARKER: &str = "-";

/// Procurement export reconciliation
#[derive(Parser, Debug)]
#[command(name = "procsync")]
#[command(version)]
#[command(about = "Reconcile procurement spreadsheet exports into a canonical, audited store")]
#[command(after_help = "Entity types: request, purchase, contract, plan_item, approval \
    (Russian names are accepted).\n\n\
    Environment: PROCSYNC_DATA_DIR (data directory), PROCSYNC_HEADER_ROWS \
    (rows scanned for the header, default 20), RUST_LOG (log filter).")]
pub struct Cli {
    /// Database file (default: <data dir>/procsync.db)
    #[arg(long, global = true, env = "PROCSYNC_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Load one or more spreadsheet exports
    Ingest {
        #[arg(value_parser = entity_type_arg)]
        entity_type: EntityType,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Field an empty cell may clear (repeatable)
        #[arg(long = "reset", value_name = "FIELD")]
        resettable: Vec<String>,
    },

    /// Retry every unresolved or numeric-key reference
    Link,

    /// Classify one entity from its state trace
    Classify {
        #[arg(value_parser = entity_type_arg)]
        entity_type: EntityType,
        id: Uuid,
    },

    /// Classify every entity of a type
    Reclassify {
        #[arg(value_parser = entity_type_arg)]
        entity_type: EntityType,
    },

    /// Record baseline history for entities that have none
    Backfill {
        #[arg(value_parser = entity_type_arg)]
        entity_type: EntityType,
    },

    /// Show the field change history of one entity
    History {
        #[arg(value_parser = entity_type_arg)]
        entity_type: EntityType,
        id: Uuid,
    },

    /// Set one field on behalf of a user ("-" clears it)
    Edit {
        #[arg(value_parser = entity_type_arg)]
        entity_type: EntityType,
        id: Uuid,
        field: String,
        value: String,
        /// Who is making the change
        #[arg(long)]
        actor: String,
    },
}

fn entity_type_arg(raw: &str) -> Result<EntityType, String> {
    resolve_entity_type(raw).ok_or_else(|| format!("unknown entity type '{raw}'"))
}

#[derive(Debug, Serialize)]
struct IngestSummary {
    files: usize,
    loaded: usize,
    rejected: usize,
    failed: usize,
    reports: Vec<IngestReport>,
    errors: Vec<String>,
}

/// Ingest each file in turn. A file that cannot be read is reported and skipped.
fn run_ingest(
    conn: &Connection,
    entity_type: EntityType,
    files: &[PathBuf],
    options: &UpsertOptions,
    config: &IngestConfig,
) -> IngestSummary {
    let mut summary = IngestSummary {
        files: files.len(),
        loaded: 0,
        rejected: 0,
        failed: 0,
        reports: Vec::new(),
        errors: Vec::new(),
    };
    for path in files {
        match ingest_file(conn, entity_type, path, config, options) {
            Ok(report) => {
                if report.is_loaded() {
                    summary.loaded += 1;
                } else {
                    summary.rejected += 1;
                }
                summary.reports.push(report);
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "File could not be ingested");
                summary.failed += 1;
                summary.errors.push(format!("{}: {e}", path.display()));
            }
        }
    }
    summary
}

/// Run a parsed command and return its JSON report.
pub fn execute(conn: &Connection, command: &Command, config: &IngestConfig) -> Result<Value, CommandError> {
    let output = match command {
        Command::Ingest { entity_type, files, resettable } => {
            let options = UpsertOptions::with_resettable(resettable.iter().cloned());
            serde_json::to_value(run_ingest(conn, *entity_type, files, &options, config))?
        }
        Command::Link => serde_json::to_value(relink_unresolved(conn, None)?)?,
        Command::Classify { entity_type, id } => {
            let status = classify_entity(conn, *entity_type, id)?;
            json!({
                "entity_type": entity_type,
                "id": id,
                "status": status,
                "label": status.and_then(status_label),
            })
        }
        Command::Reclassify { entity_type } => serde_json::to_value(reclassify_all(conn, *entity_type)?)?,
        Command::Backfill { entity_type } => serde_json::to_value(backfill_history(conn, *entity_type)?)?,
        Command::History { entity_type, id } => {
            if get_entity(conn, *entity_type, id)?.is_none() {
                return Err(DatabaseError::NotFound {
                    entity_type: entity_type.as_str().into(),
                    id: id.to_string(),
                }
                .into());
            }
            json!({
                "entity_type": entity_type,
                "id": id,
                "count": count_field_changes(conn, *entity_type, id)?,
                "changes": list_field_changes(conn, *entity_type, id)?,
            })
        }
        Command::Edit { entity_type, id, field, value, actor } => {
            let value = (value != CLEAR_MARKER).then_some(value.as_str());
            serde_json::to_value(edit_field(conn, *entity_type, id, field, value, actor)?)?
        }
    };
    Ok(output)
}
