//! File-level ingestion driver.
//!
//! One file carries one entity type. Rows are processed in file order,
//! each in its own transaction, so a failing row never takes its
//! neighbours down with it.

use std::path::Path;
use std::time::Instant;

use rusqlite::Connection;

use super::columns::{resolve_columns, ColumnMap, HeaderResolution};
use super::report::{IngestOutcome, IngestReport};
use super::schema::{schema_for, EntitySchema};
use super::sheet::{read_workbook, Cell, Sheet};
use super::upsert::{upsert_row, ParsedRow, UpsertAction, UpsertOptions, UpsertOutcome};
use super::IngestError;
use crate::config::IngestConfig;
use crate::linking::{link_entity, relink_unresolved, LinkOutcome};
use crate::models::enums::EntityType;

/// Read a workbook from disk and ingest it as `entity_type`.
pub fn ingest_file(
    conn: &Connection,
    entity_type: EntityType,
    path: &Path,
    config: &IngestConfig,
    options: &UpsertOptions,
) -> Result<IngestReport, IngestError> {
    let sheets = read_workbook(path)?;
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    ingest_workbook(conn, entity_type, &sheets, &source, config, options)
}

/// Ingest the first sheet whose header resolves for `entity_type`.
pub fn ingest_workbook(
    conn: &Connection,
    entity_type: EntityType,
    sheets: &[Sheet],
    source: &str,
    config: &IngestConfig,
    options: &UpsertOptions,
) -> Result<IngestReport, IngestError> {
    if sheets.is_empty() {
        return Err(IngestError::NoSheets);
    }

    let schema = schema_for(entity_type);
    let mut first_miss: Option<Vec<&'static str>> = None;
    for sheet in sheets {
        match resolve_columns(&sheet.rows, schema, config.header_search_rows) {
            HeaderResolution::Found(columns) => {
                return Ok(load_sheet(conn, schema, sheet, &columns, source, config, options));
            }
            HeaderResolution::NotFound { missing } => {
                tracing::debug!(sheet = %sheet.name, missing = ?missing, "No header on sheet");
                first_miss.get_or_insert(missing);
            }
        }
    }

    let missing = first_miss.unwrap_or_default();
    tracing::warn!(
        entity_type = entity_type.as_str(),
        source,
        missing = ?missing,
        "Header row not found, file rejected"
    );
    let mut report = IngestReport::new(entity_type, source, config.max_reported_errors);
    report.outcome = IngestOutcome::HeaderNotFound {
        missing: missing.into_iter().map(String::from).collect(),
    };
    Ok(report)
}

/// Ingest a single in-memory sheet.
pub fn ingest_sheet(
    conn: &Connection,
    entity_type: EntityType,
    sheet: &Sheet,
    source: &str,
    config: &IngestConfig,
    options: &UpsertOptions,
) -> Result<IngestReport, IngestError> {
    ingest_workbook(conn, entity_type, std::slice::from_ref(sheet), source, config, options)
}

fn ingest_row(
    conn: &Connection,
    schema: &EntitySchema,
    row: &ParsedRow,
    options: &UpsertOptions,
) -> Result<(UpsertOutcome, LinkOutcome), IngestError> {
    let tx = conn.unchecked_transaction()?;
    let outcome = upsert_row(&tx, schema, row, options)?;
    let links = link_entity(&tx, &outcome.entity)?;
    tx.commit()?;
    Ok((outcome, links))
}

fn load_sheet(
    conn: &Connection,
    schema: &EntitySchema,
    sheet: &Sheet,
    columns: &ColumnMap,
    source: &str,
    config: &IngestConfig,
    options: &UpsertOptions,
) -> IngestReport {
    let start = Instant::now();
    let entity_type = schema.entity_type;
    let mut report = IngestReport::new(entity_type, source, config.max_reported_errors);
    report.sheet = Some(sheet.name.clone());
    report.header_row = Some(columns.header_row + 1);

    tracing::info!(
        entity_type = entity_type.as_str(),
        source,
        sheet = %sheet.name,
        header_row = columns.header_row + 1,
        "Ingestion started"
    );

    for (index, cells) in sheet.rows.iter().enumerate().skip(columns.header_row + 1) {
        let row_number = index + 1;
        if cells.iter().all(Cell::is_blank) {
            continue;
        }
        let parsed = ParsedRow::parse(cells, columns, schema, row_number);
        if parsed.is_empty() {
            continue;
        }
        report.rows_seen += 1;

        match ingest_row(conn, schema, &parsed, options) {
            Ok((outcome, links)) => {
                match outcome.action {
                    UpsertAction::Created => report.created += 1,
                    UpsertAction::Updated => report.updated += 1,
                    UpsertAction::Unchanged => report.unchanged += 1,
                }
                report.field_changes += outcome.changes;
                report.links_resolved += links.resolved;
                report.links_unresolved += links.unresolved;
            }
            Err(e @ IngestError::MissingNaturalKey { .. }) => {
                report.skipped += 1;
                tracing::debug!(row = row_number, "Row skipped: no natural key");
                report.note(e.to_string());
            }
            Err(e) => {
                report.errors += 1;
                tracing::warn!(
                    entity_type = entity_type.as_str(),
                    row = row_number,
                    error = %e,
                    "Row failed, continuing"
                );
                report.note(format!("Row {row_number}: {e}"));
            }
        }
    }

    match relink_unresolved(conn, Some(entity_type)) {
        Ok(healed) => report.links_healed = healed.resolved,
        Err(e) => {
            tracing::warn!(entity_type = entity_type.as_str(), error = %e, "Post-file relink failed");
            report.note(format!("Relink: {e}"));
        }
    }

    report.finish(start);
    tracing::info!(
        entity_type = entity_type.as_str(),
        source,
        rows = report.rows_seen,
        created = report.created,
        updated = report.updated,
        unchanged = report.unchanged,
        skipped = report.skipped,
        errors = report.errors,
        field_changes = report.field_changes,
        links_healed = report.links_healed,
        elapsed_ms = report.elapsed_ms,
        "Ingestion finished"
    );
    report
}
