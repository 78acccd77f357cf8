//! Identity matching and merge of one parsed row into the canonical store.

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use super::coerce::coerce;
use super::columns::ColumnMap;
use super::schema::EntitySchema;
use super::sheet::Cell;
use super::IngestError;
use crate::audit::tracker::{diff_snapshots, normalize_value, record_changes, ChangeOrigin};
use crate::db::{find_entity_by_business_key, find_entity_by_guid, insert_entity, update_entity, DatabaseError};
use crate::models::{now, CanonicalEntity, FieldValue, Snapshot, GUID_FIELD};

/// One data row after coercion.
///
/// A key is present when the sheet has that column; a present `None` is
/// a blank cell, which differs from a column the sheet does not carry.
#[derive(Debug, Clone, Default)]
pub struct ParsedRow {
    /// One-based spreadsheet row number, for reporting.
    pub row_number: usize,
    pub values: BTreeMap<&'static str, Option<FieldValue>>,
}

impl ParsedRow {
    pub fn parse(row: &[Cell], columns: &ColumnMap, schema: &EntitySchema, row_number: usize) -> Self {
        let values = schema
            .fields
            .iter()
            .filter_map(|spec| {
                let index = columns.column(spec.key)?;
                let value = row.get(index).and_then(|cell| coerce(cell, spec.kind));
                Some((spec.key, value))
            })
            .collect();
        Self { row_number, values }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key).and_then(Option::as_ref)
    }

    pub fn is_empty(&self) -> bool {
        self.values.values().all(Option::is_none)
    }

    /// The row's GUID, when it carries a syntactically valid one.
    pub fn guid(&self) -> Option<Uuid> {
        self.get(GUID_FIELD)
            .and_then(FieldValue::as_text)
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpsertOptions {
    /// Fields a blank cell is allowed to clear.
    pub resettable: BTreeSet<String>,
}

impl UpsertOptions {
    pub fn with_resettable<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { resettable: fields.into_iter().map(Into::into).collect() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertAction {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub action: UpsertAction,
    pub entity: CanonicalEntity,
    /// FieldChange records written for this row.
    pub changes: usize,
}

/// Locate the stored entity a row refers to.
///
/// A known GUID wins. An unknown GUID may adopt an entity with the same
/// business key that has no GUID yet. Without a GUID the business key
/// alone decides, oldest entity first.
pub fn find_match(
    conn: &Connection,
    schema: &EntitySchema,
    row: &ParsedRow,
) -> Result<Option<CanonicalEntity>, DatabaseError> {
    let business_key = schema.business_key(|k| row.get(k).cloned());

    if let Some(guid) = row.guid() {
        if let Some(entity) = find_entity_by_guid(conn, schema.entity_type, &guid)? {
            return Ok(Some(entity));
        }
        return match business_key {
            Some(key) => find_entity_by_business_key(conn, schema.entity_type, &key, true),
            None => Ok(None),
        };
    }

    match business_key {
        Some(key) => find_entity_by_business_key(conn, schema.entity_type, &key, false),
        None => Ok(None),
    }
}

fn merge_row(entity: &mut CanonicalEntity, row: &ParsedRow, options: &UpsertOptions) {
    for (key, value) in &row.values {
        if *key == GUID_FIELD {
            continue;
        }
        match value {
            Some(incoming) => {
                let current = entity.text(key);
                let incoming_text = incoming.to_canonical_string();
                if normalize_value(current.as_deref()) != normalize_value(Some(&incoming_text)) {
                    entity.set_field(key, Some(incoming.clone()));
                }
            }
            None if options.resettable.contains(*key) => entity.set_field(key, None),
            None => {}
        }
    }
    if entity.guid.is_none() {
        entity.guid = row.guid();
    }
}

/// Match, merge, persist and audit one row. The caller owns the transaction.
pub fn upsert_row(
    conn: &Connection,
    schema: &EntitySchema,
    row: &ParsedRow,
    options: &UpsertOptions,
) -> Result<UpsertOutcome, IngestError> {
    if row.guid().is_none() && schema.business_key(|k| row.get(k).cloned()).is_none() {
        return Err(IngestError::MissingNaturalKey { row: row.row_number });
    }

    let existing = find_match(conn, schema, row)?;
    let is_new = existing.is_none();
    let (mut entity, before) = match existing {
        Some(entity) => {
            let snapshot = entity.snapshot();
            (entity, snapshot)
        }
        None => (CanonicalEntity::new(schema.entity_type), Snapshot::new()),
    };

    merge_row(&mut entity, row, options);
    entity.business_key = schema.business_key(|k| entity.field(k));
    entity.numeric_key = schema.numeric_key(entity.business_key.as_deref());

    let diffs = diff_snapshots(&before, &entity.snapshot());

    let action = if is_new {
        insert_entity(conn, &entity)?;
        UpsertAction::Created
    } else if diffs.is_empty() {
        return Ok(UpsertOutcome { action: UpsertAction::Unchanged, entity, changes: 0 });
    } else {
        entity.updated_at = now();
        update_entity(conn, &entity)?;
        UpsertAction::Updated
    };

    let changes = record_changes(conn, schema.entity_type, &entity.id, &diffs, &ChangeOrigin::Ingestion)?;
    tracing::debug!(
        entity_type = schema.entity_type.as_str(),
        entity_id = %entity.id,
        row = row.row_number,
        action = ?action,
        changes,
        "Row upserted"
    );
    Ok(UpsertOutcome { action, entity, changes })
}
