//! Snapshot diffing and FieldChange recording.

use std::collections::BTreeSet;

use rusqlite::Connection;
use uuid::Uuid;

use crate::db::{insert_field_change, DatabaseError};
use crate::models::enums::{ChangeSource, EntityType};
use crate::models::{now, NewFieldChange, Snapshot};

/// Who caused a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOrigin {
    Ingestion,
    User { actor: String },
}

impl ChangeOrigin {
    pub fn user(actor: impl Into<String>) -> Self {
        Self::User { actor: actor.into() }
    }

    pub fn source(&self) -> ChangeSource {
        match self {
            Self::Ingestion => ChangeSource::Ingestion,
            Self::User { .. } => ChangeSource::User,
        }
    }

    pub fn actor(&self) -> Option<&str> {
        match self {
            Self::Ingestion => None,
            Self::User { actor } => Some(actor),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiff {
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// Trimmed value, with blank strings treated as null.
pub fn normalize_value(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Per-field difference over the union of both snapshots' keys, in key order.
pub fn diff_snapshots(before: &Snapshot, after: &Snapshot) -> Vec<FieldDiff> {
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    keys.into_iter()
        .filter_map(|key| {
            let old = normalize_value(before.get(key).and_then(|v| v.as_deref()));
            let new = normalize_value(after.get(key).and_then(|v| v.as_deref()));
            (old != new).then(|| FieldDiff {
                field: key.clone(),
                old_value: old.map(String::from),
                new_value: new.map(String::from),
            })
        })
        .collect()
}

/// Append one FieldChange per diff. Returns the number written.
pub fn record_changes(
    conn: &Connection,
    entity_type: EntityType,
    entity_id: &Uuid,
    diffs: &[FieldDiff],
    origin: &ChangeOrigin,
) -> Result<usize, DatabaseError> {
    let changed_at = now();
    for diff in diffs {
        insert_field_change(
            conn,
            &NewFieldChange {
                entity_type,
                entity_id: *entity_id,
                field: diff.field.clone(),
                old_value: diff.old_value.clone(),
                new_value: diff.new_value.clone(),
                changed_at,
                source: origin.source(),
                actor: origin.actor().map(String::from),
            },
        )?;
    }
    if !diffs.is_empty() {
        tracing::debug!(
            entity_type = entity_type.as_str(),
            entity_id = %entity_id,
            source = origin.source().as_str(),
            changes = diffs.len(),
            "Recorded field changes"
        );
    }
    Ok(diffs.len())
}
