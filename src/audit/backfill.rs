//! Baseline history for entities that predate the audit trail.

use rusqlite::Connection;
use uuid::Uuid;

use super::tracker::{diff_snapshots, record_changes, ChangeOrigin};
use crate::bulk::{run_per_entity, BulkReport};
use crate::db::{get_entity, list_entities_without_history, DatabaseError};
use crate::models::enums::EntityType;
use crate::models::Snapshot;

fn backfill_entity(conn: &Connection, entity_type: EntityType, id: &Uuid) -> Result<bool, DatabaseError> {
    let entity = get_entity(conn, entity_type, id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: entity_type.as_str().into(),
        id: id.to_string(),
    })?;
    let diffs = diff_snapshots(&Snapshot::new(), &entity.snapshot());
    Ok(record_changes(conn, entity_type, id, &diffs, &ChangeOrigin::Ingestion)? > 0)
}

/// Write null → current records for every entity of `entity_type` with no history.
pub fn backfill_history(conn: &Connection, entity_type: EntityType) -> Result<BulkReport, DatabaseError> {
    let ids = list_entities_without_history(conn, entity_type)?;
    Ok(run_per_entity(conn, "backfill", entity_type, &ids, |tx, id| {
        backfill_entity(tx, entity_type, id)
    }))
}
