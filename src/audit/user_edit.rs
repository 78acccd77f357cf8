//! Direct user edits, audited with the acting user's identity.

use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use super::tracker::{diff_snapshots, normalize_value, record_changes, ChangeOrigin};
use super::AuditError;
use crate::db::{get_entity, update_entity};
use crate::ingest::coerce::coerce;
use crate::ingest::schema::{schema_for, FieldKind};
use crate::ingest::sheet::Cell;
use crate::linking::{link_entity, LinkOutcome};
use crate::models::enums::EntityType;
use crate::models::{now, CanonicalEntity, FieldValue, GUID_FIELD, STATUS_FIELD};
use crate::status::aliases::resolve_status;

#[derive(Debug, Clone, Serialize)]
pub struct EditOutcome {
    pub entity: CanonicalEntity,
    pub changes: usize,
    pub links: LinkOutcome,
}

fn invalid(field: &str, value: &str) -> AuditError {
    AuditError::InvalidValue { field: field.to_string(), value: value.to_string() }
}

/// Typed value for a schema field; text that is only punctuation clears it.
fn parse_field_value(kind: FieldKind, field: &str, raw: &str) -> Result<Option<FieldValue>, AuditError> {
    match coerce(&Cell::text(raw), kind) {
        Some(value) => Ok(Some(value)),
        None if kind == FieldKind::Text => Ok(None),
        None => Err(invalid(field, raw)),
    }
}

/// Set one field of an entity on behalf of `actor`. `None` clears the field.
///
/// `status` accepts any known spelling that is valid for the entity type.
/// Nothing is written when the value is unchanged.
pub fn edit_field(
    conn: &Connection,
    entity_type: EntityType,
    id: &Uuid,
    field: &str,
    raw: Option<&str>,
    actor: &str,
) -> Result<EditOutcome, AuditError> {
    let actor = actor.trim();
    if actor.is_empty() {
        return Err(AuditError::MissingActor);
    }

    let mut entity = get_entity(conn, entity_type, id)?.ok_or_else(|| AuditError::NotFound {
        entity_type: entity_type.as_str().into(),
        id: id.to_string(),
    })?;
    let before = entity.snapshot();
    let raw = normalize_value(raw);
    let schema = schema_for(entity_type);

    match field {
        GUID_FIELD => return Err(AuditError::ReadOnlyField(field.to_string())),
        STATUS_FIELD => {
            entity.status = match raw {
                None => None,
                Some(s) => Some(
                    resolve_status(s)
                        .filter(|status| entity_type.allows_status(*status))
                        .ok_or_else(|| invalid(field, s))?,
                ),
            };
        }
        _ => {
            let spec = schema.field(field).ok_or_else(|| AuditError::UnknownField {
                entity_type: entity_type.as_str().into(),
                field: field.to_string(),
            })?;
            let value = match raw {
                None => None,
                Some(s) => parse_field_value(spec.kind, field, s)?,
            };
            entity.set_field(spec.key, value);
            entity.business_key = schema.business_key(|k| entity.field(k));
            entity.numeric_key = schema.numeric_key(entity.business_key.as_deref());
        }
    }

    let diffs = diff_snapshots(&before, &entity.snapshot());
    if diffs.is_empty() {
        return Ok(EditOutcome { entity, changes: 0, links: LinkOutcome::default() });
    }

    let tx = conn.unchecked_transaction()?;
    entity.updated_at = now();
    update_entity(&tx, &entity)?;
    let changes = record_changes(&tx, entity_type, id, &diffs, &ChangeOrigin::user(actor))?;
    let links = link_entity(&tx, &entity)?;
    tx.commit()?;

    tracing::info!(
        entity_type = entity_type.as_str(),
        entity_id = %id,
        field,
        actor,
        "User edit recorded"
    );
    Ok(EditOutcome { entity, changes, links })
}
