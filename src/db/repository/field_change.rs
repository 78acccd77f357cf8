use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

/// Append one audit record and return its sequence number.
pub fn insert_field_change(conn: &Connection, change: &NewFieldChange) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO field_changes
         (entity_type, entity_id, field, old_value, new_value, changed_at, source, actor)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            change.entity_type.as_str(),
            change.entity_id.to_string(),
            change.field,
            change.old_value,
            change.new_value,
            format_timestamp(&change.changed_at),
            change.source.as_str(),
            change.actor,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Full history of one entity, oldest first.
pub fn list_field_changes(
    conn: &Connection,
    entity_type: EntityType,
    entity_id: &Uuid,
) -> Result<Vec<FieldChange>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT seq, field, old_value, new_value, changed_at, source, actor
         FROM field_changes WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY seq",
    )?;
    let rows = stmt
        .query_map(params![entity_type.as_str(), entity_id.to_string()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut changes = Vec::with_capacity(rows.len());
    for (seq, field, old_value, new_value, changed_at, source, actor) in rows {
        changes.push(FieldChange {
            seq,
            entity_type,
            entity_id: *entity_id,
            field,
            old_value,
            new_value,
            changed_at: parse_timestamp(&changed_at)?,
            source: ChangeSource::from_str(&source)?,
            actor,
        });
    }
    Ok(changes)
}

pub fn count_field_changes(
    conn: &Connection,
    entity_type: EntityType,
    entity_id: &Uuid,
) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM field_changes WHERE entity_type = ?1 AND entity_id = ?2",
        params![entity_type.as_str(), entity_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn count_all_field_changes(conn: &Connection) -> Result<i64, DatabaseError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM field_changes", [], |row| row.get(0))?)
}

/// Entities of a type that have no audit history at all.
pub fn list_entities_without_history(
    conn: &Connection,
    entity_type: EntityType,
) -> Result<Vec<Uuid>, DatabaseError> {
    let sql = format!(
        "SELECT e.id FROM {} e
         WHERE NOT EXISTS (
             SELECT 1 FROM field_changes fc
             WHERE fc.entity_type = ?1 AND fc.entity_id = e.id
         )
         ORDER BY e.created_at, e.id",
        entity_type.table_name()
    );
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map(params![entity_type.as_str()], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    ids.iter()
        .map(|s| Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn change(entity_id: Uuid, field: &str, source: ChangeSource, actor: Option<&str>) -> NewFieldChange {
        NewFieldChange {
            entity_type: EntityType::Contract,
            entity_id,
            field: field.into(),
            old_value: None,
            new_value: Some("1".into()),
            changed_at: now(),
            source,
            actor: actor.map(String::from),
        }
    }

    #[test]
    fn history_is_ordered_by_sequence() {
        let conn = open_memory_database().unwrap();
        let id = Uuid::new_v4();
        let first = insert_field_change(&conn, &change(id, "amount", ChangeSource::Ingestion, None)).unwrap();
        let second = insert_field_change(&conn, &change(id, "comment", ChangeSource::User, Some("ivanov"))).unwrap();
        assert!(second > first);

        let history = list_field_changes(&conn, EntityType::Contract, &id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].field, "amount");
        assert_eq!(history[1].source, ChangeSource::User);
        assert_eq!(history[1].actor.as_deref(), Some("ivanov"));
        assert_eq!(count_field_changes(&conn, EntityType::Contract, &id).unwrap(), 2);
        assert_eq!(count_field_changes(&conn, EntityType::Request, &id).unwrap(), 0);
    }

    #[test]
    fn entities_without_history_are_listed() {
        let conn = open_memory_database().unwrap();
        let a = CanonicalEntity::new(EntityType::Contract);
        let b = CanonicalEntity::new(EntityType::Contract);
        crate::db::insert_entity(&conn, &a).unwrap();
        crate::db::insert_entity(&conn, &b).unwrap();
        insert_field_change(&conn, &change(a.id, "amount", ChangeSource::Ingestion, None)).unwrap();

        let missing = list_entities_without_history(&conn, EntityType::Contract).unwrap();
        assert_eq!(missing, vec![b.id]);
        assert_eq!(count_all_field_changes(&conn).unwrap(), 1);
    }
}
