use std::collections::BTreeMap;
use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

const ENTITY_COLUMNS: &str =
    "id, guid, business_key, numeric_key, fields_json, state_trace, status, created_at, updated_at";

/// Raw column tuple, converted outside the rusqlite closure so enum and
/// uuid parse failures surface as `DatabaseError`.
struct EntityRow {
    id: String,
    guid: Option<String>,
    business_key: Option<String>,
    numeric_key: Option<i64>,
    fields_json: String,
    state_trace: Option<String>,
    status: Option<String>,
    created_at: String,
    updated_at: String,
}

fn entity_row_from_rusqlite(row: &Row<'_>) -> rusqlite::Result<EntityRow> {
    Ok(EntityRow {
        id: row.get(0)?,
        guid: row.get(1)?,
        business_key: row.get(2)?,
        numeric_key: row.get(3)?,
        fields_json: row.get(4)?,
        state_trace: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

fn entity_from_row(entity_type: EntityType, row: EntityRow) -> Result<CanonicalEntity, DatabaseError> {
    let fields: BTreeMap<String, FieldValue> = serde_json::from_str(&row.fields_json)?;
    Ok(CanonicalEntity {
        id: parse_uuid(&row.id)?,
        entity_type,
        guid: row.guid.as_deref().map(parse_uuid).transpose()?,
        business_key: row.business_key,
        numeric_key: row.numeric_key,
        fields,
        state_trace: row.state_trace,
        status: row.status.as_deref().map(Status::from_str).transpose()?,
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
    })
}

pub fn insert_entity(conn: &Connection, entity: &CanonicalEntity) -> Result<(), DatabaseError> {
    let sql = format!(
        "INSERT INTO {} ({ENTITY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        entity.entity_type.table_name()
    );
    conn.execute(
        &sql,
        params![
            entity.id.to_string(),
            entity.guid.map(|g| g.to_string()),
            entity.business_key,
            entity.numeric_key,
            serde_json::to_string(&entity.fields)?,
            entity.state_trace,
            entity.status.map(|s| s.as_str()),
            format_timestamp(&entity.created_at),
            format_timestamp(&entity.updated_at),
        ],
    )?;
    Ok(())
}

pub fn update_entity(conn: &Connection, entity: &CanonicalEntity) -> Result<(), DatabaseError> {
    let sql = format!(
        "UPDATE {} SET guid = ?2, business_key = ?3, numeric_key = ?4, fields_json = ?5,
         state_trace = ?6, status = ?7, updated_at = ?8 WHERE id = ?1",
        entity.entity_type.table_name()
    );
    let updated = conn.execute(
        &sql,
        params![
            entity.id.to_string(),
            entity.guid.map(|g| g.to_string()),
            entity.business_key,
            entity.numeric_key,
            serde_json::to_string(&entity.fields)?,
            entity.state_trace,
            entity.status.map(|s| s.as_str()),
            format_timestamp(&entity.updated_at),
        ],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: entity.entity_type.as_str().into(),
            id: entity.id.to_string(),
        });
    }
    Ok(())
}

/// Write only the derived status column.
pub fn update_entity_status(
    conn: &Connection,
    entity_type: EntityType,
    id: &Uuid,
    status: Option<Status>,
) -> Result<(), DatabaseError> {
    let sql = format!(
        "UPDATE {} SET status = ?2, updated_at = ?3 WHERE id = ?1",
        entity_type.table_name()
    );
    conn.execute(
        &sql,
        params![id.to_string(), status.map(|s| s.as_str()), format_timestamp(&now())],
    )?;
    Ok(())
}

fn query_one(
    conn: &Connection,
    entity_type: EntityType,
    where_clause: &str,
    param: &dyn rusqlite::ToSql,
) -> Result<Option<CanonicalEntity>, DatabaseError> {
    let sql = format!(
        "SELECT {ENTITY_COLUMNS} FROM {} WHERE {where_clause} ORDER BY rowid LIMIT 1",
        entity_type.table_name()
    );
    let row = conn
        .query_row(&sql, [param], entity_row_from_rusqlite)
        .optional()?;
    row.map(|r| entity_from_row(entity_type, r)).transpose()
}

pub fn get_entity(
    conn: &Connection,
    entity_type: EntityType,
    id: &Uuid,
) -> Result<Option<CanonicalEntity>, DatabaseError> {
    query_one(conn, entity_type, "id = ?1", &id.to_string())
}

pub fn find_entity_by_guid(
    conn: &Connection,
    entity_type: EntityType,
    guid: &Uuid,
) -> Result<Option<CanonicalEntity>, DatabaseError> {
    query_one(conn, entity_type, "guid = ?1", &guid.to_string())
}

/// Case-insensitive business key lookup. With `unclaimed_only`, entities
/// that already carry a GUID are ignored.
pub fn find_entity_by_business_key(
    conn: &Connection,
    entity_type: EntityType,
    business_key: &str,
    unclaimed_only: bool,
) -> Result<Option<CanonicalEntity>, DatabaseError> {
    let clause = if unclaimed_only {
        "business_key = ?1 AND guid IS NULL"
    } else {
        "business_key = ?1"
    };
    query_one(conn, entity_type, clause, &business_key.to_lowercase())
}

/// The one entity holding `numeric_key`. `None` when no entity or more
/// than one entity of the type holds it.
pub fn find_entity_by_numeric_key(
    conn: &Connection,
    entity_type: EntityType,
    numeric_key: i64,
) -> Result<Option<CanonicalEntity>, DatabaseError> {
    let sql = format!("SELECT id FROM {} WHERE numeric_key = ?1 LIMIT 2", entity_type.table_name());
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map([numeric_key], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    match ids.as_slice() {
        [id] => get_entity(conn, entity_type, &parse_uuid(id)?),
        _ => Ok(None),
    }
}

pub fn list_entity_ids(conn: &Connection, entity_type: EntityType) -> Result<Vec<Uuid>, DatabaseError> {
    let sql = format!("SELECT id FROM {} ORDER BY rowid", entity_type.table_name());
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    ids.iter().map(|s| parse_uuid(s)).collect()
}

pub fn count_entities(conn: &Connection, entity_type: EntityType) -> Result<i64, DatabaseError> {
    let sql = format!("SELECT COUNT(*) FROM {}", entity_type.table_name());
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn make_entity(key: &str) -> CanonicalEntity {
        let mut e = CanonicalEntity::new(EntityType::Request);
        e.business_key = Some(key.to_lowercase());
        e.numeric_key = Some(42);
        e.set_field("inner_id", Some(key.into()));
        e.set_field("amount", Some(FieldValue::Number(1500.5)));
        e.state_trace = Some("Проект".into());
        e
    }

    #[test]
    fn insert_and_get_round_trip() {
        let conn = open_memory_database().unwrap();
        let e = make_entity("ЗК-42");
        insert_entity(&conn, &e).unwrap();

        let loaded = get_entity(&conn, EntityType::Request, &e.id).unwrap().unwrap();
        assert_eq!(loaded.fields, e.fields);
        assert_eq!(loaded.state_trace, e.state_trace);
        assert_eq!(loaded.business_key.as_deref(), Some("зк-42"));
        assert_eq!(loaded.created_at, e.created_at);
    }

    #[test]
    fn business_key_lookup_is_case_insensitive() {
        let conn = open_memory_database().unwrap();
        let e = make_entity("ZK-42");
        insert_entity(&conn, &e).unwrap();

        let found = find_entity_by_business_key(&conn, EntityType::Request, "zk-42", false).unwrap();
        assert_eq!(found.map(|f| f.id), Some(e.id));
        let other_type = find_entity_by_business_key(&conn, EntityType::Contract, "zk-42", false).unwrap();
        assert!(other_type.is_none());
    }

    #[test]
    fn unclaimed_lookup_skips_entities_with_guid() {
        let conn = open_memory_database().unwrap();
        let mut e = make_entity("ZK-1");
        e.guid = Some(Uuid::new_v4());
        insert_entity(&conn, &e).unwrap();

        assert!(find_entity_by_business_key(&conn, EntityType::Request, "zk-1", true).unwrap().is_none());
        assert!(find_entity_by_business_key(&conn, EntityType::Request, "zk-1", false).unwrap().is_some());
    }

    #[test]
    fn guid_and_numeric_lookup() {
        let conn = open_memory_database().unwrap();
        let mut e = make_entity("000042");
        let guid = Uuid::new_v4();
        e.guid = Some(guid);
        insert_entity(&conn, &e).unwrap();

        assert_eq!(find_entity_by_guid(&conn, EntityType::Request, &guid).unwrap().map(|f| f.id), Some(e.id));
        assert_eq!(find_entity_by_numeric_key(&conn, EntityType::Request, 42).unwrap().map(|f| f.id), Some(e.id));
    }

    #[test]
    fn shared_numeric_key_matches_nothing() {
        let conn = open_memory_database().unwrap();
        let mut first = make_entity("2024-001");
        first.numeric_key = Some(2024);
        insert_entity(&conn, &first).unwrap();
        assert_eq!(
            find_entity_by_numeric_key(&conn, EntityType::Request, 2024).unwrap().map(|f| f.id),
            Some(first.id)
        );

        let mut second = make_entity("2024-002");
        second.numeric_key = Some(2024);
        insert_entity(&conn, &second).unwrap();
        assert!(find_entity_by_numeric_key(&conn, EntityType::Request, 2024).unwrap().is_none());
    }

    #[test]
    fn duplicate_business_keys_resolve_in_insertion_order() {
        let conn = open_memory_database().unwrap();
        // Same second, and the later row has the smaller id.
        let mut older = make_entity("ZK-5");
        older.id = Uuid::from_u128(2);
        let mut newer = make_entity("ZK-5");
        newer.id = Uuid::from_u128(1);
        newer.created_at = older.created_at;
        insert_entity(&conn, &older).unwrap();
        insert_entity(&conn, &newer).unwrap();

        let found = find_entity_by_business_key(&conn, EntityType::Request, "zk-5", false).unwrap();
        assert_eq!(found.map(|f| f.id), Some(older.id));
        assert_eq!(list_entity_ids(&conn, EntityType::Request).unwrap(), vec![older.id, newer.id]);
    }

    #[test]
    fn corrupt_stored_timestamp_is_an_error() {
        let conn = open_memory_database().unwrap();
        let e = make_entity("A");
        insert_entity(&conn, &e).unwrap();
        conn.execute("UPDATE requests SET created_at = 'вчера'", []).unwrap();
        assert!(matches!(
            get_entity(&conn, EntityType::Request, &e.id),
            Err(DatabaseError::ConstraintViolation(_))
        ));
    }

    #[test]
    fn duplicate_guid_rejected() {
        let conn = open_memory_database().unwrap();
        let guid = Uuid::new_v4();
        let mut a = make_entity("A");
        a.guid = Some(guid);
        let mut b = make_entity("B");
        b.guid = Some(guid);
        insert_entity(&conn, &a).unwrap();
        assert!(insert_entity(&conn, &b).is_err());
    }

    #[test]
    fn update_and_status() {
        let conn = open_memory_database().unwrap();
        let mut e = make_entity("A");
        insert_entity(&conn, &e).unwrap();

        e.set_field("cfo", Some("ЦФО-7".into()));
        update_entity(&conn, &e).unwrap();
        update_entity_status(&conn, EntityType::Request, &e.id, Some(Status::Draft)).unwrap();

        let loaded = get_entity(&conn, EntityType::Request, &e.id).unwrap().unwrap();
        assert_eq!(loaded.text("cfo").as_deref(), Some("ЦФО-7"));
        assert_eq!(loaded.status, Some(Status::Draft));
        assert_eq!(count_entities(&conn, EntityType::Request).unwrap(), 1);
        assert_eq!(list_entity_ids(&conn, EntityType::Request).unwrap(), vec![e.id]);
    }

    #[test]
    fn update_missing_entity_is_not_found() {
        let conn = open_memory_database().unwrap();
        let e = make_entity("ghost");
        assert!(matches!(update_entity(&conn, &e), Err(DatabaseError::NotFound { .. })));
    }
}
