use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

type LinkTuple = (String, String, String, String, String, Option<String>, Option<String>, Option<String>);

fn link_from_tuple(t: LinkTuple) -> Result<CrossReference, DatabaseError> {
    let (owner_type, owner_id, field, raw_value, target_type, target_id, resolved_at, matched_by) = t;
    let parse = |s: &str| {
        Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
    };
    Ok(CrossReference {
        owner_type: EntityType::from_str(&owner_type)?,
        owner_id: parse(&owner_id)?,
        field,
        raw_value,
        target_type: EntityType::from_str(&target_type)?,
        target_id: target_id.as_deref().map(parse).transpose()?,
        resolved_at: resolved_at.as_deref().map(parse_timestamp).transpose()?,
        matched_by: matched_by.as_deref().map(LinkMatch::from_str).transpose()?,
    })
}

const LINK_COLUMNS: &str =
    "owner_type, owner_id, field, raw_value, target_type, target_id, resolved_at, matched_by";

fn link_tuple(row: &rusqlite::Row<'_>) -> rusqlite::Result<LinkTuple> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

/// Insert or replace the reference held in `link.field` of its owner.
pub fn upsert_link(conn: &Connection, link: &CrossReference) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO entity_links (owner_type, owner_id, field, raw_value, target_type, target_id, resolved_at, matched_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(owner_type, owner_id, field) DO UPDATE SET
             raw_value = excluded.raw_value,
             target_type = excluded.target_type,
             target_id = excluded.target_id,
             resolved_at = excluded.resolved_at,
             matched_by = excluded.matched_by",
        params![
            link.owner_type.as_str(),
            link.owner_id.to_string(),
            link.field,
            link.raw_value,
            link.target_type.as_str(),
            link.target_id.map(|id| id.to_string()),
            link.resolved_at.as_ref().map(format_timestamp),
            link.matched_by.map(|m| m.as_str()),
        ],
    )?;
    Ok(())
}

pub fn delete_link(
    conn: &Connection,
    owner_type: EntityType,
    owner_id: &Uuid,
    field: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM entity_links WHERE owner_type = ?1 AND owner_id = ?2 AND field = ?3",
        params![owner_type.as_str(), owner_id.to_string(), field],
    )?;
    Ok(())
}

pub fn get_link(
    conn: &Connection,
    owner_type: EntityType,
    owner_id: &Uuid,
    field: &str,
) -> Result<Option<CrossReference>, DatabaseError> {
    let sql = format!(
        "SELECT {LINK_COLUMNS} FROM entity_links
         WHERE owner_type = ?1 AND owner_id = ?2 AND field = ?3"
    );
    let tuple = conn
        .query_row(
            &sql,
            params![owner_type.as_str(), owner_id.to_string(), field],
            link_tuple,
        )
        .optional()?;
    tuple.map(link_from_tuple).transpose()
}

pub fn list_links_for_owner(
    conn: &Connection,
    owner_type: EntityType,
    owner_id: &Uuid,
) -> Result<Vec<CrossReference>, DatabaseError> {
    let sql = format!(
        "SELECT {LINK_COLUMNS} FROM entity_links
         WHERE owner_type = ?1 AND owner_id = ?2 ORDER BY field"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![owner_type.as_str(), owner_id.to_string()], link_tuple)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(link_from_tuple).collect()
}

/// Unresolved references, optionally restricted to those pointing at `target_type`.
pub fn list_unresolved_links(
    conn: &Connection,
    target_type: Option<EntityType>,
) -> Result<Vec<CrossReference>, DatabaseError> {
    let sql = format!(
        "SELECT {LINK_COLUMNS} FROM entity_links
         WHERE target_id IS NULL AND (?1 IS NULL OR target_type = ?1)
         ORDER BY owner_type, owner_id, field"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![target_type.map(|t| t.as_str())], link_tuple)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(link_from_tuple).collect()
}

/// Links a relink pass should look at again: unresolved ones and those
/// resolved only by numeric key.
pub fn list_pending_links(
    conn: &Connection,
    target_type: Option<EntityType>,
) -> Result<Vec<CrossReference>, DatabaseError> {
    let sql = format!(
        "SELECT {LINK_COLUMNS} FROM entity_links
         WHERE (target_id IS NULL OR matched_by = ?2) AND (?1 IS NULL OR target_type = ?1)
         ORDER BY owner_type, owner_id, field"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![target_type.map(|t| t.as_str()), LinkMatch::NumericKey.as_str()],
            link_tuple,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(link_from_tuple).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn link(owner: Uuid, target: Option<Uuid>) -> CrossReference {
        matched(owner, target, target.map(|_| LinkMatch::BusinessKey))
    }

    fn matched(owner: Uuid, target: Option<Uuid>, matched_by: Option<LinkMatch>) -> CrossReference {
        CrossReference {
            owner_type: EntityType::Contract,
            owner_id: owner,
            field: "request_ref".into(),
            raw_value: "ЗК-0001".into(),
            target_type: EntityType::Request,
            target_id: target,
            resolved_at: target.map(|_| now()),
            matched_by,
        }
    }

    #[test]
    fn upsert_replaces_existing_link() {
        let conn = open_memory_database().unwrap();
        let owner = Uuid::new_v4();
        upsert_link(&conn, &link(owner, None)).unwrap();
        assert_eq!(list_unresolved_links(&conn, None).unwrap().len(), 1);

        let target = Uuid::new_v4();
        upsert_link(&conn, &link(owner, Some(target))).unwrap();
        let stored = get_link(&conn, EntityType::Contract, &owner, "request_ref").unwrap().unwrap();
        assert_eq!(stored.target_id, Some(target));
        assert!(list_unresolved_links(&conn, None).unwrap().is_empty());
        assert_eq!(list_links_for_owner(&conn, EntityType::Contract, &owner).unwrap().len(), 1);
    }

    #[test]
    fn unresolved_filter_by_target_type() {
        let conn = open_memory_database().unwrap();
        upsert_link(&conn, &link(Uuid::new_v4(), None)).unwrap();
        assert_eq!(list_unresolved_links(&conn, Some(EntityType::Request)).unwrap().len(), 1);
        assert!(list_unresolved_links(&conn, Some(EntityType::PlanItem)).unwrap().is_empty());
    }

    #[test]
    fn numeric_matches_stay_pending() {
        let conn = open_memory_database().unwrap();
        let guessed = Uuid::new_v4();
        upsert_link(&conn, &matched(guessed, Some(Uuid::new_v4()), Some(LinkMatch::NumericKey))).unwrap();
        upsert_link(&conn, &link(Uuid::new_v4(), Some(Uuid::new_v4()))).unwrap();
        upsert_link(&conn, &link(Uuid::new_v4(), None)).unwrap();

        assert_eq!(list_unresolved_links(&conn, None).unwrap().len(), 1);
        let pending = list_pending_links(&conn, Some(EntityType::Request)).unwrap();
        assert_eq!(pending.len(), 2);
        let stored = get_link(&conn, EntityType::Contract, &guessed, "request_ref").unwrap().unwrap();
        assert_eq!(stored.matched_by, Some(LinkMatch::NumericKey));
        assert!(stored.is_resolved() && !stored.is_settled());
    }

    #[test]
    fn delete_removes_link() {
        let conn = open_memory_database().unwrap();
        let owner = Uuid::new_v4();
        upsert_link(&conn, &link(owner, None)).unwrap();
        delete_link(&conn, EntityType::Contract, &owner, "request_ref").unwrap();
        assert!(get_link(&conn, EntityType::Contract, &owner, "request_ref").unwrap().is_none());
    }
}
