//! Relationship linking between canonical entities.
//!
//! A reference scalar (e.g. a contract's `request_ref`) is kept as raw text
//! in `entity_links` and resolved to a target id when the target exists.
//! Unresolved references are not errors; they are retried by later passes.
//! A numeric-key match is only taken when exactly one target holds the
//! number, and it is retried too until an exact key match replaces it.

use std::time::Instant;

use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::db::{
    delete_link, find_entity_by_business_key, find_entity_by_guid, find_entity_by_numeric_key,
    get_link, list_pending_links, upsert_link, DatabaseError,
};
use crate::ingest::schema::schema_for;
use crate::models::enums::{EntityType, LinkMatch};
use crate::models::{now, CanonicalEntity, CrossReference};

/// Link counts for a single entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkOutcome {
    pub resolved: usize,
    pub unresolved: usize,
}

/// Result of a pass over stored unresolved references.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkReport {
    pub attempted: usize,
    /// Newly resolved, or moved off a numeric-key guess.
    pub resolved: usize,
    /// Numeric-key guesses that still stand.
    pub unchanged: usize,
    pub still_unresolved: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub id: Uuid,
    pub matched_by: LinkMatch,
}

/// Find the entity `raw` names: GUID first, then business key, then a
/// numeric key held by exactly one entity.
pub fn resolve_reference(
    conn: &Connection,
    target_type: EntityType,
    raw: &str,
) -> Result<Option<Resolved>, DatabaseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    if let Ok(guid) = Uuid::parse_str(raw) {
        if let Some(entity) = find_entity_by_guid(conn, target_type, &guid)? {
            return Ok(Some(Resolved { id: entity.id, matched_by: LinkMatch::Guid }));
        }
    }

    if let Some(entity) = find_entity_by_business_key(conn, target_type, raw, false)? {
        return Ok(Some(Resolved { id: entity.id, matched_by: LinkMatch::BusinessKey }));
    }

    let Some(n) = schema_for(target_type).numeric_key(Some(raw)) else {
        return Ok(None);
    };
    Ok(find_entity_by_numeric_key(conn, target_type, n)?
        .map(|e| Resolved { id: e.id, matched_by: LinkMatch::NumericKey }))
}

/// A reference never resolves to its own owner.
fn resolve_for_owner(
    conn: &Connection,
    owner_type: EntityType,
    owner_id: &Uuid,
    target_type: EntityType,
    raw: &str,
) -> Result<Option<Resolved>, DatabaseError> {
    let target = resolve_reference(conn, target_type, raw)?;
    Ok(target.filter(|r| !(target_type == owner_type && r.id == *owner_id)))
}

fn with_target(link: CrossReference, target: Option<Resolved>) -> CrossReference {
    CrossReference {
        target_id: target.map(|r| r.id),
        resolved_at: target.map(|_| now()),
        matched_by: target.map(|r| r.matched_by),
        ..link
    }
}

/// Bring the stored links of `entity` in line with its reference scalars.
///
/// Cleared scalars drop their link. An unchanged scalar settled by an
/// exact match is left alone; everything else is (re)resolved.
pub fn link_entity(conn: &Connection, entity: &CanonicalEntity) -> Result<LinkOutcome, DatabaseError> {
    let mut outcome = LinkOutcome::default();

    for spec in schema_for(entity.entity_type).reference_fields() {
        let Some(target_type) = spec.reference else { continue };

        let raw = entity
            .text(spec.key)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let Some(raw) = raw else {
            delete_link(conn, entity.entity_type, &entity.id, spec.key)?;
            continue;
        };

        if let Some(existing) = get_link(conn, entity.entity_type, &entity.id, spec.key)? {
            if existing.raw_value == raw && existing.target_type == target_type && existing.is_settled() {
                outcome.resolved += 1;
                continue;
            }
        }

        let target = resolve_for_owner(conn, entity.entity_type, &entity.id, target_type, &raw)?;
        let link = CrossReference {
            owner_type: entity.entity_type,
            owner_id: entity.id,
            field: spec.key.to_string(),
            raw_value: raw,
            target_type,
            target_id: None,
            resolved_at: None,
            matched_by: None,
        };
        upsert_link(conn, &with_target(link, target))?;

        if target.is_some() {
            outcome.resolved += 1;
        } else {
            tracing::debug!(
                entity_type = entity.entity_type.as_str(),
                entity_id = %entity.id,
                field = spec.key,
                target_type = target_type.as_str(),
                "Reference left unresolved"
            );
            outcome.unresolved += 1;
        }
    }

    Ok(outcome)
}

enum Retry {
    Resolved,
    Unchanged,
    Unresolved,
}

fn retry_link(conn: &Connection, link: &CrossReference) -> Result<Retry, DatabaseError> {
    let target = resolve_for_owner(conn, link.owner_type, &link.owner_id, link.target_type, &link.raw_value)?;
    let current = link.target_id.zip(link.matched_by).map(|(id, matched_by)| Resolved { id, matched_by });
    if target == current {
        return Ok(if target.is_some() { Retry::Unchanged } else { Retry::Unresolved });
    }

    if target.is_none() {
        // The number the guess relied on is no longer unique.
        tracing::debug!(
            owner_type = link.owner_type.as_str(),
            owner_id = %link.owner_id,
            field = %link.field,
            "Numeric-key link dropped"
        );
    }
    upsert_link(conn, &with_target(link.clone(), target))?;
    Ok(if target.is_some() { Retry::Resolved } else { Retry::Unresolved })
}

/// Retry every unresolved or numeric-key reference, optionally only those
/// pointing at `target_type`.
pub fn relink_unresolved(
    conn: &Connection,
    target_type: Option<EntityType>,
) -> Result<LinkReport, DatabaseError> {
    let start = Instant::now();
    let pending = list_pending_links(conn, target_type)?;
    let mut report = LinkReport { attempted: pending.len(), ..Default::default() };

    for link in pending {
        match retry_link(conn, &link) {
            Ok(Retry::Resolved) => report.resolved += 1,
            Ok(Retry::Unchanged) => report.unchanged += 1,
            Ok(Retry::Unresolved) => report.still_unresolved += 1,
            Err(e) => {
                report.failed += 1;
                tracing::warn!(
                    owner_type = link.owner_type.as_str(),
                    owner_id = %link.owner_id,
                    field = %link.field,
                    error = %e,
                    "Relink failed, continuing"
                );
            }
        }
    }

    report.elapsed_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        target_type = target_type.map(|t| t.as_str()).unwrap_or("all"),
        attempted = report.attempted,
        resolved = report.resolved,
        unchanged = report.unchanged,
        still_unresolved = report.still_unresolved,
        "Relink pass finished"
    );
    Ok(report)
}
