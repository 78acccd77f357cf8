//! Status inference from an entity's state trace.
//!
//! The classifier only reads `state_trace` and writes `status`. Status
//! writes made here are derived data and do not produce audit records.

use rusqlite::Connection;
use uuid::Uuid;

use super::rules::{rules_for, ClassificationRule};
use crate::bulk::{run_per_entity, BulkReport};
use crate::db::{get_entity, list_entity_ids, update_entity_status, DatabaseError};
use crate::models::enums::{EntityType, Status};

/// First rule matching `trace`, if any.
pub fn classify_trace(entity_type: EntityType, trace: &str) -> Option<&'static ClassificationRule> {
    let normalized = trace.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }
    rules_for(entity_type)
        .iter()
        .find(|rule| rule.predicate.matches(&normalized))
}

/// Status implied by `trace`; `None` when nothing matches.
pub fn classify(entity_type: EntityType, trace: Option<&str>) -> Option<Status> {
    trace
        .and_then(|t| classify_trace(entity_type, t))
        .map(|rule| rule.status)
}

/// Recompute one entity's status. Returns the resulting status and whether it changed.
fn apply(
    conn: &Connection,
    entity_type: EntityType,
    id: &Uuid,
) -> Result<(Option<Status>, bool), DatabaseError> {
    let entity = get_entity(conn, entity_type, id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: entity_type.as_str().into(),
        id: id.to_string(),
    })?;

    let Some(rule) = entity
        .state_trace
        .as_deref()
        .and_then(|t| classify_trace(entity_type, t))
    else {
        // No match leaves the status as it was.
        return Ok((entity.status, false));
    };

    if entity.status == Some(rule.status) {
        return Ok((entity.status, false));
    }

    update_entity_status(conn, entity_type, id, Some(rule.status))?;
    tracing::debug!(
        entity_type = entity_type.as_str(),
        entity_id = %id,
        rule = rule.name,
        from = ?entity.status,
        to = rule.status.as_str(),
        "Status reclassified"
    );
    Ok((Some(rule.status), true))
}

/// Classify a single entity synchronously and return its status afterwards.
pub fn classify_entity(
    conn: &Connection,
    entity_type: EntityType,
    id: &Uuid,
) -> Result<Option<Status>, DatabaseError> {
    apply(conn, entity_type, id).map(|(status, _)| status)
}

/// Reclassify every entity of a type, one transaction per entity.
pub fn reclassify_all(conn: &Connection, entity_type: EntityType) -> Result<BulkReport, DatabaseError> {
    let ids = list_entity_ids(conn, entity_type)?;
    Ok(run_per_entity(conn, "reclassify", entity_type, &ids, |tx, id| {
        apply(tx, entity_type, id).map(|(_, changed)| changed)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_all_field_changes, insert_entity, open_memory_database};
    use crate::models::CanonicalEntity;

    fn store(conn: &Connection, entity_type: EntityType, trace: Option<&str>) -> Uuid {
        let mut e = CanonicalEntity::new(entity_type);
        e.state_trace = trace.map(String::from);
        insert_entity(conn, &e).unwrap();
        e.id
    }

    #[test]
    fn synchronized_contract_is_signed() {
        let trace = "Согласование договора - Этап 1: Согласован, Синхронизация: Исполнен";
        assert_eq!(classify(EntityType::Contract, Some(trace)), Some(Status::Signed));
    }

    #[test]
    fn registration_in_progress_beats_approved_phrases() {
        let trace = "Согласование договора - Этап 2: Согласован, \
                     Согласование договора: Согласован, Регистрация: На регистрации";
        assert_eq!(classify(EntityType::Contract, Some(trace)), Some(Status::OnRegistration));
        assert_eq!(
            classify_trace(EntityType::Contract, trace).map(|r| r.name),
            Some("contract.registering_after_approval")
        );
    }

    #[test]
    fn earlier_rule_wins_when_two_match() {
        // Matches both "Не согласован" and the generic "Согласование договора".
        let trace = "Согласование договора: Не согласован";
        assert_eq!(classify(EntityType::Contract, Some(trace)), Some(Status::Rejected));

        let approval = "Не согласовано, ранее Согласовано";
        assert_eq!(classify(EntityType::Approval, Some(approval)), Some(Status::Rejected));
    }

    #[test]
    fn purchase_completes_on_its_final_stage_despite_bidding_history() {
        let finished = "Прием заявок: Завершен, Подведение итогов: Завершен";
        assert_eq!(classify(EntityType::Purchase, Some(finished)), Some(Status::Completed));
        assert_eq!(
            classify(EntityType::Purchase, Some("Прием заявок: Завершен, Закупка: Завершена")),
            Some(Status::Completed)
        );
        // Bidding closed but results still pending.
        assert_eq!(
            classify(EntityType::Purchase, Some("Прием заявок: Завершен")),
            Some(Status::InProgress)
        );
        assert_eq!(
            classify(EntityType::Purchase, Some("Прием заявок: Идет прием")),
            Some(Status::InProgress)
        );
    }

    #[test]
    fn plan_item_in_execution_is_not_finished() {
        assert_eq!(
            classify(EntityType::PlanItem, Some("Позиция плана: В исполнении")),
            Some(Status::Included)
        );
        assert_eq!(
            classify(EntityType::PlanItem, Some("Позиция плана: В исполнении, Позиция плана: Исполнена")),
            Some(Status::Completed)
        );
        assert_eq!(classify(EntityType::PlanItem, Some("Исполнен")), Some(Status::Completed));
    }

    #[test]
    fn classification_is_deterministic() {
        let trace = "Согласование заявки: На согласовании";
        let first = classify(EntityType::Request, Some(trace));
        for _ in 0..10 {
            assert_eq!(classify(EntityType::Request, Some(trace)), first);
        }
        assert_eq!(first, Some(Status::OnApproval));
    }

    #[test]
    fn matching_ignores_case_and_padding() {
        assert_eq!(classify(EntityType::Contract, Some("  проект ")), Some(Status::Draft));
        assert_eq!(classify(EntityType::Contract, Some("ПРОЕКТ")), Some(Status::Draft));
    }

    #[test]
    fn no_match_and_no_trace_yield_none() {
        assert_eq!(classify(EntityType::Contract, Some("Неизвестная фраза")), None);
        assert_eq!(classify(EntityType::Contract, Some("   ")), None);
        assert_eq!(classify(EntityType::Contract, None), None);
    }

    #[test]
    fn single_entity_classification_persists() {
        let conn = open_memory_database().unwrap();
        let id = store(&conn, EntityType::Approval, Some("Согласовано"));
        assert_eq!(classify_entity(&conn, EntityType::Approval, &id).unwrap(), Some(Status::Approved));
        let stored = get_entity(&conn, EntityType::Approval, &id).unwrap().unwrap();
        assert_eq!(stored.status, Some(Status::Approved));
        assert_eq!(count_all_field_changes(&conn).unwrap(), 0);
    }

    #[test]
    fn no_match_keeps_existing_status() {
        let conn = open_memory_database().unwrap();
        let mut e = CanonicalEntity::new(EntityType::Purchase);
        e.state_trace = Some("что-то новое".into());
        e.status = Some(Status::Planned);
        insert_entity(&conn, &e).unwrap();

        assert_eq!(classify_entity(&conn, EntityType::Purchase, &e.id).unwrap(), Some(Status::Planned));
    }

    #[test]
    fn unknown_entity_is_not_found() {
        let conn = open_memory_database().unwrap();
        let err = classify_entity(&conn, EntityType::Request, &Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn bulk_reclassification_counts_changes() {
        let conn = open_memory_database().unwrap();
        store(&conn, EntityType::Contract, Some("Проект"));
        store(&conn, EntityType::Contract, Some("Регистрация: Зарегистрирован"));
        store(&conn, EntityType::Contract, None);

        let report = reclassify_all(&conn, EntityType::Contract).unwrap();
        assert_eq!(report.processed, 3);
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.changed, 2);
        assert_eq!(report.failed, 0);

        let again = reclassify_all(&conn, EntityType::Contract).unwrap();
        assert_eq!(again.changed, 0);
    }

    #[test]
    fn bulk_continues_past_a_malformed_row() {
        let conn = open_memory_database().unwrap();
        store(&conn, EntityType::Request, Some("Проект"));
        let bad = store(&conn, EntityType::Request, Some("Проект"));
        store(&conn, EntityType::Request, Some("Отменена"));
        conn.execute("UPDATE requests SET fields_json = 'not json' WHERE id = ?1", [bad.to_string()])
            .unwrap();

        let report = reclassify_all(&conn, EntityType::Request).unwrap();
        assert_eq!(report.processed, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.changed, 2);
    }
}
