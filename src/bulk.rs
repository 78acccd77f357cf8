//! Per-entity units of work for bulk passes over a whole entity type.
//!
//! Every entity gets its own transaction. A failure rolls back that entity
//! only, is counted and logged, and the loop moves on.

use std::fmt::Display;
use std::time::Instant;

use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::config::DEFAULT_MAX_REPORTED_ERRORS;
use crate::models::enums::EntityType;

#[derive(Debug, Clone, Serialize)]
pub struct BulkReport {
    pub operation: &'static str,
    pub entity_type: EntityType,
    pub processed: usize,
    pub succeeded: usize,
    /// Entities whose stored state was actually modified.
    pub changed: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
    pub errors: Vec<String>,
}

impl BulkReport {
    fn new(operation: &'static str, entity_type: EntityType) -> Self {
        Self {
            operation,
            entity_type,
            processed: 0,
            succeeded: 0,
            changed: 0,
            failed: 0,
            elapsed_ms: 0,
            errors: Vec::new(),
        }
    }

    fn fail(&mut self, id: &Uuid, error: impl Display) {
        self.failed += 1;
        tracing::warn!(
            operation = self.operation,
            entity_type = self.entity_type.as_str(),
            entity_id = %id,
            error = %error,
            "Bulk step failed, continuing"
        );
        if self.errors.len() < DEFAULT_MAX_REPORTED_ERRORS {
            self.errors.push(format!("{id}: {error}"));
        }
    }
}

/// Run `step` once per id, each inside its own transaction.
/// `step` returns whether it changed anything.
pub fn run_per_entity<F, E>(
    conn: &Connection,
    operation: &'static str,
    entity_type: EntityType,
    ids: &[Uuid],
    mut step: F,
) -> BulkReport
where
    F: FnMut(&Connection, &Uuid) -> Result<bool, E>,
    E: Display,
{
    let start = Instant::now();
    let mut report = BulkReport::new(operation, entity_type);

    tracing::info!(operation, entity_type = entity_type.as_str(), total = ids.len(), "Bulk pass started");

    for id in ids {
        report.processed += 1;

        let tx = match conn.unchecked_transaction() {
            Ok(tx) => tx,
            Err(e) => {
                report.fail(id, e);
                continue;
            }
        };

        match step(&tx, id) {
            Ok(changed) => match tx.commit() {
                Ok(()) => {
                    report.succeeded += 1;
                    if changed {
                        report.changed += 1;
                    }
                }
                Err(e) => report.fail(id, e),
            },
            // Dropping the transaction rolls this entity back.
            Err(e) => report.fail(id, e),
        }
    }

    report.elapsed_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        operation,
        entity_type = entity_type.as_str(),
        processed = report.processed,
        changed = report.changed,
        failed = report.failed,
        elapsed_ms = report.elapsed_ms,
        "Bulk pass finished"
    );
    report
}
