use chrono::NaiveDateTime;
use serde::Serialize;

use crate::models::enums::EntityType;
use crate::models::now;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IngestOutcome {
    Loaded,
    /// The file was rejected for this entity type; nothing was written.
    HeaderNotFound { missing: Vec<String> },
}

/// Statistics for one ingestion invocation.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub entity_type: EntityType,
    pub source: String,
    pub sheet: Option<String>,
    /// One-based spreadsheet row of the resolved header.
    pub header_row: Option<usize>,
    pub outcome: IngestOutcome,
    pub rows_seen: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub errors: usize,
    pub field_changes: usize,
    pub links_resolved: usize,
    pub links_unresolved: usize,
    /// References from earlier files resolved by this file's entities.
    pub links_healed: usize,
    pub started_at: NaiveDateTime,
    pub elapsed_ms: u64,
    pub messages: Vec<String>,
    #[serde(skip)]
    max_messages: usize,
}

impl IngestReport {
    pub fn new(entity_type: EntityType, source: impl Into<String>, max_messages: usize) -> Self {
        Self {
            entity_type,
            source: source.into(),
            sheet: None,
            header_row: None,
            outcome: IngestOutcome::Loaded,
            rows_seen: 0,
            created: 0,
            updated: 0,
            unchanged: 0,
            skipped: 0,
            errors: 0,
            field_changes: 0,
            links_resolved: 0,
            links_unresolved: 0,
            links_healed: 0,
            started_at: now(),
            elapsed_ms: 0,
            messages: Vec::new(),
            max_messages,
        }
    }

    /// Keep a per-row message; counters are exact even when messages are capped.
    pub fn note(&mut self, message: impl Into<String>) {
        if self.messages.len() < self.max_messages {
            self.messages.push(message.into());
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.outcome == IngestOutcome::Loaded
    }

    /// Entities written (created or updated).
    pub fn written(&self) -> usize {
        self.created + self.updated
    }

    pub(crate) fn finish(&mut self, start: std::time::Instant) {
        self.elapsed_ms = start.elapsed().as_millis() as u64;
    }
}
