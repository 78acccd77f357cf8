use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ChangeSource, EntityType};

/// One append-only audit record for a single field of a single entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub seq: i64,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_at: NaiveDateTime,
    pub source: ChangeSource,
    pub actor: Option<String>,
}

/// A FieldChange before the store assigns its sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFieldChange {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_at: NaiveDateTime,
    pub source: ChangeSource,
    pub actor: Option<String>,
}
