use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{EntityType, LinkMatch};

/// A reference scalar on one entity that may point at another entity.
/// `target_id` stays `None` until the referenced entity exists; `matched_by`
/// says which lookup found it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossReference {
    pub owner_type: EntityType,
    pub owner_id: Uuid,
    pub field: String,
    pub raw_value: String,
    pub target_type: EntityType,
    pub target_id: Option<Uuid>,
    pub resolved_at: Option<NaiveDateTime>,
    pub matched_by: Option<LinkMatch>,
}

impl CrossReference {
    pub fn is_resolved(&self) -> bool {
        self.target_id.is_some()
    }

    /// Resolved through an exact GUID or business key match.
    pub fn is_settled(&self) -> bool {
        self.is_resolved() && self.matched_by.is_some_and(|m| m.is_exact())
    }
}
