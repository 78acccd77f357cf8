use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{EntityType, Status};
use super::{now, TIMESTAMP_FORMAT};

pub const GUID_FIELD: &str = "guid";
pub const STATE_TRACE_FIELD: &str = "state_trace";
pub const STATUS_FIELD: &str = "status";

/// Stringified, comparable view of an entity used for audit diffs.
/// Absent keys and `None` values both mean null.
pub type Snapshot = BTreeMap<String, Option<String>>;

/// A typed business value. Null is represented by the absence of a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl FieldValue {
    /// Stable string form used for audit records and change detection.
    pub fn to_canonical_string(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::DateTime(dt) => dt.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

/// One canonical procurement record (request, purchase, contract, plan item or approval).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEntity {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub guid: Option<Uuid>,
    /// Lower-cased business key (inner id, or composite key for approvals).
    pub business_key: Option<String>,
    pub numeric_key: Option<i64>,
    pub fields: BTreeMap<String, FieldValue>,
    pub state_trace: Option<String>,
    pub status: Option<Status>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl CanonicalEntity {
    pub fn new(entity_type: EntityType) -> Self {
        let ts = now();
        Self {
            id: Uuid::new_v4(),
            entity_type,
            guid: None,
            business_key: None,
            numeric_key: None,
            fields: BTreeMap::new(),
            state_trace: None,
            status: None,
            created_at: ts,
            updated_at: ts,
        }
    }

    /// GUID when known, otherwise the business key.
    pub fn natural_key(&self) -> Option<String> {
        self.guid
            .map(|g| g.to_string())
            .or_else(|| self.business_key.clone())
    }

    /// Read a field by key. `guid` and `state_trace` live outside the field map.
    pub fn field(&self, key: &str) -> Option<FieldValue> {
        match key {
            GUID_FIELD => self.guid.map(|g| FieldValue::Text(g.to_string())),
            STATE_TRACE_FIELD => self.state_trace.clone().map(FieldValue::Text),
            STATUS_FIELD => self.status.map(|s| FieldValue::Text(s.as_str().to_string())),
            _ => self.fields.get(key).cloned(),
        }
    }

    pub fn text(&self, key: &str) -> Option<String> {
        self.field(key).map(|v| v.to_canonical_string())
    }

    /// Write a field by key; `None` clears it. Status is not writable here.
    pub fn set_field(&mut self, key: &str, value: Option<FieldValue>) {
        match key {
            GUID_FIELD => {
                self.guid = value
                    .as_ref()
                    .and_then(|v| v.as_text())
                    .and_then(|s| Uuid::parse_str(s.trim()).ok());
            }
            STATE_TRACE_FIELD => {
                self.state_trace = value.map(|v| v.to_canonical_string());
            }
            STATUS_FIELD => {}
            _ => match value {
                Some(v) => {
                    self.fields.insert(key.to_string(), v);
                }
                None => {
                    self.fields.remove(key);
                }
            },
        }
    }

    /// Everything an auditor can see change; timestamps are excluded.
    pub fn snapshot(&self) -> Snapshot {
        let mut snap: Snapshot = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), Some(v.to_canonical_string())))
            .collect();
        snap.insert(GUID_FIELD.to_string(), self.guid.map(|g| g.to_string()));
        snap.insert(STATE_TRACE_FIELD.to_string(), self.state_trace.clone());
        snap.insert(
            STATUS_FIELD.to_string(),
            self.status.map(|s| s.as_str().to_string()),
        );
        snap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn numbers_stringify_without_trailing_zero() {
        assert_eq!(FieldValue::Number(1500.0).to_canonical_string(), "1500");
        assert_eq!(FieldValue::Number(12.5).to_canonical_string(), "12.5");
    }

    #[test]
    fn datetime_stringifies_with_seconds() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 5, 0)
            .unwrap();
        assert_eq!(FieldValue::DateTime(dt).to_canonical_string(), "2024-03-01 09:05:00");
    }

    #[test]
    fn natural_key_prefers_guid() {
        let mut e = CanonicalEntity::new(EntityType::Request);
        e.business_key = Some("000123".into());
        assert_eq!(e.natural_key().as_deref(), Some("000123"));

        let guid = Uuid::new_v4();
        e.guid = Some(guid);
        assert_eq!(e.natural_key(), Some(guid.to_string()));
    }

    #[test]
    fn set_field_routes_special_keys() {
        let mut e = CanonicalEntity::new(EntityType::Contract);
        e.set_field(STATE_TRACE_FIELD, Some("Проект".into()));
        e.set_field("amount", Some(10.0.into()));
        e.set_field(GUID_FIELD, Some("not-a-guid".into()));

        assert_eq!(e.state_trace.as_deref(), Some("Проект"));
        assert_eq!(e.fields.get("amount"), Some(&FieldValue::Number(10.0)));
        assert!(e.guid.is_none());
        assert!(!e.fields.contains_key(STATE_TRACE_FIELD));
    }

    #[test]
    fn snapshot_includes_trace_guid_and_status_but_not_timestamps() {
        let mut e = CanonicalEntity::new(EntityType::Request);
        e.set_field("cfo", Some("ЦФО-1".into()));
        let snap = e.snapshot();
        assert_eq!(snap.get("cfo"), Some(&Some("ЦФО-1".to_string())));
        assert_eq!(snap.get(STATE_TRACE_FIELD), Some(&None));
        assert_eq!(snap.get(GUID_FIELD), Some(&None));
        assert_eq!(snap.get(STATUS_FIELD), Some(&None));
        assert!(!snap.contains_key("updated_at"));
    }

    #[test]
    fn field_values_survive_json() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let values = vec![
            FieldValue::Text("Поставка".into()),
            FieldValue::Number(1234567.89),
            FieldValue::Bool(true),
            FieldValue::DateTime(dt),
        ];
        let json = serde_json::to_string(&values).unwrap();
        let back: Vec<FieldValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, values);
    }
}
