//! Accepted spellings for statuses and entity types.
//!
//! Every spelling an operator or a legacy export may use is listed
//! explicitly and maps to exactly one variant. The tables are checked once
//! at startup; a spelling claimed by two variants is a startup error.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::LazyLock;

use thiserror::Error;

use crate::models::enums::{EntityType, Status};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AliasError {
    #[error("Spelling '{spelling}' maps to both {first} and {second}")]
    Conflict { spelling: String, first: String, second: String },

    #[error("No spellings declared for {0}")]
    Missing(String),
}

fn normalize(spelling: &str) -> String {
    spelling.trim().to_lowercase()
}

/// Bidirectional map: accepted spelling → variant, variant → display label.
#[derive(Debug)]
pub struct AliasMap<T> {
    by_spelling: HashMap<String, T>,
    labels: HashMap<T, &'static str>,
}

/// One variant, its human label and any extra spellings.
pub struct AliasEntry<T> {
    pub variant: T,
    pub label: &'static str,
    pub legacy: &'static [&'static str],
}

impl<T> AliasMap<T>
where
    T: Copy + Eq + Hash + Display,
{
    /// Build from `entries`; `variants` is the full set that must be covered.
    /// The variant's own `Display` form is always accepted.
    pub fn build(variants: &[T], entries: &[AliasEntry<T>]) -> Result<Self, AliasError> {
        let mut map = Self { by_spelling: HashMap::new(), labels: HashMap::new() };

        for entry in entries {
            let canonical = entry.variant.to_string();
            let spellings = std::iter::once(canonical.as_str())
                .chain(std::iter::once(entry.label))
                .chain(entry.legacy.iter().copied());
            for spelling in spellings {
                let key = normalize(spelling);
                match map.by_spelling.get(&key) {
                    Some(existing) if *existing != entry.variant => {
                        return Err(AliasError::Conflict {
                            spelling: spelling.to_string(),
                            first: existing.to_string(),
                            second: canonical,
                        });
                    }
                    Some(_) => {}
                    None => {
                        map.by_spelling.insert(key, entry.variant);
                    }
                }
            }
            map.labels.insert(entry.variant, entry.label);
        }

        if let Some(missing) = variants.iter().find(|v| !map.labels.contains_key(*v)) {
            return Err(AliasError::Missing(missing.to_string()));
        }
        Ok(map)
    }

    pub fn resolve(&self, spelling: &str) -> Option<T> {
        self.by_spelling.get(&normalize(spelling)).copied()
    }

    pub fn label(&self, variant: T) -> Option<&'static str> {
        self.labels.get(&variant).copied()
    }

    pub fn len(&self) -> usize {
        self.by_spelling.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_spelling.is_empty()
    }
}

fn entry<T>(variant: T, label: &'static str, legacy: &'static [&'static str]) -> AliasEntry<T> {
    AliasEntry { variant, label, legacy }
}

static STATUS_ALIASES: LazyLock<Result<AliasMap<Status>, AliasError>> = LazyLock::new(|| {
    use Status::*;
    AliasMap::build(
        Status::all(),
        &[
            entry(Draft, "Проект", &["draft", "черновик"]),
            entry(OnApproval, "На согласовании", &["onapproval", "on approval"]),
            entry(Approved, "Согласовано", &["approved", "согласован"]),
            entry(Rejected, "Не согласовано", &["rejected", "не согласован", "отклонено"]),
            entry(InPurchase, "В закупке", &["inpurchase", "in purchase"]),
            entry(Planned, "Запланирована", &["planned"]),
            entry(InProgress, "В работе", &["inprogress", "in progress"]),
            entry(Completed, "Завершено", &["completed", "done", "исполнено"]),
            entry(Failed, "Не состоялась", &["failed"]),
            entry(OnRegistration, "На регистрации", &["onregistration", "on registration"]),
            entry(Signed, "Подписан", &["signed", "заключен"]),
            entry(Included, "Включено в план", &["included"]),
            entry(Excluded, "Исключено", &["excluded"]),
            entry(Pending, "Ожидает", &["pending", "waiting"]),
            entry(Rework, "На доработке", &["rework", "на доработку"]),
            entry(Cancelled, "Отменено", &["cancelled", "canceled", "отменен"]),
        ],
    )
});

static ENTITY_TYPE_ALIASES: LazyLock<Result<AliasMap<EntityType>, AliasError>> = LazyLock::new(|| {
    use EntityType::*;
    AliasMap::build(
        EntityType::all(),
        &[
            entry(Request, "Заявка", &["requests", "заявки"]),
            entry(Purchase, "Закупка", &["purchases", "закупки", "procedure"]),
            entry(Contract, "Договор", &["contracts", "договоры"]),
            entry(PlanItem, "Позиция плана", &["plan", "plan_items", "plan-item", "позиции плана"]),
            entry(Approval, "Согласование", &["approvals", "согласования"]),
        ],
    )
});

/// Any accepted spelling of a status, canonical or legacy.
pub fn resolve_status(spelling: &str) -> Option<Status> {
    STATUS_ALIASES.as_ref().ok().and_then(|m| m.resolve(spelling))
}

pub fn status_label(status: Status) -> Option<&'static str> {
    STATUS_ALIASES.as_ref().ok().and_then(|m| m.label(status))
}

pub fn resolve_entity_type(spelling: &str) -> Option<EntityType> {
    ENTITY_TYPE_ALIASES.as_ref().ok().and_then(|m| m.resolve(spelling))
}

/// Startup check of both spelling tables.
pub fn validate() -> Result<(), AliasError> {
    STATUS_ALIASES.as_ref().map_err(Clone::clone)?;
    ENTITY_TYPE_ALIASES.as_ref().map_err(Clone::clone)?;
    Ok(())
}
