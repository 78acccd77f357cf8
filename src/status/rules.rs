//! Ordered state-trace classification rules, one list per entity type.
//!
//! Order is the priority contract: the first matching rule wins. Compound
//! rules that disambiguate overlapping phrases sit before the single-phrase
//! rules they would otherwise lose to.

use std::sync::LazyLock;

use thiserror::Error;

use crate::models::enums::{EntityType, Status};

/// Predicate over a state trace. Phrases are stored lower-cased and the
/// trace is lower-cased before matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracePredicate {
    /// The whole trimmed trace equals the phrase.
    Equals(String),
    /// The trace contains the phrase.
    Contains(String),
    /// The trace contains the phrase with no letter or digit on either side.
    Word(String),
    /// Every `all` phrase is contained and no `none` phrase is.
    Compound { all: Vec<String>, none: Vec<String> },
}

impl TracePredicate {
    /// `trace` must already be trimmed and lower-cased.
    pub fn matches(&self, trace: &str) -> bool {
        match self {
            Self::Equals(phrase) => trace == phrase,
            Self::Contains(phrase) => trace.contains(phrase.as_str()),
            Self::Word(phrase) => contains_word(trace, phrase),
            Self::Compound { all, none } => {
                all.iter().all(|p| trace.contains(p.as_str()))
                    && !none.iter().any(|p| trace.contains(p.as_str()))
            }
        }
    }

    fn phrases(&self) -> Vec<&str> {
        match self {
            Self::Equals(p) | Self::Contains(p) | Self::Word(p) => vec![p.as_str()],
            Self::Compound { all, none } => all.iter().chain(none).map(String::as_str).collect(),
        }
    }
}

fn contains_word(trace: &str, word: &str) -> bool {
    !word.is_empty()
        && trace.match_indices(word).any(|(i, _)| {
            let before = trace[..i].chars().next_back();
            let after = trace[i + word.len()..].chars().next();
            !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
        })
}

#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub name: &'static str,
    pub entity_type: EntityType,
    pub predicate: TracePredicate,
    pub status: Status,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("Rule '{rule}' yields {status}, which {entity_type} does not allow")]
    StatusNotAllowed { rule: &'static str, entity_type: EntityType, status: Status },

    #[error("Rule '{rule}' has an empty phrase")]
    EmptyPhrase { rule: &'static str },

    #[error("Rule '{rule}' is filed under {actual} instead of {expected}")]
    WrongEntityType { rule: &'static str, expected: EntityType, actual: EntityType },
}

fn lower(phrases: &[&str]) -> Vec<String> {
    phrases.iter().map(|p| p.trim().to_lowercase()).collect()
}

fn equals(entity_type: EntityType, name: &'static str, phrase: &str, status: Status) -> ClassificationRule {
    ClassificationRule {
        name,
        entity_type,
        predicate: TracePredicate::Equals(phrase.trim().to_lowercase()),
        status,
    }
}

fn contains(entity_type: EntityType, name: &'static str, phrase: &str, status: Status) -> ClassificationRule {
    ClassificationRule {
        name,
        entity_type,
        predicate: TracePredicate::Contains(phrase.trim().to_lowercase()),
        status,
    }
}

fn word(entity_type: EntityType, name: &'static str, phrase: &str, status: Status) -> ClassificationRule {
    ClassificationRule {
        name,
        entity_type,
        predicate: TracePredicate::Word(phrase.trim().to_lowercase()),
        status,
    }
}

fn compound(
    entity_type: EntityType,
    name: &'static str,
    all: &[&str],
    none: &[&str],
    status: Status,
) -> ClassificationRule {
    ClassificationRule {
        name,
        entity_type,
        predicate: TracePredicate::Compound { all: lower(all), none: lower(none) },
        status,
    }
}

static REQUEST_RULES: LazyLock<Vec<ClassificationRule>> = LazyLock::new(|| {
    let t = EntityType::Request;
    vec![
        contains(t, "request.cancelled", "Отменен", Status::Cancelled),
        contains(t, "request.in_purchase", "Передана в закупку", Status::InPurchase),
        contains(t, "request.in_purchase_short", "В закупке", Status::InPurchase),
        contains(t, "request.rejected", "Не согласован", Status::Rejected),
        contains(t, "request.not_approved", "Не утвержден", Status::Rejected),
        contains(t, "request.declined", "Отклонен", Status::Rejected),
        contains(t, "request.on_approval", "На согласовании", Status::OnApproval),
        contains(t, "request.approved", "Согласование заявки: Согласован", Status::Approved),
        contains(t, "request.confirmed", "Утвержден", Status::Approved),
        equals(t, "request.draft", "Проект", Status::Draft),
        contains(t, "request.draft_marker", "Черновик", Status::Draft),
        contains(t, "request.approval_started", "Согласование заявки", Status::OnApproval),
    ]
});

static PURCHASE_RULES: LazyLock<Vec<ClassificationRule>> = LazyLock::new(|| {
    let t = EntityType::Purchase;
    vec![
        contains(t, "purchase.cancelled", "Отменен", Status::Cancelled),
        contains(t, "purchase.failed", "Не состоялась", Status::Failed),
        contains(t, "purchase.declared_failed", "Признана несостоявшейся", Status::Failed),
        // Final stages first: a finished procedure still carries its bidding stage.
        contains(t, "purchase.results_closed", "Подведение итогов: Завершен", Status::Completed),
        contains(t, "purchase.results", "Подведение итогов: Выполнен", Status::Completed),
        contains(t, "purchase.procedure_closed", "Закупка: Завершен", Status::Completed),
        // "Прием заявок: Завершен" on its own means bidding closed, not the procedure.
        compound(t, "purchase.completed", &["Завершен"], &["Прием заявок: Завершен"], Status::Completed),
        contains(t, "purchase.bidding", "Прием заявок", Status::InProgress),
        contains(t, "purchase.published", "Опубликован", Status::InProgress),
        contains(t, "purchase.planned", "Запланирован", Status::Planned),
        equals(t, "purchase.draft", "Проект", Status::Draft),
        contains(t, "purchase.draft_marker", "Черновик", Status::Draft),
    ]
});

static CONTRACT_RULES: LazyLock<Vec<ClassificationRule>> = LazyLock::new(|| {
    let t = EntityType::Contract;
    vec![
        contains(t, "contract.cancelled", "Отменен", Status::Cancelled),
        // Registration in progress outranks every "approved" phrase below.
        compound(
            t,
            "contract.registering_after_approval",
            &["Регистрация: На регистрации", "Согласование договора"],
            &["Не согласован"],
            Status::OnRegistration,
        ),
        contains(t, "contract.synchronized", "Синхронизация: Исполнен", Status::Signed),
        contains(t, "contract.registered", "Регистрация: Зарегистрирован", Status::Signed),
        contains(t, "contract.rejected", "Не согласован", Status::Rejected),
        contains(t, "contract.stage2_approved", "Этап 2: Согласован", Status::Signed),
        contains(t, "contract.approved", "Согласование договора: Согласован", Status::Signed),
        contains(t, "contract.registering", "На регистрации", Status::OnRegistration),
        contains(t, "contract.on_approval", "На согласовании", Status::OnApproval),
        equals(t, "contract.draft", "Проект", Status::Draft),
        contains(t, "contract.approval_started", "Согласование договора", Status::OnApproval),
    ]
});

static PLAN_ITEM_RULES: LazyLock<Vec<ClassificationRule>> = LazyLock::new(|| {
    let t = EntityType::PlanItem;
    vec![
        contains(t, "plan_item.excluded", "Исключен", Status::Excluded),
        // Whole words, so "В исполнении" does not read as finished.
        word(t, "plan_item.fulfilled", "Исполнен", Status::Completed),
        word(t, "plan_item.fulfilled_f", "Исполнена", Status::Completed),
        word(t, "plan_item.fulfilled_n", "Исполнено", Status::Completed),
        contains(t, "plan_item.purchase_done", "Закупка завершена", Status::Completed),
        contains(t, "plan_item.in_execution", "В исполнении", Status::Included),
        contains(t, "plan_item.included", "Включен в план", Status::Included),
        contains(t, "plan_item.confirmed", "Утвержден", Status::Included),
        contains(t, "plan_item.on_approval", "На согласовании", Status::OnApproval),
        equals(t, "plan_item.draft", "Проект", Status::Draft),
        contains(t, "plan_item.draft_marker", "Черновик", Status::Draft),
    ]
});

static APPROVAL_RULES: LazyLock<Vec<ClassificationRule>> = LazyLock::new(|| {
    let t = EntityType::Approval;
    vec![
        contains(t, "approval.cancelled", "Отменено", Status::Cancelled),
        contains(t, "approval.rework", "На доработку", Status::Rework),
        contains(t, "approval.rework_state", "На доработке", Status::Rework),
        contains(t, "approval.rejected", "Не согласовано", Status::Rejected),
        contains(t, "approval.declined", "Отклонено", Status::Rejected),
        contains(t, "approval.approved", "Согласовано", Status::Approved),
        contains(t, "approval.in_work", "В работе", Status::Pending),
        contains(t, "approval.waiting", "Ожидает", Status::Pending),
    ]
});

/// Rules for `entity_type`, highest priority first.
pub fn rules_for(entity_type: EntityType) -> &'static [ClassificationRule] {
    match entity_type {
        EntityType::Request => REQUEST_RULES.as_slice(),
        EntityType::Purchase => PURCHASE_RULES.as_slice(),
        EntityType::Contract => CONTRACT_RULES.as_slice(),
        EntityType::PlanItem => PLAN_ITEM_RULES.as_slice(),
        EntityType::Approval => APPROVAL_RULES.as_slice(),
    }
}

/// Check every rule list. Returns the total number of rules.
pub fn validate_rules() -> Result<usize, RuleError> {
    let mut total = 0;
    for entity_type in EntityType::all() {
        for rule in rules_for(*entity_type) {
            if rule.entity_type != *entity_type {
                return Err(RuleError::WrongEntityType {
                    rule: rule.name,
                    expected: *entity_type,
                    actual: rule.entity_type,
                });
            }
            if !entity_type.allows_status(rule.status) {
                return Err(RuleError::StatusNotAllowed {
                    rule: rule.name,
                    entity_type: *entity_type,
                    status: rule.status,
                });
            }
            if rule.predicate.phrases().iter().any(|p| p.is_empty()) {
                return Err(RuleError::EmptyPhrase { rule: rule.name });
            }
            total += 1;
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn shipped_rules_are_valid() {
        let total = validate_rules().unwrap();
        assert!(total > 40);
    }

    #[test]
    fn rule_names_are_unique() {
        let mut seen = HashSet::new();
        for t in EntityType::all() {
            for rule in rules_for(*t) {
                assert!(seen.insert(rule.name), "duplicate rule name {}", rule.name);
            }
        }
    }

    #[test]
    fn every_type_has_rules() {
        for t in EntityType::all() {
            assert!(!rules_for(*t).is_empty(), "{t} has no rules");
        }
    }

    #[test]
    fn compound_requires_all_and_rejects_none() {
        let p = TracePredicate::Compound { all: lower(&["a", "b"]), none: lower(&["c"]) };
        assert!(p.matches("a b"));
        assert!(!p.matches("a"));
        assert!(!p.matches("a b c"));
    }

    #[test]
    fn word_needs_boundaries_on_both_sides() {
        let p = TracePredicate::Word("исполнен".into());
        assert!(p.matches("позиция плана: исполнен"));
        assert!(p.matches("исполнен, закрыт"));
        assert!(!p.matches("позиция плана: в исполнении"));
        assert!(!p.matches("неисполнен"));
        assert!(p.matches("в исполнении, исполнен"));
    }

    #[test]
    fn equals_is_whole_string_only() {
        let p = TracePredicate::Equals("проект".into());
        assert!(p.matches("проект"));
        assert!(!p.matches("проект договора"));
    }
}
