//! Static field schemas per entity type.
//!
//! A schema lists every canonical field an export may carry, the header
//! labels that identify its column, and how the business key is formed.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::models::enums::EntityType;
use crate::models::FieldValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    DateTime,
    Bool,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub kind: FieldKind,
    /// Header labels in preference order.
    pub headers: &'static [&'static str],
    pub required: bool,
    /// Set when the scalar names another entity.
    pub reference: Option<EntityType>,
}

const fn text(key: &'static str, headers: &'static [&'static str]) -> FieldSpec {
    FieldSpec { key, kind: FieldKind::Text, headers, required: false, reference: None }
}

const fn required(key: &'static str, headers: &'static [&'static str]) -> FieldSpec {
    FieldSpec { key, kind: FieldKind::Text, headers, required: true, reference: None }
}

const fn number(key: &'static str, headers: &'static [&'static str]) -> FieldSpec {
    FieldSpec { key, kind: FieldKind::Number, headers, required: false, reference: None }
}

const fn date(key: &'static str, headers: &'static [&'static str]) -> FieldSpec {
    FieldSpec { key, kind: FieldKind::DateTime, headers, required: false, reference: None }
}

const fn flag(key: &'static str, headers: &'static [&'static str]) -> FieldSpec {
    FieldSpec { key, kind: FieldKind::Bool, headers, required: false, reference: None }
}

const fn reference(key: &'static str, headers: &'static [&'static str], target: EntityType) -> FieldSpec {
    FieldSpec { key, kind: FieldKind::Text, headers, required: false, reference: Some(target) }
}

#[derive(Debug, Clone, Copy)]
pub enum BusinessKey {
    Field(&'static str),
    /// Parts joined with `|`; every part must be present.
    Composite(&'static [&'static str]),
}

#[derive(Debug)]
pub struct EntitySchema {
    pub entity_type: EntityType,
    pub fields: &'static [FieldSpec],
    pub business_key: BusinessKey,
}

const GUID: FieldSpec = text("guid", &["GUID", "Идентификатор", "Ссылка.GUID"]);
const CFO: FieldSpec = text("cfo", &["ЦФО", "Центр финансовой ответственности"]);
const COMMENT: FieldSpec = text("comment", &["Комментарий", "Примечание"]);

static REQUEST: EntitySchema = EntitySchema {
    entity_type: EntityType::Request,
    fields: &[
        GUID,
        required("inner_id", &["Внутренний номер", "Номер заявки"]),
        text("name", &["Наименование", "Предмет закупки"]),
        CFO,
        number("amount", &["Сумма заявки", "Сумма"]),
        date("created", &["Дата создания", "Дата заявки"]),
        text("initiator", &["Инициатор", "Автор"]),
        reference("plan_item_ref", &["Позиция плана", "Позиция ГКПЗ"], EntityType::PlanItem),
        text("state_trace", &["Состояние", "Статус документа"]),
        COMMENT,
    ],
    business_key: BusinessKey::Field("inner_id"),
};

static PURCHASE: EntitySchema = EntitySchema {
    entity_type: EntityType::Purchase,
    fields: &[
        GUID,
        required("inner_id", &["Внутренний номер", "Номер закупки"]),
        text("name", &["Наименование", "Предмет закупки"]),
        CFO,
        number("amount", &["Начальная цена", "Сумма"]),
        text("method", &["Способ закупки"]),
        date("planned_date", &["Плановая дата", "Дата проведения"]),
        reference("request_ref", &["Заявка", "Номер заявки"], EntityType::Request),
        text("state_trace", &["Состояние", "Статус документа"]),
        COMMENT,
    ],
    business_key: BusinessKey::Field("inner_id"),
};

static CONTRACT: EntitySchema = EntitySchema {
    entity_type: EntityType::Contract,
    fields: &[
        GUID,
        required("inner_id", &["Внутренний номер", "Номер договора"]),
        text("name", &["Предмет договора", "Наименование"]),
        CFO,
        text("counterparty", &["Контрагент", "Поставщик"]),
        number("amount", &["Сумма договора", "Сумма"]),
        date("signed_at", &["Дата подписания", "Дата договора"]),
        reference("request_ref", &["Заявка", "Номер заявки"], EntityType::Request),
        reference("purchase_ref", &["Закупка", "Номер закупки"], EntityType::Purchase),
        reference("parent_contract_ref", &["Основной договор", "Родительский договор"], EntityType::Contract),
        text("state_trace", &["Состояние", "Статус документа"]),
        COMMENT,
    ],
    business_key: BusinessKey::Field("inner_id"),
};

static PLAN_ITEM: EntitySchema = EntitySchema {
    entity_type: EntityType::PlanItem,
    fields: &[
        GUID,
        required("inner_id", &["Номер позиции", "Внутренний номер"]),
        text("name", &["Наименование", "Предмет закупки"]),
        CFO,
        number("amount", &["Плановая сумма", "Сумма"]),
        text("method", &["Способ закупки"]),
        date("planned_date", &["Плановая дата", "Дата начала"]),
        text("state_trace", &["Состояние", "Статус позиции"]),
        COMMENT,
    ],
    business_key: BusinessKey::Field("inner_id"),
};

static APPROVAL: EntitySchema = EntitySchema {
    entity_type: EntityType::Approval,
    fields: &[
        GUID,
        FieldSpec {
            key: "request_ref",
            kind: FieldKind::Text,
            headers: &["Документ.Внутренний номер", "Заявка"],
            required: true,
            reference: Some(EntityType::Request),
        },
        required("stage", &["Этап"]),
        required("role", &["Роль"]),
        text("assignee", &["Исполнитель", "Согласующий"]),
        CFO,
        date("assigned_at", &["Дата назначения"]),
        date("planned_at", &["Плановая дата", "Срок"]),
        date("completed_at", &["Дата выполнения", "Дата завершения"]),
        number("days_in_work", &["Дней в работе"]),
        flag("is_overdue", &["Просрочено"]),
        text("state_trace", &["Результат", "Состояние"]),
        COMMENT,
    ],
    business_key: BusinessKey::Composite(&["request_ref", "stage", "role"]),
};

pub fn schema_for(entity_type: EntityType) -> &'static EntitySchema {
    match entity_type {
        EntityType::Request => &REQUEST,
        EntityType::Purchase => &PURCHASE,
        EntityType::Contract => &CONTRACT,
        EntityType::PlanItem => &PLAN_ITEM,
        EntityType::Approval => &APPROVAL,
    }
}

static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid digit regex"));

/// First run of digits in `s`, e.g. `"ЗК-000123 от 01.02"` → 123.
pub fn numeric_key(s: &str) -> Option<i64> {
    DIGIT_RUN.find(s).and_then(|m| m.as_str().parse::<i64>().ok())
}

impl EntitySchema {
    pub fn field(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.required)
    }

    pub fn reference_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.reference.is_some())
    }

    /// Lower-cased business key built from `lookup`, or `None` when any part is missing.
    pub fn business_key<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<FieldValue>,
    {
        let part = |key: &str| {
            lookup(key)
                .map(|v| v.to_canonical_string().trim().to_lowercase())
                .filter(|s| !s.is_empty())
        };
        match self.business_key {
            BusinessKey::Field(key) => part(key),
            BusinessKey::Composite(keys) => keys
                .iter()
                .map(|k| part(k))
                .collect::<Option<Vec<_>>>()
                .map(|parts| parts.join("|")),
        }
    }

    /// Numeric fallback key. Composite keys have none.
    pub fn numeric_key(&self, business_key: Option<&str>) -> Option<i64> {
        match self.business_key {
            BusinessKey::Field(_) => business_key.and_then(numeric_key),
            BusinessKey::Composite(_) => None,
        }
    }
}
