//! Cell coercion: one raw cell in, one typed value (or null) out.
//!
//! Nothing here returns an error. A value that cannot be read as the
//! requested kind becomes `None` and the row carries on.

use chrono::{NaiveDate, NaiveDateTime};

use super::schema::FieldKind;
use super::sheet::Cell;
use crate::models::{FieldValue, TIMESTAMP_FORMAT};

/// Textual date-time layouts, tried in order. Day-first before month-first.
const DATETIME_PATTERNS: &[&str] = &[
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Date-only layouts; a match defaults to midnight.
const DATE_PATTERNS: &[&str] = &[
    "%d.%m.%y",
    "%d.%m.%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%Y-%m-%d",
    "%Y.%m.%d",
    "%m/%d/%Y",
];

const TRUE_TOKENS: &[&str] = &["да", "yes", "y", "true", "истина", "1", "+", "д"];
const FALSE_TOKENS: &[&str] = &["нет", "no", "n", "false", "ложь", "0", "н"];

/// Coerce a cell into the declared kind of its field.
pub fn coerce(cell: &Cell, kind: FieldKind) -> Option<FieldValue> {
    match kind {
        FieldKind::Text => coerce_text(cell).map(FieldValue::Text),
        FieldKind::Number => coerce_number(cell).map(FieldValue::Number),
        FieldKind::DateTime => coerce_datetime(cell).map(FieldValue::DateTime),
        FieldKind::Bool => coerce_bool(cell).map(FieldValue::Bool),
    }
}

/// Coerce without a declared kind: the cell's own type decides.
pub fn infer(cell: &Cell) -> Option<FieldValue> {
    match cell.displayed() {
        Cell::Number(n) => Some(FieldValue::Number(*n)),
        Cell::Bool(b) => Some(FieldValue::Bool(*b)),
        Cell::DateTime(dt) => Some(FieldValue::DateTime(*dt)),
        other => coerce_text(other).map(FieldValue::Text),
    }
}

/// True for blank strings and strings made only of punctuation ("-", "—", "...").
pub fn is_null_text(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_whitespace() || c.is_ascii_punctuation() || matches!(c, '—' | '–' | '…' | '№'))
}

pub fn coerce_text(cell: &Cell) -> Option<String> {
    match cell.displayed() {
        Cell::Text(s) => {
            let trimmed = s.trim();
            (!is_null_text(trimmed)).then(|| trimmed.to_string())
        }
        Cell::Number(n) => Some(FieldValue::Number(*n).to_canonical_string()),
        Cell::Bool(b) => Some(b.to_string()),
        Cell::DateTime(dt) => Some(dt.format(TIMESTAMP_FORMAT).to_string()),
        Cell::Empty | Cell::Error(_) | Cell::Formula { .. } => None,
    }
}

pub fn coerce_number(cell: &Cell) -> Option<f64> {
    match cell.displayed() {
        Cell::Number(n) if n.is_finite() => Some(*n),
        Cell::Text(s) => parse_number_text(s),
        _ => None,
    }
}

pub fn coerce_datetime(cell: &Cell) -> Option<NaiveDateTime> {
    match cell.displayed() {
        Cell::DateTime(dt) => Some(*dt),
        Cell::Text(s) => parse_datetime_text(s),
        _ => None,
    }
}

pub fn coerce_bool(cell: &Cell) -> Option<bool> {
    match cell.displayed() {
        Cell::Bool(b) => Some(*b),
        Cell::Number(n) if *n == 1.0 => Some(true),
        Cell::Number(n) if *n == 0.0 => Some(false),
        Cell::Text(s) => parse_bool_text(s),
        _ => None,
    }
}

/// Parse an exported number such as `"1 234 567,89 руб."` or `"1,234.50"`.
///
/// Everything but digits, a leading minus and separators is dropped. When
/// both `.` and `,` appear the rightmost one is the decimal separator; a
/// lone comma is a decimal separator; repeated identical separators are
/// thousands separators.
pub fn parse_number_text(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if is_null_text(trimmed) {
        return None;
    }
    let negative = trimmed.starts_with('-') || (trimmed.starts_with('(') && trimmed.ends_with(')'));
    let kept: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    // Separators only count between digits ("руб." must not add a decimal point).
    let kept = kept.trim_matches(|c| c == '.' || c == ',');
    if !kept.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let last_dot = kept.rfind('.');
    let last_comma = kept.rfind(',');
    let decimal = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(d.max(c)),
        (Some(d), None) if kept.matches('.').count() == 1 => Some(d),
        (None, Some(c)) if kept.matches(',').count() == 1 => Some(c),
        _ => None,
    };

    let mut normalized = String::with_capacity(kept.len() + 1);
    if negative {
        normalized.push('-');
    }
    for (i, c) in kept.char_indices() {
        match c {
            '.' | ',' if Some(i) == decimal => normalized.push('.'),
            '.' | ',' => {}
            digit => normalized.push(digit),
        }
    }
    normalized.parse::<f64>().ok().filter(|n| n.is_finite())
}

pub fn parse_datetime_text(s: &str) -> Option<NaiveDateTime> {
    let trimmed = s.trim();
    if is_null_text(trimmed) {
        return None;
    }
    DATETIME_PATTERNS
        .iter()
        .find_map(|p| NaiveDateTime::parse_from_str(trimmed, p).ok())
        .or_else(|| {
            DATE_PATTERNS
                .iter()
                .find_map(|p| NaiveDate::parse_from_str(trimmed, p).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

pub fn parse_bool_text(s: &str) -> Option<bool> {
    let token = s.trim().to_lowercase();
    if TRUE_TOKENS.contains(&token.as_str()) {
        Some(true)
    } else if FALSE_TOKENS.contains(&token.as_str()) {
        Some(false)
    } else {
        None
    }
}
