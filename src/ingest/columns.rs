//! Column resolution: find the header row and map canonical fields to column indices.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::coerce::coerce_text;
use super::schema::{EntitySchema, FieldSpec};
use super::sheet::Cell;

/// Containment matches shorter than this are ignored ("№" must not match everything).
const MIN_CONTAINMENT_LEN: usize = 3;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnMap {
    /// Zero-based index of the header row within the sheet.
    pub header_row: usize,
    pub columns: BTreeMap<&'static str, usize>,
}

impl ColumnMap {
    pub fn column(&self, key: &str) -> Option<usize> {
        self.columns.get(key).copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderResolution {
    Found(ColumnMap),
    /// No row in the window resolved every required field. `missing` lists
    /// the required fields absent from the closest candidate row.
    NotFound { missing: Vec<&'static str> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchTier {
    Exact,
    Normalized,
    Contains,
}

/// Trim, collapse inner whitespace and lower-case.
pub fn normalize_header(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").to_lowercase()
}

struct HeaderCell {
    raw: String,
    normalized: String,
    index: usize,
}

fn header_cells(row: &[Cell]) -> Vec<HeaderCell> {
    let mut cells: Vec<HeaderCell> = Vec::new();
    for (index, cell) in row.iter().enumerate() {
        let Some(raw) = coerce_text(cell) else { continue };
        // First occurrence of a repeated header keeps the column.
        if cells.iter().any(|c| c.raw == raw) {
            continue;
        }
        cells.push(HeaderCell { normalized: normalize_header(&raw), raw, index });
    }
    cells
}

fn matches(tier: MatchTier, label: &str, label_norm: &str, header: &HeaderCell) -> bool {
    match tier {
        MatchTier::Exact => header.raw == label,
        MatchTier::Normalized => header.normalized == label_norm,
        MatchTier::Contains => {
            let (short, long) = if header.normalized.chars().count() <= label_norm.chars().count() {
                (header.normalized.as_str(), label_norm)
            } else {
                (label_norm, header.normalized.as_str())
            };
            short.chars().count() >= MIN_CONTAINMENT_LEN && long.contains(short)
        }
    }
}

/// Column for one field: the best tier wins, then label order, then column order.
fn match_field(spec: &FieldSpec, headers: &[HeaderCell]) -> Option<usize> {
    for tier in [MatchTier::Exact, MatchTier::Normalized, MatchTier::Contains] {
        for label in spec.headers {
            let label_norm = normalize_header(label);
            if let Some(h) = headers.iter().find(|h| matches(tier, label, &label_norm, h)) {
                return Some(h.index);
            }
        }
    }
    None
}

/// Scan the first `window` rows for a header row resolving every required field.
pub fn resolve_columns(rows: &[Vec<Cell>], schema: &EntitySchema, window: usize) -> HeaderResolution {
    let mut closest: Option<Vec<&'static str>> = None;

    for (row_index, row) in rows.iter().take(window).enumerate() {
        let headers = header_cells(row);
        if headers.is_empty() {
            continue;
        }

        let missing: Vec<&'static str> = schema
            .required_fields()
            .filter(|f| match_field(f, &headers).is_none())
            .map(|f| f.key)
            .collect();

        if missing.is_empty() {
            let columns = schema
                .fields
                .iter()
                .filter_map(|f| match_field(f, &headers).map(|idx| (f.key, idx)))
                .collect();
            tracing::debug!(
                entity_type = schema.entity_type.as_str(),
                header_row = row_index,
                "Header row resolved"
            );
            return HeaderResolution::Found(ColumnMap { header_row: row_index, columns });
        }

        if closest.as_ref().map_or(true, |c| missing.len() < c.len()) {
            closest = Some(missing);
        }
    }

    HeaderResolution::NotFound {
        missing: closest.unwrap_or_else(|| schema.required_fields().map(|f| f.key).collect()),
    }
}
