//! Workbook reading.
//!
//! Everything downstream works on `Sheet`/`Cell`; calamine is only touched here.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::NaiveDateTime;

use super::IngestError;

/// One spreadsheet cell as exported upstream.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// A numeric cell carrying a date format.
    DateTime(NaiveDateTime),
    /// A formula together with the value it last evaluated to.
    Formula {
        expression: String,
        cached: Option<Box<Cell>>,
    },
    /// A spreadsheet error value such as `#N/A`.
    Error(String),
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// The value the spreadsheet would display: formulas resolve to their cached value.
    pub fn displayed(&self) -> &Cell {
        match self {
            Self::Formula { cached: Some(inner), .. } => inner.displayed(),
            Self::Formula { cached: None, .. } => &Cell::Empty,
            other => other,
        }
    }

    pub fn is_blank(&self) -> bool {
        match self.displayed() {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { name: name.into(), rows }
    }
}

/// Read every worksheet of an `.xls`, `.xlsx`, `.xlsm`, `.xlsb` or `.ods` file.
pub fn read_workbook(path: &Path) -> Result<Vec<Sheet>, IngestError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| IngestError::Workbook(e.to_string()))?;

    let names = workbook.sheet_names().to_vec();
    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let values = match workbook.worksheet_range(&name) {
            Ok(range) => range,
            Err(e) => {
                tracing::warn!(sheet = %name, error = %e, "Skipping unreadable sheet");
                continue;
            }
        };
        // Formula text is optional; legacy formats may not expose it.
        let formulas = workbook.worksheet_formula(&name).ok();
        sheets.push(Sheet::new(name, sheet_rows(&values, formulas.as_ref())));
    }

    if sheets.is_empty() {
        return Err(IngestError::NoSheets);
    }
    Ok(sheets)
}

fn sheet_rows(values: &Range<Data>, formulas: Option<&Range<String>>) -> Vec<Vec<Cell>> {
    let (row0, col0) = values.start().unwrap_or((0, 0));
    // Leading empty rows keep row numbers aligned with the spreadsheet.
    let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); row0 as usize];
    let data_rows = values
        .rows()
        .enumerate()
        .map(|(r, row)| {
            row.iter()
                .enumerate()
                .map(|(c, data)| {
                    let value = cell_from_data(data);
                    let position = (row0 + r as u32, col0 + c as u32);
                    match formulas.and_then(|f| f.get_value(position)) {
                        Some(expr) if !expr.is_empty() => Cell::Formula {
                            expression: expr.clone(),
                            cached: Some(Box::new(value)),
                        },
                        _ => value,
                    }
                })
                .collect::<Vec<_>>()
        });
    rows.extend(data_rows);
    rows
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ndt) => Cell::DateTime(ndt),
            None => Cell::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => Cell::Error(format!("{e:?}")),
    }
}
