use std::io::Read;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::models::{BrewRecord, Ingredient, Reading, text_from_value};

/// Cell spellings that mean "not fermenting". Rows written before the
/// `fermenting` column existed have no value at all and stay fermenting.
pub const FALSE_SPELLINGS: [&str; 2] = ["false", "0"];

/// Column names in their positional order (used when a sheet has no header).
pub const COLUMN_NAMES: [&str; 6] = ["id", "name", "readings", "notes", "ingredients", "fermenting"];

/// One row as it comes off the sheet, before any interpretation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub id: Option<Value>,
    pub name: Option<Value>,
    pub readings: Option<Value>,
    pub notes: Option<Value>,
    pub ingredients: Option<Value>,
    pub fermenting: Option<Value>,
}

impl RawRow {
    fn from_cells(mut cells: [Option<Value>; 6]) -> Self {
        Self {
            id: cells[0].take(),
            name: cells[1].take(),
            readings: cells[2].take(),
            notes: cells[3].take(),
            ingredients: cells[4].take(),
            fermenting: cells[5].take(),
        }
    }

    /// Build a row from a CSV record laid out by `layout`.
    #[must_use]
    pub fn from_csv_record(record: &csv::StringRecord, layout: &ColumnLayout) -> Self {
        let cells = layout.indices.map(|idx| {
            idx.and_then(|i| record.get(i))
                .map(|v| Value::String(v.to_string()))
        });
        Self::from_cells(cells)
    }

    /// Build a row from JSON: an object keyed by column name, or an array in
    /// column order. An object without any known key falls back to its
    /// `"0"`..`"5"` keys.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(map) => {
                let named = COLUMN_NAMES.map(|name| map.get(name).cloned());
                if named.iter().any(Option::is_some) {
                    Self::from_cells(named)
                } else {
                    Self::from_cells(std::array::from_fn(|i| map.get(&i.to_string()).cloned()))
                }
            }
            Value::Array(items) => Self::from_cells(std::array::from_fn(|i| items.get(i).cloned())),
            _ => Self::default(),
        }
    }
}

/// Where each known column lives in a CSV record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    indices: [Option<usize>; 6],
}

impl ColumnLayout {
    /// Columns 0-5 in [`COLUMN_NAMES`] order.
    #[must_use]
    pub fn positional() -> Self {
        Self {
            indices: [Some(0), Some(1), Some(2), Some(3), Some(4), Some(5)],
        }
    }

    /// Map header names (trimmed, case-insensitive). `None` when the header
    /// names none of the known columns, i.e. the sheet has no header row.
    #[must_use]
    pub fn from_headers(headers: &csv::StringRecord) -> Option<Self> {
        let indices = COLUMN_NAMES.map(|name| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        });
        indices
            .iter()
            .any(Option::is_some)
            .then_some(Self { indices })
    }

    #[must_use]
    pub fn is_positional(&self) -> bool {
        *self == Self::positional()
    }
}

/// Turn a raw row into a record. Never fails; an empty `id` is left for the
/// caller to filter (see [`retain_identified`]).
#[must_use]
pub fn normalize_row(row: &RawRow) -> BrewRecord {
    BrewRecord {
        id: text_cell(row.id.as_ref()),
        name: text_cell(row.name.as_ref()),
        readings: parse_json_column::<Reading>(row.readings.as_ref()),
        notes: text_cell(row.notes.as_ref()),
        ingredients: parse_json_column::<Ingredient>(row.ingredients.as_ref()),
        fermenting: resolve_fermenting(row.fermenting.as_ref()),
    }
}

fn text_cell(raw: Option<&Value>) -> String {
    raw.map(text_from_value)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Decode a JSON-array cell. Empty text, malformed JSON, and non-array values
/// all give an empty list; elements that are not objects are skipped.
#[must_use]
pub fn parse_json_column<T: DeserializeOwned>(raw: Option<&Value>) -> Vec<T> {
    let decoded = match raw {
        Some(Value::String(text)) if !text.trim().is_empty() => {
            match serde_json::from_str::<Value>(text) {
                Ok(v) => v,
                Err(e) => {
                    tracing::debug!(error = %e, "embedded JSON column did not decode");
                    return Vec::new();
                }
            }
        }
        Some(v @ Value::Array(_)) => v.clone(),
        _ => return Vec::new(),
    };

    let Value::Array(items) = decoded else {
        return Vec::new();
    };

    items
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect()
}

/// Resolve the `fermenting` cell: only an explicit false (`false`, `"false"`,
/// `"0"`, `0`) stops a brew. Anything else, including a missing cell, is `true`.
#[must_use]
pub fn resolve_fermenting(raw: Option<&Value>) -> bool {
    match raw {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(Value::String(s)) => !FALSE_SPELLINGS.contains(&s.as_str()),
        _ => true,
    }
}

/// Drop records that have no id.
pub fn retain_identified(records: &mut Vec<BrewRecord>) {
    records.retain(|b| !b.id.is_empty());
}

/// Parse the published sheet export into records, dropping rows without an id.
///
/// The first line is treated as a header when it names any known column;
/// otherwise every line is data and columns are read positionally.
pub fn parse_brews_csv<R: Read>(reader: R) -> Result<Vec<BrewRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut records = rdr.records();
    let Some(first) = records.next() else {
        return Ok(Vec::new());
    };
    let first = first.context("Failed to read CSV header")?;

    let (layout, first_is_data) = match ColumnLayout::from_headers(&first) {
        Some(layout) => (layout, false),
        None => {
            tracing::debug!("no recognised header; reading columns positionally");
            (ColumnLayout::positional(), true)
        }
    };

    let mut brews = Vec::new();
    if first_is_data {
        brews.push(normalize_row(&RawRow::from_csv_record(&first, &layout)));
    }
    for (line_num, result) in records.enumerate() {
        let record = result.with_context(|| format!("Failed to parse CSV row {}", line_num + 2))?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        brews.push(normalize_row(&RawRow::from_csv_record(&record, &layout)));
    }

    retain_identified(&mut brews);
    Ok(brews)
}
