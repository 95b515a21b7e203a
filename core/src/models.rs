use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Gravities above this are integer-scaled (1046) and get divided by 1000.
pub const SG_SCALE_THRESHOLD: f64 = 100.0;

/// A single fermentation batch as stored in the spreadsheet.
///
/// Serializes to exactly the body the script endpoint expects:
/// `{id, name, readings, notes, ingredients, fermenting}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrewRecord {
    pub id: String,
    pub name: String,
    pub readings: Vec<Reading>,
    pub notes: String,
    pub ingredients: Vec<Ingredient>,
    pub fermenting: bool,
}

impl BrewRecord {
    #[must_use]
    pub fn new(id: String, name: String, notes: String) -> Self {
        Self {
            id,
            name,
            readings: Vec::new(),
            notes,
            ingredients: Vec::new(),
            fermenting: true,
        }
    }

    #[must_use]
    pub fn ingredients_total(&self) -> f64 {
        self.ingredients.iter().map(|i| i.cost).sum()
    }
}

/// One gravity sample. `date` is kept as entered; see [`crate::dates::parse_brew_date`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(default, deserialize_with = "lenient_text")]
    pub date: String,
    #[serde(rename = "SG", default, deserialize_with = "lenient_number")]
    pub sg: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub temp: Option<f64>,
}

impl Reading {
    /// Gravity in the decimal domain, if the sample holds a usable number.
    #[must_use]
    pub fn normalized_sg(&self) -> Option<f64> {
        self.sg.filter(|v| v.is_finite()).map(normalize_sg)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    #[serde(default, deserialize_with = "lenient_text")]
    pub item: String,
    #[serde(default, deserialize_with = "lenient_cost")]
    pub cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BrewStatus {
    New,
    Fermenting,
    Ready,
    Complete,
}

impl BrewStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BrewStatus::New => "NEW",
            BrewStatus::Fermenting => "FERMENTING",
            BrewStatus::Ready => "READY",
            BrewStatus::Complete => "COMPLETE",
        }
    }
}

impl fmt::Display for BrewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived, read-only view of a brew. Gravities are already normalized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrewStats {
    pub og: Option<f64>,
    pub current: Option<f64>,
    pub abv: Option<f64>,
    pub days: Option<i64>,
    pub count: usize,
    pub start_date: Option<NaiveDate>,
    pub status: BrewStatus,
}

/// Bring an SG sample into the decimal domain (1046 -> 1.046).
#[must_use]
pub fn normalize_sg(raw: f64) -> f64 {
    if raw > SG_SCALE_THRESHOLD {
        raw / 1000.0
    } else {
        raw
    }
}

/// Coerce a loosely-typed cell to text. Null and structured values become empty.
#[must_use]
pub fn text_from_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

/// Read a number out of a JSON number or a numeric string.
#[must_use]
pub fn number_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(|v| text_from_value(&v))
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(|v| number_from_value(&v))
}

fn lenient_cost<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(|v| {
        number_from_value(&v)
            .filter(|c| *c >= 0.0)
            .unwrap_or(0.0)
    })
}
