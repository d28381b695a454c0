use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Canonical layout every parsed date is rendered with.
pub const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d";
pub const CANONICAL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single non-null cell. Missing values are modelled as `Option<Value>::None`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Decimal(Decimal),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

pub type Cell = Option<Value>;

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            Value::Decimal(d) => d.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Date(d) => d.format(CANONICAL_DATE_FORMAT).to_string(),
            Value::DateTime(dt) => dt.format(CANONICAL_DATETIME_FORMAT).to_string(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Decimal(d) => d.to_string().parse().ok(),
            Value::String(s) => s.trim().parse().ok(),
            Value::Boolean(_) | Value::Date(_) | Value::DateTime(_) => None,
        }
    }

    /// Orders values of compatible kinds; mixed kinds fall back to their display form.
    pub fn compare(&self, other: &Value) -> std::cmp::Ordering {
        match (self, other) {
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::Date(a), Value::DateTime(b)) => a.and_hms_opt(0, 0, 0).map_or(
                std::cmp::Ordering::Less,
                |start| start.cmp(b),
            ),
            (Value::DateTime(a), Value::Date(b)) => b.and_hms_opt(0, 0, 0).map_or(
                std::cmp::Ordering::Greater,
                |start| a.cmp(&start),
            ),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => self.as_display().cmp(&other.as_display()),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

pub fn render_cell(cell: &Cell) -> String {
    cell.as_ref().map(Value::as_display).unwrap_or_default()
}

fn is_placeholder_token(lowered: &str) -> bool {
    matches!(
        lowered,
        "na" | "n/a" | "nan" | "null" | "none" | "#n/a" | "<na>" | "nat"
    )
}

/// Types a raw delimited-text field the way a spreadsheet reader would: blanks and
/// placeholders become null, plain numbers become numeric, everything else stays text.
/// A number is only typed when it renders back to the same text, so leading zeros,
/// explicit signs, trailing fractional zeros and out-of-range integers survive as text.
pub fn infer_cell(raw: &str) -> Cell {
    let trimmed = raw.trim();
    if trimmed.is_empty() || is_placeholder_token(&trimmed.to_ascii_lowercase()) {
        return None;
    }
    if looks_numeric(trimmed) {
        let typed = trimmed
            .parse::<i64>()
            .map(Value::Integer)
            .or_else(|_| trimmed.parse::<f64>().map(Value::Float))
            .ok()
            .filter(|value| value.as_display() == trimmed);
        if typed.is_some() {
            return typed;
        }
    }
    Some(Value::String(raw.to_string()))
}

fn looks_numeric(value: &str) -> bool {
    let body = value.strip_prefix(['-', '+']).unwrap_or(value);
    let mut seen_digit = false;
    let mut seen_dot = false;
    for ch in body.chars() {
        match ch {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return false,
        }
    }
    seen_digit
}
