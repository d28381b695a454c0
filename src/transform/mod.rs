//! Field-level value transformations.
//!
//! Every transform is a pure `Cell -> Cell` function. Nulls pass through untouched and
//! a value the transform cannot handle comes back unchanged; the failure is logged
//! with the offending value and counted in [`TransformStats`], never raised.
//!
//! Transform kinds are resolved into the closed [`Transform`] enum when the mapping
//! specification is deserialized, so no string matching happens per value.

pub mod codes;
pub mod custom;
pub mod string_ops;
pub mod temporal;

use std::{collections::HashMap, str::FromStr};

use anyhow::{Result, anyhow, bail};
use log::{debug, warn};
use rust_decimal::{Decimal, RoundingStrategy, prelude::FromPrimitive, prelude::ToPrimitive};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::data::{CANONICAL_DATE_FORMAT, CANONICAL_DATETIME_FORMAT, Cell, Value};

pub use custom::CustomRule;

const DEFAULT_DECIMAL_PRECISION: u32 = 15;
const DEFAULT_DECIMAL_SCALE: u32 = 2;
const LOGGED_FAILURES_PER_MAPPING: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    Decimal { precision: u32, scale: u32 },
    Integer,
    /// A cast target this engine does not implement; values pass through.
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseStyle {
    Upper,
    Lower,
    #[default]
    Proper,
    /// Only trims.
    Preserve,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Literal substitutions keyed by uppercased input.
    Table(HashMap<String, Value>),
    CountryAlpha3,
    CurrencyIso4217,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeSpec {
    pub case: CaseStyle,
    pub lookup: Option<Lookup>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(from = "RawTransform")]
pub enum Transform {
    #[default]
    Identity,
    Cast(CastKind),
    ParseDate,
    ParseDatetime,
    StringNormalize(NormalizeSpec),
    CurrencyNormalize,
    Custom(CustomRule),
}

#[derive(Debug, Deserialize)]
struct RawTransform {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    params: JsonValue,
}

impl From<RawTransform> for Transform {
    fn from(raw: RawTransform) -> Self {
        let params = &raw.params;
        match raw.kind.trim().to_ascii_lowercase().as_str() {
            "" | "identity" => Transform::Identity,
            "cast" => Transform::Cast(cast_kind(params)),
            "parse_date" => Transform::ParseDate,
            "parse_datetime" => Transform::ParseDatetime,
            "string_normalize" => Transform::StringNormalize(normalize_spec(params)),
            "currency_normalize" => Transform::CurrencyNormalize,
            "custom" => {
                let rule = param_str(params, "rule")
                    .or_else(|| param_str(params, "kind"))
                    .unwrap_or_default();
                Transform::Custom(CustomRule::classify(rule))
            }
            other => {
                warn!("Unknown transform type '{other}'; values will pass through unchanged");
                Transform::Identity
            }
        }
    }
}

fn param_str<'a>(params: &'a JsonValue, key: &str) -> Option<&'a str> {
    params.get(key).and_then(JsonValue::as_str)
}

fn param_u32(params: &JsonValue, key: &str) -> Option<u32> {
    params
        .get(key)
        .and_then(JsonValue::as_u64)
        .and_then(|v| u32::try_from(v).ok())
}

fn cast_kind(params: &JsonValue) -> CastKind {
    match param_str(params, "type").map(str::to_ascii_lowercase).as_deref() {
        Some("decimal") => CastKind::Decimal {
            precision: param_u32(params, "precision").unwrap_or(DEFAULT_DECIMAL_PRECISION),
            scale: param_u32(params, "scale").unwrap_or(DEFAULT_DECIMAL_SCALE),
        },
        Some("integer") | Some("int") => CastKind::Integer,
        _ => CastKind::Unsupported,
    }
}

fn normalize_spec(params: &JsonValue) -> NormalizeSpec {
    let case = match param_str(params, "case").map(str::to_ascii_lowercase).as_deref() {
        Some("upper") => CaseStyle::Upper,
        Some("lower") => CaseStyle::Lower,
        Some("proper") | None => CaseStyle::Proper,
        Some(_) => CaseStyle::Preserve,
    };
    let lookup = match params.get("mapping") {
        Some(JsonValue::Object(entries)) if !entries.is_empty() => Some(Lookup::Table(
            entries
                .iter()
                .filter_map(|(key, value)| {
                    json_to_value(value).map(|v| (key.trim().to_uppercase(), v))
                })
                .collect(),
        )),
        Some(JsonValue::String(name)) => match name.as_str() {
            "iso_3166_alpha3" => Some(Lookup::CountryAlpha3),
            "iso_4217" => Some(Lookup::CurrencyIso4217),
            other => {
                debug!("Ignoring unknown named lookup '{other}'");
                None
            }
        },
        _ => None,
    };
    NormalizeSpec { case, lookup }
}

fn json_to_value(value: &JsonValue) -> Option<Value> {
    match value {
        JsonValue::String(s) => Some(Value::String(s.clone())),
        JsonValue::Bool(b) => Some(Value::Boolean(*b)),
        JsonValue::Number(n) => n
            .as_i64()
            .map(Value::Integer)
            .or_else(|| n.as_f64().map(Value::Float)),
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}

/// Per-mapping counters for values that passed through because the transform could
/// not handle them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformStats {
    pub applied: usize,
    pub failures: usize,
}

impl TransformStats {
    pub fn absorb(&mut self, other: &TransformStats) {
        self.applied += other.applied;
        self.failures += other.failures;
    }
}

impl Transform {
    pub fn label(&self) -> String {
        match self {
            Transform::Identity => "identity".into(),
            Transform::Cast(CastKind::Decimal { precision, scale }) => {
                format!("cast(decimal {precision},{scale})")
            }
            Transform::Cast(CastKind::Integer) => "cast(integer)".into(),
            Transform::Cast(CastKind::Unsupported) => "cast(unsupported)".into(),
            Transform::ParseDate => "parse_date".into(),
            Transform::ParseDatetime => "parse_datetime".into(),
            Transform::StringNormalize(spec) => {
                let case = match spec.case {
                    CaseStyle::Upper => "upper",
                    CaseStyle::Lower => "lower",
                    CaseStyle::Proper => "proper",
                    CaseStyle::Preserve => "trim",
                };
                match &spec.lookup {
                    Some(Lookup::Table(table)) => {
                        format!("string_normalize({case}, {} substitution(s))", table.len())
                    }
                    Some(Lookup::CountryAlpha3) => format!("string_normalize({case}, iso_3166_alpha3)"),
                    Some(Lookup::CurrencyIso4217) => format!("string_normalize({case}, iso_4217)"),
                    None => format!("string_normalize({case})"),
                }
            }
            Transform::CurrencyNormalize => "currency_normalize".into(),
            Transform::Custom(rule) => format!("custom({})", rule.label()),
        }
    }

    pub fn is_identifier_generation(&self) -> bool {
        matches!(self, Transform::Custom(CustomRule::DeterministicId))
    }

    /// Applies the transform, discarding failure bookkeeping.
    pub fn apply(&self, cell: &Cell) -> Cell {
        self.apply_tracked(cell, &mut TransformStats::default())
    }

    /// Applies the transform; a failing value is logged, counted and returned as-is.
    pub fn apply_tracked(&self, cell: &Cell, stats: &mut TransformStats) -> Cell {
        let value = cell.as_ref()?;
        stats.applied += 1;
        match self.try_apply(value) {
            Ok(result) => Some(result),
            Err(err) => {
                stats.failures += 1;
                if stats.failures <= LOGGED_FAILURES_PER_MAPPING {
                    warn!("{} left value '{}' unchanged: {err}", self.label(), value);
                } else {
                    debug!("{} left value '{}' unchanged: {err}", self.label(), value);
                }
                Some(value.clone())
            }
        }
    }

    fn try_apply(&self, value: &Value) -> Result<Value> {
        match self {
            Transform::Identity => Ok(value.clone()),
            Transform::Cast(kind) => cast(value, *kind),
            Transform::ParseDate => parse_date(value),
            Transform::ParseDatetime => parse_datetime(value),
            Transform::StringNormalize(spec) => Ok(normalize(value, spec)),
            Transform::CurrencyNormalize => Ok(Value::String(codes::currency_iso4217(
                &value.as_display(),
            ))),
            Transform::Custom(rule) => Ok(apply_custom(value, *rule)),
        }
    }
}

fn cast(value: &Value, kind: CastKind) -> Result<Value> {
    match kind {
        CastKind::Decimal { precision, scale } => {
            let decimal = to_decimal(value)?;
            let rounded = decimal.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
            let integer_digits = integer_digit_count(&rounded);
            let allowed = precision.saturating_sub(scale) as usize;
            if integer_digits > allowed {
                bail!("{integer_digits} integer digit(s) exceed decimal({precision},{scale})");
            }
            Ok(Value::Decimal(rounded))
        }
        CastKind::Integer => {
            let truncated = to_decimal(value)?.trunc();
            truncated
                .to_i64()
                .map(Value::Integer)
                .ok_or_else(|| anyhow!("{truncated} does not fit a 64-bit integer"))
        }
        CastKind::Unsupported => Ok(value.clone()),
    }
}

fn to_decimal(value: &Value) -> Result<Decimal> {
    match value {
        Value::Decimal(d) => Ok(*d),
        Value::Integer(i) => Ok(Decimal::from(*i)),
        Value::Float(f) => {
            Decimal::from_f64(*f).ok_or_else(|| anyhow!("{f} is not representable as decimal"))
        }
        Value::String(s) => {
            let trimmed = s.trim();
            Decimal::from_str(trimmed)
                .or_else(|_| Decimal::from_scientific(trimmed))
                .map_err(|_| anyhow!("'{s}' is not numeric"))
        }
        Value::Boolean(_) | Value::Date(_) | Value::DateTime(_) => {
            bail!("{value:?} cannot be cast to a number")
        }
    }
}

fn integer_digit_count(value: &Decimal) -> usize {
    let whole = value.trunc().abs();
    if whole.is_zero() {
        0
    } else {
        whole.to_string().len()
    }
}

fn parse_date(value: &Value) -> Result<Value> {
    let date = match value {
        Value::Date(d) => *d,
        Value::DateTime(dt) => dt.date(),
        other => temporal::parse_naive_date(&other.as_display())?,
    };
    Ok(Value::String(date.format(CANONICAL_DATE_FORMAT).to_string()))
}

fn parse_datetime(value: &Value) -> Result<Value> {
    match value {
        Value::DateTime(dt) => Ok(Value::String(
            dt.format(CANONICAL_DATETIME_FORMAT).to_string(),
        )),
        Value::Date(_) => parse_date(value),
        other => match temporal::parse_naive_datetime(&other.as_display()) {
            Ok(dt) => Ok(Value::String(
                dt.format(CANONICAL_DATETIME_FORMAT).to_string(),
            )),
            Err(_) => parse_date(other),
        },
    }
}

fn normalize(value: &Value, spec: &NormalizeSpec) -> Value {
    let original = value.as_display();
    let trimmed = original.trim();
    let cased = match spec.case {
        CaseStyle::Upper => string_ops::uppercase(trimmed),
        CaseStyle::Lower => string_ops::lowercase(trimmed),
        CaseStyle::Proper => string_ops::proper_case(trimmed),
        CaseStyle::Preserve => trimmed.into(),
    };
    match &spec.lookup {
        Some(Lookup::Table(table)) => table
            .get(&cased.to_uppercase())
            .or_else(|| table.get(&trimmed.to_uppercase()))
            .cloned()
            .unwrap_or_else(|| Value::String(cased.into_owned())),
        Some(Lookup::CountryAlpha3) => Value::String(codes::country_alpha3(&cased)),
        Some(Lookup::CurrencyIso4217) => Value::String(codes::currency_iso4217(&cased)),
        None => Value::String(cased.into_owned()),
    }
}

fn apply_custom(value: &Value, rule: CustomRule) -> Value {
    match rule {
        CustomRule::PhoneE164 => custom::phone_e164(&value.as_display())
            .map(Value::String)
            .unwrap_or_else(|| value.clone()),
        CustomRule::DeterministicId => {
            Value::String(custom::deterministic_id(&value.as_display()))
        }
        CustomRule::Passthrough => value.clone(),
    }
}
