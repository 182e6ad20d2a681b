use std::str::FromStr;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::errors::RecordError;

const ENGINE_LABELS: &[(&str, &str)] = &[
    ("mysql", "mysql"),
    ("postgresql", "postgres"),
    ("postgres", "postgres"),
    ("aurora mysql", "aurora-mysql"),
    ("aurora", "aurora-mysql"),
    ("aurora postgresql", "aurora-postgresql"),
    ("mariadb", "mariadb"),
    ("oracle", "oracle-se2"),
    ("oracle se2", "oracle-se2"),
    ("oracle ee", "oracle-ee"),
    ("sql server", "sqlserver-se"),
    ("sqlserver", "sqlserver-se"),
    ("sql server ee", "sqlserver-ee"),
    ("sql server web", "sqlserver-web"),
    ("sql server ex", "sqlserver-ex"),
    ("redis", "redis"),
    ("memcached", "memcached"),
    ("valkey", "valkey"),
];

/// Maps provider engine labels (`Aurora PostgreSQL`, `SQL Server`) to engine
/// ids; unknown labels are lowercased with spaces turned into hyphens.
pub fn normalize_engine(label: &str) -> String {
    let trimmed = label.trim();
    let lowered = trimmed.to_lowercase().replace(['-', '_'], " ");
    if let Some((_, engine)) = ENGINE_LABELS.iter().find(|(known, _)| *known == lowered) {
        return (*engine).to_string();
    }

    lowered.split_whitespace().collect::<Vec<_>>().join("-")
}

/// Decimal parse first, then integer parse, then scientific notation.
pub fn parse_decimal_text(text: &str) -> Option<Decimal> {
    let trimmed = text.trim();
    Decimal::from_str(trimmed)
        .ok()
        .or_else(|| trimmed.parse::<i64>().ok().map(Decimal::from))
        .or_else(|| Decimal::from_scientific(trimmed).ok())
}

fn decimal_from_value(value: &Value) -> Option<Option<Decimal>> {
    match value {
        Value::Null => Some(None),
        Value::String(text) if text.trim().is_empty() => Some(None),
        Value::String(text) => parse_decimal_text(text).map(Some),
        Value::Number(number) => number
            .as_i64()
            .map(Decimal::from)
            .or_else(|| number.as_u64().map(Decimal::from))
            .or_else(|| number.as_f64().and_then(Decimal::from_f64))
            .map(Some),
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Monetary or percentage field; absent values default to zero.
pub fn parse_amount(field: &'static str, value: Option<&Value>) -> Result<Decimal, RecordError> {
    let Some(value) = value else {
        return Ok(Decimal::ZERO);
    };

    match decimal_from_value(value) {
        Some(amount) => Ok(amount.unwrap_or(Decimal::ZERO)),
        None => Err(RecordError::InvalidAmount { field, value: value.to_string() }),
    }
}

/// Recommended quantity. Upstream sends `"5"` or `"5.0"`; fractions truncate.
pub fn parse_quantity(field: &'static str, value: Option<&Value>) -> Result<u32, RecordError> {
    let raw = value.ok_or(RecordError::MissingField(field))?;
    let quantity = match decimal_from_value(raw) {
        Some(Some(quantity)) => quantity,
        Some(None) => return Err(RecordError::MissingField(field)),
        None => return Err(RecordError::InvalidQuantity(raw.to_string())),
    };

    if quantity.is_sign_negative() && !quantity.is_zero() {
        return Err(RecordError::InvalidQuantity(raw.to_string()));
    }

    quantity.trunc().to_u32().ok_or_else(|| RecordError::InvalidQuantity(raw.to_string()))
}

pub fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|text| text.trim().to_string()).filter(|text| !text.is_empty())
}

pub fn required(value: Option<String>, field: &'static str) -> Result<String, RecordError> {
    non_empty(value).ok_or(RecordError::MissingField(field))
}
