//! Converts raw wire JSON cells into typed values per the column's recursive `typeSignature`.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;
use serde_json::Value;
use snafu::Snafu;

use crate::wire::{TypeSignature, WireColumn};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display(
        "could not convert {original_value:?} into a native value for Trino type {target_type:?}"
    ))]
    Conversion {
        original_value: String,
        target_type: String,
    },
}

/// A typed cell value. Container variants recurse; scalars map onto the closest native Rust
/// representation for the corresponding Trino wire type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Null,
    Json(Value),
    Decimal(BigDecimal),
    Date(NaiveDate),
    Time(NaiveTime),
    TimeWithZone(NaiveTime, String),
    Timestamp(NaiveDateTime),
    TimestampWithZone(chrono::DateTime<Tz>),
    Array(Vec<TypedValue>),
    Row(Vec<TypedValue>),
    Map(Vec<(TypedValue, TypedValue)>),
}

pub fn map_row(
    raw: &[Value],
    columns: &[WireColumn],
) -> Result<Vec<Value>, crate::error::Error> {
    raw.iter()
        .zip(columns.iter())
        .map(|(cell, column)| {
            let typed = map_cell(cell, &column.type_signature).map_err(|_| {
                crate::error::Error::DataConversion {
                    original_value: cell.to_string(),
                    target_type: column.type_name.clone(),
                }
            })?;
            Ok(typed_value_to_json(typed))
        })
        .collect()
}

/// Render a [`TypedValue`] back into a JSON value for callers that don't need the distinct
/// Rust types — integration tests and the bench tool both consume rows this way.
fn typed_value_to_json(value: TypedValue) -> Value {
    match value {
        TypedValue::Null => Value::Null,
        TypedValue::Json(v) => v,
        TypedValue::Decimal(d) => Value::String(d.to_string()),
        TypedValue::Date(d) => Value::String(d.to_string()),
        TypedValue::Time(t) => Value::String(t.to_string()),
        TypedValue::TimeWithZone(t, zone) => Value::String(format!("{t}{zone}")),
        TypedValue::Timestamp(ts) => Value::String(ts.to_string()),
        TypedValue::TimestampWithZone(ts) => Value::String(ts.to_rfc3339()),
        TypedValue::Array(items) => Value::Array(items.into_iter().map(typed_value_to_json).collect()),
        TypedValue::Row(items) => Value::Array(items.into_iter().map(typed_value_to_json).collect()),
        TypedValue::Map(pairs) => Value::Array(
            pairs
                .into_iter()
                .map(|(k, v)| Value::Array(vec![typed_value_to_json(k), typed_value_to_json(v)]))
                .collect(),
        ),
    }
}

pub fn map_cell(value: &Value, signature: &TypeSignature) -> Result<TypedValue, Error> {
    if value.is_null() {
        return Ok(TypedValue::Null);
    }

    let raw_type = signature.raw_type.as_str();

    if raw_type == "array" {
        let element_type = signature
            .arguments
            .first()
            .and_then(|a| a.as_type_signature())
            .ok_or_else(|| conversion_error(value, raw_type))?;
        let items = value.as_array().ok_or_else(|| conversion_error(value, raw_type))?;
        let mapped = items
            .iter()
            .map(|item| map_cell(item, &element_type))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(TypedValue::Array(mapped));
    }

    if raw_type == "row" {
        let field_types: Vec<TypeSignature> = signature
            .arguments
            .iter()
            .filter_map(|a| a.as_type_signature())
            .collect();
        let items = value.as_array().ok_or_else(|| conversion_error(value, raw_type))?;
        let mapped = items
            .iter()
            .zip(field_types.iter())
            .map(|(item, field_type)| map_cell(item, field_type))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(TypedValue::Row(mapped));
    }

    if raw_type == "map" {
        let mut arg_iter = signature.arguments.iter().filter_map(|a| a.as_type_signature());
        let key_type = arg_iter.next().ok_or_else(|| conversion_error(value, raw_type))?;
        let value_type = arg_iter.next().ok_or_else(|| conversion_error(value, raw_type))?;
        let entries = value.as_object().ok_or_else(|| conversion_error(value, raw_type))?;
        let mut mapped = Vec::with_capacity(entries.len());
        for (key, val) in entries {
            // JSON object keys are always strings; re-wrap so non-string key types still run
            // through the same mapper instead of a separate decode path.
            let mapped_key = map_cell(&Value::String(key.clone()), &key_type)?;
            let mapped_value = map_cell(val, &value_type)?;
            mapped.push((mapped_key, mapped_value));
        }
        return Ok(TypedValue::Map(mapped));
    }

    if raw_type.contains("decimal") {
        let text = value.as_str().ok_or_else(|| conversion_error(value, raw_type))?;
        let decimal = BigDecimal::from_str(text).map_err(|_| conversion_error(value, raw_type))?;
        return Ok(TypedValue::Decimal(decimal));
    }

    if raw_type == "double" || raw_type == "real" {
        if let Some(text) = value.as_str() {
            return match text {
                "Infinity" => Ok(TypedValue::Json(Value::from(f64::INFINITY))),
                "-Infinity" => Ok(TypedValue::Json(Value::from(f64::NEG_INFINITY))),
                "NaN" => Ok(TypedValue::Json(Value::from(f64::NAN))),
                _ => Ok(TypedValue::Json(value.clone())),
            };
        }
        return Ok(TypedValue::Json(value.clone()));
    }

    if raw_type == "date" {
        let text = value.as_str().ok_or_else(|| conversion_error(value, raw_type))?;
        let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map_err(|_| conversion_error(value, raw_type))?;
        return Ok(TypedValue::Date(date));
    }

    if raw_type == "timestamp with time zone" {
        let text = value.as_str().ok_or_else(|| conversion_error(value, raw_type))?;
        return parse_timestamp_with_zone(text).map_err(|_| conversion_error(value, raw_type));
    }

    if raw_type.starts_with("timestamp") {
        let text = value.as_str().ok_or_else(|| conversion_error(value, raw_type))?;
        let parsed = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
            .map_err(|_| conversion_error(value, raw_type))?;
        return Ok(TypedValue::Timestamp(parsed));
    }

    if raw_type == "time with time zone" {
        let text = value.as_str().ok_or_else(|| conversion_error(value, raw_type))?;
        return parse_time_with_zone(text).map_err(|_| conversion_error(value, raw_type));
    }

    if raw_type.starts_with("time") {
        let text = value.as_str().ok_or_else(|| conversion_error(value, raw_type))?;
        let parsed = NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
            .map_err(|_| conversion_error(value, raw_type))?;
        return Ok(TypedValue::Time(parsed));
    }

    // boolean, tinyint/smallint/integer/bigint, varchar, char, varbinary, json, and anything
    // else: identity passthrough of the decoded JSON scalar.
    Ok(TypedValue::Json(value.clone()))
}

fn parse_timestamp_with_zone(text: &str) -> Result<TypedValue, ()> {
    let (timestamp_part, zone_part) = text.rsplit_once(' ').ok_or(())?;
    if zone_part.starts_with('+') || zone_part.starts_with('-') {
        let combined = format!("{timestamp_part}{zone_part}");
        let parsed = chrono::DateTime::parse_from_str(&combined, "%Y-%m-%d %H:%M:%S%.f%z")
            .map_err(|_| ())?;
        let tz: Tz = "UTC".parse().expect("UTC is always a valid zone");
        return Ok(TypedValue::TimestampWithZone(parsed.with_timezone(&tz)));
    }

    let naive = NaiveDateTime::parse_from_str(timestamp_part, "%Y-%m-%d %H:%M:%S%.f").map_err(|_| ())?;
    let tz: Tz = zone_part.parse().map_err(|_| ())?;
    // Localize the wall-clock time to the named zone directly, rather than treating it as
    // UTC and converting, so "10:00 Europe/Vienna" stays 10:00 Vienna.
    let localized = match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _latest) => earliest,
        LocalResult::None => return Err(()),
    };
    Ok(TypedValue::TimestampWithZone(localized))
}

fn parse_time_with_zone(text: &str) -> Result<TypedValue, ()> {
    let split_at = text
        .char_indices()
        .skip(1)
        .find(|(_, c)| *c == '+' || *c == '-')
        .map(|(idx, _)| idx)
        .ok_or(())?;
    let (time_part, zone_part) = text.split_at(split_at);
    let time = NaiveTime::parse_from_str(time_part, "%H:%M:%S%.f").map_err(|_| ())?;
    Ok(TypedValue::TimeWithZone(time, zone_part.to_string()))
}

fn conversion_error(value: &Value, raw_type: &str) -> Error {
    ConversionSnafu {
        original_value: value.to_string(),
        target_type: raw_type.to_string(),
    }
    .build()
}
