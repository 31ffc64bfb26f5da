//! Tolerant field decoders for the canonical model.
//!
//! Documents drift: counts arrive as strings, flags as 0/1, lists as a
//! single scalar. These `deserialize_with` helpers decode through a
//! `serde_json::Value` and coerce instead of failing, so one odd field never
//! discards a whole post.

use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Coerce a value into a non-negative count. Negative, fractional-negative
/// and unparseable inputs become 0.
pub fn value_to_count(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_i64().map(|_| 0))
            .or_else(|| n.as_f64().map(float_to_count))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(|n| u64::try_from(n).unwrap_or(0))
                .or_else(|_| s.parse::<f64>().map(float_to_count))
                .unwrap_or(0)
        }
        _ => 0,
    }
}

fn float_to_count(f: f64) -> u64 {
    if f.is_finite() && f > 0.0 {
        f.floor() as u64
    } else {
        0
    }
}

fn value_to_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn decode_elements<T: DeserializeOwned>(items: Vec<Value>) -> Vec<T> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| match serde_json::from_value(item) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                debug!("skipping undecodable element {}: {}", i, e);
                None
            }
        })
        .collect()
}

pub fn count<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    Ok(value_to_count(&Value::deserialize(d)?))
}

pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(value_to_flag(&Value::deserialize(d)?).unwrap_or(false))
}

pub fn opt_flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    Ok(value_to_flag(&Value::deserialize(d)?))
}

pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(value_to_text(&Value::deserialize(d)?).unwrap_or_default())
}

pub fn opt_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(value_to_text(&Value::deserialize(d)?))
}

/// Decode a nested record, falling back to its default when the value has the wrong shape.
pub fn record<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(d)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Like [`record`] but a null or mistyped value stays absent.
pub fn opt_record<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(serde_json::from_value(Value::deserialize(d)?).ok())
}

/// Decode a sequence; a non-array becomes empty and bad elements are skipped.
pub fn seq<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(d)? {
        Value::Array(items) => Ok(decode_elements(items)),
        _ => Ok(Vec::new()),
    }
}

/// Like [`seq`] but keeps "absent" distinct from "empty".
pub fn opt_seq<'de, D, T>(d: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(d)? {
        Value::Array(items) => Ok(Some(decode_elements(items))),
        _ => Ok(None),
    }
}

/// Decode a set-like list of strings: duplicates and blanks dropped, first
/// occurrence order kept. A bare string is split on commas.
pub fn string_set<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<String>>, D::Error> {
    let raw: Vec<String> = match Value::deserialize(d)? {
        Value::Array(items) => items.iter().filter_map(value_to_text).collect(),
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        _ => return Ok(None),
    };
    let mut set: Vec<String> = Vec::with_capacity(raw.len());
    for tag in raw {
        let tag = tag.trim();
        if !tag.is_empty() && !set.iter().any(|t| t == tag) {
            set.push(tag.to_string());
        }
    }
    Ok(Some(set))
}
