//! Lenient field deserializers for model output.
//!
//! The envelope of a model response is parsed strictly; individual fields
//! are tolerant of `null`, bare strings where a list is expected, and
//! numbers where a string is expected.

use std::collections::BTreeSet;

use serde::de::{self, Deserializer};
use serde::Deserialize;

/// Accept a string, number, bool or `null` (→ empty string).
pub fn flexible_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value_to_string(&value))
}

/// Accept `null` (→ `None`) or anything [`flexible_string`] accepts.
pub fn optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let s = value_to_string(&value);
    Ok(if s.is_empty() { None } else { Some(s) })
}

/// Accept an array of scalars, a single comma-separated string, or `null`.
/// Blank entries are dropped and every entry is trimmed.
pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Null => Ok(Vec::new()),
        serde_json::Value::String(s) => Ok(split_list(&s)),
        serde_json::Value::Array(items) => Ok(items
            .iter()
            .map(value_to_string)
            .filter(|s| !s.is_empty())
            .collect()),
        other => Err(de::Error::invalid_type(
            unexpected(&other),
            &"an array of strings or a comma-separated string",
        )),
    }
}

/// Same as [`string_list`] but collected into an ordered set.
pub fn string_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(string_list(deserializer)?.into_iter().collect())
}

/// Accept a bool, `"true"`/`"false"` strings, or `null` (→ false).
pub fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        serde_json::Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    })
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split([',', ';'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn unexpected(value: &serde_json::Value) -> de::Unexpected<'_> {
    match value {
        serde_json::Value::Bool(b) => de::Unexpected::Bool(*b),
        serde_json::Value::Number(_) => de::Unexpected::Other("number"),
        serde_json::Value::Object(_) => de::Unexpected::Map,
        _ => de::Unexpected::Other("value"),
    }
}
