//! Parses the loosely-structured workflow payload into candidate records.
//!
//! The upstream workflow emits anything from a clean JSON array to a
//! double-encoded string with stray backslashes. The cascade below tries the
//! cheap interpretations first and falls back to best-effort string repair.
//! It never errors: failures surface as diagnostics on the outcome.

use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub records: Vec<Value>,
    pub parse_error: Option<String>,
    pub raw_content: Option<Value>,
}

impl ParseOutcome {
    fn records(records: Vec<Value>) -> Self {
        Self {
            records,
            ..Default::default()
        }
    }

    fn failure(message: String, raw: Value) -> Self {
        Self {
            records: Vec::new(),
            parse_error: Some(message),
            raw_content: Some(raw),
        }
    }
}

/// Interpret the aggregated workflow payload. First match wins:
/// array as-is, then string decoding (with repair fallbacks), then the
/// known object shapes.
pub fn parse(content: &Value) -> ParseOutcome {
    match content {
        Value::Array(items) => ParseOutcome::records(items.clone()),
        Value::String(s) => parse_string(s),
        Value::Object(obj) => {
            if let Some(records) = object_records(obj) {
                ParseOutcome::records(records)
            } else {
                ParseOutcome::failure(
                    "object payload has neither a data array nor city+content".to_string(),
                    content.clone(),
                )
            }
        }
        other => ParseOutcome::failure(
            format!("unsupported payload shape: {}", value_kind(other)),
            other.clone(),
        ),
    }
}

/// Records from the two recognized object shapes: a `data` array, or a
/// `city` + `content` pair flattened into a single record.
fn object_records(obj: &Map<String, Value>) -> Option<Vec<Value>> {
    if let Some(Value::Array(data)) = obj.get("data") {
        return Some(data.clone());
    }
    if obj.contains_key("city") && obj.contains_key("content") {
        return Some(vec![flatten_city_content(obj)]);
    }
    None
}

/// Flatten `{city, content: {...}}` into one record. The outer object's
/// picture keys always win over anything inside `content`, defaulting to
/// empty lists.
fn flatten_city_content(obj: &Map<String, Value>) -> Value {
    let mut record = Map::new();
    if let Some(city) = obj.get("city") {
        record.insert("city".to_string(), city.clone());
    }
    if let Some(Value::Object(content)) = obj.get("content") {
        for (key, value) in content {
            record.insert(key.clone(), value.clone());
        }
    }
    record.insert(
        "pictureAdvises".to_string(),
        obj.get("pictureAdvises").cloned().unwrap_or_else(|| json!([])),
    );
    record.insert(
        "pictures".to_string(),
        obj.get("pictures").cloned().unwrap_or_else(|| json!([])),
    );
    Value::Object(record)
}

fn parse_string(raw: &str) -> ParseOutcome {
    let trimmed = raw.trim();

    // A JSON-encoded string is one quoting layer too deep; peel exactly one.
    let (effective, first_err) = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::String(inner)) => match serde_json::from_str::<Value>(&inner) {
            Ok(value) => return ParseOutcome::from_decoded(value, raw),
            Err(e) => (inner, e),
        },
        Ok(value) => return ParseOutcome::from_decoded(value, raw),
        Err(e) => (trimmed.to_string(), e),
    };

    // The payload often wraps a JSON array in prose. Grab the widest
    // bracketed block and try that.
    if let Some(block) = bracketed_block(&effective) {
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(block) {
            debug!("Recovered record array from bracketed block");
            return ParseOutcome::records(items);
        }
    }

    let repaired = repair(&effective);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) => {
            debug!("Payload parsed after repair");
            ParseOutcome::from_decoded(value, raw)
        }
        Err(second_err) => ParseOutcome::failure(
            format!("parse failed: {first_err}; after repair: {second_err}"),
            Value::String(raw.to_string()),
        ),
    }
}

impl ParseOutcome {
    /// Route a successfully decoded string payload. Unlike the top-level
    /// object path, the city+content shape is checked before a `data`
    /// array, and an unrecognized object still becomes a single record
    /// rather than a diagnostic.
    fn from_decoded(value: Value, raw: &str) -> Self {
        match value {
            Value::Array(items) => ParseOutcome::records(items),
            Value::Object(obj) => {
                if obj.contains_key("city") && obj.contains_key("content") {
                    return ParseOutcome::records(vec![flatten_city_content(&obj)]);
                }
                match object_records(&obj) {
                    Some(records) => ParseOutcome::records(records),
                    None => ParseOutcome::records(vec![Value::Object(obj)]),
                }
            }
            other => ParseOutcome::failure(
                format!("string payload decoded to a {}", value_kind(&other)),
                Value::String(raw.to_string()),
            ),
        }
    }
}

/// Widest `[...]` span in the text.
fn bracketed_block(text: &str) -> Option<&str> {
    let re = Regex::new(r"(?s)\[.*\]").ok()?;
    re.find(text).map(|m| m.as_str())
}

/// Best-effort cleanup for the known upstream mangling: stray backslashes,
/// spaced-out separators, trailing commas.
fn repair(text: &str) -> String {
    let without_backslashes = text.replace('\\', "");
    let squeezed = Regex::new(r#""\s*([:,])\s*""#)
        .map(|re| re.replace_all(&without_backslashes, "\"$1\"").into_owned())
        .unwrap_or(without_backslashes);
    Regex::new(r",\s*([}\]])")
        .map(|re| re.replace_all(&squeezed, "$1").into_owned())
        .unwrap_or(squeezed)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
