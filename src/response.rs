//! Parsing of model replies into JSON records
//!
//! Models often wrap JSON in a markdown fence. Parsing here is fail-soft:
//! anything that is not a JSON array is logged with the raw reply and
//! yields `None`, which callers turn into an empty result.

use crate::PdfError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static LEADING_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[ \t]*(?i:json)?[ \t]*\r?\n?").unwrap());

static TRAILING_FENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n?```$").unwrap());

/// Remove a leading ``` / ```json marker and a trailing ``` marker
pub fn strip_code_fence(raw: &str) -> &str {
    let mut content = raw.trim();
    if let Some(m) = LEADING_FENCE_RE.find(content) {
        content = &content[m.end()..];
    }
    if let Some(m) = TRAILING_FENCE_RE.find(content) {
        content = &content[..m.start()];
    }
    content.trim()
}

/// Parse a reply as a JSON array of objects
pub fn parse_json_array(raw: &str) -> Result<Vec<Map<String, Value>>, PdfError> {
    let content = strip_code_fence(raw);
    let value: Value =
        serde_json::from_str(content).map_err(|e| PdfError::MalformedResponse(e.to_string()))?;

    let Value::Array(items) = value else {
        return Err(PdfError::MalformedResponse(
            "expected a JSON array at top level".to_string(),
        ));
    };

    let total = items.len();
    let objects: Vec<Map<String, Value>> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();

    if objects.len() < total {
        log::warn!(
            "Skipped {} non-object entries in model response",
            total - objects.len()
        );
    }

    Ok(objects)
}

/// Parse a reply, logging the raw text and returning `None` on failure
pub(crate) fn parse_or_log(raw: &str, what: &str) -> Option<Vec<Map<String, Value>>> {
    match parse_json_array(raw) {
        Ok(objects) => Some(objects),
        Err(e) => {
            log::error!("Error parsing {} response: {}", what, e);
            log::error!("Response content: {}", raw);
            None
        }
    }
}

pub(crate) fn get_string(map: &Map<String, Value>, key: &str, default: &str) -> String {
    match map.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => default.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Numeric coercion; non-finite values ("NaN", "inf") fall back to `default`
pub(crate) fn get_f64(map: &Map<String, Value>, key: &str, default: f64) -> f64 {
    let value = match map.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    value.filter(|v| v.is_finite()).unwrap_or(default)
}

/// Integer coercion; fractional values are truncated
pub(crate) fn get_u32(map: &Map<String, Value>, key: &str, default: u32) -> u32 {
    let raw = get_f64(map, key, f64::from(default));
    if raw.is_finite() && raw >= 0.0 && raw <= f64::from(u32::MAX) {
        raw as u32
    } else {
        default
    }
}

pub(crate) fn get_bool(map: &Map<String, Value>, key: &str, default: bool) -> bool {
    match map.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => true,
            "false" | "no" => false,
            _ => default,
        },
        _ => default,
    }
}
