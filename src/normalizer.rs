//! Entity payload normalization.
//!
//! The service returns entities either as a JSON-encoded string (often wrapped
//! in a markdown code fence) or as an already-decoded object, and does not
//! guarantee that every entity carries every field. Everything downstream of
//! [`normalize`] can assume a fully-shaped [`EntityCollection`].

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::error::{Result, ReviewError};
use crate::schema::{Coordinates, Entity, EntityCollection, EntityGroup};

/// Entity payload as received, before decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityPayload {
    RawString(String),
    Object(Value),
}

impl EntityPayload {
    /// Classify a response field once, at the service boundary.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(text) => Self::RawString(text),
            other => Self::Object(other),
        }
    }

    /// Verbatim text for the raw-JSON fallback view.
    pub fn raw_text(&self) -> String {
        match self {
            Self::RawString(text) => text.clone(),
            Self::Object(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
        }
    }
}

/// Decode and normalize an entity payload.
///
/// String payloads that fail to decode yield [`ReviewError::Parse`]; decoded
/// payloads whose top level is not an object yield [`ReviewError::Validation`].
pub fn normalize(payload: &EntityPayload) -> Result<EntityCollection> {
    let decoded;
    let value = match payload {
        EntityPayload::RawString(text) => {
            let body = strip_code_fence(text);
            decoded = serde_json::from_str::<Value>(body).map_err(|e| {
                warn!("Entity payload is not valid JSON: {}", e);
                ReviewError::Parse(format!("Failed to parse entities: {}", e))
            })?;
            &decoded
        }
        EntityPayload::Object(value) => value,
    };

    let categories = value.as_object().ok_or_else(|| {
        ReviewError::Validation(format!(
            "Invalid entity structure: expected an object, got {}",
            json_kind(value)
        ))
    })?;

    let collection = normalize_categories(categories);
    debug!("Normalized {} entity categories", collection.len());
    Ok(collection)
}

fn normalize_categories(categories: &Map<String, Value>) -> EntityCollection {
    categories
        .iter()
        .map(|(category, data)| {
            let group = match data {
                Value::Array(items) => EntityGroup::Many(items.iter().map(normalize_entity).collect()),
                Value::Object(_) => EntityGroup::Single(normalize_entity(data)),
                _ => EntityGroup::Single(Entity::default()),
            };
            (category.clone(), group)
        })
        .collect()
}

fn normalize_entity(item: &Value) -> Entity {
    let value = match item.get("value") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    };

    // Any coordinates object is completed field by field; nothing partial leaks.
    let coordinates = item
        .get("coordinates")
        .and_then(Value::as_object)
        .map(|coords| Coordinates {
            start_index: int_field(coords, "start_idx"),
            end_index: int_field(coords, "end_idx"),
            text_snippet: coords
                .get("text_snippet")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });

    Entity { value, coordinates }
}

fn int_field(coords: &Map<String, Value>, key: &str) -> i64 {
    match coords.get(key) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        _ => 0,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\r?\n?```\s*$")
            .expect("fence pattern is valid")
    })
}

/// Remove a surrounding markdown code fence (```` ```json ```` / ```` ```markdown ````).
pub fn strip_code_fence(text: &str) -> &str {
    match fence_regex().captures(text).and_then(|cap| cap.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => text.trim(),
    }
}
