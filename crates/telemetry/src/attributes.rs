//! Ordered-fallback lookup over span attribute bags.
//!
//! Tracing SDKs flatten nested data inconsistently: the same field may
//! arrive as a dotted key (`ai.telemetry.metadata.userId`), as a nested
//! object under a shorter key, or inside a JSON document stored as a string.
//! Every lookup here tolerates all three and treats malformed JSON as absent.

use serde_json::Value;
use std::borrow::Cow;

use crate::model::Attributes;

/// An attribute that may hold a JSON document either already decoded or
/// still encoded as a string.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaybeJson<'a> {
    /// JSON text that still needs parsing.
    Raw(&'a str),
    /// An object or array the SDK kept structured.
    Parsed(&'a Value),
    /// Missing, null, or a scalar that cannot hold structure.
    Absent,
}

impl<'a> MaybeJson<'a> {
    /// Classify a raw attribute value.
    pub fn from_value(value: Option<&'a Value>) -> Self {
        match value {
            Some(Value::String(raw)) => Self::Raw(raw),
            Some(v @ (Value::Object(_) | Value::Array(_))) => Self::Parsed(v),
            _ => Self::Absent,
        }
    }

    /// Decode into a single JSON value. Unparsable text yields `None`.
    pub fn decode(self) -> Option<Cow<'a, Value>> {
        match self {
            Self::Raw(raw) => serde_json::from_str(raw).ok().map(Cow::Owned),
            Self::Parsed(value) => Some(Cow::Borrowed(value)),
            Self::Absent => None,
        }
    }
}

/// Return the first candidate key that resolves to a non-null value.
///
/// Each key is tried as a direct attribute first. Dotted keys are then
/// split at every `.`, longest root first; the root's value is decoded
/// (parsing JSON strings) and the remaining segments are walked through
/// nested objects.
pub fn get_attr<'a, K: AsRef<str>>(attrs: &'a Attributes, keys: &[K]) -> Option<Cow<'a, Value>> {
    keys.iter().find_map(|key| lookup(attrs, key.as_ref()))
}

/// First candidate that yields a usable token count.
pub fn first_count<K: AsRef<str>>(attrs: &Attributes, keys: &[K]) -> Option<u64> {
    keys.iter()
        .find_map(|key| lookup(attrs, key.as_ref()).and_then(|v| as_count(&v)))
}

/// First candidate that yields non-blank text.
pub fn first_text<K: AsRef<str>>(attrs: &Attributes, keys: &[K]) -> Option<String> {
    keys.iter()
        .find_map(|key| lookup(attrs, key.as_ref()).and_then(|v| as_text(&v)))
}

fn lookup<'a>(attrs: &'a Attributes, key: &str) -> Option<Cow<'a, Value>> {
    if let Some(value) = attrs.get(key).filter(|v| !v.is_null()) {
        return Some(Cow::Borrowed(value));
    }

    for (split, _) in key.rmatch_indices('.') {
        let (root, rest) = (&key[..split], &key[split + 1..]);
        let Some(root_value) = attrs.get(root) else {
            continue;
        };
        let path: Vec<&str> = rest.split('.').collect();
        if let Some(found) = descend(root_value, &path) {
            return Some(found);
        }
    }

    None
}

fn descend<'a>(root: &'a Value, path: &[&str]) -> Option<Cow<'a, Value>> {
    match MaybeJson::from_value(Some(root)).decode()? {
        Cow::Borrowed(value) => walk(value, path).map(Cow::Borrowed),
        Cow::Owned(value) => walk(&value, path).cloned().map(Cow::Owned),
    }
}

fn walk<'v>(mut current: &'v Value, path: &[&str]) -> Option<&'v Value> {
    for part in path {
        current = current.as_object()?.get(*part)?;
    }
    (!current.is_null()).then_some(current)
}

/// Interpret a value as a non-negative token count.
///
/// Accepts integers, finite non-negative floats (rounded) and numeric
/// strings.
pub fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(float_count)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<u64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().and_then(float_count))
        }
        _ => None,
    }
}

fn float_count(f: f64) -> Option<u64> {
    (f.is_finite() && f >= 0.0).then(|| f.round() as u64)
}

/// Interpret a scalar value as text. Blank strings are treated as absent.
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
