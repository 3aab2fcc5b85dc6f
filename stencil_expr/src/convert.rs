//! Conversion between document values and runtime values.
//!
//! Everything leaving the evaluator becomes `serde_json::Value`; nested
//! sequences and mappings convert recursively in both directions. Whole
//! numbers bind as signed integers so document values compare naturally with
//! integer literals.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use cel::Value;
use cel::objects::Key;
use serde_json::{Map as JsonMap, Number, Value as Json};

/// To_cel converts a document value into a runtime value.
pub(crate) fn to_cel(value: &Json) -> Value {
    match value {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                Value::UInt(u)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Json::String(s) => Value::String(Arc::new(s.clone())),
        Json::Array(items) => Value::List(Arc::new(items.iter().map(to_cel).collect())),
        Json::Object(m) => {
            let out: HashMap<Key, Value> = m
                .iter()
                .map(|(k, v)| (Key::String(Arc::new(k.clone())), to_cel(v)))
                .collect();
            Value::Map(out.into())
        }
    }
}

/// To_json converts a runtime value into a document value.
///
/// Bytes become their base64 text. Functions, durations, and timestamps have
/// no document representation and are reported as errors.
pub(crate) fn to_json(value: &Value) -> Result<Json, String> {
    Ok(match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::Number((*i).into()),
        Value::UInt(u) => Json::Number((*u).into()),
        Value::Float(f) => Json::Number(
            Number::from_f64(*f).ok_or_else(|| format!("non-finite number {f}"))?,
        ),
        Value::String(s) => Json::String(s.to_string()),
        Value::Bytes(b) => Json::String(BASE64.encode(b.as_slice())),
        Value::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items.iter() {
                out.push(to_json(item)?);
            }
            Json::Array(out)
        }
        Value::Map(m) => {
            let mut out = JsonMap::with_capacity(m.map.len());
            for (k, v) in m.map.iter() {
                out.insert(key_string(k), to_json(v)?);
            }
            Json::Object(out)
        }
        other => return Err(format!("value {other:?} has no document form")),
    })
}

fn key_string(key: &Key) -> String {
    match key {
        Key::String(s) => s.to_string(),
        Key::Int(i) => i.to_string(),
        Key::Uint(u) => u.to_string(),
        Key::Bool(b) => b.to_string(),
    }
}
