//! Parsing of the compact field DSL.

use std::collections::HashMap;

use serde_json::{Map as JsonMap, Value as Json, json};

use crate::{Error, Result};

/// Translator walks a field-DSL mapping, resolving named types from the side
/// table. Expansions are cached per translator.
pub(crate) struct Translator<'t> {
    types: &'t JsonMap<String, Json>,
    cache: HashMap<String, Json>,
    stack: Vec<String>,
}

impl<'t> Translator<'t> {
    pub(crate) fn new(types: &'t JsonMap<String, Json>) -> Self {
        Self {
            types,
            cache: HashMap::new(),
            stack: Vec::new(),
        }
    }

    /// Object_schema translates one field mapping into an object schema with
    /// an alphabetically sorted `required` list.
    pub(crate) fn object_schema(&mut self, fields: &JsonMap<String, Json>) -> Result<Json> {
        let mut properties = JsonMap::with_capacity(fields.len());
        let mut required = Vec::new();

        for (name, field) in fields {
            let (schema, is_required) = self.field_schema(name, field)?;
            if is_required {
                required.push(name.clone());
            }
            properties.insert(name.clone(), schema);
        }
        required.sort();

        let mut out = JsonMap::new();
        out.insert("type".into(), json!("object"));
        out.insert("additionalProperties".into(), json!(false));
        out.insert("properties".into(), Json::Object(properties));
        if !required.is_empty() {
            out.insert("required".into(), json!(required));
        }
        Ok(Json::Object(out))
    }

    fn field_schema(&mut self, name: &str, field: &Json) -> Result<(Json, bool)> {
        match field {
            // An inline object carries no constraint string, so it can have
            // neither a default nor required=false: it is required.
            Json::Object(fields) => Ok((self.object_schema(fields)?, true)),
            Json::String(s) => self.constraint_schema(name, s),
            _ => Err(Error::FieldShape {
                field: name.to_string(),
            }),
        }
    }

    fn constraint_schema(&mut self, field: &str, s: &str) -> Result<(Json, bool)> {
        let (type_part, constraint_part) = match s.split_once('|') {
            Some((t, c)) => (t.trim(), c.trim()),
            None => (s.trim(), ""),
        };
        if type_part.is_empty() {
            return Err(Error::Constraint {
                field: field.to_string(),
                message: "empty type".into(),
            });
        }

        let mut schema = self.type_schema(field, type_part)?;
        let constraints = tokenize(field, constraint_part)?;

        let base = schema
            .get("type")
            .and_then(Json::as_str)
            .unwrap_or("object")
            .to_string();
        let mut explicit_required = None;
        let mut has_default = false;

        for (key, raw) in constraints {
            match key.as_str() {
                "required" => {
                    explicit_required = Some(parse_bool(field, &key, &raw)?);
                }
                "default" => {
                    has_default = true;
                    let v = typed_literal(field, &base, &raw)?;
                    set(&mut schema, "default", v);
                }
                "enum" => {
                    let mut values = Vec::new();
                    for part in raw.split(',') {
                        values.push(typed_literal(field, &base, part.trim())?);
                    }
                    set(&mut schema, "enum", Json::Array(values));
                }
                "minimum" | "maximum" | "exclusiveMinimum" | "exclusiveMaximum" | "minItems"
                | "maxItems" | "minLength" | "maxLength" | "minProperties" | "maxProperties"
                | "multipleOf" => {
                    let v: Json = serde_json::from_str(&raw).map_err(|_| Error::Constraint {
                        field: field.to_string(),
                        message: format!("{key} expects a number, got {raw:?}"),
                    })?;
                    set(&mut schema, &key, v);
                }
                "uniqueItems" | "nullable" => {
                    let v = parse_bool(field, &key, &raw)?;
                    set(&mut schema, &key, Json::Bool(v));
                }
                "pattern" | "title" | "description" | "format" => {
                    set(&mut schema, &key, Json::String(raw));
                }
                "example" => {
                    let v = typed_literal(field, &base, &raw)?;
                    set(&mut schema, "example", v);
                }
                // Unknown keys are ignored.
                _ => {}
            }
        }

        let required = explicit_required.unwrap_or(!has_default);
        Ok((schema, required))
    }

    fn type_schema(&mut self, field: &str, t: &str) -> Result<Json> {
        match t {
            "string" | "integer" | "number" | "boolean" => Ok(json!({"type": t})),
            "object" => Ok(json!({"type": "object"})),
            _ => {
                if let Some(elem) = t.strip_prefix("[]") {
                    let items = self.type_schema(field, elem.trim())?;
                    return Ok(json!({"type": "array", "items": items}));
                }
                if let Some(elem) = strip_generic(t, "array") {
                    let items = self.type_schema(field, elem)?;
                    return Ok(json!({"type": "array", "items": items}));
                }
                if let Some(value) = strip_generic(t, "map") {
                    let values = self.type_schema(field, value)?;
                    return Ok(json!({"type": "object", "additionalProperties": values}));
                }
                if let Some(rest) = t.strip_prefix("map[") {
                    let (key, value) = rest.split_once(']').ok_or_else(|| Error::Constraint {
                        field: field.to_string(),
                        message: format!("malformed map type {t:?}"),
                    })?;
                    if key.trim() != "string" {
                        return Err(Error::Constraint {
                            field: field.to_string(),
                            message: format!("map keys must be strings, got {key:?}"),
                        });
                    }
                    let values = self.type_schema(field, value.trim())?;
                    return Ok(json!({"type": "object", "additionalProperties": values}));
                }
                self.custom_type(t)
            }
        }
    }

    fn custom_type(&mut self, name: &str) -> Result<Json> {
        if let Some(cached) = self.cache.get(name) {
            return Ok(cached.clone());
        }
        if self.stack.iter().any(|n| n == name) {
            let mut path = self.stack.join(" -> ");
            path.push_str(" -> ");
            path.push_str(name);
            return Err(Error::CyclicType { path });
        }
        let definition = self.types.get(name).ok_or_else(|| Error::UnknownType {
            name: name.to_string(),
        })?;

        self.stack.push(name.to_string());
        let schema = match definition {
            Json::Object(fields) => self.object_schema(fields),
            // A string definition is an alias, constraints included; its
            // requiredness is decided at each use site.
            Json::String(alias) => self.constraint_schema(name, alias).map(|(s, _)| s),
            _ => Err(Error::FieldShape {
                field: name.to_string(),
            }),
        };
        self.stack.pop();

        let schema = schema?;
        self.cache.insert(name.to_string(), schema.clone());
        Ok(schema)
    }
}

fn set(schema: &mut Json, key: &str, value: Json) {
    if let Json::Object(m) = schema {
        m.insert(key.to_string(), value);
    }
}

fn parse_bool(field: &str, key: &str, raw: &str) -> Result<bool> {
    match raw {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Error::Constraint {
            field: field.to_string(),
            message: format!("{key} expects true or false, got {raw:?}"),
        }),
    }
}

// A typed literal: strings may appear bare, everything else must be JSON.
fn typed_literal(field: &str, base: &str, raw: &str) -> Result<Json> {
    if base == "string" {
        if raw.starts_with('"') {
            if let Ok(v @ Json::String(_)) = serde_json::from_str(raw) {
                return Ok(v);
            }
        }
        return Ok(Json::String(raw.to_string()));
    }
    serde_json::from_str(raw).map_err(|_| Error::Constraint {
        field: field.to_string(),
        message: format!("cannot decode {raw:?} as a {base} literal"),
    })
}

fn strip_generic<'s>(t: &'s str, name: &str) -> Option<&'s str> {
    t.strip_prefix(name)?
        .strip_prefix('<')?
        .strip_suffix('>')
        .map(str::trim)
}

// key=value tokens; values may be single- or double-quoted to carry spaces.
fn tokenize(field: &str, s: &str) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        let Some((key, after)) = rest.split_once('=') else {
            return Err(Error::Constraint {
                field: field.to_string(),
                message: format!("expected key=value, got {rest:?}"),
            });
        };
        let key = key.trim().to_string();
        let (value, tail) = match after.as_bytes().first() {
            Some(&q @ (b'"' | b'\'')) => {
                let q = q as char;
                let inner = &after[1..];
                let Some(end) = inner.find(q) else {
                    return Err(Error::Constraint {
                        field: field.to_string(),
                        message: format!("unterminated quote in {after:?}"),
                    });
                };
                (inner[..end].to_string(), &inner[end + 1..])
            }
            _ => match after.split_once(char::is_whitespace) {
                Some((v, tail)) => (v.to_string(), tail),
                None => (after.to_string(), ""),
            },
        };
        out.push((key, value));
        rest = tail.trim_start();
    }
    Ok(out)
}
