//! The template engine: walking JSON trees and substituting `${…}` fragments.

use serde_json::{Map as JsonMap, Value as Json};
use tracing::trace;

use crate::{Environment, Error, Evaluated, Result, evaluate};

/// Rendered is the outcome of rendering a node.
///
/// `Omit` never survives into a finished document: mappings drop omitted
/// entries and sequences drop omitted elements while the tree is assembled.
#[derive(Clone, Debug, PartialEq)]
pub enum Rendered {
    /// An ordinary value.
    Value(Json),
    /// The node resolved to "absent"; its parent must not contain it.
    Omit,
}

impl Rendered {
    /// Into_value unwraps an ordinary value, mapping `Omit` to `None`.
    pub fn into_value(self) -> Option<Json> {
        match self {
            Rendered::Value(v) => Some(v),
            Rendered::Omit => None,
        }
    }
}

/// Render walks `data` and substitutes every `${…}` fragment using the
/// variables in `env`.
///
/// Strings that are exactly one fragment (after trimming) yield the
/// expression's native value, so a templated field can produce whole
/// mappings or sequences. Everything else interpolates fragment results into
/// the surrounding text.
pub fn render(data: &Json, env: &Environment) -> Result<Rendered> {
    let mut path = Vec::new();
    render_at(data, env, &mut path)
}

fn render_at(data: &Json, env: &Environment, path: &mut Vec<String>) -> Result<Rendered> {
    match data {
        Json::String(s) => render_str(s, env).map_err(|e| located(e, path)),
        Json::Object(m) => render_map(m, env, path),
        Json::Array(items) => render_seq(items, env, path),
        other => Ok(Rendered::Value(other.clone())),
    }
}

fn render_map(m: &JsonMap<String, Json>, env: &Environment, path: &mut Vec<String>) -> Result<Rendered> {
    let mut out = JsonMap::with_capacity(m.len());
    for (key, value) in m {
        path.push(key.clone());
        let rendered_key = match render_key(key, env) {
            Ok(k) => k,
            Err(e) => return Err(located(e, path)),
        };
        let Some(rendered_key) = rendered_key else {
            // Key resolved to omit(): the whole entry disappears.
            path.pop();
            continue;
        };
        match render_at(value, env, path)? {
            Rendered::Value(v) => {
                out.insert(rendered_key, v);
            }
            Rendered::Omit => trace!(field = %key, "omitted field"),
        }
        path.pop();
    }
    Ok(Rendered::Value(Json::Object(out)))
}

fn render_seq(items: &[Json], env: &Environment, path: &mut Vec<String>) -> Result<Rendered> {
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        path.push(format!("[{i}]"));
        match render_at(item, env, path)? {
            Rendered::Value(v) => out.push(v),
            Rendered::Omit => trace!(index = i, "omitted element"),
        }
        path.pop();
    }
    Ok(Rendered::Value(Json::Array(out)))
}

fn render_key(key: &str, env: &Environment) -> Result<Option<String>> {
    match render_str(key, env)? {
        Rendered::Omit => Ok(None),
        Rendered::Value(Json::String(s)) => Ok(Some(s)),
        Rendered::Value(other) => Ok(Some(stringify(&other))),
    }
}

fn render_str(s: &str, env: &Environment) -> Result<Rendered> {
    let fragments = scan(s);
    if fragments.is_empty() {
        return Ok(Rendered::Value(Json::String(s.to_string())));
    }

    // A string that is exactly one fragment keeps the expression's native
    // value instead of being forced into text.
    let trimmed = s.trim();
    if let [only] = fragments.as_slice()
        && s[only.start..only.end] == *trimmed
    {
        return Ok(match evaluate(only.expr, env)? {
            Evaluated::Value(v) => Rendered::Value(v),
            Evaluated::Omit => Rendered::Omit,
        });
    }

    let mut out = String::with_capacity(s.len());
    let mut cursor = 0;
    for f in &fragments {
        out.push_str(&s[cursor..f.start]);
        match evaluate(f.expr, env)? {
            Evaluated::Value(v) => out.push_str(&stringify(&v)),
            // No textual form for "absent": the enclosing value goes away.
            Evaluated::Omit => return Ok(Rendered::Omit),
        }
        cursor = f.end;
    }
    out.push_str(&s[cursor..]);
    Ok(Rendered::Value(Json::String(out)))
}

fn stringify(v: &Json) -> String {
    match v {
        Json::String(s) => s.clone(),
        Json::Number(n) => n.to_string(),
        Json::Bool(b) => b.to_string(),
        // Null and containers take their compact JSON form.
        other => other.to_string(),
    }
}

struct Fragment<'s> {
    start: usize,
    end: usize,
    expr: &'s str,
}

// Brace-depth scanning: expressions may contain `{…}` literals, so the
// fragment ends at the brace that returns the depth to zero, not at the
// first `}`. An unterminated fragment ends the scan; the rest is literal.
fn scan(s: &str) -> Vec<Fragment<'_>> {
    let bytes = s.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
            let mut depth = 1usize;
            let mut j = i + 2;
            while j < bytes.len() && depth > 0 {
                match bytes[j] {
                    b'{' => depth += 1,
                    b'}' => depth -= 1,
                    _ => {}
                }
                j += 1;
            }
            if depth != 0 {
                break;
            }
            out.push(Fragment {
                start: i,
                end: j,
                expr: &s[i + 2..j - 1],
            });
            i = j;
        } else {
            i += 1;
        }
    }
    out
}

fn located(err: Error, path: &[String]) -> Error {
    if path.is_empty() {
        return err;
    }
    let mut out = String::new();
    for (i, seg) in path.iter().enumerate() {
        if i > 0 && !seg.starts_with('[') {
            out.push('.');
        }
        out.push_str(seg);
    }
    Error::Template {
        path: out,
        source: Box::new(err),
    }
}
