//! Extended JSON Pointer parsing, resolution, and parent preparation.

use serde_json::{Map as JsonMap, Value as Json};

use crate::{Error, Result};

/// Segment is one step of an extended path.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Segment {
    /// An ordinary pointer segment (unescaped).
    Key(String),
    /// The trailing `-` append marker.
    Append,
    /// A `[?(@.field=='value')]` array filter.
    Filter {
        /// Field each element is probed for.
        field: String,
        /// The value to compare against, quotes stripped.
        value: String,
    },
}

/// Parse splits an extended path into segments.
pub(crate) fn parse(path: &str) -> Result<Vec<Segment>> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = path.strip_prefix('/') else {
        return Err(Error::Path {
            path: path.to_string(),
            message: "must start with '/'".to_string(),
        });
    };
    rest.split('/').map(|raw| segment(path, raw)).collect()
}

fn segment(path: &str, raw: &str) -> Result<Segment> {
    if raw == "-" {
        return Ok(Segment::Append);
    }
    if raw.starts_with("[?(") || raw.starts_with("[?") {
        return filter_segment(raw);
    }
    if raw.starts_with('[') {
        // Bracketed segments other than the supported filter form are not
        // pointer keys; report them instead of treating them as text.
        return Err(Error::Path {
            path: path.to_string(),
            message: format!("unsupported bracket segment {raw:?}"),
        });
    }
    Ok(Segment::Key(unescape(raw)))
}

// Exactly `[?(@.field=='value')]`; the quotes may be single, double, or
// absent.
fn filter_segment(raw: &str) -> Result<Segment> {
    let err = || Error::Filter {
        segment: raw.to_string(),
    };
    let inner = raw
        .strip_prefix("[?(")
        .and_then(|s| s.strip_suffix(")]"))
        .ok_or_else(err)?;
    let body = inner.strip_prefix("@.").ok_or_else(err)?;
    let (field, value) = body.split_once("==").ok_or_else(err)?;
    let field = field.trim();
    if field.is_empty() || field.contains(['=', '<', '>', '!']) {
        return Err(err());
    }
    Ok(Segment::Filter {
        field: field.to_string(),
        value: unquote(value.trim()).to_string(),
    })
}

fn unquote(s: &str) -> &str {
    for q in ['\'', '"'] {
        if let Some(inner) = s.strip_prefix(q).and_then(|s| s.strip_suffix(q)) {
            return inner;
        }
    }
    s
}

/// Resolve expands an extended path against `resource` into concrete RFC 6902
/// pointers, in ascending index order.
///
/// Filters that match nothing produce an empty result; filters over a present
/// non-array are path errors. Elements missing the probed field are skipped.
pub(crate) fn resolve(resource: &Json, segments: &[Segment], path: &str) -> Result<Vec<String>> {
    // Each state is a concrete pointer prefix plus the value it points at,
    // when that value exists. Filters fork states; keys narrow them.
    let mut states: Vec<(String, Option<&Json>)> = vec![(String::new(), Some(resource))];

    for seg in segments {
        match seg {
            Segment::Key(k) => {
                for (pointer, current) in &mut states {
                    pointer.push('/');
                    pointer.push_str(&escape(k));
                    *current = current.and_then(|v| child(v, k));
                }
            }
            Segment::Append => {
                for (pointer, current) in &mut states {
                    pointer.push_str("/-");
                    *current = None;
                }
            }
            Segment::Filter { field, value } => {
                let mut next = Vec::new();
                for (pointer, current) in states {
                    let Some(current) = current else {
                        continue;
                    };
                    let Json::Array(items) = current else {
                        return Err(Error::Path {
                            path: path.to_string(),
                            message: format!("filter applied to a non-array at {pointer:?}"),
                        });
                    };
                    for (i, item) in items.iter().enumerate() {
                        match item.get(field) {
                            Some(Json::String(s)) if s == value => {
                                next.push((format!("{pointer}/{i}"), Some(item)));
                            }
                            // Non-string fields still match on textual
                            // equality so numeric discriminators work.
                            Some(other) if !other.is_string() && other.to_string() == *value => {
                                next.push((format!("{pointer}/{i}"), Some(item)));
                            }
                            _ => {}
                        }
                    }
                }
                states = next;
            }
        }
    }

    Ok(states.into_iter().map(|(pointer, _)| pointer).collect())
}

fn child<'v>(v: &'v Json, key: &str) -> Option<&'v Json> {
    match v {
        Json::Object(m) => m.get(key),
        Json::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Prepare creates the missing intermediate mappings along `pointer`, and a
/// missing final array when the pointer appends.
///
/// Only mappings are invented: a segment that would index a missing array is
/// an error rather than an auto-extension.
pub(crate) fn prepare(resource: &mut Json, pointer: &str, path: &str) -> Result<()> {
    let segments: Vec<String> = match pointer.strip_prefix('/') {
        Some(rest) => rest.split('/').map(unescape).collect(),
        None => return Ok(()),
    };
    let Some((_last, parents)) = segments.split_last() else {
        return Ok(());
    };

    let mut cur = resource;
    for (i, seg) in parents.iter().enumerate() {
        let next_is_append = segments[i + 1] == "-";
        let next_is_index = segments[i + 1].parse::<usize>().is_ok();
        cur = match cur {
            Json::Object(m) => {
                if !m.contains_key(seg) {
                    if next_is_index {
                        return Err(Error::Path {
                            path: path.to_string(),
                            message: format!("cannot index missing array at {seg:?}"),
                        });
                    }
                    let empty = if next_is_append {
                        Json::Array(Vec::new())
                    } else {
                        Json::Object(JsonMap::new())
                    };
                    m.insert(seg.clone(), empty);
                }
                &mut m[seg.as_str()]
            }
            Json::Array(items) => {
                let idx = seg.parse::<usize>().ok().filter(|i| *i < items.len());
                match idx {
                    Some(idx) => &mut items[idx],
                    None => {
                        return Err(Error::Path {
                            path: path.to_string(),
                            message: format!("array index {seg:?} out of range"),
                        });
                    }
                }
            }
            other => {
                return Err(Error::Path {
                    path: path.to_string(),
                    message: format!("cannot descend into {other}"),
                });
            }
        };
    }
    Ok(())
}

/// Ensure_value returns the value at `pointer`, creating an empty mapping (or
/// appending one, for `/-`) when the final location does not exist yet.
///
/// Used by the merge verbs, which write into the location in place.
pub(crate) fn ensure_value<'r>(
    resource: &'r mut Json,
    pointer: &str,
    path: &str,
) -> Result<&'r mut Json> {
    if pointer.is_empty() {
        return Ok(resource);
    }
    let (parent_ptr, last) = pointer.rsplit_once('/').unwrap_or(("", pointer));
    let last = unescape(last);

    let parent = resource.pointer_mut(parent_ptr).ok_or_else(|| Error::Path {
        path: path.to_string(),
        message: format!("missing parent at {parent_ptr:?}"),
    })?;
    match parent {
        Json::Object(m) => {
            if !m.contains_key(&last) {
                m.insert(last.clone(), Json::Object(JsonMap::new()));
            }
            Ok(&mut m[last.as_str()])
        }
        Json::Array(items) => {
            if last == "-" {
                items.push(Json::Object(JsonMap::new()));
                return Ok(items.last_mut().expect("just pushed"));
            }
            let idx = last.parse::<usize>().ok().filter(|i| *i < items.len());
            match idx {
                Some(idx) => Ok(&mut items[idx]),
                None => Err(Error::Path {
                    path: path.to_string(),
                    message: format!("array index {last:?} out of range"),
                }),
            }
        }
        other => Err(Error::Path {
            path: path.to_string(),
            message: format!("cannot merge into {other}"),
        }),
    }
}

fn escape(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

fn unescape(s: &str) -> String {
    s.replace("~1", "/").replace("~0", "~")
}
