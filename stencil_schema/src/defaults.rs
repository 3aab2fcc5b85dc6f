//! Extraction of the defaults tree from a translated schema.

use serde_json::{Map as JsonMap, Value as Json};

/// Extract derives the defaults subtree for one schema node.
///
/// Object nodes collect the defaults of their children; an explicit `default`
/// on any node wins over collection. Array nodes only ever contribute an
/// explicit default: element defaults never invent elements.
pub(crate) fn extract(schema: &Json) -> Option<Json> {
    let node = schema.as_object()?;

    if let Some(d) = node.get("default") {
        return Some(d.clone());
    }

    match node.get("type").and_then(Json::as_str) {
        Some("object") => {
            let properties = node.get("properties")?.as_object()?;
            let mut out = JsonMap::new();
            for (name, child) in properties {
                if let Some(d) = extract(child) {
                    out.insert(name.clone(), d);
                }
            }
            if out.is_empty() {
                None
            } else {
                Some(Json::Object(out))
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn explicit_default_wins() {
        let schema = json!({
            "type": "object",
            "default": {"a": 1},
            "properties": {"a": {"type": "integer", "default": 2}},
        });
        assert_eq!(extract(&schema), Some(json!({"a": 1})));
    }

    #[test]
    fn empty_collection_is_none() {
        let schema = json!({
            "type": "object",
            "properties": {"a": {"type": "integer"}},
        });
        assert_eq!(extract(&schema), None);
    }

    #[test]
    fn arrays_without_default_contribute_nothing() {
        let schema = json!({
            "type": "array",
            "items": {"type": "object", "properties": {"p": {"type": "integer", "default": 1}}},
        });
        assert_eq!(extract(&schema), None);
    }
}
