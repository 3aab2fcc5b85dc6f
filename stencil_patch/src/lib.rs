#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

//! Stencil_patch resolves extended JSON Pointer paths and executes patch
//! operations against rendered resource documents.
//!
//! Paths are JSON Pointers with two extensions: a trailing `/-` appends to an
//! array, and a `[?(@.field=='value')]` segment selects every array element
//! whose field equals the value. Extended paths are resolved into plain
//! RFC 6902 pointers first; the standard verbs are then handed to the
//! `json-patch` engine, while `merge` and `mergeShallow` keep their custom
//! semantics here.

use serde_json::{Value as Json, json};
use tracing::debug;

use api::v1alpha1::{Op, Operation};
use stencil_expr::{Environment, Rendered, render};

mod merge;
mod path;

pub use merge::{deep_merge, shallow_merge};

/// Error enumerates the failures reported by this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A path could not be parsed or navigated.
    #[error("path {path:?}: {message}")]
    Path {
        /// The offending path.
        path: String,
        /// What went wrong.
        message: String,
    },
    /// A filter segment used an unsupported syntax.
    #[error("unsupported filter segment {segment:?}")]
    Filter {
        /// The offending segment.
        segment: String,
    },
    /// The verb requires a value and none was supplied.
    #[error("{op} requires a value")]
    MissingValue {
        /// The verb.
        op: Op,
    },
    /// The verb requires a `from` path and none was supplied.
    #[error("{op} requires a from path")]
    MissingFrom {
        /// The verb.
        op: Op,
    },
    /// A `from` path must land on exactly one location.
    #[error("{op} from path {path:?} resolved to {count} locations")]
    FromCardinality {
        /// The verb.
        op: Op,
        /// The offending path.
        path: String,
        /// How many locations it hit.
        count: usize,
    },
    /// A path or value failed to render.
    #[error(transparent)]
    Render(#[from] stencil_expr::Error),
    /// The RFC 6902 engine rejected an operation.
    #[error("json patch error: {0}")]
    Rfc6902(#[from] json_patch::PatchError),
    /// An operation document failed to encode.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result is the usual alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Apply executes one operation against `resource`.
///
/// The operation's path and value are rendered with `env` first, so `${…}`
/// fragments are legal in both. A filter that matches nothing is a silent
/// no-op.
pub fn apply(resource: &mut Json, op: &Operation, env: &Environment) -> Result<()> {
    let path = render_path(&op.path, env)?;
    let segments = path::parse(&path)?;

    let value = match &op.value {
        Some(v) => match render(v, env)? {
            Rendered::Value(v) => Some(v),
            // The operand resolved to "absent": nothing to do.
            Rendered::Omit => {
                debug!(op = %op.op, %path, "operand omitted, skipping operation");
                return Ok(());
            }
        },
        None => None,
    };

    let mut pointers = path::resolve(resource, &segments, &path)?;
    if pointers.is_empty() {
        debug!(op = %op.op, %path, "no filter matches, skipping operation");
        return Ok(());
    }
    // Within one filter expansion, removals run highest-index first so that
    // earlier removals do not shift later targets.
    if op.op == Op::Remove {
        pointers.reverse();
    }

    for pointer in &pointers {
        match op.op {
            Op::Add | Op::Replace | Op::Test => {
                let value = value
                    .as_ref()
                    .ok_or(Error::MissingValue { op: op.op })?
                    .clone();
                if op.op == Op::Add {
                    path::prepare(resource, pointer, &path)?;
                }
                rfc6902(resource, json!({"op": op.op, "path": pointer, "value": value}))?;
            }
            Op::Remove => {
                rfc6902(resource, json!({"op": "remove", "path": pointer}))?;
            }
            Op::Copy | Op::Move => {
                let from = op.from.as_deref().ok_or(Error::MissingFrom { op: op.op })?;
                let from = render_path(from, env)?;
                let from_segments = path::parse(&from)?;
                let from_pointers = path::resolve(resource, &from_segments, &from)?;
                let [from_pointer] = from_pointers.as_slice() else {
                    return Err(Error::FromCardinality {
                        op: op.op,
                        path: from,
                        count: from_pointers.len(),
                    });
                };
                rfc6902(
                    resource,
                    json!({"op": op.op, "path": pointer, "from": from_pointer}),
                )?;
            }
            Op::Merge | Op::MergeShallow => {
                let value = value.as_ref().ok_or(Error::MissingValue { op: op.op })?;
                path::prepare(resource, pointer, &path)?;
                let target = path::ensure_value(resource, pointer, &path)?;
                if !target.is_object() {
                    return Err(Error::Path {
                        path: path.clone(),
                        message: format!("{} target is not a mapping", op.op),
                    });
                }
                if op.op == Op::Merge {
                    deep_merge(target, value);
                } else {
                    shallow_merge(target, value);
                }
            }
        }
    }
    Ok(())
}

fn rfc6902(resource: &mut Json, operation: Json) -> Result<()> {
    let patch: json_patch::Patch = serde_json::from_value(Json::Array(vec![operation]))?;
    json_patch::patch(resource, &patch)?;
    Ok(())
}

fn render_path(path: &str, env: &Environment) -> Result<String> {
    match render(&Json::String(path.to_string()), env)? {
        Rendered::Value(Json::String(s)) => Ok(s),
        Rendered::Value(other) => Err(Error::Path {
            path: path.to_string(),
            message: format!("rendered to a non-string: {other}"),
        }),
        Rendered::Omit => Err(Error::Path {
            path: path.to_string(),
            message: "rendered to omit()".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_json_diff::assert_json_eq;
    use serde_json::from_value;

    fn operation(v: Json) -> Operation {
        from_value(v).unwrap()
    }

    fn apply_all(resource: &mut Json, ops: Json) {
        let ops: Vec<Operation> = from_value(ops).unwrap();
        let env = Environment::new();
        for op in &ops {
            apply(resource, op, &env).unwrap();
        }
    }

    #[test]
    fn add_through_missing_parents() {
        let mut doc = json!({});
        apply_all(
            &mut doc,
            json!([{"op": "add", "path": "/spec/template/metadata", "value": {"labels": {}}}]),
        );
        assert_json_eq!(doc, json!({"spec": {"template": {"metadata": {"labels": {}}}}}));
    }

    #[test]
    fn filtered_append() {
        let mut doc = json!({
            "spec": {"template": {"spec": {"containers": [
                {"name": "app", "volumeMounts": []},
                {"name": "sidecar"},
            ]}}},
        });
        apply_all(
            &mut doc,
            json!([{
                "op": "add",
                "path": "/spec/template/spec/containers/[?(@.name=='app')]/volumeMounts/-",
                "value": {"name": "logs", "mountPath": "/var/log"},
            }]),
        );
        let containers = &doc["spec"]["template"]["spec"]["containers"];
        assert_json_eq!(
            containers[0]["volumeMounts"].clone(),
            json!([{"name": "logs", "mountPath": "/var/log"}]),
        );
        // The filter matched only the app container: no key invented on the
        // sidecar.
        assert!(containers[1].get("volumeMounts").is_none());
    }

    #[test]
    fn filtered_remove_keeps_relative_order() {
        let mut doc = json!({"items": [
            {"kind": "a", "n": 0},
            {"kind": "b", "n": 1},
            {"kind": "a", "n": 2},
            {"kind": "b", "n": 3},
            {"kind": "a", "n": 4},
        ]});
        apply_all(
            &mut doc,
            json!([{"op": "remove", "path": "/items/[?(@.kind=='a')]"}]),
        );
        assert_json_eq!(
            doc,
            json!({"items": [{"kind": "b", "n": 1}, {"kind": "b", "n": 3}]}),
        );
    }

    #[test]
    fn missing_filter_match_is_a_no_op() {
        let mut doc = json!({"items": [{"name": "x"}]});
        apply_all(
            &mut doc,
            json!([{"op": "remove", "path": "/items/[?(@.name=='y')]"}]),
        );
        assert_json_eq!(doc, json!({"items": [{"name": "x"}]}));
    }

    #[test]
    fn merge_is_recursive() {
        let mut doc = json!({"spec": {"resources": {"requests": {"cpu": "100m"}}}});
        apply_all(
            &mut doc,
            json!([{
                "op": "merge",
                "path": "/spec/resources",
                "value": {"requests": {"memory": "256Mi"}, "limits": {"cpu": "1"}},
            }]),
        );
        assert_json_eq!(
            doc["spec"]["resources"].clone(),
            json!({
                "requests": {"cpu": "100m", "memory": "256Mi"},
                "limits": {"cpu": "1"},
            }),
        );
    }

    #[test]
    fn merge_shallow_replaces_nested() {
        let mut doc = json!({"spec": {"resources": {"requests": {"cpu": "100m"}}}});
        apply_all(
            &mut doc,
            json!([{
                "op": "mergeShallow",
                "path": "/spec/resources",
                "value": {"requests": {"memory": "256Mi"}},
            }]),
        );
        assert_json_eq!(
            doc["spec"]["resources"].clone(),
            json!({"requests": {"memory": "256Mi"}}),
        );
    }

    #[test]
    fn merge_into_filtered_element() {
        let mut doc = json!({"containers": [{"name": "app", "env": {"A": "1"}}]});
        apply_all(
            &mut doc,
            json!([{
                "op": "merge",
                "path": "/containers/[?(@.name=='app')]",
                "value": {"env": {"B": "2"}},
            }]),
        );
        assert_json_eq!(
            doc["containers"][0].clone(),
            json!({"name": "app", "env": {"A": "1", "B": "2"}}),
        );
    }

    #[test]
    fn replace_on_missing_target_fails() {
        let mut doc = json!({});
        let op = operation(json!({"op": "replace", "path": "/nope", "value": 1}));
        let err = apply(&mut doc, &op, &Environment::new()).unwrap_err();
        assert!(matches!(err, Error::Rfc6902(_)), "got: {err}");
    }

    #[test]
    fn test_verb_round_trips() {
        let mut doc = json!({"a": 1});
        let env = Environment::new();
        apply(
            &mut doc,
            &operation(json!({"op": "test", "path": "/a", "value": 1})),
            &env,
        )
        .unwrap();
        let err = apply(
            &mut doc,
            &operation(json!({"op": "test", "path": "/a", "value": 2})),
            &env,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Rfc6902(_)));
    }

    #[test]
    fn copy_and_move() {
        let mut doc = json!({"a": {"x": 1}});
        apply_all(
            &mut doc,
            json!([
                {"op": "copy", "path": "/b", "from": "/a"},
                {"op": "move", "path": "/c", "from": "/a/x"},
            ]),
        );
        assert_json_eq!(doc, json!({"a": {}, "b": {"x": 1}, "c": 1}));
    }

    #[test]
    fn templated_path_and_value() {
        let mut env = Environment::new();
        env.insert("spec".into(), json!({"port": 9090, "target": "ports"}));
        let mut doc = json!({"ports": []});
        let op = operation(json!({
            "op": "add",
            "path": "/${spec.target}/-",
            "value": {"containerPort": "${spec.port}"},
        }));
        apply(&mut doc, &op, &env).unwrap();
        assert_json_eq!(doc, json!({"ports": [{"containerPort": 9090}]}));
    }

    #[test]
    fn omitted_operand_skips_the_operation() {
        let mut doc = json!({"a": 1});
        let op = operation(json!({"op": "add", "path": "/b", "value": "${omit()}"}));
        apply(&mut doc, &op, &Environment::new()).unwrap();
        assert_json_eq!(doc, json!({"a": 1}));
    }

    #[test]
    fn templated_filter_values() {
        let mut env = Environment::new();
        env.insert("spec".into(), json!({"container": "app"}));
        let mut doc = json!({"containers": [{"name": "app"}, {"name": "other"}]});
        let op = operation(json!({
            "op": "add",
            "path": "/containers/[?(@.name=='${spec.container}')]/ready",
            "value": true,
        }));
        apply(&mut doc, &op, &env).unwrap();
        assert_json_eq!(
            doc["containers"].clone(),
            json!([{"name": "app", "ready": true}, {"name": "other"}]),
        );
    }

    #[test]
    fn copy_from_filtered_source() {
        let mut doc = json!({
            "containers": [{"name": "app", "image": "x:1"}],
            "initContainers": [],
        });
        let op = operation(json!({
            "op": "copy",
            "path": "/initContainers/-",
            "from": "/containers/[?(@.name=='app')]",
        }));
        apply(&mut doc, &op, &Environment::new()).unwrap();
        assert_json_eq!(
            doc["initContainers"].clone(),
            json!([{"name": "app", "image": "x:1"}]),
        );
    }

    #[test]
    fn ambiguous_from_is_rejected() {
        let mut doc = json!({
            "items": [{"kind": "a"}, {"kind": "a"}],
            "out": [],
        });
        let op = operation(json!({
            "op": "copy",
            "path": "/out/-",
            "from": "/items/[?(@.kind=='a')]",
        }));
        let err = apply(&mut doc, &op, &Environment::new()).unwrap_err();
        assert!(matches!(err, Error::FromCardinality { count: 2, .. }), "got: {err}");
    }

    #[test]
    fn merge_over_a_scalar_is_an_error() {
        let mut doc = json!({"spec": {"replicas": 3}});
        let op = operation(json!({
            "op": "merge",
            "path": "/spec/replicas",
            "value": {"x": 1},
        }));
        let err = apply(&mut doc, &op, &Environment::new()).unwrap_err();
        assert!(matches!(err, Error::Path { .. }), "got: {err}");
    }

    #[test]
    fn escaped_segments() {
        let mut doc = json!({"metadata": {"annotations": {}}});
        apply_all(
            &mut doc,
            json!([{
                "op": "add",
                "path": "/metadata/annotations/stencil.dev~1managed",
                "value": "true",
            }]),
        );
        assert_json_eq!(
            doc["metadata"]["annotations"].clone(),
            json!({"stencil.dev/managed": "true"}),
        );
    }
}
