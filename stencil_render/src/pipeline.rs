//! The rendering pipeline: base resources first, then addons over the
//! accumulated resource list.

use serde_json::{Map as JsonMap, Value as Json};
use tracing::{debug, trace};

use api::v1alpha1::{
    Addon, AddonInstance, ComponentDefinition, EnvironmentSettings, TargetSelector,
};
use stencil_expr::{Environment, Rendered, render};

use crate::{Error, Result, context};

/// Render_base renders the definition's resource templates in declaration
/// order.
pub(crate) fn render_base(
    definition: &ComponentDefinition,
    env: &Environment,
) -> Result<Vec<Json>> {
    let mut resources = Vec::with_capacity(definition.spec.resources.len());
    for rt in &definition.spec.resources {
        let wrap = Error::for_resource(&rt.id);
        if let Some(expr) = &rt.include_when
            && !predicate(expr, env, "includeWhen").map_err(wrap)?
        {
            debug!(id = %rt.id, "resource not included");
            continue;
        }
        let wrap = Error::for_resource(&rt.id);
        let iterations =
            iterations(rt.for_each.as_deref(), rt.var.as_deref(), env).map_err(wrap)?;
        for iter_env in iterations {
            let doc = render_document(&rt.template, &iter_env, "resource template")
                .map_err(Error::for_resource(&rt.id))?;
            trace!(id = %rt.id, "resource rendered");
            resources.push(doc);
        }
    }
    Ok(resources)
}

/// Apply_addon renders one addon instance's `creates` and applies its
/// `patches` against the accumulated resource list.
pub(crate) fn apply_addon(
    addon: &Addon,
    instance: &AddonInstance,
    env_settings: Option<&EnvironmentSettings>,
    base: &Environment,
    resources: &mut Vec<Json>,
) -> Result<()> {
    let env = context::addon_environment(addon, instance, env_settings, base)?;

    for create in &addon.spec.creates {
        resources.push(render_document(create, &env, "creates entry")?);
    }

    for (pi, patch) in addon.spec.patches.iter().enumerate() {
        let iterations = iterations(patch.for_each.as_deref(), patch.var.as_deref(), &env)?;
        for iter_env in iterations {
            // Selection happens against the current state of the list, so a
            // patch observes every mutation made before it.
            let mut targets = Vec::new();
            for (ri, resource) in resources.iter().enumerate() {
                if !matches_target(&patch.target, resource) {
                    continue;
                }
                if let Some(filter) = &patch.target.where_ {
                    let mut predicate_env = iter_env.clone();
                    predicate_env.insert("resource".into(), resource.clone());
                    if !predicate(filter, &predicate_env, "target.where")? {
                        continue;
                    }
                }
                targets.push(ri);
            }
            trace!(patch = pi, targets = targets.len(), "targets selected");

            for ri in targets {
                for (oi, op) in patch.operations.iter().enumerate() {
                    let mut op_env = iter_env.clone();
                    op_env.insert("resource".into(), resources[ri].clone());
                    stencil_patch::apply(&mut resources[ri], op, &op_env)
                        .map_err(|e| Error::for_operation(pi, oi)(e.into()))?;
                }
            }
        }
    }
    Ok(())
}

// A guard expression: boolean required, unresolved references read as false.
fn predicate(expr: &str, env: &Environment, what: &str) -> Result<bool> {
    match render(&Json::String(expr.to_string()), env) {
        Ok(Rendered::Value(Json::Bool(b))) => Ok(b),
        Ok(Rendered::Value(other)) => Err(Error::shape(format!(
            "{what} must yield a boolean, got {other}"
        ))),
        Ok(Rendered::Omit) => Err(Error::shape(format!("{what} must yield a boolean"))),
        Err(e) if e.is_missing_data() => {
            debug!(expression = expr, "unresolved reference in {what}, treating as false");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

// One environment per iteration; without forEach, a single pass with the
// caller's environment.
fn iterations(
    for_each: Option<&str>,
    var: Option<&str>,
    env: &Environment,
) -> Result<Vec<Environment>> {
    let Some(expr) = for_each else {
        return Ok(vec![env.clone()]);
    };
    let items = match render(&Json::String(expr.to_string()), env)? {
        Rendered::Value(Json::Array(items)) => items,
        Rendered::Value(other) => {
            return Err(Error::shape(format!(
                "forEach must yield a sequence, got {other}"
            )));
        }
        Rendered::Omit => {
            return Err(Error::shape("forEach must yield a sequence"));
        }
    };
    let var = var.unwrap_or("item");
    Ok(items
        .into_iter()
        .map(|item| {
            let mut child = env.clone();
            child.insert(var.to_string(), item);
            child
        })
        .collect())
}

fn render_document(
    template: &JsonMap<String, Json>,
    env: &Environment,
    what: &str,
) -> Result<Json> {
    match render(&Json::Object(template.clone()), env)? {
        Rendered::Value(doc @ Json::Object(_)) => Ok(doc),
        Rendered::Value(other) => Err(Error::shape(format!(
            "{what} must render to a mapping, got {other}"
        ))),
        Rendered::Omit => Err(Error::shape(format!("{what} must render to a mapping"))),
    }
}

fn matches_target(selector: &TargetSelector, resource: &Json) -> bool {
    if let Some(kind) = &selector.kind
        && resource.get("kind").and_then(Json::as_str) != Some(kind)
    {
        return false;
    }
    let api_version = resource
        .get("apiVersion")
        .and_then(Json::as_str)
        .unwrap_or("");
    let (group, version) = match api_version.split_once('/') {
        Some((g, v)) => (g, v),
        // Core-group resources carry a bare version.
        None => ("", api_version),
    };
    if let Some(want) = &selector.group
        && want != group
    {
        return false;
    }
    if let Some(want) = &selector.version
        && want != version
    {
        return false;
    }
    if let Some(want) = &selector.name
        && resource
            .pointer("/metadata/name")
            .and_then(Json::as_str)
            != Some(want)
    {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::{from_value, json};

    fn definition(v: Json) -> ComponentDefinition {
        from_value(v).unwrap()
    }

    fn env(v: Json) -> Environment {
        let mut e = Environment::new();
        if let Json::Object(m) = v {
            for (k, v) in m {
                e.insert(k, v);
            }
        }
        e
    }

    #[test]
    fn include_when_missing_data_omits_quietly() {
        let def = definition(json!({
            "metadata": {"name": "d"},
            "spec": {
                "resources": [
                    {
                        "id": "hpa",
                        "includeWhen": "${spec.enableHPA}",
                        "template": {"kind": "HorizontalPodAutoscaler"},
                    },
                    {"id": "deploy", "template": {"kind": "Deployment"}},
                ],
            },
        }));
        let resources = render_base(&def, &env(json!({"spec": {}}))).unwrap();
        assert_eq!(resources, vec![json!({"kind": "Deployment"})]);
    }

    #[test]
    fn include_when_true_keeps_the_resource() {
        let def = definition(json!({
            "metadata": {"name": "d"},
            "spec": {
                "resources": [{
                    "id": "hpa",
                    "includeWhen": "${spec.enableHPA}",
                    "template": {"kind": "HorizontalPodAutoscaler"},
                }],
            },
        }));
        let resources =
            render_base(&def, &env(json!({"spec": {"enableHPA": true}}))).unwrap();
        assert_eq!(resources.len(), 1);
    }

    #[test]
    fn include_when_requires_a_boolean() {
        let def = definition(json!({
            "metadata": {"name": "d"},
            "spec": {
                "resources": [{
                    "id": "hpa",
                    "includeWhen": "${spec.enableHPA}",
                    "template": {},
                }],
            },
        }));
        let err = render_base(&def, &env(json!({"spec": {"enableHPA": "yes"}}))).unwrap_err();
        assert!(err.to_string().contains("hpa"), "got: {err}");
    }

    #[test]
    fn for_each_renders_in_sequence_order() {
        let def = definition(json!({
            "metadata": {"name": "d"},
            "spec": {
                "resources": [{
                    "id": "ingress",
                    "forEach": "${spec.ingresses}",
                    "template": {
                        "kind": "Ingress",
                        "host": "${item.host}",
                    },
                }],
            },
        }));
        let resources = render_base(
            &def,
            &env(json!({"spec": {"ingresses": [{"host": "a"}, {"host": "b"}]}})),
        )
        .unwrap();
        assert_eq!(
            resources,
            vec![
                json!({"kind": "Ingress", "host": "a"}),
                json!({"kind": "Ingress", "host": "b"}),
            ],
        );
    }

    #[test]
    fn for_each_honours_custom_var() {
        let def = definition(json!({
            "metadata": {"name": "d"},
            "spec": {
                "resources": [{
                    "id": "cm",
                    "forEach": "${spec.names}",
                    "var": "entry",
                    "template": {"name": "${entry}"},
                }],
            },
        }));
        let resources =
            render_base(&def, &env(json!({"spec": {"names": ["x", "y"]}}))).unwrap();
        assert_eq!(resources, vec![json!({"name": "x"}), json!({"name": "y"})]);
    }

    #[test]
    fn for_each_requires_a_sequence() {
        let def = definition(json!({
            "metadata": {"name": "d"},
            "spec": {
                "resources": [{
                    "id": "cm",
                    "forEach": "${spec.n}",
                    "template": {},
                }],
            },
        }));
        let err = render_base(&def, &env(json!({"spec": {"n": 3}}))).unwrap_err();
        assert!(err.to_string().contains("sequence"), "got: {err}");
    }

    #[test]
    fn target_matching() {
        let resource = json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web"},
        });
        let m = |v: Json| -> bool {
            matches_target(&from_value::<TargetSelector>(v).unwrap(), &resource)
        };
        assert!(m(json!({})));
        assert!(m(json!({"kind": "Deployment"})));
        assert!(m(json!({"kind": "Deployment", "group": "apps", "version": "v1"})));
        assert!(m(json!({"name": "web"})));
        assert!(!m(json!({"kind": "Service"})));
        assert!(!m(json!({"group": "batch"})));
        assert!(!m(json!({"name": "other"})));

        let core = json!({"apiVersion": "v1", "kind": "Service", "metadata": {"name": "s"}});
        let sel: TargetSelector = from_value(json!({"group": "", "version": "v1"})).unwrap();
        assert!(matches_target(&sel, &core));
    }
}
