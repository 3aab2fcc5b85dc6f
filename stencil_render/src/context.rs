//! Assembly of the variable environments handed to the template engine.

use serde_json::{Map as JsonMap, Value as Json, json};

use api::v1alpha1::{
    AdditionalContext, Addon, AddonInstance, Component, ComponentDefinition, EnvironmentSettings,
};
use stencil_expr::Environment;
use stencil_patch::deep_merge;

use crate::Result;

/// Component_environment builds the environment for the base render:
/// schema defaults, then component parameters, then environment overrides,
/// plus the `metadata`/`build`/platform-context variables.
pub(crate) fn component_environment(
    definition: &ComponentDefinition,
    component: &Component,
    env_settings: Option<&EnvironmentSettings>,
    context: Option<&AdditionalContext>,
    workload: Option<&Json>,
) -> Result<Environment> {
    let schema = stencil_schema::translate(&definition.spec.schema)?;
    let mut spec = schema.defaults();
    deep_merge(&mut spec, &Json::Object(component.spec.parameters.clone()));
    if let Some(es) = env_settings {
        deep_merge(&mut spec, &Json::Object(es.spec.overrides.clone()));
    }

    let mut env = Environment::new();
    env.insert("spec".into(), spec);
    env.insert("metadata".into(), metadata_value(component));
    env.insert("build".into(), build_value(component, context));

    if let Some(ctx) = context {
        if !ctx.pod_selectors.is_empty() {
            env.insert("podSelectors".into(), json!(ctx.pod_selectors));
        }
        if let Some(configurations) = &ctx.configurations {
            env.insert("configurations".into(), json!(configurations));
        }
        if let Some(secrets) = &ctx.secrets {
            env.insert("secrets".into(), json!(secrets));
        }
    }
    if let Some(workload) = workload {
        env.insert("workload".into(), workload.clone());
    }
    Ok(env)
}

/// Addon_environment builds the environment one addon instance renders
/// with: the base environment with `spec` rebound to the addon's own
/// defaults/config/overrides layering, plus `instanceId`.
pub(crate) fn addon_environment(
    addon: &Addon,
    instance: &AddonInstance,
    env_settings: Option<&EnvironmentSettings>,
    base: &Environment,
) -> Result<Environment> {
    let schema = stencil_schema::translate(&addon.spec.schema)?;
    let mut spec = schema.defaults();
    deep_merge(&mut spec, &Json::Object(instance.config.clone()));
    if let Some(overrides) = env_settings
        .and_then(|es| es.spec.addon_overrides.get(&instance.instance_id))
    {
        deep_merge(&mut spec, &Json::Object(overrides.clone()));
    }

    let mut env = base.clone();
    env.insert("spec".into(), spec);
    env.insert("instanceId".into(), json!(instance.instance_id));
    Ok(env)
}

fn metadata_value(component: &Component) -> Json {
    let m = &component.metadata;
    let mut out = JsonMap::new();
    out.insert("name".into(), json!(m.name));
    if let Some(ns) = &m.namespace {
        out.insert("namespace".into(), json!(ns));
    }
    out.insert("labels".into(), json!(m.labels));
    out.insert("annotations".into(), json!(m.annotations));
    Json::Object(out)
}

// The platform-provided image wins over whatever the component declared.
fn build_value(component: &Component, context: Option<&AdditionalContext>) -> Json {
    let mut out = match &component.spec.build {
        Some(build) => json!(build),
        None => Json::Object(JsonMap::new()),
    };
    if let Some(image) = context
        .and_then(|c| c.build.as_ref())
        .and_then(|b| b.image.as_ref())
    {
        out["image"] = json!(image);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::from_value;

    fn definition(v: Json) -> ComponentDefinition {
        from_value(v).unwrap()
    }

    fn component(v: Json) -> Component {
        from_value(v).unwrap()
    }

    #[test]
    fn defaults_then_parameters_then_overrides() {
        let def = definition(json!({
            "metadata": {"name": "web-service"},
            "spec": {
                "schema": {
                    "parameters": {
                        "replicas": "integer | default=1",
                        "mode": "string | default=safe",
                        "resources": {
                            "requests": {
                                "cpu": "string | default=100m",
                                "memory": "string | required=false",
                            },
                        },
                    },
                },
            },
        }));
        let c = component(json!({
            "metadata": {"name": "checkout"},
            "spec": {
                "componentType": "web-service",
                "parameters": {
                    "mode": "fast",
                    "resources": {"requests": {"cpu": "250m"}},
                },
            },
        }));
        let es: EnvironmentSettings = from_value(json!({
            "metadata": {"name": "checkout-prod"},
            "spec": {
                "environment": "prod",
                "overrides": {
                    "replicas": 3,
                    "resources": {"requests": {"memory": "256Mi"}},
                },
            },
        }))
        .unwrap();

        let env = component_environment(&def, &c, Some(&es), None, None).unwrap();
        assert_eq!(
            env["spec"],
            json!({
                "replicas": 3,
                "mode": "fast",
                "resources": {"requests": {"cpu": "250m", "memory": "256Mi"}}
            }),
        );
        assert_eq!(env["metadata"]["name"], json!("checkout"));
        assert_eq!(env["build"], json!({}));
        assert!(!env.contains_key("workload"));
    }

    #[test]
    fn platform_image_wins() {
        let def = definition(json!({
            "metadata": {"name": "t"},
            "spec": {},
        }));
        let c = component(json!({
            "metadata": {"name": "c"},
            "spec": {
                "componentType": "t",
                "build": {"image": "registry/app:dev", "templateRef": "docker"},
            },
        }));
        let ctx: AdditionalContext = from_value(json!({
            "build": {"image": "registry/app:sha-abc123"},
            "podSelectors": {"app": "c"},
        }))
        .unwrap();

        let env = component_environment(&def, &c, None, Some(&ctx), None).unwrap();
        assert_eq!(env["build"]["image"], json!("registry/app:sha-abc123"));
        assert_eq!(env["build"]["templateRef"], json!("docker"));
        assert_eq!(env["podSelectors"], json!({"app": "c"}));
    }

    #[test]
    fn addon_spec_layers_by_instance() {
        let addon: Addon = from_value(json!({
            "metadata": {"name": "volume"},
            "spec": {
                "schema": {"parameters": {"size": "string | default=1Gi"}},
            },
        }))
        .unwrap();
        let instance: AddonInstance = from_value(json!({
            "name": "volume",
            "instanceId": "data",
            "config": {"size": "10Gi"},
        }))
        .unwrap();
        let es: EnvironmentSettings = from_value(json!({
            "metadata": {"name": "es"},
            "spec": {
                "environment": "prod",
                "addonOverrides": {
                    "data": {"size": "50Gi"},
                    "other": {"size": "9Gi"},
                },
            },
        }))
        .unwrap();

        let mut base = Environment::new();
        base.insert("metadata".into(), json!({"name": "c"}));

        let env = addon_environment(&addon, &instance, Some(&es), &base).unwrap();
        assert_eq!(env["spec"], json!({"size": "50Gi"}));
        assert_eq!(env["instanceId"], json!("data"));
        assert_eq!(env["metadata"], json!({"name": "c"}));
    }
}
