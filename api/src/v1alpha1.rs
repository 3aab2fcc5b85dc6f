//! Module `v1alpha1` implements the v1alpha1 stencil document API.
//!
//! The documents here are the parsed forms of the manifests a platform feeds
//! into the renderer: a [`ComponentDefinition`] describing a parameterised
//! family of resources, [`Addon`]s bundling extra resources and patches, a
//! [`Component`] selecting parameters and addons, [`EnvironmentSettings`]
//! overlaying values per deployment target, and the platform-injected
//! [`AdditionalContext`].

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::{Validate, ValidationError};

pub use crate::Metadata;

/// VERSION is the API group's version.
pub static VERSION: &str = "v1alpha1";

/// ComponentDefinition describes a reusable, parameterised family of resource
/// documents.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDefinition {
    /// ApiVersion of this document.
    #[serde(default)]
    pub api_version: String,
    /// Kind of this document.
    #[serde(default)]
    pub kind: String,
    /// Standard object metadata.
    #[validate]
    pub metadata: Metadata,
    /// Spec holds the schema and resource templates.
    #[validate]
    pub spec: ComponentDefinitionSpec,
}

/// ComponentDefinitionSpec is the payload of a [`ComponentDefinition`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDefinitionSpec {
    /// WorkloadType names the workload family this definition produces.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workload_type: Option<String>,
    /// Schema describes the parameters accepted by this definition.
    #[serde(default)]
    pub schema: SchemaSpec,
    /// Resources is the ordered list of resource templates to render.
    #[serde(default)]
    #[validate(custom = "unique_resource_ids")]
    pub resources: Vec<ResourceTemplate>,
}

/// SchemaSpec is the compact field-DSL schema carried by definitions and
/// addons.
///
/// The values are raw DSL mappings; translation to JSON Schema happens in the
/// schema crate, not here.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSpec {
    /// Types is the side table of named custom types.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub types: Map<String, Value>,
    /// Parameters describes the accepted parameter fields.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
    /// EnvOverrides describes the fields that environments may override.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub env_overrides: Map<String, Value>,
}

/// ResourceTemplate is a single templated resource inside a definition.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplate {
    /// Id is the stable identifier, unique within the definition.
    pub id: String,
    /// IncludeWhen guards rendering; must evaluate to a boolean.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_when: Option<String>,
    /// ForEach iterates the template; must evaluate to a sequence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub for_each: Option<String>,
    /// Var is the loop variable name used with forEach. Defaults to `item`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub var: Option<String>,
    /// Template is the resource body with embedded expressions.
    #[serde(default)]
    pub template: Map<String, Value>,
}

/// Addon bundles additional resources and patches applied after the base
/// resources of a component render.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Addon {
    /// ApiVersion of this document.
    #[serde(default)]
    pub api_version: String,
    /// Kind of this document.
    #[serde(default)]
    pub kind: String,
    /// Standard object metadata.
    #[validate]
    pub metadata: Metadata,
    /// Spec holds the creates and patches.
    pub spec: AddonSpec,
}

/// AddonSpec is the payload of an [`Addon`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonSpec {
    /// DisplayName is a human-friendly name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Schema describes the configuration accepted by this addon.
    #[serde(default)]
    pub schema: SchemaSpec,
    /// Creates is the ordered list of full resource documents to add.
    #[serde(default)]
    pub creates: Vec<Map<String, Value>>,
    /// Patches is the ordered list of patch specs to apply.
    #[serde(default)]
    pub patches: Vec<PatchSpec>,
    /// Documentation for addon consumers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

/// PatchSpec is a target selector plus an ordered list of operations,
/// optionally iterated.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchSpec {
    /// ForEach iterates the patch; must evaluate to a sequence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub for_each: Option<String>,
    /// Var is the loop variable name used with forEach. Defaults to `item`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub var: Option<String>,
    /// Target selects the resources this patch applies to.
    #[serde(default)]
    pub target: TargetSelector,
    /// Operations is the ordered list of patch operations.
    #[serde(default)]
    pub operations: Vec<Operation>,
}

/// TargetSelector narrows the rendered resource list for a patch.
///
/// Unset fields match everything.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSelector {
    /// Kind matches the resource `kind`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Group matches the group half of `apiVersion`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Version matches the version half of `apiVersion`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Name matches `metadata.name`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Where is an expression filter evaluated with `resource` in scope.
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_: Option<String>,
}

/// Operation is a single patch operation.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Op is the verb.
    pub op: Op,
    /// Path is an extended JSON Pointer; `${…}` fragments are legal.
    pub path: String,
    /// Value carries the operand for verbs that take one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// From is the source pointer for `copy` and `move`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

/// Op enumerates the patch verbs.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Op {
    /// RFC 6902 `add`.
    Add,
    /// RFC 6902 `replace`.
    Replace,
    /// RFC 6902 `remove`.
    Remove,
    /// Recursive deep merge at the path.
    Merge,
    /// Single-level merge at the path.
    MergeShallow,
    /// RFC 6902 `test`.
    Test,
    /// RFC 6902 `copy`.
    Copy,
    /// RFC 6902 `move`.
    Move,
}

/// Component is a concrete selection of parameters and addons against a
/// [`ComponentDefinition`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    /// ApiVersion of this document.
    #[serde(default)]
    pub api_version: String,
    /// Kind of this document.
    #[serde(default)]
    pub kind: String,
    /// Standard object metadata.
    #[validate]
    pub metadata: Metadata,
    /// Spec holds the parameters, addon instances, and build details.
    #[validate]
    pub spec: ComponentSpec,
}

/// ComponentSpec is the payload of a [`Component`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// ComponentType names the definition this component instantiates.
    pub component_type: String,
    /// Parameters supplies values for the definition's schema.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
    /// Addons is the ordered list of addon instances to apply.
    #[serde(default)]
    #[validate(custom = "unique_instance_ids")]
    pub addons: Vec<AddonInstance>,
    /// Build describes how the workload image is produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSpec>,
}

/// AddonInstance selects an addon with a configuration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonInstance {
    /// Name of the addon.
    pub name: String,
    /// InstanceId is unique within the component.
    pub instance_id: String,
    /// Config supplies values for the addon's schema.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub config: Map<String, Value>,
}

/// BuildSpec describes the build of the component's workload image.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSpec {
    /// Image is the pre-built image, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Repository is the source repository to build from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<Repository>,
    /// TemplateRef names the build template to use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_ref: Option<String>,
}

/// Repository locates the source used for a build.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// Url of the repository.
    #[serde(default)]
    pub url: String,
    /// Revision to check out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// AppPath is the path to the application inside the repository.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_path: Option<String>,
}

/// EnvironmentSettings overlays parameter values for one deployment target.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSettings {
    /// ApiVersion of this document.
    #[serde(default)]
    pub api_version: String,
    /// Kind of this document.
    #[serde(default)]
    pub kind: String,
    /// Standard object metadata.
    #[validate]
    pub metadata: Metadata,
    /// Spec holds the overrides.
    pub spec: EnvironmentSettingsSpec,
}

/// EnvironmentSettingsSpec is the payload of [`EnvironmentSettings`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSettingsSpec {
    /// Environment names the deployment target.
    pub environment: String,
    /// Overrides is deep-merged into the component parameters.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub overrides: Map<String, Value>,
    /// AddonOverrides maps an addon `instanceId` to its overrides.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub addon_overrides: BTreeMap<String, Map<String, Value>>,
    /// Owner records who owns this environment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// ComponentRef names the component these settings apply to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_ref: Option<String>,
}

/// AdditionalContext is the platform-injected data made available to
/// expressions.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalContext {
    /// PodSelectors are the selector labels for the workload's pods.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pod_selectors: BTreeMap<String, String>,
    /// Build carries platform build output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildContext>,
    /// Configurations are plain config bindings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configurations: Option<Configurations>,
    /// Secrets are secret bindings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secrets: Option<Secrets>,
}

/// BuildContext is the build output injected by the platform.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildContext {
    /// Image is the image produced by the platform build.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Configurations groups plain configuration bindings.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Configurations {
    /// Envs are environment-variable bindings.
    #[serde(default)]
    pub envs: Vec<ConfigEnv>,
    /// Files are file-mount bindings.
    #[serde(default)]
    pub files: Vec<ConfigFile>,
}

/// ConfigEnv is one plain environment-variable binding.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigEnv {
    /// Name of the variable.
    pub name: String,
    /// Value of the variable.
    #[serde(default)]
    pub value: String,
}

/// ConfigFile is one plain file-mount binding.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    /// Name of the file binding.
    pub name: String,
    /// MountPath is where the file lands in the container.
    pub mount_path: String,
    /// Content of the file.
    #[serde(default)]
    pub content: String,
}

/// Secrets groups secret bindings.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Secrets {
    /// Envs are secret environment-variable bindings.
    #[serde(default)]
    pub envs: Vec<SecretEnv>,
    /// Files are secret file-mount bindings.
    #[serde(default)]
    pub files: Vec<SecretFile>,
}

/// SecretEnv is one secret environment-variable binding.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretEnv {
    /// Name of the variable.
    pub name: String,
    /// ValueRef locates the secret value.
    #[serde(default)]
    pub value_ref: String,
}

/// SecretFile is one secret file-mount binding.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretFile {
    /// Name of the file binding.
    pub name: String,
    /// MountPath is where the file lands in the container.
    pub mount_path: String,
    /// ValueRef locates the secret content.
    #[serde(default)]
    pub value_ref: String,
}

fn unique_resource_ids(resources: &Vec<ResourceTemplate>) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for r in resources {
        if !seen.insert(r.id.as_str()) {
            let mut err = ValidationError::new("duplicate_resource_id");
            err.add_param("id".into(), &r.id);
            return Err(err);
        }
    }
    Ok(())
}

fn unique_instance_ids(addons: &Vec<AddonInstance>) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for a in addons {
        if !seen.insert(a.instance_id.as_str()) {
            let mut err = ValidationError::new("duplicate_instance_id");
            err.add_param("instanceId".into(), &a.instance_id);
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::{from_value, json};

    #[test]
    fn component_definition() {
        let def: ComponentDefinition = from_value(json!({
            "apiVersion": "stencil.dev/v1alpha1",
            "kind": "ComponentDefinition",
            "metadata": { "name": "web-service" },
            "spec": {
                "workloadType": "deployment",
                "schema": {
                    "parameters": {
                        "replicas": "integer | default=1",
                    },
                },
                "resources": [
                    { "id": "deployment", "template": { "kind": "Deployment" } },
                    { "id": "service", "includeWhen": "${spec.expose}", "template": {} },
                ],
            },
        }))
        .unwrap();
        assert_eq!(def.spec.resources.len(), 2);
        assert_eq!(
            def.spec.resources[1].include_when.as_deref(),
            Some("${spec.expose}")
        );
        def.validate().unwrap();
    }

    #[test]
    fn duplicate_resource_id_rejected() {
        let def: ComponentDefinition = from_value(json!({
            "metadata": { "name": "web" },
            "spec": {
                "resources": [
                    { "id": "a", "template": {} },
                    { "id": "a", "template": {} },
                ],
            },
        }))
        .unwrap();
        assert!(def.validate().is_err());
    }

    #[test]
    fn duplicate_instance_id_rejected() {
        let c: Component = from_value(json!({
            "metadata": { "name": "web" },
            "spec": {
                "componentType": "web-service",
                "addons": [
                    { "name": "pvc", "instanceId": "data" },
                    { "name": "pvc", "instanceId": "data" },
                ],
            },
        }))
        .unwrap();
        assert!(c.validate().is_err());
    }

    #[test]
    fn operation_verbs() {
        let op: Operation = from_value(json!({
            "op": "mergeShallow",
            "path": "/spec/template",
            "value": {},
        }))
        .unwrap();
        assert_eq!(op.op, Op::MergeShallow);
        assert_eq!(op.op.to_string(), "mergeShallow");

        let op: Operation = from_value(json!({
            "op": "move",
            "path": "/b",
            "from": "/a",
        }))
        .unwrap();
        assert_eq!(op.op, Op::Move);
        assert_eq!(op.from.as_deref(), Some("/a"));
    }

    #[test]
    fn where_keyword_field() {
        let p: PatchSpec = from_value(json!({
            "target": { "kind": "Deployment", "where": "${resource.metadata.name == 'web'}" },
            "operations": [],
        }))
        .unwrap();
        assert_eq!(
            p.target.where_.as_deref(),
            Some("${resource.metadata.name == 'web'}")
        );
        let out = serde_json::to_value(&p).unwrap();
        assert!(out["target"].get("where").is_some());
    }

    #[test]
    fn environment_settings_from_yaml() {
        let doc = r#"
apiVersion: stencil.dev/v1alpha1
kind: EnvironmentSettings
metadata:
  name: web-prod
spec:
  environment: production
  overrides:
    replicas: 3
  addonOverrides:
    data:
      size: 50Gi
"#;
        let es: EnvironmentSettings = serde_yaml::from_str(doc).unwrap();
        assert_eq!(es.spec.environment, "production");
        assert_eq!(es.spec.addon_overrides["data"]["size"], json!("50Gi"));
    }
}
