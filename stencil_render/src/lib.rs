#![cfg_attr(debug_assertions, warn(missing_docs))]
#![cfg_attr(debug_assertions, warn(rustdoc::broken_intra_doc_links))]
#![cfg_attr(not(debug_assertions), deny(missing_docs))]
#![cfg_attr(not(debug_assertions), deny(rustdoc::broken_intra_doc_links))]

//! Stencil_render turns a component definition, a component, and its addons
//! into the final list of resource documents.
//!
//! ```
//! # use serde_json::{from_value, json};
//! use api::v1alpha1::{Component, ComponentDefinition};
//! use stencil_render::Renderer;
//!
//! let definition: ComponentDefinition = from_value(json!({
//!     "metadata": {"name": "web-service"},
//!     "spec": {
//!         "schema": {"parameters": {"replicas": "integer | default=1"}},
//!         "resources": [{
//!             "id": "deployment",
//!             "template": {
//!                 "apiVersion": "apps/v1",
//!                 "kind": "Deployment",
//!                 "metadata": {"name": "${metadata.name}"},
//!                 "spec": {"replicas": "${spec.replicas}"},
//!             },
//!         }],
//!     },
//! })).unwrap();
//! let component: Component = from_value(json!({
//!     "metadata": {"name": "checkout"},
//!     "spec": {"componentType": "web-service"},
//! })).unwrap();
//!
//! let resources = Renderer::new(&definition, &component).render_all().unwrap();
//! assert_eq!(resources[0]["spec"]["replicas"], json!(1));
//! ```
//!
//! Rendering is staged: the definition's resource templates render in
//! declaration order, then each addon instance renders its `creates` and
//! applies its `patches`, each instance observing everything the previous
//! ones produced.

use serde_json::Value as Json;
use tracing::debug;

use api::v1alpha1::{AdditionalContext, Addon, Component, ComponentDefinition, EnvironmentSettings};

mod context;
mod pipeline;

/// Error is the error domain for rendering.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A failure while rendering one resource template.
    #[error("resource {id:?}: {source}")]
    Resource {
        /// The resource template id.
        id: String,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },
    /// A failure while applying one addon instance.
    #[error("addon {name:?} instance {instance_id:?}: {source}")]
    Addon {
        /// The addon name.
        name: String,
        /// The addon instance id.
        instance_id: String,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },
    /// A failure in one patch operation.
    #[error("patch {patch}, operation {operation}: {source}")]
    Operation {
        /// Index of the patch spec.
        patch: usize,
        /// Index of the operation inside it.
        operation: usize,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },
    /// A component references an addon that was not supplied.
    #[error("no addon named {name:?} for instance {instance_id:?}")]
    UnknownAddon {
        /// The addon name the component asked for.
        name: String,
        /// The instance that asked.
        instance_id: String,
    },
    /// Something rendered to the wrong shape.
    #[error("{message}")]
    Shape {
        /// What was expected and what arrived.
        message: String,
    },
    /// An expression failure.
    #[error(transparent)]
    Expr(#[from] stencil_expr::Error),
    /// A schema translation failure.
    #[error(transparent)]
    Schema(#[from] stencil_schema::Error),
    /// A patch failure.
    #[error(transparent)]
    Patch(#[from] stencil_patch::Error),
}

impl Error {
    pub(crate) fn for_resource(id: &str) -> impl FnOnce(Error) -> Error {
        let id = id.to_string();
        move |source| Error::Resource {
            id,
            source: Box::new(source),
        }
    }

    pub(crate) fn for_addon(name: &str, instance_id: &str) -> impl FnOnce(Error) -> Error {
        let name = name.to_string();
        let instance_id = instance_id.to_string();
        move |source| Error::Addon {
            name,
            instance_id,
            source: Box::new(source),
        }
    }

    pub(crate) fn for_operation(patch: usize, operation: usize) -> impl FnOnce(Error) -> Error {
        move |source| Error::Operation {
            patch,
            operation,
            source: Box::new(source),
        }
    }

    pub(crate) fn shape(message: impl Into<String>) -> Error {
        Error::Shape {
            message: message.into(),
        }
    }
}

/// Result is the usual alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Renderer stages a full render of one component.
///
/// The borrowed inputs are never mutated; every render starts from fresh
/// copies of the schema defaults and parameter trees.
pub struct Renderer<'a> {
    definition: &'a ComponentDefinition,
    component: &'a Component,
    env_settings: Option<&'a EnvironmentSettings>,
    addons: &'a [Addon],
    context: Option<&'a AdditionalContext>,
    workload: Option<&'a Json>,
}

impl<'a> Renderer<'a> {
    /// New creates a renderer for `component` against `definition`.
    pub fn new(definition: &'a ComponentDefinition, component: &'a Component) -> Self {
        Self {
            definition,
            component,
            env_settings: None,
            addons: &[],
            context: None,
            workload: None,
        }
    }

    /// With_env_settings overlays per-environment values.
    pub fn with_env_settings(self, env_settings: &'a EnvironmentSettings) -> Self {
        Self {
            env_settings: Some(env_settings),
            ..self
        }
    }

    /// With_addons supplies the addon library the component may reference.
    pub fn with_addons(self, addons: &'a [Addon]) -> Self {
        Self { addons, ..self }
    }

    /// With_context attaches platform-injected context.
    pub fn with_context(self, context: &'a AdditionalContext) -> Self {
        Self {
            context: Some(context),
            ..self
        }
    }

    /// With_workload attaches the workload document.
    pub fn with_workload(self, workload: &'a Json) -> Self {
        Self {
            workload: Some(workload),
            ..self
        }
    }

    /// Render_all renders the base resources and applies every addon
    /// instance in declaration order.
    pub fn render_all(&self) -> Result<Vec<Json>> {
        self.render_with_addon_limit(self.component.spec.addons.len())
    }

    /// Render_with_addon_limit renders the base resources and applies the
    /// first `limit` addon instances. The limit is clamped to the number of
    /// instances the component declares.
    pub fn render_with_addon_limit(&self, limit: usize) -> Result<Vec<Json>> {
        let env = context::component_environment(
            self.definition,
            self.component,
            self.env_settings,
            self.context,
            self.workload,
        )?;

        let mut resources = pipeline::render_base(self.definition, &env)?;
        debug!(count = resources.len(), "base resources rendered");

        let limit = limit.min(self.component.spec.addons.len());
        for instance in &self.component.spec.addons[..limit] {
            let addon = self
                .addons
                .iter()
                .find(|a| a.metadata.name == instance.name)
                .ok_or_else(|| Error::UnknownAddon {
                    name: instance.name.clone(),
                    instance_id: instance.instance_id.clone(),
                })?;
            pipeline::apply_addon(addon, instance, self.env_settings, &env, &mut resources)
                .map_err(Error::for_addon(&instance.name, &instance.instance_id))?;
            debug!(
                addon = %instance.name,
                instance = %instance.instance_id,
                count = resources.len(),
                "addon applied",
            );
        }
        Ok(resources)
    }
}
