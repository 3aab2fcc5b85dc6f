#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]
//! Api contains the versions of the stencil manifest documents.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

pub mod v1alpha1;

/// GROUP is the API group for all stencil documents.
pub static GROUP: &str = "stencil.dev";

/// Metadata is the common object metadata carried by every document.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Name of the object.
    #[validate(length(min = 1))]
    pub name: String,
    /// Namespace of the object, if namespaced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Labels attached to the object.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations attached to the object.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}
