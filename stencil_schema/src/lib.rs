#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

//! Stencil_schema translates the compact field DSL carried by definitions and
//! addons into JSON Schema documents, and derives the defaults tree used to
//! seed rendering inputs.
//!
//! A schema is a mapping from field name to either a nested mapping (an
//! inline object) or a constraint string:
//!
//! ```text
//! replicas: "integer | default=1 minimum=0"
//! endpoints: "[]Endpoint | minItems=1"
//! labels: "map<string>"
//! ```
//!
//! Named types such as `Endpoint` resolve from the schema's side table of
//! custom types.

use serde_json::{Map as JsonMap, Value as Json};

use api::v1alpha1::SchemaSpec;

mod defaults;
mod dsl;

/// Error enumerates the failures reported by this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A field description was neither a mapping nor a constraint string.
    #[error("field {field:?}: expected a mapping or a constraint string")]
    FieldShape {
        /// The offending field.
        field: String,
    },
    /// A constraint string could not be parsed.
    #[error("field {field:?}: malformed constraint: {message}")]
    Constraint {
        /// The offending field.
        field: String,
        /// What went wrong.
        message: String,
    },
    /// A named type did not resolve from the side table.
    #[error("unknown type {name:?}")]
    UnknownType {
        /// The unresolved name.
        name: String,
    },
    /// Named types reference each other in a cycle.
    #[error("type cycle: {path}")]
    CyclicType {
        /// The cycle, as `A -> B -> A`.
        path: String,
    },
}

/// Result is the usual alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Schema is a translated schema: the JSON Schema document plus the defaults
/// tree extracted from it.
#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
    document: Json,
    defaults: Json,
}

impl Schema {
    /// Document returns the JSON Schema document.
    pub fn document(&self) -> &Json {
        &self.document
    }

    /// Into_document consumes the schema, returning the document.
    pub fn into_document(self) -> Json {
        self.document
    }

    /// Defaults returns a fresh deep copy of the defaults tree.
    ///
    /// Always a mapping; empty when the schema declares no defaults.
    pub fn defaults(&self) -> Json {
        self.defaults.clone()
    }
}

/// Translate converts a schema's `parameters` DSL into a [`Schema`].
pub fn translate(spec: &SchemaSpec) -> Result<Schema> {
    translate_fields(&spec.parameters, &spec.types)
}

/// Translate_overrides converts a schema's `envOverrides` DSL into a
/// [`Schema`], resolving names from the same side table.
pub fn translate_overrides(spec: &SchemaSpec) -> Result<Schema> {
    translate_fields(&spec.env_overrides, &spec.types)
}

/// Translate_fields converts one field-DSL mapping into a [`Schema`].
pub fn translate_fields(fields: &JsonMap<String, Json>, types: &JsonMap<String, Json>) -> Result<Schema> {
    let document = dsl::Translator::new(types).object_schema(fields)?;
    let defaults = defaults::extract(&document).unwrap_or_else(|| Json::Object(JsonMap::new()));
    Ok(Schema { document, defaults })
}
