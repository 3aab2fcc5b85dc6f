#![cfg_attr(debug_assertions, warn(missing_docs))]
#![cfg_attr(debug_assertions, warn(rustdoc::broken_intra_doc_links))]
#![cfg_attr(not(debug_assertions), deny(missing_docs))]
#![cfg_attr(not(debug_assertions), deny(rustdoc::broken_intra_doc_links))]

//! Stencil_expr hosts the expression language and the template engine built
//! on top of it.
//!
//! Expressions are CEL, extended with the string/encoding/math/list helpers
//! registered in [`ext`], an `omit()` builtin signalling "remove my
//! surrounding field", and a single-level `merge()`. Templates are arbitrary
//! JSON trees whose strings may carry `${…}` fragments; [`render`] walks a
//! tree and substitutes every fragment.
//!
//! ```
//! use serde_json::json;
//! use stencil_expr::{render, Environment, Rendered};
//!
//! let mut env = Environment::new();
//! env.insert("spec".into(), json!({"replicas": 3}));
//!
//! let out = render(&json!({"replicas": "${spec.replicas}"}), &env).unwrap();
//! assert_eq!(out, Rendered::Value(json!({"replicas": 3})));
//! ```

use std::collections::BTreeMap;

mod convert;
mod eval;
pub mod ext;
mod template;

pub use eval::{Evaluated, evaluate};
pub use template::{Rendered, render};

/// Environment is the set of variables visible to an expression.
///
/// Scoping is by construction: callers clone an environment and insert the
/// loop or resource variables for the duration of a nested render.
pub type Environment = BTreeMap<String, serde_json::Value>;

/// Error is the error domain for expression evaluation and rendering.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The expression failed to parse.
    #[error("parse error in {expression:?}: {source}")]
    Parse {
        /// The offending expression text.
        expression: String,
        /// The parser diagnostics, position-bearing.
        source: cel::ParseErrors,
    },
    /// The expression failed to evaluate.
    #[error("evaluation error in {expression:?}: {source}")]
    Eval {
        /// The offending expression text.
        expression: String,
        /// The runtime failure.
        source: cel::ExecutionError,
    },
    /// The expression produced a value with no document representation.
    #[error("unrepresentable result from {expression:?}: {message}")]
    Unrepresentable {
        /// The offending expression text.
        expression: String,
        /// What the value was.
        message: String,
    },
    /// A failure while rendering a template, located by field path.
    #[error("render error at {path}: {source}")]
    Template {
        /// Dotted path of the enclosing field.
        path: String,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Is_missing_data reports whether the failure is an unresolved
    /// reference: an unknown variable, key, or field.
    ///
    /// Predicates such as resource guards treat these as "false" rather than
    /// failing the render.
    pub fn is_missing_data(&self) -> bool {
        use cel::ExecutionError::{NoSuchKey, UndeclaredReference};
        match self {
            Error::Eval { source, .. } => matches!(source, NoSuchKey(_) | UndeclaredReference(_)),
            Error::Template { source, .. } => source.is_missing_data(),
            _ => false,
        }
    }
}

/// Result is the usual alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;
