//! Compilation and evaluation of single expressions.

use cel::{Context, Program};

use crate::{Environment, Error, Result, convert, ext};

/// Evaluated is the outcome of evaluating one expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Evaluated {
    /// An ordinary value.
    Value(serde_json::Value),
    /// The `omit()` builtin was called: the surrounding field must disappear.
    Omit,
}

/// Evaluate compiles `expression` and runs it with the variables in `env`.
///
/// The runtime result is converted to a document-native value; `omit()` is
/// reported as [`Evaluated::Omit`] instead of a value.
pub fn evaluate(expression: &str, env: &Environment) -> Result<Evaluated> {
    let program = Program::compile(expression).map_err(|source| Error::Parse {
        expression: expression.to_string(),
        source,
    })?;

    let mut ctx: Context<'_> = ext::root_context().new_inner_scope();
    bind(&mut ctx, env);

    match program.execute(&ctx) {
        Ok(value) => {
            let value =
                convert::to_json(&value).map_err(|message| Error::Unrepresentable {
                    expression: expression.to_string(),
                    message,
                })?;
            Ok(Evaluated::Value(value))
        }
        Err(err) if ext::is_omit(&err) => Ok(Evaluated::Omit),
        Err(source) => Err(Error::Eval {
            expression: expression.to_string(),
            source,
        }),
    }
}

fn bind(ctx: &mut Context<'_>, env: &Environment) {
    for (name, value) in env {
        ctx.add_variable_from_value(name.clone(), convert::to_cel(value));
    }
}
