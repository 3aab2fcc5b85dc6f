//! The extension library registered on every evaluation context.
//!
//! Everything here follows the shape of the runtime's own builtins: plain
//! functions with extractor arguments, registered by name on a root
//! [`Context`] that individual evaluations derive inner scopes from.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use cel::extractors::{Arguments, Identifier, This};
use cel::objects::Key;
use cel::parser::Expression;
use cel::{Context, ExecutionError, FunctionContext, ResolveResult, Value};

/// OMIT_TOKEN is the reserved message carried by the error `omit()` raises.
///
/// The runtime has no way for a function to return "no value", so `omit()`
/// raises a function error with this exact message and the evaluation layer
/// translates it back into an omit marker before anything else can see it.
const OMIT_TOKEN: &str = "__omit__";

static ROOT: LazyLock<Context<'static>> = LazyLock::new(|| {
    let mut ctx = Context::default();
    register(&mut ctx);
    ctx
});

/// Root_context returns the shared context carrying the extension library.
pub fn root_context() -> &'static Context<'static> {
    &ROOT
}

/// Is_omit reports whether `err` is the token raised by `omit()`.
pub fn is_omit(err: &ExecutionError) -> bool {
    matches!(
        err,
        ExecutionError::FunctionError { function, message }
            if function.as_str() == "omit" && message.as_str() == OMIT_TOKEN
    )
}

/// Register installs the extension library into `ctx`.
pub fn register(ctx: &mut Context<'_>) {
    ctx.add_function("omit", omit);
    ctx.add_function("merge", merge);

    ctx.add_function("charAt", char_at);
    ctx.add_function("indexOf", index_of);
    ctx.add_function("lowerAscii", lower_ascii);
    ctx.add_function("upperAscii", upper_ascii);
    ctx.add_function("replace", replace);
    ctx.add_function("split", split);
    ctx.add_function("substring", substring);
    ctx.add_function("trim", trim);
    ctx.add_function("join", join);

    ctx.add_function("base64Encode", base64_encode);
    ctx.add_function("base64Decode", base64_decode);

    ctx.add_function("ceil", ceil);
    ctx.add_function("floor", floor);
    ctx.add_function("round", round);

    ctx.add_function("flatten", flatten);
    ctx.add_function("unique", unique);
    ctx.add_function("setContains", set_contains);
    ctx.add_function("setIntersects", set_intersects);

    ctx.add_function("transformMap", transform_map);
    ctx.add_function("transformMapEntry", transform_map_entry);
}

fn omit(ftx: &FunctionContext) -> ResolveResult {
    Err(ftx.error(OMIT_TOKEN))
}

// Single-level: keys of b shadow keys of a, nested maps are not descended
// into. Deep merging belongs to the patch engine, not the language.
fn merge(ftx: &FunctionContext, a: Value, b: Value) -> ResolveResult {
    let (Value::Map(a), Value::Map(b)) = (&a, &b) else {
        return Err(ftx.error("merge() expects two maps"));
    };
    let mut out: HashMap<Key, Value> = HashMap::with_capacity(a.map.len() + b.map.len());
    for (k, v) in a.map.iter() {
        out.insert(k.clone(), v.clone());
    }
    for (k, v) in b.map.iter() {
        out.insert(k.clone(), v.clone());
    }
    Ok(Value::Map(out.into()))
}

fn char_at(ftx: &FunctionContext, This(s): This<Arc<String>>, i: i64) -> ResolveResult {
    let Ok(i) = usize::try_from(i) else {
        return Err(ftx.error("index out of range"));
    };
    match s.chars().nth(i) {
        Some(c) => Ok(Value::String(Arc::new(c.to_string()))),
        None if i == s.chars().count() => Ok(Value::String(Arc::new(String::new()))),
        None => Err(ftx.error("index out of range")),
    }
}

fn index_of(This(s): This<Arc<String>>, needle: Arc<String>) -> i64 {
    match s.find(needle.as_str()) {
        Some(byte) => s[..byte].chars().count() as i64,
        None => -1,
    }
}

fn lower_ascii(This(s): This<Arc<String>>) -> String {
    s.to_ascii_lowercase()
}

fn upper_ascii(This(s): This<Arc<String>>) -> String {
    s.to_ascii_uppercase()
}

fn replace(This(s): This<Arc<String>>, from: Arc<String>, to: Arc<String>) -> String {
    s.replace(from.as_str(), to.as_str())
}

fn split(This(s): This<Arc<String>>, sep: Arc<String>) -> ResolveResult {
    let parts: Vec<Value> = s
        .split(sep.as_str())
        .map(|p| Value::String(Arc::new(p.to_string())))
        .collect();
    Ok(Value::List(Arc::new(parts)))
}

// substring(start) and substring(start, end), char-indexed like charAt.
fn substring(
    ftx: &FunctionContext,
    This(s): This<Arc<String>>,
    Arguments(args): Arguments,
) -> ResolveResult {
    let as_index = |v: &Value| -> Result<usize, ExecutionError> {
        match v {
            Value::Int(i) if *i >= 0 => Ok(*i as usize),
            Value::UInt(u) => Ok(*u as usize),
            _ => Err(ftx.error("substring() expects non-negative integer indexes")),
        }
    };
    let n = s.chars().count();
    let (start, end) = match args.as_slice() {
        [b] => (as_index(b)?, n),
        [b, e] => (as_index(b)?, as_index(e)?),
        _ => return Err(ftx.error("substring() expects one or two arguments")),
    };
    if start > end || end > n {
        return Err(ftx.error("substring() range out of bounds"));
    }
    let out: String = s.chars().skip(start).take(end - start).collect();
    Ok(Value::String(Arc::new(out)))
}

fn trim(This(s): This<Arc<String>>) -> String {
    s.trim().to_string()
}

// join() and join(separator) over a list of strings.
fn join(
    ftx: &FunctionContext,
    This(list): This<Value>,
    Arguments(args): Arguments,
) -> ResolveResult {
    let sep = match args.as_slice() {
        [] => String::new(),
        [Value::String(s)] => s.to_string(),
        _ => return Err(ftx.error("join() expects at most one string argument")),
    };
    let Value::List(items) = &list else {
        return Err(ftx.error("join() expects a list"));
    };
    let mut parts = Vec::with_capacity(items.len());
    for item in items.iter() {
        match item {
            Value::String(s) => parts.push(s.to_string()),
            _ => return Err(ftx.error("join() expects a list of strings")),
        }
    }
    Ok(Value::String(Arc::new(parts.join(&sep))))
}

fn base64_encode(ftx: &FunctionContext, This(v): This<Value>) -> ResolveResult {
    let encoded = match &v {
        Value::String(s) => BASE64.encode(s.as_bytes()),
        Value::Bytes(b) => BASE64.encode(b.as_slice()),
        _ => return Err(ftx.error("base64Encode() expects a string or bytes")),
    };
    Ok(Value::String(Arc::new(encoded)))
}

fn base64_decode(ftx: &FunctionContext, This(s): This<Arc<String>>) -> ResolveResult {
    let bytes = BASE64
        .decode(s.as_bytes())
        .map_err(|e| ftx.error(format!("invalid base64: {e}")))?;
    match String::from_utf8(bytes) {
        Ok(s) => Ok(Value::String(Arc::new(s))),
        Err(e) => Ok(Value::Bytes(Arc::new(e.into_bytes()))),
    }
}

fn ceil(ftx: &FunctionContext, v: Value) -> ResolveResult {
    numeric(ftx, v, "ceil", f64::ceil)
}

fn floor(ftx: &FunctionContext, v: Value) -> ResolveResult {
    numeric(ftx, v, "floor", f64::floor)
}

fn round(ftx: &FunctionContext, v: Value) -> ResolveResult {
    numeric(ftx, v, "round", f64::round)
}

fn numeric(ftx: &FunctionContext, v: Value, name: &str, f: fn(f64) -> f64) -> ResolveResult {
    match v {
        Value::Int(_) | Value::UInt(_) => Ok(v),
        Value::Float(x) => Ok(Value::Int(f(x) as i64)),
        _ => Err(ftx.error(format!("{name}() expects a number"))),
    }
}

// One level only; non-list elements are kept as-is.
fn flatten(ftx: &FunctionContext, This(list): This<Value>) -> ResolveResult {
    let Value::List(items) = &list else {
        return Err(ftx.error("flatten() expects a list"));
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items.iter() {
        match item {
            Value::List(inner) => out.extend(inner.iter().cloned()),
            other => out.push(other.clone()),
        }
    }
    Ok(Value::List(Arc::new(out)))
}

fn unique(ftx: &FunctionContext, This(list): This<Value>) -> ResolveResult {
    let Value::List(items) = &list else {
        return Err(ftx.error("unique() expects a list"));
    };
    let mut out: Vec<Value> = Vec::with_capacity(items.len());
    for item in items.iter() {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    Ok(Value::List(Arc::new(out)))
}

fn set_contains(ftx: &FunctionContext, This(a): This<Value>, b: Value) -> ResolveResult {
    let (Value::List(a), Value::List(b)) = (&a, &b) else {
        return Err(ftx.error("setContains() expects two lists"));
    };
    Ok(Value::Bool(b.iter().all(|x| a.contains(x))))
}

fn set_intersects(ftx: &FunctionContext, This(a): This<Value>, b: Value) -> ResolveResult {
    let (Value::List(a), Value::List(b)) = (&a, &b) else {
        return Err(ftx.error("setIntersects() expects two lists"));
    };
    Ok(Value::Bool(b.iter().any(|x| a.contains(x))))
}

fn key_value(k: &Key) -> Value {
    match k {
        Key::String(s) => Value::String(s.clone()),
        Key::Int(i) => Value::Int(*i),
        Key::Uint(u) => Value::UInt(*u),
        Key::Bool(b) => Value::Bool(*b),
    }
}

// transformMap(m, k, v, expr): same keys, values produced by expr.
fn transform_map(
    ftx: &FunctionContext,
    This(this): This<Value>,
    Identifier(key_var): Identifier,
    Identifier(val_var): Identifier,
    expr: Expression,
) -> ResolveResult {
    let Value::Map(m) = &this else {
        return Err(ftx.error("transformMap() expects a map"));
    };
    let mut out: HashMap<Key, Value> = HashMap::with_capacity(m.map.len());
    for (k, v) in m.map.iter() {
        let mut ptx = ftx.ptx.new_inner_scope();
        ptx.add_variable_from_value(key_var.as_str(), key_value(k));
        ptx.add_variable_from_value(val_var.as_str(), v.clone());
        out.insert(k.clone(), ptx.resolve(&expr)?);
    }
    Ok(Value::Map(out.into()))
}

// transformMapEntry(m, k, v, expr): expr yields a map whose entries are
// collected; later entries shadow earlier ones on key collision.
fn transform_map_entry(
    ftx: &FunctionContext,
    This(this): This<Value>,
    Identifier(key_var): Identifier,
    Identifier(val_var): Identifier,
    expr: Expression,
) -> ResolveResult {
    let Value::Map(m) = &this else {
        return Err(ftx.error("transformMapEntry() expects a map"));
    };
    let mut out: HashMap<Key, Value> = HashMap::with_capacity(m.map.len());
    for (k, v) in m.map.iter() {
        let mut ptx = ftx.ptx.new_inner_scope();
        ptx.add_variable_from_value(key_var.as_str(), key_value(k));
        ptx.add_variable_from_value(val_var.as_str(), v.clone());
        match ptx.resolve(&expr)? {
            Value::Map(entry) => {
                for (k, v) in entry.map.iter() {
                    out.insert(k.clone(), v.clone());
                }
            }
            _ => return Err(ftx.error("transformMapEntry() expression must yield a map")),
        }
    }
    Ok(Value::Map(out.into()))
}
