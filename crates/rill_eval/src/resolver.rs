//! Reference resolution.
//!
//! Pure lookups of data paths and variables against a [`Context`]. A
//! mandatory reference that cannot be resolved fails with
//! [`EngineError::Reference`]; an optional one resolves to `None`.

use crate::expr::{Expr, Path, Segment, TemplatePart};
use rill_core::{Binding, Context, EngineError, EngineResult, Value, to_text};

/// Follow `path` into `value`.
///
/// A key applied to an array maps over its elements, dropping elements
/// without the key and flattening array results. On failure returns the
/// index of the first segment that could not be followed.
///
/// # Errors
///
/// Returns the failing segment index
pub fn navigate(value: &Value, path: &Path) -> Result<Value, usize> {
    let mut current = value.clone();
    for (index, segment) in path.segments().iter().enumerate() {
        current = step(&current, segment).ok_or(index)?;
    }
    Ok(current)
}

fn step(value: &Value, segment: &Segment) -> Option<Value> {
    match (segment, value) {
        (Segment::Index(i, _), Value::Array(items)) => items.get(*i).cloned(),
        (Segment::Index(_, key), Value::Object(map)) => map.get(key).cloned(),
        (Segment::Key(key), Value::Object(map)) => map.get(key).cloned(),
        (Segment::Key(_), Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match step(item, segment) {
                    Some(Value::Array(inner)) => out.extend(inner),
                    Some(found) => out.push(found),
                    None => {}
                }
            }
            Some(Value::Array(out))
        }
        _ => None,
    }
}

fn missing(reference: String, path: &Path, index: usize) -> EngineError {
    let segment = path
        .segments()
        .get(index)
        .map(ToString::to_string)
        .unwrap_or_default();
    EngineError::reference(reference, format!("no value at segment '{}'", segment))
}

/// Resolve a data path against the current value
///
/// # Errors
///
/// Returns [`EngineError::Reference`] when a mandatory path is missing
pub fn resolve_path(ctx: &Context, path: &Path, optional: bool) -> EngineResult<Option<Value>> {
    match navigate(ctx.data(), path) {
        Ok(value) => Ok(Some(value)),
        Err(_) if optional => Ok(None),
        Err(index) => Err(missing(path.to_string(), path, index)),
    }
}

/// Resolve a variable, then a path into its value.
///
/// A resource bound to the variable is returned as-is when the path is
/// empty; otherwise the path navigates the resource's snapshot.
///
/// # Errors
///
/// Returns [`EngineError::Reference`] when a mandatory variable or path is
/// missing, and [`EngineError::ScopeOverflow`] when the scope walk exceeds
/// its cap
pub fn resolve_var(
    ctx: &Context,
    name: &str,
    path: &Path,
    optional: bool,
) -> EngineResult<Option<Binding>> {
    let reference = || {
        if path.is_empty() {
            format!("${}", name)
        } else {
            format!("${}/{}", name, path)
        }
    };

    let Some(binding) = ctx.lookup_var(name)? else {
        if optional {
            return Ok(None);
        }
        return Err(EngineError::reference(reference(), "variable not defined"));
    };
    if path.is_empty() {
        return Ok(Some(binding));
    }
    match navigate(&binding.to_value(), path) {
        Ok(value) => Ok(Some(Binding::Value(value))),
        Err(_) if optional => Ok(None),
        Err(index) => Err(missing(reference(), path, index)),
    }
}

/// Render template parts to a string. Unresolved optional references
/// render as empty text.
///
/// # Errors
///
/// Propagates reference failures
pub fn render_template(parts: &[TemplatePart], ctx: &Context) -> EngineResult<String> {
    let mut out = String::new();
    for part in parts {
        match part {
            TemplatePart::Text(text) => out.push_str(text),
            TemplatePart::Ref(expr) => {
                if let Some(binding) = resolve(expr, ctx)? {
                    out.push_str(&to_text(&binding.to_value()));
                }
            }
        }
    }
    Ok(out)
}

/// Resolve a reference, literal or template expression
///
/// # Errors
///
/// Returns [`EngineError::Reference`] for missing mandatory references and
/// [`EngineError::InvalidArgument`] for operator nodes, which need the
/// evaluator
pub fn resolve(expr: &Expr, ctx: &Context) -> EngineResult<Option<Binding>> {
    match expr {
        Expr::Literal(value) => Ok(Some(Binding::Value(value.clone()))),
        Expr::PathRef { path, optional } => {
            Ok(resolve_path(ctx, path, *optional)?.map(Binding::Value))
        }
        Expr::VarRef {
            name,
            path,
            optional,
        } => resolve_var(ctx, name, path, *optional),
        Expr::Template(parts) => Ok(Some(Binding::Value(Value::String(render_template(
            parts, ctx,
        )?)))),
        Expr::Step(_) | Expr::Pipeline(_) => Err(EngineError::invalid_argument(
            expr.describe(),
            "operator expressions are evaluated, not resolved",
        )),
    }
}
