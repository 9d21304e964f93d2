//! Placeholder parser.
//!
//! Placeholders are delimited by `%`:
//!
//! - `%%` is the current value,
//! - `%a/b/0%` is a path into the current value,
//! - `%$name%` and `%$name/a/b%` look up a variable, then a path,
//! - a trailing `?` inside the delimiters marks the reference optional,
//! - `\%` is a literal percent sign.
//!
//! A string that is exactly one placeholder becomes a reference, keeping
//! the referenced value's type. Text mixed with placeholders becomes a
//! template rendered to a string. Plain text stays a literal.

use crate::expr::{Expr, Path, TemplatePart};
use rill_core::{EngineError, EngineResult, Value};

/// Parse `input` into an expression
///
/// # Errors
///
/// Returns [`EngineError::Parse`] for an unterminated placeholder or an
/// empty variable name
pub fn parse(input: &str) -> EngineResult<Expr> {
    let mut parts: Vec<TemplatePart> = Vec::new();
    let mut text = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'%') => {
                chars.next();
                text.push('%');
            }
            '%' => {
                let mut body = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == '%' {
                        closed = true;
                        break;
                    }
                    body.push(inner);
                }
                if !closed {
                    return Err(parse_error(input, "unterminated placeholder"));
                }
                if !text.is_empty() {
                    parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                }
                parts.push(TemplatePart::Ref(reference(&body, input)?));
            }
            other => text.push(other),
        }
    }
    if !text.is_empty() {
        parts.push(TemplatePart::Text(text));
    }

    match parts.len() {
        0 => Ok(Expr::Literal(Value::String(String::new()))),
        1 => match parts.pop() {
            Some(TemplatePart::Ref(expr)) => Ok(expr),
            Some(TemplatePart::Text(text)) => Ok(Expr::Literal(Value::String(text))),
            None => Ok(Expr::Literal(Value::String(String::new()))),
        },
        _ => Ok(Expr::Template(parts.into())),
    }
}

fn reference(body: &str, input: &str) -> EngineResult<Expr> {
    let (body, optional) = match body.strip_suffix('?') {
        Some(stripped) => (stripped, true),
        None => (body, false),
    };

    if let Some(var) = body.strip_prefix('$') {
        let (name, path) = var.split_once('/').unwrap_or((var, ""));
        if name.is_empty() {
            return Err(parse_error(input, "empty variable name"));
        }
        return Ok(Expr::VarRef {
            name: name.to_string(),
            path: Path::parse(path),
            optional,
        });
    }

    Ok(Expr::PathRef {
        path: Path::parse(body),
        optional,
    })
}

fn parse_error(input: &str, reason: &str) -> EngineError {
    EngineError::Parse {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}
