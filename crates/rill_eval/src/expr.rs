//! Expression trees.

use rill_core::{EngineError, EngineResult, ExprId, Value};
use serde::{Deserialize, Deserializer};
use std::sync::Arc;

/// One segment of a data path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Object key; maps over arrays
    Key(String),
    /// Array index with the text it was parsed from; on objects the text is
    /// looked up as a key
    Index(usize, String),
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(_, key) => f.write_str(key),
        }
    }
}

/// Slash-separated data path; empty means the value itself
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    /// The empty path
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse `a/b/0`. Empty segments are ignored and all-digit segments
    /// become indices.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let segments = input
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.parse::<usize>() {
                Ok(index) if s.bytes().all(|b| b.is_ascii_digit()) => Segment::Index(index, s.to_string()),
                _ => Segment::Key(s.to_string()),
            })
            .collect();
        Self { segments }
    }

    /// Path segments
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether the path has no segments
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

/// Piece of a string template
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Literal text
    Text(String),
    /// Reference rendered as text
    Ref(Expr),
}

/// Operator application
#[derive(Debug, PartialEq)]
pub struct StepExpr {
    /// Node identity
    pub id: ExprId,
    /// Operator name, `namespace.name` or a bare `core` name
    pub operator: String,
    /// Argument expressions, evaluated left to right
    pub args: Vec<Expr>,
}

/// Ordered steps folded over the current value
#[derive(Debug, PartialEq)]
pub struct PipelineExpr {
    /// Node identity
    pub id: ExprId,
    /// Steps in source order
    pub steps: Vec<Expr>,
}

/// Expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Constant value
    Literal(Value),
    /// Path into the current value
    PathRef {
        /// Path, empty for the current value
        path: Path,
        /// Missing values resolve to nothing instead of failing
        optional: bool,
    },
    /// Variable lookup plus an optional path into its value
    VarRef {
        /// Variable name
        name: String,
        /// Path into the variable's value
        path: Path,
        /// Missing values resolve to nothing instead of failing
        optional: bool,
    },
    /// Text with embedded references
    Template(Arc<[TemplatePart]>),
    /// Operator application
    Step(Arc<StepExpr>),
    /// Sequence of steps
    Pipeline(Arc<PipelineExpr>),
}

impl Expr {
    /// Constant
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// The current value
    #[must_use]
    pub fn current() -> Self {
        Self::PathRef {
            path: Path::root(),
            optional: false,
        }
    }

    /// Mandatory data path
    #[must_use]
    pub fn path(path: &str) -> Self {
        Self::PathRef {
            path: Path::parse(path),
            optional: false,
        }
    }

    /// Mandatory variable reference
    pub fn var(name: impl Into<String>) -> Self {
        Self::VarRef {
            name: name.into(),
            path: Path::root(),
            optional: false,
        }
    }

    /// Operator application
    pub fn step(operator: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Step(Arc::new(StepExpr {
            id: ExprId::next(),
            operator: operator.into(),
            args,
        }))
    }

    /// Pipeline of steps
    #[must_use]
    pub fn pipeline(steps: Vec<Expr>) -> Self {
        Self::Pipeline(Arc::new(PipelineExpr {
            id: ExprId::next(),
            steps,
        }))
    }

    /// Parse a string that may contain placeholders
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Parse`] on malformed placeholders
    pub fn parse(input: &str) -> EngineResult<Self> {
        crate::template::parse(input)
    }

    /// Build an expression from its JSON document form.
    ///
    /// - `{"$op": "ns.name", "args": [...]}` is a step,
    /// - `{"$pipeline": [...]}` is a pipeline,
    /// - `{"$literal": value}` is taken verbatim,
    /// - strings are parsed for placeholders,
    /// - arrays become a `core.list` step over their items,
    /// - anything else is a literal.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Parse`] on malformed documents or placeholders
    pub fn from_json(doc: &Value) -> EngineResult<Self> {
        match doc {
            Value::String(s) => Self::parse(s),
            Value::Array(items) => {
                let args = items.iter().map(Self::from_json).collect::<EngineResult<Vec<_>>>()?;
                Ok(Self::step("core.list", args))
            }
            Value::Object(map) => {
                if let Some(op) = map.get("$op") {
                    let Some(name) = op.as_str() else {
                        return Err(doc_error(doc, "$op must be a string"));
                    };
                    let args = match map.get("args") {
                        None | Some(Value::Null) => Vec::new(),
                        Some(Value::Array(items)) => items
                            .iter()
                            .map(Self::from_json)
                            .collect::<EngineResult<Vec<_>>>()?,
                        Some(single) => vec![Self::from_json(single)?],
                    };
                    Ok(Self::step(name, args))
                } else if let Some(steps) = map.get("$pipeline") {
                    let Value::Array(steps) = steps else {
                        return Err(doc_error(doc, "$pipeline must be an array"));
                    };
                    let steps = steps
                        .iter()
                        .map(Self::from_json)
                        .collect::<EngineResult<Vec<_>>>()?;
                    Ok(Self::pipeline(steps))
                } else if let Some(value) = map.get("$literal") {
                    Ok(Self::Literal(value.clone()))
                } else {
                    Ok(Self::Literal(doc.clone()))
                }
            }
            other => Ok(Self::Literal(other.clone())),
        }
    }

    /// Identity of step and pipeline nodes
    #[must_use]
    pub fn id(&self) -> Option<ExprId> {
        match self {
            Self::Step(step) => Some(step.id),
            Self::Pipeline(pipeline) => Some(pipeline.id),
            _ => None,
        }
    }

    /// Short description for diagnostics
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Literal(value) => format!("literal {}", value),
            Self::PathRef { path, .. } => format!("%{}%", path),
            Self::VarRef { name, path, .. } if path.is_empty() => format!("%${}%", name),
            Self::VarRef { name, path, .. } => format!("%${}/{}%", name, path),
            Self::Template(_) => "template".to_string(),
            Self::Step(step) => step.operator.clone(),
            Self::Pipeline(pipeline) => format!("pipeline of {} steps", pipeline.steps.len()),
        }
    }
}

fn doc_error(doc: &Value, reason: &str) -> EngineError {
    EngineError::Parse {
        input: doc.to_string(),
        reason: reason.to_string(),
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

impl<'de> Deserialize<'de> for Expr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let doc = Value::deserialize(deserializer)?;
        Self::from_json(&doc).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_parse() {
        let path = Path::parse("a/0/b");
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("a".to_string()),
                Segment::Index(0, "0".to_string()),
                Segment::Key("b".to_string())
            ]
        );
        assert_eq!(path.to_string(), "a/0/b");
        assert!(Path::parse("").is_empty());
        assert_eq!(Path::parse("a//b").segments().len(), 2);
    }

    #[test]
    fn test_path_keeps_index_text() {
        let path = Path::parse("items/007");
        assert_eq!(path.segments()[1], Segment::Index(7, "007".to_string()));
        assert_eq!(path.to_string(), "items/007");
    }

    #[test]
    fn test_path_signed_number_is_key() {
        assert_eq!(Path::parse("+1").segments(), &[Segment::Key("+1".to_string())]);
    }

    #[test]
    fn test_step_ids_unique() {
        let a = Expr::step("core.join", vec![]);
        let b = Expr::step("core.join", vec![]);
        assert_ne!(a.id(), b.id());
        assert!(Expr::literal(1).id().is_none());
    }

    #[test]
    fn test_from_json_step() {
        let expr = Expr::from_json(&json!({"$op": "core.join", "args": [","]})).unwrap();
        let Expr::Step(step) = expr else {
            panic!("expected a step");
        };
        assert_eq!(step.operator, "core.join");
        assert_eq!(step.args, vec![Expr::literal(",")]);
    }

    #[test]
    fn test_from_json_pipeline() {
        let expr = Expr::from_json(&json!({"$pipeline": ["%name%", {"$op": "core.join"}]})).unwrap();
        let Expr::Pipeline(pipeline) = expr else {
            panic!("expected a pipeline");
        };
        assert_eq!(pipeline.steps.len(), 2);
        assert_eq!(pipeline.steps[0], Expr::path("name"));
    }

    #[test]
    fn test_from_json_array_and_literals() {
        let Expr::Step(step) = Expr::from_json(&json!([1, "%%"])).unwrap() else {
            panic!("expected a list step");
        };
        assert_eq!(step.operator, "core.list");
        assert_eq!(step.args[1], Expr::current());

        assert_eq!(Expr::from_json(&json!(3)).unwrap(), Expr::literal(3));
        assert_eq!(
            Expr::from_json(&json!({"$literal": "%raw%"})).unwrap(),
            Expr::literal("%raw%")
        );
        assert_eq!(
            Expr::from_json(&json!({"a": 1})).unwrap(),
            Expr::literal(json!({"a": 1}))
        );
    }

    #[test]
    fn test_from_json_errors() {
        assert!(Expr::from_json(&json!({"$op": 5})).is_err());
        assert!(Expr::from_json(&json!({"$pipeline": "x"})).is_err());
        assert!(Expr::from_json(&json!("%open")).is_err());
    }

    #[test]
    fn test_deserialize() {
        let expr: Expr = serde_json::from_str(r#"{"$op": "rx.take", "args": [5]}"#).unwrap();
        assert_eq!(expr.describe(), "rx.take");
        let bad: Result<Expr, _> = serde_json::from_str(r#""%oops""#);
        assert!(bad.is_err());
    }
}
