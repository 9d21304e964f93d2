//! Operator registry.
//!
//! Operators are looked up by `namespace.name`. Bare names resolve in the
//! `core` namespace.

use crate::args::Args;
use crate::outcome::Outcome;
use crate::schema::OperatorSchema;
use indexmap::IndexMap;
use rill_core::{Context, EngineError, EngineResult};
use std::sync::Arc;

/// Namespace used for names without a dot
pub const DEFAULT_NAMESPACE: &str = "core";

/// Operator implementation
pub type Handler = Arc<dyn Fn(&Context, Args) -> EngineResult<Outcome> + Send + Sync>;

/// Fully qualified operator name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperatorId {
    /// Namespace
    pub namespace: String,
    /// Name within the namespace
    pub name: String,
}

impl OperatorId {
    /// Create an id
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Split `ns.name` at the first dot; bare names land in `core`
    #[must_use]
    pub fn parse(qualified: &str) -> Self {
        match qualified.split_once('.') {
            Some((namespace, name)) => Self::new(namespace, name),
            None => Self::new(DEFAULT_NAMESPACE, qualified),
        }
    }
}

impl std::fmt::Display for OperatorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

/// Registered operator
#[derive(Clone)]
pub struct OperatorEntry {
    /// Qualified name
    pub id: OperatorId,
    /// Parameter schema
    pub schema: OperatorSchema,
    /// Implementation
    pub handler: Handler,
}

impl OperatorEntry {
    /// Invoke the handler
    ///
    /// # Errors
    ///
    /// Returns whatever the handler returns
    pub fn invoke(&self, ctx: &Context, args: Args) -> EngineResult<Outcome> {
        (self.handler)(ctx, args)
    }
}

impl std::fmt::Debug for OperatorEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorEntry")
            .field("id", &self.id)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// Operators by qualified name, in registration order
#[derive(Debug, Clone, Default)]
pub struct OperatorRegistry {
    operators: IndexMap<OperatorId, OperatorEntry>,
}

impl OperatorRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            operators: IndexMap::new(),
        }
    }

    /// Registry preloaded with the `core`, `rx` and `queue` operators
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Registry`] if a built-in fails to register
    pub fn try_with_builtins() -> EngineResult<Self> {
        let mut registry = Self::new();
        registry.register_builtins()?;
        Ok(registry)
    }

    /// Like [`Self::try_with_builtins`], logging a registration failure and
    /// returning whatever registered before it
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        if let Err(error) = registry.register_builtins() {
            tracing::error!(%error, "failed to register built-in operators");
        }
        registry
    }

    /// Add the built-in operators to this registry
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Registry`] if a built-in name is already taken
    pub fn register_builtins(&mut self) -> EngineResult<()> {
        crate::builtins::register_all(self)
    }

    /// Register an operator
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Registry`] if the name is taken or malformed
    pub fn register<F>(&mut self, id: OperatorId, schema: OperatorSchema, handler: F) -> EngineResult<()>
    where
        F: Fn(&Context, Args) -> EngineResult<Outcome> + Send + Sync + 'static,
    {
        if id.namespace.is_empty() || id.name.is_empty() || id.name.contains('.') {
            return Err(EngineError::Registry {
                reason: format!("invalid operator name '{}'", id),
            });
        }
        if self.operators.contains_key(&id) {
            return Err(EngineError::Registry {
                reason: format!("operator '{}' is already registered", id),
            });
        }
        tracing::trace!(operator = %id, "registered operator");
        let entry = OperatorEntry {
            id: id.clone(),
            schema,
            handler: Arc::new(handler),
        };
        self.operators.insert(id, entry);
        Ok(())
    }

    /// Registration builder scoped to one namespace
    pub fn namespace(&mut self, namespace: impl Into<String>) -> Namespace<'_> {
        Namespace {
            registry: self,
            namespace: namespace.into(),
        }
    }

    /// Look up an operator by qualified or bare name
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::OperatorNotFound`] if nothing is registered
    /// under the name
    pub fn get(&self, name: &str) -> EngineResult<OperatorEntry> {
        self.operators
            .get(&OperatorId::parse(name))
            .cloned()
            .ok_or_else(|| EngineError::OperatorNotFound {
                name: name.to_string(),
            })
    }

    /// Whether an operator is registered under the name
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.operators.contains_key(&OperatorId::parse(name))
    }

    /// Qualified names in registration order
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.operators.keys().map(ToString::to_string).collect()
    }

    /// Names registered in one namespace
    #[must_use]
    pub fn list_namespace(&self, namespace: &str) -> Vec<String> {
        self.operators
            .keys()
            .filter(|id| id.namespace == namespace)
            .map(|id| id.name.clone())
            .collect()
    }

    /// Remove an operator
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::OperatorNotFound`] if nothing is registered
    /// under the name
    pub fn unregister(&mut self, name: &str) -> EngineResult<()> {
        self.operators
            .shift_remove(&OperatorId::parse(name))
            .map(|_| ())
            .ok_or_else(|| EngineError::OperatorNotFound {
                name: name.to_string(),
            })
    }

    /// Number of registered operators
    #[must_use]
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

/// Registers operators under one namespace
pub struct Namespace<'a> {
    registry: &'a mut OperatorRegistry,
    namespace: String,
}

impl Namespace<'_> {
    /// Register `namespace.name`
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Registry`] if the name is taken or malformed
    pub fn register<F>(&mut self, name: &str, schema: OperatorSchema, handler: F) -> EngineResult<&mut Self>
    where
        F: Fn(&Context, Args) -> EngineResult<Outcome> + Send + Sync + 'static,
    {
        let id = OperatorId::new(self.namespace.clone(), name);
        self.registry.register(id, schema, handler)?;
        Ok(self)
    }

    /// Namespace name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.namespace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn constant(_: &Context, _: Args) -> EngineResult<Outcome> {
        Ok(Outcome::ready(json!(42)))
    }

    #[test]
    fn test_operator_id_parse() {
        assert_eq!(OperatorId::parse("rx.map"), OperatorId::new("rx", "map"));
        assert_eq!(OperatorId::parse("join"), OperatorId::new("core", "join"));
        assert_eq!(OperatorId::parse("a.b.c"), OperatorId::new("a", "b.c"));
        assert_eq!(OperatorId::new("queue", "add").to_string(), "queue.add");
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = OperatorRegistry::new();
        registry
            .namespace("demo")
            .register("answer", OperatorSchema::new("The answer"), constant)
            .unwrap();

        assert!(registry.contains("demo.answer"));
        let entry = registry.get("demo.answer").unwrap();
        let ctx = Context::new(json!(null));
        let outcome = entry.invoke(&ctx, Args::new("demo.answer", vec![])).unwrap();
        assert!(matches!(outcome, Outcome::Ready(v) if v == json!(42)));
        assert_eq!(registry.list_namespace("demo"), vec!["answer".to_string()]);
    }

    #[test]
    fn test_bare_names_are_core() {
        let mut registry = OperatorRegistry::new();
        registry
            .register(OperatorId::parse("answer"), OperatorSchema::default(), constant)
            .unwrap();
        assert!(registry.contains("core.answer"));
        assert!(registry.contains("answer"));
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = OperatorRegistry::new();
        let mut ns = registry.namespace("demo");
        ns.register("a", OperatorSchema::default(), constant).unwrap();
        let err = ns.register("a", OperatorSchema::default(), constant).err().unwrap();
        assert_eq!(
            err,
            EngineError::Registry {
                reason: "operator 'demo.a' is already registered".to_string()
            }
        );
        assert!(ns.register("b.c", OperatorSchema::default(), constant).is_err());
    }

    #[test]
    fn test_missing_operator() {
        let registry = OperatorRegistry::new();
        assert_eq!(
            registry.get("nope.op").err(),
            Some(EngineError::OperatorNotFound {
                name: "nope.op".to_string()
            })
        );
    }

    #[test]
    fn test_unregister_preserves_order() {
        let mut registry = OperatorRegistry::new();
        {
            let mut ns = registry.namespace("demo");
            for name in ["a", "b", "c"] {
                ns.register(name, OperatorSchema::default(), constant).unwrap();
            }
        }
        registry.unregister("demo.b").unwrap();
        assert_eq!(registry.list(), vec!["demo.a".to_string(), "demo.c".to_string()]);
        assert!(registry.unregister("demo.b").is_err());
    }

    #[test]
    fn test_builtins_loaded() {
        let registry = OperatorRegistry::with_builtins();
        for name in ["core.join", "rx.pipe", "rx.map_promise", "queue.add"] {
            assert!(registry.contains(name), "{} missing", name);
        }
    }

    #[test]
    fn test_try_with_builtins() {
        let registry = OperatorRegistry::try_with_builtins().unwrap();
        assert!(registry.contains("core.join"));
        assert_eq!(registry.list(), OperatorRegistry::with_builtins().list());
    }

    #[test]
    fn test_builtin_conflict_is_reported() {
        let mut registry = OperatorRegistry::new();
        registry
            .namespace("core")
            .register("join", OperatorSchema::default(), constant)
            .unwrap();
        let err = registry.register_builtins().err().unwrap();
        assert!(matches!(err, EngineError::Registry { .. }), "{:?}", err);
    }
}
