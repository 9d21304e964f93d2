//! Evaluation contexts.
//!
//! A [`Context`] carries the current data value and a pointer into the scope
//! arena. Contexts are cheap to clone and never mutated after creation;
//! deriving a child (new data, new variables) allocates a new context that
//! shares the ambient state of the top-level evaluation.

use crate::config::EvalConfig;
use crate::error::{EngineError, EngineResult};
use crate::id::{EvalId, ExprId};
use crate::scope::{ScopeArena, ScopeId};
use crate::value::{Binding, Value};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// State shared by every context derived from one top-level evaluation
struct Ambient {
    eval_id: EvalId,
    scopes: ScopeArena,
    cache: Mutex<HashMap<ExprId, Arc<dyn Any + Send + Sync>>>,
    cancelled: AtomicBool,
    config: EvalConfig,
}

struct ContextInner {
    data: Value,
    scope: ScopeId,
    ambient: Arc<Ambient>,
    parent: Option<Weak<ContextInner>>,
    label: Option<String>,
    depth: usize,
}

/// Resolution environment for one evaluation step
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Create a root context with default limits
    #[must_use]
    pub fn new(data: Value) -> Self {
        Self::with_config(data, EvalConfig::default())
    }

    /// Create a root context with explicit limits
    #[must_use]
    pub fn with_config(data: Value, config: EvalConfig) -> Self {
        let scopes = ScopeArena::new();
        let scope = scopes.root();
        scopes.retain(scope);
        let ambient = Arc::new(Ambient {
            eval_id: EvalId::new(),
            scopes,
            cache: Mutex::new(HashMap::new()),
            cancelled: AtomicBool::new(false),
            config,
        });
        Self {
            inner: Arc::new(ContextInner {
                data,
                scope,
                ambient,
                parent: None,
                label: None,
                depth: 0,
            }),
        }
    }

    fn derive(&self, data: Value, scope: ScopeId, label: Option<String>) -> Self {
        self.inner.ambient.scopes.retain(scope);
        Self {
            inner: Arc::new(ContextInner {
                data,
                scope,
                ambient: Arc::clone(&self.inner.ambient),
                parent: Some(Arc::downgrade(&self.inner)),
                label,
                depth: self.inner.depth + 1,
            }),
        }
    }

    /// Current data value
    #[must_use]
    pub fn data(&self) -> &Value {
        &self.inner.data
    }

    /// Child context with a new current value and the same scope
    #[must_use]
    pub fn with_data(&self, data: Value) -> Self {
        self.derive(data, self.inner.scope, None)
    }

    /// Child context with `name` bound in a new innermost scope frame
    #[must_use]
    pub fn with_var(&self, name: impl Into<String>, binding: impl Into<Binding>) -> Self {
        let mut vars = IndexMap::new();
        vars.insert(name.into(), binding.into());
        self.with_vars(vars)
    }

    /// Child context with several variables bound in one new frame
    #[must_use]
    pub fn with_vars(&self, vars: IndexMap<String, Binding>) -> Self {
        let scope = self.inner.ambient.scopes.push(self.inner.scope, vars);
        self.derive(self.inner.data.clone(), scope, None)
    }

    /// Child context carrying a diagnostic label
    #[must_use]
    pub fn with_label(&self, label: impl Into<String>) -> Self {
        self.derive(self.inner.data.clone(), self.inner.scope, Some(label.into()))
    }

    /// Look up a variable, nearest scope first
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ScopeOverflow`] if the walk exceeds
    /// [`EvalConfig::max_scope_depth`]
    pub fn lookup_var(&self, name: &str) -> EngineResult<Option<Binding>> {
        self.inner
            .ambient
            .scopes
            .lookup(self.inner.scope, name, self.inner.ambient.config.max_scope_depth)
    }

    /// Variable names visible from this context, innermost first
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ScopeOverflow`] if the walk exceeds
    /// [`EvalConfig::max_scope_depth`]
    pub fn visible_vars(&self) -> EngineResult<Vec<String>> {
        self.inner
            .ambient
            .scopes
            .visible_names(self.inner.scope, self.inner.ambient.config.max_scope_depth)
    }

    /// Parent context, if it is still alive
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Self { inner })
    }

    /// Labels of this context and its live ancestors, innermost first
    #[must_use]
    pub fn trail(&self) -> Vec<String> {
        let mut labels = Vec::new();
        let mut current = Some(self.clone());
        while let Some(ctx) = current {
            if let Some(label) = &ctx.inner.label {
                labels.push(label.clone());
            }
            current = ctx.parent();
        }
        labels
    }

    /// Number of derivations between this context and the root
    #[must_use]
    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    /// Identifier of the top-level evaluation
    #[must_use]
    pub fn eval_id(&self) -> EvalId {
        self.inner.ambient.eval_id
    }

    /// Limits in effect
    #[must_use]
    pub fn config(&self) -> &EvalConfig {
        &self.inner.ambient.config
    }

    /// Flag the whole evaluation as cancelled
    pub fn cancel(&self) {
        if !self.inner.ambient.cancelled.swap(true, Ordering::SeqCst) {
            tracing::debug!(eval_id = %self.inner.ambient.eval_id, "evaluation cancelled");
        }
    }

    /// Whether [`cancel`](Self::cancel) was called on any related context
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.ambient.cancelled.load(Ordering::SeqCst)
    }

    /// Fail if the evaluation was cancelled
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Cancelled`] once the flag is set
    pub fn check_cancelled(&self) -> EngineResult<()> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Fetch the cached entry for `id`, computing it on first use.
    ///
    /// The cache is shared across all derived contexts, so an entry built
    /// while evaluating one stream item is reused for the next.
    ///
    /// # Errors
    ///
    /// Propagates the error from `init`. A cached entry of a different type
    /// is treated as a miss and replaced.
    pub fn cached<T, F>(&self, id: ExprId, init: F) -> EngineResult<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> EngineResult<T>,
    {
        let hit = self.inner.ambient.cache.lock().get(&id).cloned();
        if let Some(entry) = hit {
            if let Ok(typed) = entry.downcast::<T>() {
                return Ok(typed);
            }
        }

        let value = Arc::new(init()?);
        self.inner
            .ambient
            .cache
            .lock()
            .insert(id, Arc::clone(&value) as Arc<dyn Any + Send + Sync>);
        Ok(value)
    }

    /// Number of cached entries
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.inner.ambient.cache.lock().len()
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        self.ambient.scopes.release(self.scope);
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("eval_id", &self.inner.ambient.eval_id)
            .field("data", &self.inner.data)
            .field("scope", &self.inner.scope)
            .field("depth", &self.inner.depth)
            .finish()
    }
}
