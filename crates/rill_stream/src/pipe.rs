//! Left-to-right stream composition with scoped resources.

use crate::observable::{Observable, Operator};
use rill_core::{Binding, Context, EngineError, EngineResult, ResourceRef};
use std::sync::Arc;

/// Builds a resource for one subscription
pub type ResourceFactory = Arc<dyn Fn(&Context) -> EngineResult<ResourceRef> + Send + Sync>;

/// Builds an element once the context of earlier elements is known
pub type ElementBuilder = Arc<dyn Fn(&Context) -> EngineResult<PipeElement> + Send + Sync>;

/// One stage of a [`pipe`]
#[derive(Clone)]
pub enum PipeElement {
    /// The stream everything after it transforms
    Source(Observable),
    /// Transformer applied to the stream so far
    Operator(Operator),
    /// Resource created per subscription and bound under `name` for every
    /// later element
    Resource {
        /// Variable name
        name: String,
        /// Constructor
        factory: ResourceFactory,
    },
    /// Element built at subscription time from the context at its position
    Deferred(ElementBuilder),
}

impl PipeElement {
    /// Resource element from a closure
    pub fn resource<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Context) -> EngineResult<ResourceRef> + Send + Sync + 'static,
    {
        Self::Resource {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    /// Deferred element from a closure
    pub fn deferred<F>(builder: F) -> Self
    where
        F: Fn(&Context) -> EngineResult<PipeElement> + Send + Sync + 'static,
    {
        Self::Deferred(Arc::new(builder))
    }
}

impl std::fmt::Debug for PipeElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source(_) => f.write_str("Source"),
            Self::Operator(op) => f.debug_tuple("Operator").field(&op.name()).finish(),
            Self::Resource { name, .. } => f.debug_struct("Resource").field("name", name).finish(),
            Self::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

impl From<Observable> for PipeElement {
    fn from(source: Observable) -> Self {
        Self::Source(source)
    }
}

impl From<Operator> for PipeElement {
    fn from(operator: Operator) -> Self {
        Self::Operator(operator)
    }
}

/// Compose `elements` into one observable.
///
/// Assembly happens per subscription. Resources are created in order,
/// bound into a child scope that every later element sees, and released
/// when the subscription ends, however it ends. Exactly one source is
/// required and it must precede every operator.
pub fn pipe(elements: Vec<PipeElement>) -> Observable {
    let elements = Arc::new(elements);
    Observable::new(move |ctx, sub| {
        let mut scope = ctx.clone();
        let mut stream: Option<Observable> = None;

        for element in elements.iter() {
            let step = assemble(element, &mut scope, &mut stream, &mut |resource: ResourceRef| {
                sub.add(move || resource.release());
            });
            if let Err(error) = step {
                tracing::debug!(subscription = %sub.id(), %error, "pipe assembly failed");
                sub.error(error);
                return;
            }
        }

        match stream {
            Some(stream) => {
                stream.subscribe_with(&scope, sub);
            }
            None => sub.error(EngineError::stream("pipe has no source")),
        }
    })
}

fn assemble(
    element: &PipeElement,
    scope: &mut Context,
    stream: &mut Option<Observable>,
    own: &mut dyn FnMut(ResourceRef),
) -> EngineResult<()> {
    match element {
        PipeElement::Source(source) => {
            if stream.is_some() {
                return Err(EngineError::stream("pipe has more than one source"));
            }
            *stream = Some(source.bind(scope.clone()));
        }
        PipeElement::Operator(operator) => {
            let Some(current) = stream.take() else {
                return Err(EngineError::stream(format!(
                    "operator {} appears before the pipe source",
                    operator.name()
                )));
            };
            *stream = Some(operator.apply(current).bind(scope.clone()));
        }
        PipeElement::Resource { name, factory } => {
            let resource = factory(scope)?;
            tracing::trace!(name = %name, kind = resource.kind(), "pipe resource created");
            own(resource.clone());
            *scope = scope.with_var(name.clone(), Binding::Resource(resource));
        }
        PipeElement::Deferred(builder) => {
            let built = builder(scope)?;
            if let PipeElement::Deferred(_) = built {
                return Err(EngineError::stream(
                    "deferred element produced another deferred element",
                ));
            }
            assemble(&built, scope, stream, own)?;
        }
    }
    Ok(())
}
