//! Handler inputs and the handler trait.
//!
//! A handler declares what it needs as a [`FromScope`] type, usually a
//! small struct filled field by field from a [`Resolver`]:
//!
//! ```
//! use routescope::scope::{handler, FromScope, Resolver, Scope, Slot};
//!
//! struct Greeting {
//!     name: Slot<String>,
//!     greeting: Slot<String>,
//! }
//!
//! impl FromScope for Greeting {
//!     fn from_scope(r: &mut Resolver<'_>) -> Self {
//!         Self {
//!             name: r.named_or("name", "world".to_string()),
//!             greeting: r.named("greeting"),
//!         }
//!     }
//! }
//!
//! let greet = handler::from_fn(|g: Greeting| {
//!     let name = g.name.get().unwrap_or_default();
//!     g.greeting.set(format!("hello {name}"));
//!     Ok(())
//! });
//!
//! let mut scope = Scope::new();
//! routescope::scope::Handler::call(&greet, &mut scope).unwrap();
//! assert_eq!(scope.resolve::<String>("greeting").as_deref(), Some("hello world"));
//! ```

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::trace;

use super::core::{Resolution, Scope};
use super::error::ScopeError;
use super::slot::Slot;
use super::value::{AnyValue, TypeKey};

/// Fills handler parameters from a [`Scope`], one formal parameter per call.
pub struct Resolver<'a> {
    scope: &'a mut Scope,
    unresolved: Vec<String>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(scope: &'a mut Scope) -> Self {
        Self {
            scope,
            unresolved: Vec::new(),
        }
    }

    fn resolve<T: Any>(
        &mut self,
        name: &str,
        want: Option<TypeKey>,
        default: Option<Box<dyn AnyValue>>,
    ) -> Slot<T> {
        let (cell, how) = self.scope.resolve_param(name, want, default);
        trace!(parameter = %name, resolution = ?how, "Parameter resolved");
        if how == Resolution::Created && self.scope.is_strict() {
            self.unresolved.push(name.to_string());
        }
        Slot::from_cell(name, cell)
    }

    /// Untyped parameter: the binding named `name`, else a new null binding.
    pub fn named<T: Any>(&mut self, name: &str) -> Slot<T> {
        self.resolve(name, None, None)
    }

    /// Untyped parameter with a default used when nothing is bound.
    pub fn named_or<T: Any + Clone>(&mut self, name: &str, default: T) -> Slot<T> {
        self.resolve(name, None, Some(Box::new(default) as Box<dyn AnyValue>))
    }

    /// Parameter typed `T`: any binding declared as `T` regardless of its
    /// name, then the binding named `name`, then a new null binding.
    pub fn typed<T: Any>(&mut self, name: &str) -> Slot<T> {
        self.resolve(name, Some(TypeKey::of::<T>()), None)
    }

    /// Typed parameter with a default.
    pub fn typed_or<T: Any + Clone>(&mut self, name: &str, default: T) -> Slot<T> {
        self.resolve(
            name,
            Some(TypeKey::of::<T>()),
            Some(Box::new(default) as Box<dyn AnyValue>),
        )
    }

    /// The scope being resolved against.
    pub fn scope(&mut self) -> &mut Scope {
        self.scope
    }

    pub(crate) fn finish(self) -> Result<(), ScopeError> {
        match self.unresolved.into_iter().next() {
            Some(name) => Err(ScopeError::Unresolved { name }),
            None => Ok(()),
        }
    }
}

/// A set of handler inputs resolved from a scope.
pub trait FromScope: Sized {
    fn from_scope(r: &mut Resolver<'_>) -> Self;
}

impl FromScope for () {
    fn from_scope(_: &mut Resolver<'_>) -> Self {}
}

macro_rules! from_scope_tuple {
    ($($t:ident),+) => {
        impl<$($t: FromScope),+> FromScope for ($($t,)+) {
            fn from_scope(r: &mut Resolver<'_>) -> Self {
                ($($t::from_scope(r),)+)
            }
        }
    };
}

from_scope_tuple!(A);
from_scope_tuple!(A, B);
from_scope_tuple!(A, B, C);
from_scope_tuple!(A, B, C, D);
from_scope_tuple!(A, B, C, D, E);
from_scope_tuple!(A, B, C, D, E, G);

/// A before-handler, terminal handler or after-handler.
///
/// Handlers are shared between worker threads, so they are `Send + Sync`;
/// the scope they run against is per request.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, scope: &mut Scope) -> anyhow::Result<()>;

    /// Short label used in logs.
    fn describe(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

pub type BoxedHandler = Arc<dyn Handler>;

/// Handler built from a closure over a [`FromScope`] input.
pub struct FnHandler<F, I> {
    f: F,
    _inputs: PhantomData<fn(I)>,
}

impl<F, I> Handler for FnHandler<F, I>
where
    F: Fn(I) -> anyhow::Result<()> + Send + Sync + 'static,
    I: FromScope + 'static,
{
    fn call(&self, scope: &mut Scope) -> anyhow::Result<()> {
        scope.invoke(|inputs: I| (self.f)(inputs))?
    }

    fn describe(&self) -> &'static str {
        std::any::type_name::<F>()
    }
}

/// Handler built from a closure that drives the [`Resolver`] directly.
pub struct ResolverHandler<F> {
    f: F,
}

impl<F> Handler for ResolverHandler<F>
where
    F: Fn(&mut Resolver<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn call(&self, scope: &mut Scope) -> anyhow::Result<()> {
        scope.invoke_with(|r| (self.f)(r))?
    }

    fn describe(&self) -> &'static str {
        std::any::type_name::<F>()
    }
}

/// Constructors for [`Handler`] values.
pub mod handler {
    use super::*;

    pub fn from_fn<F, I>(f: F) -> FnHandler<F, I>
    where
        F: Fn(I) -> anyhow::Result<()> + Send + Sync + 'static,
        I: FromScope + 'static,
    {
        FnHandler {
            f,
            _inputs: PhantomData,
        }
    }

    pub fn with_resolver<F>(f: F) -> ResolverHandler<F>
    where
        F: Fn(&mut Resolver<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        ResolverHandler { f }
    }

    /// A handler that does nothing.
    pub fn noop() -> ResolverHandler<fn(&mut Resolver<'_>) -> anyhow::Result<()>> {
        fn nothing(_: &mut Resolver<'_>) -> anyhow::Result<()> {
            Ok(())
        }
        ResolverHandler {
            f: nothing as fn(&mut Resolver<'_>) -> anyhow::Result<()>,
        }
    }

    pub fn boxed<H: Handler>(h: H) -> BoxedHandler {
        Arc::new(h)
    }
}
