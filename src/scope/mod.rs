//! # Scope Module
//!
//! A [`Scope`] is the variable environment a request pipeline runs in. Handlers
//! never receive an explicit argument list; they declare their inputs and the
//! scope resolves each one.
//!
//! ## Resolution rules
//!
//! For every formal parameter, in order:
//!
//! 1. **Typed parameters** take the first binding (insertion order) whose
//!    declared type is exactly the requested type, else the first binding that
//!    declared a compatible view of it, whatever the binding's name.
//! 2. Otherwise the binding under the parameter's own name.
//! 3. Otherwise the parameter's default value, without binding anything.
//! 4. Otherwise a new null binding is created under the parameter's name and
//!    handed out by reference, so the handler can use it as an output.
//!
//! Rule 4 means resolution never fails in the default, permissive mode: a
//! handler that asks for something nobody provided observes null. Enable
//! [`Scope::set_strict`] to turn that case into [`ScopeError::Unresolved`].
//!
//! ## By reference and by value
//!
//! Names resolve by reference unless [`Scope::set_pass_by_reference`] says
//! otherwise. A by-reference [`Slot`] writes straight into the binding, which
//! is how before-handlers flip control variables and how filters replace the
//! request or response for the rest of the pipeline.
//!
//! ## Lifecycle
//!
//! The dispatch loop builds one root scope per request; each route attempt
//! clones it. Clones are O(1) and copy-on-write: what one route attempt
//! writes is never seen by the next attempt or by the error pipeline.

mod core;
mod error;
mod inject;
mod slot;
mod value;

pub use core::Scope;
pub use error::ScopeError;
pub use inject::{handler, BoxedHandler, FnHandler, FromScope, Handler, Resolver, ResolverHandler};
pub use slot::Slot;
pub use value::{AnyValue, TypeKey};
