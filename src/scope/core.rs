//! Binding table and parameter resolution.
//!
//! The table sits behind an `Rc` and is copied on the first write after a
//! clone (`Rc::make_mut`), so `Scope::clone` is O(1) however many routes are
//! attempted per request.
//!
//! Every binding records the scope that owns its cell. Cloning hands both
//! scopes a fresh owner tag, so right after a clone neither side owns any
//! cell. A scope copies a foreign cell into one of its own before handing it
//! out by reference, and writes through a [`Slot`] never reach the other
//! side. Within one scope the cell stays shared, so every handler of a
//! pipeline sees the writes of the ones before it. By-value resolution
//! always hands out a detached copy.

use std::any::Any;
use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use tracing::{debug, trace};

use super::error::ScopeError;
use super::inject::{FromScope, Resolver};
use super::slot::Slot;
use super::value::{detach, new_cell, AnyValue, TypeKey, ValueCell};

type Factory = Rc<dyn Fn() -> Box<dyn AnyValue>>;
type Converter = Rc<dyn Fn(&dyn Any) -> Option<Box<dyn AnyValue>>>;

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

fn next_owner() -> u64 {
    NEXT_OWNER.fetch_add(1, Ordering::Relaxed)
}

#[derive(Clone)]
enum Source {
    Ready(ValueCell),
    Deferred(Factory),
}

#[derive(Clone)]
struct Compatible {
    target: TypeKey,
    convert: Converter,
}

#[derive(Clone)]
struct Binding {
    source: Source,
    owner: u64,
    declared: Option<TypeKey>,
    compatible: Vec<Compatible>,
}

#[derive(Clone, Default)]
struct Table {
    bindings: IndexMap<String, Binding>,
    by_value: HashSet<String>,
}

/// How a parameter was satisfied. Returned alongside the cell so callers can
/// log or enforce strictness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Resolution {
    /// Rule 1: a binding with a compatible declared type, named here.
    ByType(String),
    /// Rule 2: a binding under the parameter's own name.
    ByName,
    /// Rule 3: the parameter's default value; nothing was bound.
    Default,
    /// Rule 4: a fresh null binding was created under the parameter's name.
    Created,
}

/// A mutable, cheaply cloneable variable environment used to inject handler
/// parameters by name or by declared type.
///
/// ```
/// use routescope::scope::Scope;
///
/// let mut scope = Scope::new();
/// scope.bind("test", 1_i64);
///
/// let seen = scope.invoke_with(|r| r.named::<i64>("test").get()).unwrap();
/// assert_eq!(seen, Some(1));
/// ```
pub struct Scope {
    table: Rc<Table>,
    owner: Cell<u64>,
    strict: bool,
}

impl Default for Scope {
    fn default() -> Self {
        Self {
            table: Rc::default(),
            owner: Cell::new(next_owner()),
            strict: false,
        }
    }
}

impl Clone for Scope {
    /// Snapshot of the bindings. Later writes on either side stay on that
    /// side, except through shared handles such as `Rc<RefCell<_>>`.
    fn clone(&self) -> Self {
        // The original gives up its cells too: they are now reachable from both tables.
        self.owner.set(next_owner());
        Self {
            table: Rc::clone(&self.table),
            owner: Cell::new(next_owner()),
            strict: self.strict,
        }
    }
}

impl Scope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn table_mut(&mut self) -> &mut Table {
        Rc::make_mut(&mut self.table)
    }

    fn insert(&mut self, name: String, source: Source, declared: Option<TypeKey>) {
        trace!(binding = %name, declared = ?declared, "Scope binding");
        let owner = self.owner.get();
        self.table_mut().bindings.insert(
            name,
            Binding {
                source,
                owner,
                declared,
                compatible: Vec::new(),
            },
        );
    }

    /// Bind an immediate value without a declared type.
    ///
    /// Untyped bindings are reachable by name only, like scalars. Use
    /// [`Scope::bind_typed`] to make a value visible to typed parameters.
    pub fn bind<T: Any + Clone>(&mut self, name: impl Into<String>, value: T) -> &mut Self {
        let cell = new_cell(Some(Box::new(value) as Box<dyn AnyValue>));
        self.insert(name.into(), Source::Ready(cell), None);
        self
    }

    /// Bind an immediate value and declare its type (`T`, inferred from the
    /// value), making it reachable by type-directed resolution as well as by
    /// name.
    pub fn bind_typed<T: Any + Clone>(&mut self, name: impl Into<String>, value: T) -> &mut Self {
        let cell = new_cell(Some(Box::new(value) as Box<dyn AnyValue>));
        self.insert(name.into(), Source::Ready(cell), Some(TypeKey::of::<T>()));
        self
    }

    /// Bind the null value under `name`.
    pub fn bind_null(&mut self, name: impl Into<String>) -> &mut Self {
        self.insert(name.into(), Source::Ready(new_cell(None)), None);
        self
    }

    /// Bind a factory that runs at most once, the first time `name` is
    /// resolved in this scope. The produced value replaces the factory here
    /// only: clones taken earlier keep the factory and run it on their own.
    pub fn bind_deferred<T, F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        T: Any + Clone,
        F: Fn() -> T + 'static,
    {
        let factory: Factory = Rc::new(move || Box::new(factory()) as Box<dyn AnyValue>);
        self.insert(name.into(), Source::Deferred(factory), Some(TypeKey::of::<T>()));
        self
    }

    /// Declare that the binding `name` (of type `T`) can also satisfy
    /// parameters typed `U`, through `convert`.
    ///
    /// Exact type matches always win over compatible ones. A compatible
    /// match resolves by value: the callee gets the converted copy.
    pub fn declare_compatible<T, U, F>(&mut self, name: &str, convert: F) -> Result<&mut Self, ScopeError>
    where
        T: Any,
        U: Any + Clone,
        F: Fn(&T) -> U + 'static,
    {
        let binding = self
            .table_mut()
            .bindings
            .get_mut(name)
            .ok_or_else(|| ScopeError::Unbound {
                name: name.to_string(),
            })?;
        let convert: Converter = Rc::new(move |value: &dyn Any| {
            value
                .downcast_ref::<T>()
                .map(|v| Box::new(convert(v)) as Box<dyn AnyValue>)
        });
        binding.compatible.push(Compatible {
            target: TypeKey::of::<U>(),
            convert,
        });
        Ok(self)
    }

    /// Choose whether resolving `name` hands out the shared cell (`true`,
    /// the default) or a private copy (`false`).
    pub fn set_pass_by_reference(&mut self, name: &str, by_reference: bool) -> &mut Self {
        let table = self.table_mut();
        if by_reference {
            table.by_value.remove(name);
        } else {
            table.by_value.insert(name.to_string());
        }
        self
    }

    #[must_use]
    pub fn is_pass_by_reference(&self, name: &str) -> bool {
        !self.table.by_value.contains(name)
    }

    /// Make rule 4 (implicit null binding) an error for this scope and the
    /// clones taken from it afterwards.
    pub fn set_strict(&mut self, strict: bool) -> &mut Self {
        self.strict = strict;
        self
    }

    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.table.bindings.contains_key(name)
    }

    /// Declared type of `name`, if it was bound with one.
    #[must_use]
    pub fn declared_type(&self, name: &str) -> Option<TypeKey> {
        self.table.bindings.get(name).and_then(|b| b.declared)
    }

    pub fn unbind(&mut self, name: &str) -> bool {
        if !self.contains(name) {
            return false;
        }
        self.table_mut().bindings.shift_remove(name).is_some()
    }

    /// Bound names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.table.bindings.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.bindings.is_empty()
    }

    /// Current value of `name`, materializing a deferred binding.
    ///
    /// Returns `None` for unbound names, the null value, or a value of
    /// another type.
    pub fn resolve<T: Any + Clone>(&mut self, name: &str) -> Option<T> {
        let cell = self.materialize(name)?;
        let value = cell.borrow();
        value
            .as_ref()
            .and_then(|v| (**v).as_any().downcast_ref::<T>().cloned())
    }

    /// Handle on the binding `name` exactly as a by-name parameter would
    /// see it, without creating anything when it is missing.
    pub fn slot<T: Any>(&mut self, name: &str) -> Option<Slot<T>> {
        let cell = self.materialize(name)?;
        Some(Slot::from_cell(name, self.hand_out(name, cell)))
    }

    /// Call `f` with inputs resolved from this scope.
    ///
    /// In permissive mode (the default) resolution always succeeds: a
    /// parameter nothing can satisfy gets a fresh null binding. In strict
    /// mode that case is reported as [`ScopeError::Unresolved`] and `f` is
    /// not called.
    pub fn invoke<I, R, F>(&mut self, f: F) -> Result<R, ScopeError>
    where
        I: FromScope,
        F: FnOnce(I) -> R,
    {
        let mut resolver = Resolver::new(self);
        let inputs = I::from_scope(&mut resolver);
        resolver.finish()?;
        Ok(f(inputs))
    }

    /// Like [`Scope::invoke`], but hands the callee the resolver itself.
    pub fn invoke_with<R, F>(&mut self, f: F) -> Result<R, ScopeError>
    where
        F: FnOnce(&mut Resolver<'_>) -> R,
    {
        let mut resolver = Resolver::new(self);
        let out = f(&mut resolver);
        resolver.finish()?;
        Ok(out)
    }

    /// Return the ready cell behind `name`, running its factory first if the
    /// binding is still deferred.
    fn materialize(&mut self, name: &str) -> Option<ValueCell> {
        let binding = self.table.bindings.get(name)?;
        let factory = match &binding.source {
            Source::Ready(cell) => return Some(Rc::clone(cell)),
            Source::Deferred(factory) => Rc::clone(factory),
        };
        debug!(binding = %name, "Materializing deferred binding");
        let cell = new_cell(Some((*factory)()));
        self.adopt(name, &cell);
        Some(cell)
    }

    /// Make `cell` the ready cell of `name`, owned by this scope.
    fn adopt(&mut self, name: &str, cell: &ValueCell) {
        let owner = self.owner.get();
        if let Some(binding) = self.table_mut().bindings.get_mut(name) {
            binding.source = Source::Ready(Rc::clone(cell));
            binding.owner = owner;
        }
    }

    /// Cell handed to a callee for `name`: this scope's own cell when
    /// by-reference, a private copy otherwise.
    fn hand_out(&mut self, name: &str, cell: ValueCell) -> ValueCell {
        if !self.is_pass_by_reference(name) {
            return detach(&cell);
        }
        let owned = self
            .table
            .bindings
            .get(name)
            .is_some_and(|b| b.owner == self.owner.get());
        if owned {
            return cell;
        }
        trace!(binding = %name, "Copying inherited binding");
        let own = detach(&cell);
        self.adopt(name, &own);
        own
    }

    /// First binding (insertion order) whose declared type is `want`, else
    /// the first that declared a compatible view of `want`.
    fn find_by_type(&self, want: TypeKey) -> Option<(String, Option<Converter>)> {
        let bindings = &self.table.bindings;
        if let Some((name, _)) = bindings.iter().find(|(_, b)| b.declared == Some(want)) {
            return Some((name.clone(), None));
        }
        bindings.iter().find_map(|(name, b)| {
            b.compatible
                .iter()
                .find(|c| c.target == want)
                .map(|c| (name.clone(), Some(Rc::clone(&c.convert))))
        })
    }

    /// Resolve one formal parameter following the four rules in order.
    pub(crate) fn resolve_param(
        &mut self,
        name: &str,
        want: Option<TypeKey>,
        default: Option<Box<dyn AnyValue>>,
    ) -> (ValueCell, Resolution) {
        if let Some(want) = want {
            if let Some((found, convert)) = self.find_by_type(want) {
                if let Some(cell) = self.materialize(&found) {
                    let handed = match convert {
                        None => self.hand_out(&found, cell),
                        Some(convert) => {
                            let converted = cell
                                .borrow()
                                .as_ref()
                                .and_then(|v| (*convert)((**v).as_any()));
                            new_cell(converted)
                        }
                    };
                    return (handed, Resolution::ByType(found));
                }
            }
        }

        if let Some(cell) = self.materialize(name) {
            return (self.hand_out(name, cell), Resolution::ByName);
        }

        if let Some(default) = default {
            return (new_cell(Some(default)), Resolution::Default);
        }

        let cell = new_cell(None);
        if !self.strict {
            self.insert(name.to_string(), Source::Ready(Rc::clone(&cell)), None);
            // Output parameters are always written through.
            self.table_mut().by_value.remove(name);
        }
        (cell, Resolution::Created)
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("bindings", &self.table.bindings.keys().collect::<Vec<_>>())
            .field("strict", &self.strict)
            .finish()
    }
}
