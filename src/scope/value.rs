use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Type-erased, cloneable value stored in a scope binding.
///
/// Every `T: Any + Clone` is an `AnyValue`. Cloning a handle type such as
/// `Rc<RefCell<_>>` clones the handle, so object identity survives copies.
pub trait AnyValue: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn clone_value(&self) -> Box<dyn AnyValue>;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Clone> AnyValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_value(&self) -> Box<dyn AnyValue> {
        Box::new(self.clone())
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Shared storage behind a binding. `None` is the null value.
pub(crate) type ValueCell = Rc<RefCell<Option<Box<dyn AnyValue>>>>;

pub(crate) fn new_cell(value: Option<Box<dyn AnyValue>>) -> ValueCell {
    Rc::new(RefCell::new(value))
}

/// Copy a cell's current content into a fresh, unshared cell.
pub(crate) fn detach(cell: &ValueCell) -> ValueCell {
    let copy = cell.borrow().as_ref().map(|v| (**v).clone_value());
    new_cell(copy)
}

/// Declared type of a binding, used for type-directed resolution.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
