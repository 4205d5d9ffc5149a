use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use super::error::ScopeError;
use super::value::{new_cell, AnyValue, ValueCell};

/// Typed handle on a resolved parameter.
///
/// For a by-reference binding the slot shares the scope's cell: `set` is
/// visible to the caller and to every later handler of the pipeline. For a
/// by-value binding, a default, or a compatible-type conversion, the slot
/// owns a private copy.
///
/// The cell is a `RefCell`; calling back into the same slot from inside
/// [`Slot::with`] or [`Slot::with_mut`] panics.
pub struct Slot<T> {
    name: Rc<str>,
    cell: ValueCell,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any> Slot<T> {
    pub(crate) fn from_cell(name: &str, cell: ValueCell) -> Self {
        Self {
            name: Rc::from(name),
            cell,
            _marker: PhantomData,
        }
    }

    /// A slot not attached to any scope.
    #[must_use]
    pub fn detached(name: &str, value: Option<T>) -> Self
    where
        T: Clone,
    {
        let value = value.map(|v| Box::new(v) as Box<dyn AnyValue>);
        Self::from_cell(name, new_cell(value))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when the slot holds the null value.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.cell.borrow().is_none()
    }

    /// True when the slot holds a value of type `T`.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.cell
            .borrow()
            .as_ref()
            .is_some_and(|v| (**v).as_any().is::<T>())
    }

    /// Copy of the current value; `None` for null or a value of another type.
    #[must_use]
    pub fn get(&self) -> Option<T>
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Like [`Slot::get`], but tells a type mismatch apart from null.
    pub fn try_get(&self) -> Result<Option<T>, ScopeError>
    where
        T: Clone,
    {
        let value = self.cell.borrow();
        match value.as_ref() {
            None => Ok(None),
            Some(v) => match (**v).as_any().downcast_ref::<T>() {
                Some(t) => Ok(Some(t.clone())),
                None => Err(ScopeError::TypeMismatch {
                    name: self.name.to_string(),
                    expected: std::any::type_name::<T>(),
                    found: (**v).type_name(),
                }),
            },
        }
    }

    /// Replace the value.
    pub fn set(&self, value: T)
    where
        T: Clone,
    {
        *self.cell.borrow_mut() = Some(Box::new(value) as Box<dyn AnyValue>);
    }

    /// Reset to the null value.
    pub fn clear(&self) {
        *self.cell.borrow_mut() = None;
    }

    /// Move the value out, leaving null behind. A value of another type is
    /// left in place.
    pub fn take(&self) -> Option<T>
    where
        T: Clone,
    {
        let value = self.get()?;
        self.clear();
        Some(value)
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let value = self.cell.borrow();
        value
            .as_ref()
            .and_then(|v| (**v).as_any().downcast_ref::<T>())
            .map(f)
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut value = self.cell.borrow_mut();
        value
            .as_mut()
            .and_then(|v| (**v).as_any_mut().downcast_mut::<T>())
            .map(f)
    }
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            name: Rc::clone(&self.name),
            cell: Rc::clone(&self.cell),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let held = self.cell.borrow().as_ref().map(|v| (**v).type_name());
        f.debug_struct("Slot")
            .field("name", &self.name)
            .field("holds", &held)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mismatch_is_reported() {
        let slot = Slot::<u32>::detached("n", Some(4));
        let other: Slot<String> = Slot::from_cell("n", Rc::clone(&slot.cell));
        assert_eq!(other.get(), None);
        assert!(matches!(
            other.try_get(),
            Err(ScopeError::TypeMismatch { .. })
        ));
        assert_eq!(slot.try_get(), Ok(Some(4)));
    }

    #[test]
    fn test_take_leaves_null() {
        let slot = Slot::detached("s", Some(String::from("x")));
        assert_eq!(slot.take().as_deref(), Some("x"));
        assert!(slot.is_null());
    }

    #[test]
    fn test_with_mut_edits_in_place() {
        let slot = Slot::detached("v", Some(vec![1, 2]));
        let copy = slot.clone();
        slot.with_mut(|v| v.push(3));
        assert_eq!(copy.get(), Some(vec![1, 2, 3]));
    }
}
