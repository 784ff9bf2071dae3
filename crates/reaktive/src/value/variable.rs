#![forbid(unsafe_code)]

//! Mutable reactive values.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use super::binding::Binding;
use super::dependencies::Dependency;
use super::{ReactiveValue, ValueCell};
use crate::error::{ReactiveError, Result};
use crate::observer::Observer;

struct Bound {
    observer: Observer,
    _source: Box<dyn Any>,
}

struct VariableInner<T> {
    cell: Rc<ValueCell<T>>,
    bound: RefCell<Option<Bound>>,
}

/// A mutable reactive value.
///
/// Cloning a `Variable` creates a new handle to the **same** value.
/// Equality and hashing use identity, not the held value.
pub struct Variable<T> {
    inner: Rc<VariableInner<T>>,
}

impl<T> Clone for Variable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for Variable<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for Variable<T> {}

impl<T> Hash for Variable<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Rc::as_ptr(&self.inner), state);
    }
}

impl<T: fmt::Debug> fmt::Debug for Variable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("cell", &self.inner.cell)
            .field("bound", &self.inner.bound.borrow().is_some())
            .finish()
    }
}

/// Create a mutable reactive value.
pub fn reactive_variable<T: Clone + PartialEq + 'static>(value: T) -> Variable<T> {
    Variable::new(value)
}

impl<T: Clone + PartialEq + 'static> Variable<T> {
    /// Create a variable holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(VariableInner {
                cell: Rc::new(ValueCell::new(value)),
                bound: RefCell::new(None),
            }),
        }
    }

    /// Set the value. Observers run only if it differs from the current one.
    ///
    /// Ignored while the variable is bound; see [`try_set`](Self::try_set).
    /// Returns whether the value changed.
    pub fn set(&self, value: T) -> bool {
        if self.is_bound() {
            tracing::debug!("set ignored on a bound variable");
            return false;
        }
        self.inner.cell.set(value)
    }

    /// Set the value, failing while the variable is bound.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::UnsupportedOperation`] if the variable currently
    /// follows another value through [`bind`](Self::bind).
    pub fn try_set(&self, value: T) -> Result<bool> {
        if self.is_bound() {
            return Err(ReactiveError::UnsupportedOperation {
                operation: "set",
                target: "a bound variable",
            });
        }
        Ok(self.inner.cell.set(value))
    }

    /// Replace the value with `f(current)`.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        let next = self.inner.cell.with(f);
        self.set(next)
    }

    /// A setter that does not keep this variable alive.
    pub fn setter(&self) -> VariableSetter<T> {
        VariableSetter {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Make this variable follow `source` until the returned observer is
    /// killed or [`unbind`](Self::unbind) is called.
    ///
    /// The current value is taken from `source` immediately. Binding an
    /// already bound variable replaces the previous binding.
    pub fn bind(&self, source: &impl ReactiveValue<T>) -> Observer {
        self.unbind();
        self.inner.cell.set(source.now());
        let cell = Rc::downgrade(&self.inner.cell);
        let observer = source.observe(move |_, new| {
            if let Some(cell) = cell.upgrade() {
                cell.set(new.clone());
            }
        });
        *self.inner.bound.borrow_mut() = Some(Bound {
            observer: observer.clone(),
            _source: Box::new(source.clone()),
        });
        observer
    }

    /// Stop following the bound source, if any.
    pub fn unbind(&self) {
        let previous = self.inner.bound.borrow_mut().take();
        if let Some(bound) = previous {
            bound.observer.kill();
        }
    }

    /// Whether the variable currently follows another value.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.inner
            .bound
            .borrow()
            .as_ref()
            .is_some_and(|b| b.observer.is_alive())
    }
}

impl<T: Clone + PartialEq + 'static> ReactiveValue<T> for Variable<T> {
    fn now(&self) -> T {
        self.inner.cell.get()
    }

    fn with_now<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.cell.with(f)
    }

    fn observe(&self, handler: impl Fn(&T, &T) + 'static) -> Observer {
        self.inner.cell.observe(handler)
    }

    fn as_binding(&self) -> Binding<T> {
        Binding::from_cell(Rc::clone(&self.inner.cell))
    }
}

impl<T: Clone + PartialEq + 'static> Dependency for Variable<T> {
    fn observe_invalidation(&self, on_invalidate: Rc<dyn Fn()>) -> Observer {
        self.inner.cell.observe(move |_, _| on_invalidate())
    }
}

/// Write access to a [`Variable`] that does not keep it alive.
pub struct VariableSetter<T> {
    inner: Weak<VariableInner<T>>,
}

impl<T> Clone for VariableSetter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for VariableSetter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableSetter")
            .field("live", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> VariableSetter<T> {
    /// The variable, if it is still alive.
    #[must_use]
    pub fn variable(&self) -> Option<Variable<T>> {
        self.inner.upgrade().map(|inner| Variable { inner })
    }

    /// Set the variable's value. Returns `false` if nothing changed or the
    /// variable is gone.
    pub fn set(&self, value: T) -> bool {
        self.variable().is_some_and(|v| v.set(value))
    }

    /// Bind the variable to `source`; see [`Variable::bind`].
    ///
    /// Returns a dead observer if the variable is gone.
    pub fn bind(&self, source: &impl ReactiveValue<T>) -> Observer {
        match self.variable() {
            Some(variable) => variable.bind(source),
            None => Observer::noop(),
        }
    }
}
