#![forbid(unsafe_code)]

//! Shared storage behind variables and bindings.

use std::cell::RefCell;
use std::fmt;

use crate::observer::{Observer, Registry};
use crate::propagation;

/// One value transition, delivered to observers as `(old, new)`.
pub(crate) struct ValueChange<T> {
    old: T,
    new: T,
}

/// A value plus the observers of its transitions.
///
/// # Invariants
///
/// 1. Setting a value equal to the current one is a no-op: no transition is
///    recorded and no observer runs.
/// 2. Observers see each transition exactly once, in registration order.
/// 3. `set` returns only after every observer of the transition, and
///    everything they trigger, has run.
pub(crate) struct ValueCell<T> {
    value: RefCell<T>,
    changes: Registry<ValueChange<T>>,
}

impl<T: Clone + PartialEq + 'static> ValueCell<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            value: RefCell::new(value),
            changes: Registry::new(),
        }
    }

    pub(crate) fn get(&self) -> T {
        self.value.borrow().clone()
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.borrow())
    }

    /// Replace the value, notifying observers if it actually changed.
    pub(crate) fn set(&self, value: T) -> bool {
        let old = {
            let mut current = self.value.borrow_mut();
            if *current == value {
                return false;
            }
            std::mem::replace(&mut *current, value.clone())
        };
        propagation::settle(|| self.changes.fire(ValueChange { old, new: value }));
        true
    }

    pub(crate) fn observe(&self, handler: impl Fn(&T, &T) + 'static) -> Observer {
        self.changes
            .register(move |change: &ValueChange<T>| handler(&change.old, &change.new))
    }

    pub(crate) fn observer_count(&self) -> usize {
        self.changes.len()
    }
}

impl<T: fmt::Debug> fmt::Debug for ValueCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueCell")
            .field("value", &*self.value.borrow())
            .finish()
    }
}
