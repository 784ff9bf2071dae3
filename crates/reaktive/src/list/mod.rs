#![forbid(unsafe_code)]

//! Reactive lists.
//!
//! A [`ReactiveList`] reports every structural change as a positional
//! [`ListChange`]. Root lists are created with [`reactive_list`], which
//! returns a [`MutableReactiveList`]; derived lists are read-only.
//!
//! Positional mutators come in two flavors. The plain ones ignore an
//! out-of-range index and emit nothing; the `try_*` ones reject it with
//! [`ReactiveError::IndexOutOfRange`]. Neither emits a partial change.
//!
//! # Invariants
//!
//! 1. Each effective mutation emits exactly one change per affected element,
//!    in the order the elements are affected. `clear` emits a single
//!    [`ListChange::Cleared`] carrying the removed elements.
//! 2. The index of a change is relative to the list as it was right after
//!    the previous change.
//! 3. Replacing an element with an equal one emits nothing.

mod views;

pub use views::AsReactiveList;

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::rc::{Rc, Weak};

use crate::collection::ReactiveCollection;
use crate::error::{ReactiveError, Result};
use crate::observer::{DependencyScope, Observer, Registry};
use crate::propagation;
use crate::value::Dependency;

// ---------------------------------------------------------------------------
// ListChange
// ---------------------------------------------------------------------------

/// One structural change of a reactive list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListChange<E> {
    /// `element` was inserted at `index`.
    Added {
        /// Position of the new element.
        index: usize,
        /// The new element.
        element: E,
    },
    /// `element` was removed from `index`.
    Removed {
        /// Former position of the element.
        index: usize,
        /// The removed element.
        element: E,
    },
    /// The element at `index` was replaced.
    Replaced {
        /// Position of the replaced element.
        index: usize,
        /// The element before the change.
        old: E,
        /// The element after the change.
        new: E,
    },
    /// Every element was removed.
    Cleared {
        /// The removed elements, in list order.
        removed: Vec<E>,
    },
}

impl<E: Clone> ListChange<E> {
    /// Replay this change on a plain vector.
    ///
    /// Changes that do not fit `list` are ignored.
    pub fn apply_to(&self, list: &mut Vec<E>) {
        match self {
            Self::Added { index, element } if *index <= list.len() => {
                list.insert(*index, element.clone());
            }
            Self::Removed { index, .. } if *index < list.len() => {
                list.remove(*index);
            }
            Self::Replaced { index, new, .. } if *index < list.len() => {
                list[*index] = new.clone();
            }
            Self::Cleared { .. } => list.clear(),
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// ReactiveList<E>
// ---------------------------------------------------------------------------

struct ListCore<E> {
    elements: RefCell<Vec<E>>,
    changes: Registry<ListChange<E>>,
    scope: DependencyScope,
}

/// A read-only view of a reactive list.
///
/// Cloning creates another handle to the **same** list. Equality and
/// hashing use identity.
pub struct ReactiveList<E> {
    core: Rc<ListCore<E>>,
}

impl<E> Clone for ReactiveList<E> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<E> PartialEq for ReactiveList<E> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }
}

impl<E> Eq for ReactiveList<E> {}

impl<E> Hash for ReactiveList<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Rc::as_ptr(&self.core), state);
    }
}

impl<E: fmt::Debug> fmt::Debug for ReactiveList<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.core.elements.borrow().iter()).finish()
    }
}

pub(crate) struct WeakList<E> {
    core: Weak<ListCore<E>>,
}

impl<E> Clone for WeakList<E> {
    fn clone(&self) -> Self {
        Self {
            core: Weak::clone(&self.core),
        }
    }
}

impl<E> WeakList<E> {
    pub(crate) fn upgrade(&self) -> Option<ReactiveList<E>> {
        self.core.upgrade().map(|core| ReactiveList { core })
    }
}

impl<E: Clone + PartialEq + 'static> ReactiveList<E> {
    pub(crate) fn from_elements(elements: impl IntoIterator<Item = E>) -> Self {
        Self {
            core: Rc::new(ListCore {
                elements: RefCell::new(elements.into_iter().collect()),
                changes: Registry::new(),
                scope: DependencyScope::new(),
            }),
        }
    }

    /// A snapshot of the current elements.
    #[must_use]
    pub fn now(&self) -> Vec<E> {
        self.core.elements.borrow().clone()
    }

    /// Borrow the current elements without copying them.
    pub fn with<R>(&self, f: impl FnOnce(&[E]) -> R) -> R {
        f(&self.core.elements.borrow())
    }

    /// The element at `index`, if any.
    #[must_use]
    pub fn get_now(&self, index: usize) -> Option<E> {
        self.core.elements.borrow().get(index).cloned()
    }

    /// Run `handler` after every structural change.
    pub fn observe(&self, handler: impl Fn(&ListChange<E>) + 'static) -> Observer {
        self.core.changes.register(handler)
    }

    /// Stop updating this derived list. Idempotent; a no-op for root lists.
    pub fn dispose(&self) {
        if self.core.scope.dispose() {
            tracing::debug!(
                elements = self.core.elements.borrow().len(),
                "derived list disposed"
            );
        }
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.core.scope.is_disposed()
    }

    pub(crate) fn downgrade(&self) -> WeakList<E> {
        WeakList {
            core: Rc::downgrade(&self.core),
        }
    }

    pub(crate) fn hold(&self, observer: Observer) {
        self.core.scope.hold(observer);
    }

    pub(crate) fn anchor(&self, value: impl Any) {
        self.core.scope.anchor(value);
    }

    fn len(&self) -> usize {
        self.core.elements.borrow().len()
    }

    /// Insert at `index`; `false` if the index is past the end.
    pub(crate) fn insert(&self, index: usize, element: E) -> bool {
        {
            let mut elements = self.core.elements.borrow_mut();
            if index > elements.len() {
                return false;
            }
            elements.insert(index, element.clone());
        }
        self.core.changes.fire(ListChange::Added { index, element });
        true
    }

    pub(crate) fn remove_index(&self, index: usize) -> Option<E> {
        let element = {
            let mut elements = self.core.elements.borrow_mut();
            if index >= elements.len() {
                return None;
            }
            elements.remove(index)
        };
        self.core.changes.fire(ListChange::Removed {
            index,
            element: element.clone(),
        });
        Some(element)
    }

    pub(crate) fn replace(&self, index: usize, element: E) -> Option<E> {
        let old = {
            let mut elements = self.core.elements.borrow_mut();
            let slot = elements.get_mut(index)?;
            if *slot == element {
                return Some(element);
            }
            std::mem::replace(slot, element.clone())
        };
        self.core.changes.fire(ListChange::Replaced {
            index,
            old: old.clone(),
            new: element,
        });
        Some(old)
    }

    pub(crate) fn clear_all(&self) -> bool {
        let removed = std::mem::take(&mut *self.core.elements.borrow_mut());
        if removed.is_empty() {
            return false;
        }
        self.core.changes.fire(ListChange::Cleared { removed });
        true
    }

    fn out_of_range(&self, operation: &'static str, index: usize) -> ReactiveError {
        ReactiveError::IndexOutOfRange {
            operation,
            index,
            len: self.len(),
        }
    }
}

impl<E: Clone + PartialEq + 'static> ReactiveCollection<E> for ReactiveList<E> {
    fn elements(&self) -> Vec<E> {
        self.now()
    }

    fn size(&self) -> usize {
        self.len()
    }

    fn observe_collection(
        &self,
        added: impl Fn(&E) + 'static,
        removed: impl Fn(&E) + 'static,
    ) -> Observer {
        self.observe(move |change| match change {
            ListChange::Added { element, .. } => added(element),
            ListChange::Removed { element, .. } => removed(element),
            ListChange::Replaced { old, new, .. } => {
                removed(old);
                added(new);
            }
            ListChange::Cleared { removed: elements } => elements.iter().for_each(&removed),
        })
    }
}

impl<E: Clone + PartialEq + 'static> Dependency for ReactiveList<E> {
    fn observe_invalidation(&self, on_invalidate: Rc<dyn Fn()>) -> Observer {
        self.observe(move |_| on_invalidate())
    }
}

// ---------------------------------------------------------------------------
// MutableReactiveList<E>
// ---------------------------------------------------------------------------

/// A root reactive list that can be mutated.
///
/// Dereferences to the read-only [`ReactiveList`] it feeds.
pub struct MutableReactiveList<E> {
    list: ReactiveList<E>,
}

impl<E> Clone for MutableReactiveList<E> {
    fn clone(&self) -> Self {
        Self {
            list: self.list.clone(),
        }
    }
}

impl<E> PartialEq for MutableReactiveList<E> {
    fn eq(&self, other: &Self) -> bool {
        self.list == other.list
    }
}

impl<E> Eq for MutableReactiveList<E> {}

impl<E> Hash for MutableReactiveList<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.list.hash(state);
    }
}

impl<E: fmt::Debug> fmt::Debug for MutableReactiveList<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.list.fmt(f)
    }
}

impl<E> Deref for MutableReactiveList<E> {
    type Target = ReactiveList<E>;

    fn deref(&self) -> &ReactiveList<E> {
        &self.list
    }
}

impl<E: Clone + PartialEq + 'static> MutableReactiveList<E> {
    /// Append `element`.
    pub fn add(&self, element: E) {
        propagation::settle(|| {
            let end = self.list.len();
            self.list.insert(end, element);
        });
    }

    /// Insert `element` at `index`. Ignored if `index > len`.
    pub fn add_at(&self, index: usize, element: E) -> bool {
        propagation::settle(|| self.list.insert(index, element))
    }

    /// Insert `element` at `index`.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::IndexOutOfRange`] if `index > len`.
    pub fn try_add_at(&self, index: usize, element: E) -> Result<()> {
        if self.add_at(index, element) {
            Ok(())
        } else {
            Err(self.list.out_of_range("add_at", index))
        }
    }

    /// Append every element in order.
    pub fn add_all(&self, elements: impl IntoIterator<Item = E>) {
        propagation::settle(|| {
            for element in elements {
                let end = self.list.len();
                self.list.insert(end, element);
            }
        });
    }

    /// Insert the elements in order starting at `index`. Ignored entirely
    /// if `index > len`.
    pub fn add_all_at(&self, index: usize, elements: impl IntoIterator<Item = E>) -> bool {
        if index > self.list.len() {
            return false;
        }
        propagation::settle(|| {
            for (offset, element) in elements.into_iter().enumerate() {
                self.list.insert(index + offset, element);
            }
        });
        true
    }

    /// Insert the elements in order starting at `index`.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::IndexOutOfRange`] if `index > len`; nothing is
    /// inserted.
    pub fn try_add_all_at(&self, index: usize, elements: impl IntoIterator<Item = E>) -> Result<()> {
        if self.add_all_at(index, elements) {
            Ok(())
        } else {
            Err(self.list.out_of_range("add_all_at", index))
        }
    }

    /// Remove the first occurrence of `element`.
    pub fn remove(&self, element: &E) -> bool {
        let index = self.list.with(|elements| elements.iter().position(|e| e == element));
        index.is_some_and(|index| self.remove_at(index).is_some())
    }

    /// Remove the element at `index`. Ignored if `index >= len`.
    pub fn remove_at(&self, index: usize) -> Option<E> {
        propagation::settle(|| self.list.remove_index(index))
    }

    /// Remove the element at `index`.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::IndexOutOfRange`] if `index >= len`.
    pub fn try_remove_at(&self, index: usize) -> Result<E> {
        self.remove_at(index)
            .ok_or_else(|| self.list.out_of_range("remove_at", index))
    }

    /// Remove every occurrence of every element in `elements`, front to
    /// back. Returns whether the list changed.
    pub fn remove_all(&self, elements: &[E]) -> bool {
        propagation::settle(|| {
            let mut index = 0;
            let mut changed = false;
            while let Some(element) = self.list.get_now(index) {
                if elements.contains(&element) {
                    self.list.remove_index(index);
                    changed = true;
                } else {
                    index += 1;
                }
            }
            changed
        })
    }

    /// Replace the element at `index`, returning the previous one. Ignored
    /// if `index >= len`.
    pub fn set(&self, index: usize, element: E) -> Option<E> {
        propagation::settle(|| self.list.replace(index, element))
    }

    /// Replace the element at `index`, returning the previous one.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::IndexOutOfRange`] if `index >= len`.
    pub fn try_set(&self, index: usize, element: E) -> Result<E> {
        self.set(index, element)
            .ok_or_else(|| self.list.out_of_range("set", index))
    }

    /// Remove every element. Emits nothing if the list is already empty.
    pub fn clear(&self) {
        propagation::settle(|| self.list.clear_all());
    }

    /// A read-only handle to this list.
    pub fn as_list(&self) -> ReactiveList<E> {
        self.list.clone()
    }
}

impl<E: Clone + PartialEq + 'static> ReactiveCollection<E> for MutableReactiveList<E> {
    fn elements(&self) -> Vec<E> {
        self.list.now()
    }

    fn size(&self) -> usize {
        self.list.len()
    }

    fn observe_collection(
        &self,
        added: impl Fn(&E) + 'static,
        removed: impl Fn(&E) + 'static,
    ) -> Observer {
        self.list.observe_collection(added, removed)
    }
}

impl<E: Clone + PartialEq + 'static> Dependency for MutableReactiveList<E> {
    fn observe_invalidation(&self, on_invalidate: Rc<dyn Fn()>) -> Observer {
        self.list.observe_invalidation(on_invalidate)
    }
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

/// Create a mutable reactive list holding `elements`.
pub fn reactive_list<E: Clone + PartialEq + 'static>(
    elements: impl IntoIterator<Item = E>,
) -> MutableReactiveList<E> {
    MutableReactiveList {
        list: ReactiveList::from_elements(elements),
    }
}

/// Create a reactive list that never changes.
pub fn unmodifiable_reactive_list<E: Clone + PartialEq + 'static>(
    elements: impl IntoIterator<Item = E>,
) -> ReactiveList<E> {
    ReactiveList::from_elements(elements)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
