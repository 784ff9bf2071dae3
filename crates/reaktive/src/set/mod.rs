#![forbid(unsafe_code)]

//! Reactive sets.
//!
//! A [`ReactiveSet`] reports every membership change as a [`SetChange`].
//! Root sets are created with [`reactive_set`], which returns a
//! [`MutableReactiveSet`]; derived sets (see the combinators in this module)
//! are read-only [`ReactiveSet`]s.
//!
//! # Invariants
//!
//! 1. Each effective insertion or removal emits exactly one change. Adding a
//!    present element or removing an absent one emits nothing.
//! 2. Batch operations emit one change per affected element, in the order
//!    they are applied.
//! 3. `now()` is a detached snapshot; iterating it never observes later
//!    changes.
//! 4. A derived set refers weakly to itself from its source observers and
//!    strongly to its sources, never the reverse.

mod views;

pub use views::AsReactiveSet;
pub(crate) use views::flatten_value;

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::rc::{Rc, Weak};

use ahash::AHashSet;

use crate::collection::ReactiveCollection;
use crate::observer::{DependencyScope, Observer, Registry};
use crate::propagation;
use crate::value::Dependency;

// ---------------------------------------------------------------------------
// SetChange
// ---------------------------------------------------------------------------

/// One membership change of a reactive set.
pub enum SetChange<E> {
    /// `element` was added to `source`.
    Added {
        /// The new element.
        element: E,
        /// The set that changed.
        source: ReactiveSet<E>,
    },
    /// `element` was removed from `source`.
    Removed {
        /// The removed element.
        element: E,
        /// The set that changed.
        source: ReactiveSet<E>,
    },
}

impl<E> SetChange<E> {
    /// The element that was added or removed.
    pub fn element(&self) -> &E {
        match self {
            Self::Added { element, .. } | Self::Removed { element, .. } => element,
        }
    }

    /// The set that changed.
    pub fn source(&self) -> &ReactiveSet<E> {
        match self {
            Self::Added { source, .. } | Self::Removed { source, .. } => source,
        }
    }

    /// Whether this change is an addition.
    pub fn is_added(&self) -> bool {
        matches!(self, Self::Added { .. })
    }

    /// Replay this change on a plain set.
    pub fn apply_to(&self, set: &mut AHashSet<E>)
    where
        E: Clone + Eq + Hash,
    {
        match self {
            Self::Added { element, .. } => {
                set.insert(element.clone());
            }
            Self::Removed { element, .. } => {
                set.remove(element);
            }
        }
    }
}

impl<E: Clone> Clone for SetChange<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Added { element, source } => Self::Added {
                element: element.clone(),
                source: source.clone(),
            },
            Self::Removed { element, source } => Self::Removed {
                element: element.clone(),
                source: source.clone(),
            },
        }
    }
}

impl<E: fmt::Debug> fmt::Debug for SetChange<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added { element, .. } => f.debug_tuple("Added").field(element).finish(),
            Self::Removed { element, .. } => f.debug_tuple("Removed").field(element).finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// ReactiveSet<E>
// ---------------------------------------------------------------------------

struct SetCore<E> {
    elements: RefCell<AHashSet<E>>,
    changes: Registry<SetChange<E>>,
    scope: DependencyScope,
}

/// A read-only view of a reactive set.
///
/// Cloning creates another handle to the **same** set. Equality and hashing
/// use identity, so sets can themselves be elements of reactive sets.
pub struct ReactiveSet<E> {
    core: Rc<SetCore<E>>,
}

impl<E> Clone for ReactiveSet<E> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<E> PartialEq for ReactiveSet<E> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }
}

impl<E> Eq for ReactiveSet<E> {}

impl<E> Hash for ReactiveSet<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Rc::as_ptr(&self.core), state);
    }
}

impl<E: fmt::Debug> fmt::Debug for ReactiveSet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.core.elements.borrow().iter()).finish()
    }
}

/// Weak handle used by derived views to reach their own storage.
pub(crate) struct WeakSet<E> {
    core: Weak<SetCore<E>>,
}

impl<E> Clone for WeakSet<E> {
    fn clone(&self) -> Self {
        Self {
            core: Weak::clone(&self.core),
        }
    }
}

impl<E> WeakSet<E> {
    pub(crate) fn upgrade(&self) -> Option<ReactiveSet<E>> {
        self.core.upgrade().map(|core| ReactiveSet { core })
    }
}

impl<E: Clone + Eq + Hash + 'static> ReactiveSet<E> {
    pub(crate) fn from_elements(elements: impl IntoIterator<Item = E>) -> Self {
        Self {
            core: Rc::new(SetCore {
                elements: RefCell::new(elements.into_iter().collect()),
                changes: Registry::new(),
                scope: DependencyScope::new(),
            }),
        }
    }

    /// A snapshot of the current elements.
    #[must_use]
    pub fn now(&self) -> AHashSet<E> {
        self.core.elements.borrow().clone()
    }

    /// Borrow the current elements without copying them.
    ///
    /// Mutating any reactive entity from inside `f` panics if it ends up
    /// mutating this set.
    pub fn with<R>(&self, f: impl FnOnce(&AHashSet<E>) -> R) -> R {
        f(&self.core.elements.borrow())
    }

    /// Whether `element` is currently in the set.
    #[must_use]
    pub fn contains_now(&self, element: &E) -> bool {
        self.core.elements.borrow().contains(element)
    }

    /// Run `handler` after every membership change.
    pub fn observe(&self, handler: impl Fn(&SetChange<E>) + 'static) -> Observer {
        self.core.changes.register(handler)
    }

    /// Stop updating this derived set. Idempotent; a no-op for root sets.
    ///
    /// The set keeps its current elements.
    pub fn dispose(&self) {
        if self.core.scope.dispose() {
            tracing::debug!(
                elements = self.core.elements.borrow().len(),
                "derived set disposed"
            );
        }
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.core.scope.is_disposed()
    }

    pub(crate) fn downgrade(&self) -> WeakSet<E> {
        WeakSet {
            core: Rc::downgrade(&self.core),
        }
    }

    pub(crate) fn hold(&self, observer: Observer) {
        self.core.scope.hold(observer);
    }

    pub(crate) fn anchor(&self, value: impl Any) {
        self.core.scope.anchor(value);
    }

    /// Insert `element`, emitting `Added` if it was absent.
    pub(crate) fn insert(&self, element: E) -> bool {
        let inserted = self.core.elements.borrow_mut().insert(element.clone());
        if inserted {
            self.core.changes.fire(SetChange::Added {
                element,
                source: self.clone(),
            });
        }
        inserted
    }

    /// Remove `element`, emitting `Removed` if it was present.
    pub(crate) fn take(&self, element: &E) -> bool {
        let removed = self.core.elements.borrow_mut().take(element);
        match removed {
            Some(element) => {
                self.core.changes.fire(SetChange::Removed {
                    element,
                    source: self.clone(),
                });
                true
            }
            None => false,
        }
    }
}

impl<E: Clone + Eq + Hash + 'static> ReactiveCollection<E> for ReactiveSet<E> {
    fn elements(&self) -> Vec<E> {
        self.core.elements.borrow().iter().cloned().collect()
    }

    fn size(&self) -> usize {
        self.core.elements.borrow().len()
    }

    fn observe_collection(
        &self,
        added: impl Fn(&E) + 'static,
        removed: impl Fn(&E) + 'static,
    ) -> Observer {
        self.observe(move |change| match change {
            SetChange::Added { element, .. } => added(element),
            SetChange::Removed { element, .. } => removed(element),
        })
    }
}

impl<E: Clone + Eq + Hash + 'static> Dependency for ReactiveSet<E> {
    fn observe_invalidation(&self, on_invalidate: Rc<dyn Fn()>) -> Observer {
        self.observe(move |_| on_invalidate())
    }
}

// ---------------------------------------------------------------------------
// MutableReactiveSet<E>
// ---------------------------------------------------------------------------

/// A root reactive set that can be mutated.
///
/// Dereferences to the read-only [`ReactiveSet`] it feeds.
pub struct MutableReactiveSet<E> {
    set: ReactiveSet<E>,
}

impl<E> Clone for MutableReactiveSet<E> {
    fn clone(&self) -> Self {
        Self {
            set: self.set.clone(),
        }
    }
}

impl<E> PartialEq for MutableReactiveSet<E> {
    fn eq(&self, other: &Self) -> bool {
        self.set == other.set
    }
}

impl<E> Eq for MutableReactiveSet<E> {}

impl<E> Hash for MutableReactiveSet<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.set.hash(state);
    }
}

impl<E: fmt::Debug> fmt::Debug for MutableReactiveSet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.set.fmt(f)
    }
}

impl<E> Deref for MutableReactiveSet<E> {
    type Target = ReactiveSet<E>;

    fn deref(&self) -> &ReactiveSet<E> {
        &self.set
    }
}

impl<E: Clone + Eq + Hash + 'static> MutableReactiveSet<E> {
    /// Add `element`. Returns `false` and emits nothing if it was present.
    pub fn add(&self, element: E) -> bool {
        propagation::settle(|| self.set.insert(element))
    }

    /// Remove `element`. Returns `false` and emits nothing if it was absent.
    pub fn remove(&self, element: &E) -> bool {
        propagation::settle(|| self.set.take(element))
    }

    /// Add every element in turn. Returns whether the set changed.
    pub fn add_all(&self, elements: impl IntoIterator<Item = E>) -> bool {
        propagation::settle(|| {
            elements
                .into_iter()
                .fold(false, |changed, element| self.set.insert(element) | changed)
        })
    }

    /// Remove every element in turn. Returns whether the set changed.
    pub fn remove_all<'a>(&self, elements: impl IntoIterator<Item = &'a E>) -> bool
    where
        E: 'a,
    {
        propagation::settle(|| {
            elements
                .into_iter()
                .fold(false, |changed, element| self.set.take(element) | changed)
        })
    }

    /// Remove every element for which `keep` returns `false`.
    pub fn retain(&self, mut keep: impl FnMut(&E) -> bool) -> bool {
        let doomed: Vec<E> = self.set.with(|elements| {
            elements.iter().filter(|e| !keep(e)).cloned().collect()
        });
        self.remove_all(&doomed)
    }

    /// Remove every element, emitting one `Removed` per element.
    pub fn clear(&self) {
        let drained: Vec<E> = self.set.core.elements.borrow_mut().drain().collect();
        propagation::settle(|| {
            for element in drained {
                self.set.core.changes.fire(SetChange::Removed {
                    element,
                    source: self.set.clone(),
                });
            }
        });
    }

    /// A read-only handle to this set.
    pub fn as_set(&self) -> ReactiveSet<E> {
        self.set.clone()
    }
}

impl<E: Clone + Eq + Hash + 'static> ReactiveCollection<E> for MutableReactiveSet<E> {
    fn elements(&self) -> Vec<E> {
        self.set.elements()
    }

    fn size(&self) -> usize {
        self.set.size()
    }

    fn observe_collection(
        &self,
        added: impl Fn(&E) + 'static,
        removed: impl Fn(&E) + 'static,
    ) -> Observer {
        self.set.observe_collection(added, removed)
    }
}

impl<E: Clone + Eq + Hash + 'static> Dependency for MutableReactiveSet<E> {
    fn observe_invalidation(&self, on_invalidate: Rc<dyn Fn()>) -> Observer {
        self.set.observe_invalidation(on_invalidate)
    }
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

/// Create a mutable reactive set holding `elements`.
pub fn reactive_set<E: Clone + Eq + Hash + 'static>(
    elements: impl IntoIterator<Item = E>,
) -> MutableReactiveSet<E> {
    MutableReactiveSet {
        set: ReactiveSet::from_elements(elements),
    }
}

/// Create a reactive set that never changes.
pub fn unmodifiable_reactive_set<E: Clone + Eq + Hash + 'static>(
    elements: impl IntoIterator<Item = E>,
) -> ReactiveSet<E> {
    ReactiveSet::from_elements(elements)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn record<E: Clone + Eq + Hash + 'static>(
        set: &ReactiveSet<E>,
    ) -> (Rc<RefCell<Vec<(bool, E)>>>, Observer) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let obs = set.observe(move |change| {
            l.borrow_mut()
                .push((change.is_added(), change.element().clone()));
        });
        (log, obs)
    }

    #[test]
    fn mutations_emit_one_change_each() {
        let set = reactive_set([1, 2]);
        let (log, _obs) = record(&set);

        assert!(set.add(3));
        assert!(set.remove(&1));
        assert_eq!(*log.borrow(), vec![(true, 3), (false, 1)]);
        assert_eq!(set.now(), AHashSet::from_iter([2, 3]));
    }

    #[test]
    fn redundant_mutations_emit_nothing() {
        let set = reactive_set([1, 2]);
        let (log, _obs) = record(&set);

        assert!(!set.add(1));
        assert!(!set.remove(&9));
        assert!(!set.add_all([1, 2]));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn batch_operations_emit_per_element() {
        let set = reactive_set(Vec::<i32>::new());
        let (log, _obs) = record(&set);

        assert!(set.add_all([1, 2, 2, 3]));
        assert_eq!(*log.borrow(), vec![(true, 1), (true, 2), (true, 3)]);
        log.borrow_mut().clear();

        assert!(set.remove_all(&[3, 7, 1]));
        assert_eq!(*log.borrow(), vec![(false, 3), (false, 1)]);
    }

    #[test]
    fn retain_and_clear() {
        let set = reactive_set(0..6);
        let (log, _obs) = record(&set);

        set.retain(|e| e % 2 == 0);
        assert_eq!(set.now(), AHashSet::from_iter([0, 2, 4]));
        assert_eq!(log.borrow().len(), 3);

        set.clear();
        assert!(set.now().is_empty());
        assert_eq!(log.borrow().len(), 6);
        set.clear();
        assert_eq!(log.borrow().len(), 6);
    }

    #[test]
    fn change_carries_source() {
        let set = reactive_set([1]);
        let seen: Rc<RefCell<Option<ReactiveSet<i32>>>> = Rc::new(RefCell::new(None));
        let s = Rc::clone(&seen);
        let _obs = set.observe(move |change| {
            *s.borrow_mut() = Some(change.source().clone());
        });
        set.add(2);
        assert_eq!(seen.borrow().as_ref(), Some(&set.as_set()));
    }

    #[test]
    fn snapshot_is_detached() {
        let set = reactive_set([1]);
        let snapshot = set.now();
        set.add(2);
        assert_eq!(snapshot.len(), 1);
        assert!(set.contains_now(&2));
    }

    #[test]
    fn sets_compare_by_identity() {
        let a = reactive_set([1]);
        let b = reactive_set([1]);
        assert_ne!(a, b);
        assert_eq!(a.as_set(), *a);
        let outer = reactive_set([a.as_set(), b.as_set()]);
        assert_eq!(outer.size(), 2);
    }

    #[test]
    fn apply_to_replays_changes() {
        let set = reactive_set([1, 2]);
        let mirror = Rc::new(RefCell::new(set.now()));
        let m = Rc::clone(&mirror);
        let _obs = set.observe(move |change| change.apply_to(&mut m.borrow_mut()));
        set.add(5);
        set.remove(&1);
        assert_eq!(*mirror.borrow(), set.now());
    }

    #[test]
    fn root_set_dispose_is_harmless() {
        let set = reactive_set([1]);
        set.dispose();
        set.add(2);
        assert_eq!(set.size(), 2);
    }
}
