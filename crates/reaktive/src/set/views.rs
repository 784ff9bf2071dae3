#![forbid(unsafe_code)]

//! Incremental set views.
//!
//! Every view computes its initial contents with one pass over its sources,
//! then translates each incoming [`SetChange`] into the changes of its own
//! contents. Views never read the live state of their sources after
//! construction: each keeps a mirror or a multiplicity count of what it has
//! been told, so a notification delivered after its source has moved on
//! (later in the same propagation frame, or after a handler mutated the
//! source again) is never applied against a state that is ahead of it.
//!
//! # Invariants
//!
//! 1. After the graph settles, every view equals a from-scratch evaluation
//!    over the current contents of its sources.
//! 2. A view emits a change only when its own contents change.
//! 3. Disposing a view stops all of its source and part observers.

use std::cell::RefCell;
use std::hash::Hash;
use std::ops::{Add, Sub};
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};

use super::{MutableReactiveSet, ReactiveSet, SetChange, WeakSet, unmodifiable_reactive_set};
use crate::observer::Observer;
use crate::value::ReactiveValue;

/// Anything that can be viewed as a [`ReactiveSet`].
pub trait AsReactiveSet: 'static {
    /// Element type of the set.
    type Element: Clone + Eq + Hash + 'static;

    /// A handle to the set.
    fn as_reactive_set(&self) -> ReactiveSet<Self::Element>;
}

impl<E: Clone + Eq + Hash + 'static> AsReactiveSet for ReactiveSet<E> {
    type Element = E;

    fn as_reactive_set(&self) -> ReactiveSet<E> {
        self.clone()
    }
}

impl<E: Clone + Eq + Hash + 'static> AsReactiveSet for MutableReactiveSet<E> {
    type Element = E;

    fn as_reactive_set(&self) -> ReactiveSet<E> {
        self.as_set()
    }
}

// ---------------------------------------------------------------------------
// Bookkeeping
// ---------------------------------------------------------------------------

/// Occurrence counts of view elements contributed by several sources.
struct Multiset<U> {
    counts: AHashMap<U, usize>,
}

impl<U: Clone + Eq + Hash> Multiset<U> {
    fn new() -> Self {
        Self {
            counts: AHashMap::new(),
        }
    }

    /// Count one more occurrence; `true` for the first one.
    fn add(&mut self, element: U) -> bool {
        let count = self.counts.entry(element).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Count one less occurrence; `true` when the last one is gone.
    fn remove(&mut self, element: &U) -> bool {
        match self.counts.get_mut(element) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.counts.remove(element);
                true
            }
            None => false,
        }
    }

    fn distinct(&self) -> impl Iterator<Item = &U> {
        self.counts.keys()
    }
}

/// A nested set a view currently draws elements from.
struct Part<U> {
    mirror: AHashSet<U>,
    set: ReactiveSet<U>,
    _observer: Observer,
}

fn insert_all<U: Clone + Eq + Hash + 'static>(target: &ReactiveSet<U>, elements: Vec<U>) {
    for element in elements {
        target.insert(element);
    }
}

fn remove_all<U: Clone + Eq + Hash + 'static>(target: &ReactiveSet<U>, elements: Vec<U>) {
    for element in elements {
        target.take(&element);
    }
}

// ---------------------------------------------------------------------------
// Two-sided views
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

#[derive(Clone, Copy, Debug)]
enum SetOp {
    Union,
    Difference,
    Intersection,
}

impl SetOp {
    fn includes(self, in_left: bool, in_right: bool) -> bool {
        match self {
            Self::Union => in_left || in_right,
            Self::Difference => in_left && !in_right,
            Self::Intersection => in_left && in_right,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Union => "union",
            Self::Difference => "difference",
            Self::Intersection => "intersection",
        }
    }
}

struct Mirrors<E> {
    left: AHashSet<E>,
    right: AHashSet<E>,
}

impl<E: Clone + Eq + Hash> Mirrors<E> {
    fn membership(&self, element: &E) -> (bool, bool) {
        (self.left.contains(element), self.right.contains(element))
    }

    /// Apply `change` to one side; returns membership before and after.
    fn apply(&mut self, side: Side, change: &SetChange<E>) -> ((bool, bool), (bool, bool)) {
        let element = change.element();
        let before = self.membership(element);
        let mirror = match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        };
        change.apply_to(mirror);
        (before, self.membership(element))
    }
}

fn two_sided<E>(left: &ReactiveSet<E>, right: &ReactiveSet<E>, op: SetOp) -> ReactiveSet<E>
where
    E: Clone + Eq + Hash + 'static,
{
    let mirrors = Mirrors {
        left: left.now(),
        right: right.now(),
    };
    let initial: Vec<E> = mirrors
        .left
        .union(&mirrors.right)
        .filter(|e| {
            let (l, r) = mirrors.membership(e);
            op.includes(l, r)
        })
        .cloned()
        .collect();
    let view = ReactiveSet::from_elements(initial);
    let mirrors = Rc::new(RefCell::new(mirrors));

    for (side, source) in [(Side::Left, left), (Side::Right, right)] {
        let (target, mirrors) = (view.downgrade(), Rc::clone(&mirrors));
        view.hold(source.observe(move |change| {
            let Some(target) = target.upgrade() else { return };
            let ((l0, r0), (l1, r1)) = mirrors.borrow_mut().apply(side, change);
            match (op.includes(l0, r0), op.includes(l1, r1)) {
                (false, true) => {
                    target.insert(change.element().clone());
                }
                (true, false) => {
                    target.take(change.element());
                }
                _ => {}
            }
        }));
        view.anchor(source.clone());
    }
    tracing::trace!(
        view = op.name(),
        elements = view.core.elements.borrow().len(),
        "derived set created"
    );
    view
}

// ---------------------------------------------------------------------------
// Combinators
// ---------------------------------------------------------------------------

impl<E: Clone + Eq + Hash + 'static> ReactiveSet<E> {
    /// A set of `f` applied to every element.
    ///
    /// `f` need not be injective: a mapped value stays in the view until the
    /// last element mapping to it is removed.
    pub fn map<U>(&self, f: impl Fn(&E) -> U + 'static) -> ReactiveSet<U>
    where
        U: Clone + Eq + Hash + 'static,
    {
        let mut counts = Multiset::new();
        self.with(|elements| {
            for element in elements {
                counts.add(f(element));
            }
        });
        let view = ReactiveSet::from_elements(counts.distinct().cloned());
        let counts = RefCell::new(counts);
        let target = view.downgrade();
        view.hold(self.observe(move |change| {
            let Some(target) = target.upgrade() else { return };
            let mapped = f(change.element());
            match change {
                SetChange::Added { .. } => {
                    let first = counts.borrow_mut().add(mapped.clone());
                    if first {
                        target.insert(mapped);
                    }
                }
                SetChange::Removed { .. } => {
                    let last = counts.borrow_mut().remove(&mapped);
                    if last {
                        target.take(&mapped);
                    }
                }
            }
        }));
        view.anchor(self.clone());
        tracing::trace!(view = "map", "derived set created");
        view
    }

    /// A set of the elements satisfying `predicate`.
    pub fn filter(&self, predicate: impl Fn(&E) -> bool + 'static) -> ReactiveSet<E> {
        let initial: Vec<E> =
            self.with(|elements| elements.iter().filter(|e| predicate(e)).cloned().collect());
        let view = ReactiveSet::from_elements(initial);
        let target = view.downgrade();
        view.hold(self.observe(move |change| {
            let Some(target) = target.upgrade() else { return };
            match change {
                SetChange::Added { element, .. } => {
                    if predicate(element) {
                        target.insert(element.clone());
                    }
                }
                SetChange::Removed { element, .. } => {
                    target.take(element);
                }
            }
        }));
        view.anchor(self.clone());
        tracing::trace!(view = "filter", "derived set created");
        view
    }

    /// The union of the sets `f` yields for every element.
    ///
    /// The set returned by `f` is captured when its element is added and
    /// observed until that element is removed.
    pub fn flat_map<S>(&self, f: impl Fn(&E) -> S + 'static) -> ReactiveSet<S::Element>
    where
        S: AsReactiveSet,
    {
        let view = ReactiveSet::from_elements(std::iter::empty());
        let state = Rc::new(RefCell::new(FlatState::new()));
        let target = view.downgrade();
        let elements: Vec<E> = self.with(|elements| elements.iter().cloned().collect());
        for element in elements {
            let part = f(&element).as_reactive_set();
            let surfaced = attach_part(&state, &target, element, part);
            insert_all(&view, surfaced);
        }

        let (weak_state, outer_target) = (Rc::downgrade(&state), view.downgrade());
        view.hold(self.observe(move |change| {
            let (Some(state), Some(target)) = (weak_state.upgrade(), outer_target.upgrade())
            else {
                return;
            };
            match change {
                SetChange::Added { element, .. } => {
                    let part = f(element).as_reactive_set();
                    let surfaced = attach_part(&state, &outer_target, element.clone(), part);
                    insert_all(&target, surfaced);
                }
                SetChange::Removed { element, .. } => {
                    let (part, vanished) = detach_part(&state, element);
                    drop(part);
                    remove_all(&target, vanished);
                }
            }
        }));
        view.anchor(state);
        view.anchor(self.clone());
        tracing::trace!(view = "flat_map", "derived set created");
        view
    }

    /// A set of the elements in this set or in `other`.
    pub fn union(&self, other: &impl AsReactiveSet<Element = E>) -> ReactiveSet<E> {
        two_sided(self, &other.as_reactive_set(), SetOp::Union)
    }

    /// A set of the elements in this set but not in `other`.
    pub fn difference(&self, other: &impl AsReactiveSet<Element = E>) -> ReactiveSet<E> {
        two_sided(self, &other.as_reactive_set(), SetOp::Difference)
    }

    /// A set of the elements in both this set and `other`.
    pub fn intersect(&self, other: &impl AsReactiveSet<Element = E>) -> ReactiveSet<E> {
        two_sided(self, &other.as_reactive_set(), SetOp::Intersection)
    }

    /// The union of the nested sets.
    pub fn flatten(&self) -> ReactiveSet<E::Element>
    where
        E: AsReactiveSet,
    {
        self.flat_map(|part: &E| part.as_reactive_set())
    }

    /// A set of the current values of the reactive values in this set.
    ///
    /// Each value is observed while it is an element; a change of a value
    /// replaces its old value with the new one in the view.
    pub fn values<T>(&self) -> ReactiveSet<T>
    where
        E: ReactiveValue<T>,
        T: Clone + Eq + Hash + 'static,
    {
        let view = ReactiveSet::from_elements(std::iter::empty());
        let state = Rc::new(RefCell::new(ValuesState::new()));
        let target = view.downgrade();
        let elements: Vec<E> = self.with(|elements| elements.iter().cloned().collect());
        for element in elements {
            if let Some(surfaced) = attach_value(&state, &target, element) {
                view.insert(surfaced);
            }
        }

        let (weak_state, outer_target) = (Rc::downgrade(&state), view.downgrade());
        view.hold(self.observe(move |change| {
            let (Some(state), Some(target)) = (weak_state.upgrade(), outer_target.upgrade())
            else {
                return;
            };
            match change {
                SetChange::Added { element, .. } => {
                    if let Some(surfaced) = attach_value(&state, &outer_target, element.clone()) {
                        target.insert(surfaced);
                    }
                }
                SetChange::Removed { element, .. } => {
                    let (tracked, vanished) = detach_value(&state, element);
                    drop(tracked);
                    if let Some(vanished) = vanished {
                        target.take(&vanished);
                    }
                }
            }
        }));
        view.anchor(state);
        view.anchor(self.clone());
        tracing::trace!(view = "values", "derived set created");
        view
    }
}

// ---------------------------------------------------------------------------
// flat_map state
// ---------------------------------------------------------------------------

struct FlatState<E, U> {
    parts: AHashMap<E, Part<U>>,
    counts: Multiset<U>,
}

impl<E, U: Clone + Eq + Hash> FlatState<E, U> {
    fn new() -> Self {
        Self {
            parts: AHashMap::new(),
            counts: Multiset::new(),
        }
    }
}

/// Start drawing from `part` for `key`; returns the elements that surface
/// in the view.
fn attach_part<E, U>(
    state: &Rc<RefCell<FlatState<E, U>>>,
    target: &WeakSet<U>,
    key: E,
    part: ReactiveSet<U>,
) -> Vec<U>
where
    E: Clone + Eq + Hash + 'static,
    U: Clone + Eq + Hash + 'static,
{
    let (weak_state, target, part_key) = (Rc::downgrade(state), target.clone(), key.clone());
    let observer = part.observe(move |change| {
        let (Some(state), Some(target)) = (weak_state.upgrade(), target.upgrade()) else {
            return;
        };
        let element = change.element();
        let changed = {
            let state = &mut *state.borrow_mut();
            let Some(part) = state.parts.get_mut(&part_key) else { return };
            match change {
                SetChange::Added { .. } => {
                    part.mirror.insert(element.clone()) && state.counts.add(element.clone())
                }
                SetChange::Removed { .. } => {
                    part.mirror.remove(element) && state.counts.remove(element)
                }
            }
        };
        if changed {
            match change {
                SetChange::Added { .. } => target.insert(element.clone()),
                SetChange::Removed { .. } => target.take(element),
            };
        }
    });
    let mirror = part.now();
    let state = &mut *state.borrow_mut();
    let surfaced = mirror
        .iter()
        .filter(|e| state.counts.add((*e).clone()))
        .cloned()
        .collect();
    state.parts.insert(
        key,
        Part {
            mirror,
            set: part,
            _observer: observer,
        },
    );
    surfaced
}

/// Stop drawing from the part of `key`; returns it with the elements that
/// leave the view.
fn detach_part<E, U>(state: &Rc<RefCell<FlatState<E, U>>>, key: &E) -> (Option<Part<U>>, Vec<U>)
where
    E: Eq + Hash,
    U: Clone + Eq + Hash,
{
    let state = &mut *state.borrow_mut();
    let Some(part) = state.parts.remove(key) else {
        return (None, Vec::new());
    };
    let vanished = part
        .mirror
        .iter()
        .filter(|e| state.counts.remove(e))
        .cloned()
        .collect();
    (Some(part), vanished)
}

// ---------------------------------------------------------------------------
// values state
// ---------------------------------------------------------------------------

struct TrackedValue<T> {
    current: T,
    _observer: Observer,
}

struct ValuesState<E, T> {
    tracked: AHashMap<E, TrackedValue<T>>,
    counts: Multiset<T>,
}

impl<E, T: Clone + Eq + Hash> ValuesState<E, T> {
    fn new() -> Self {
        Self {
            tracked: AHashMap::new(),
            counts: Multiset::new(),
        }
    }
}

fn attach_value<E, T>(
    state: &Rc<RefCell<ValuesState<E, T>>>,
    target: &WeakSet<T>,
    element: E,
) -> Option<T>
where
    E: ReactiveValue<T> + Eq + Hash,
    T: Clone + Eq + Hash + 'static,
{
    let (weak_state, target, key) = (Rc::downgrade(state), target.clone(), element.clone());
    let observer = element.observe(move |_, new| {
        let (Some(state), Some(target)) = (weak_state.upgrade(), target.upgrade()) else {
            return;
        };
        let (vanished, surfaced) = {
            let state = &mut *state.borrow_mut();
            let Some(tracked) = state.tracked.get_mut(&key) else { return };
            if tracked.current == *new {
                return;
            }
            let old = std::mem::replace(&mut tracked.current, new.clone());
            let vanished = state.counts.remove(&old).then_some(old);
            let surfaced = state.counts.add(new.clone()).then(|| new.clone());
            (vanished, surfaced)
        };
        if let Some(old) = vanished {
            target.take(&old);
        }
        if let Some(new) = surfaced {
            target.insert(new);
        }
    });
    let current = element.now();
    let state = &mut *state.borrow_mut();
    let surfaced = state.counts.add(current.clone()).then(|| current.clone());
    state.tracked.insert(
        element,
        TrackedValue {
            current,
            _observer: observer,
        },
    );
    surfaced
}

fn detach_value<E, T>(
    state: &Rc<RefCell<ValuesState<E, T>>>,
    element: &E,
) -> (Option<TrackedValue<T>>, Option<T>)
where
    E: Eq + Hash,
    T: Clone + Eq + Hash,
{
    let state = &mut *state.borrow_mut();
    let Some(tracked) = state.tracked.remove(element) else {
        return (None, None);
    };
    let vanished = state
        .counts
        .remove(&tracked.current)
        .then(|| tracked.current.clone());
    (Some(tracked), vanished)
}

// ---------------------------------------------------------------------------
// Values holding sets
// ---------------------------------------------------------------------------

struct CurrentPart<U> {
    part: Option<Part<U>>,
}

/// A set tracking whichever set `value` currently holds.
pub(crate) fn flatten_value<S, V>(value: &V) -> ReactiveSet<S::Element>
where
    S: AsReactiveSet + Clone + PartialEq,
    V: ReactiveValue<S>,
{
    let first = value.with_now(|set| set.as_reactive_set());
    let view = ReactiveSet::from_elements(first.now());
    let current = Rc::new(RefCell::new(CurrentPart { part: None }));
    let part = observe_current(&current, &view.downgrade(), first);
    current.borrow_mut().part = Some(part);

    let (weak_current, target) = (Rc::downgrade(&current), view.downgrade());
    view.hold(value.observe(move |_, new| {
        let (Some(current), Some(view)) = (weak_current.upgrade(), target.upgrade()) else {
            return;
        };
        let next = new.as_reactive_set();
        let part = observe_current(&current, &target, next);
        let incoming = part.mirror.clone();
        let previous = current.borrow_mut().part.replace(part);
        let outgoing = previous.map(|p| p.mirror).unwrap_or_default();
        remove_all(&view, outgoing.difference(&incoming).cloned().collect());
        insert_all(&view, incoming.difference(&outgoing).cloned().collect());
    }));
    view.anchor(current);
    view.anchor(value.clone());
    tracing::trace!(view = "flatten_to_set", "derived set created");
    view
}

fn observe_current<U>(
    current: &Rc<RefCell<CurrentPart<U>>>,
    target: &WeakSet<U>,
    set: ReactiveSet<U>,
) -> Part<U>
where
    U: Clone + Eq + Hash + 'static,
{
    let (weak_current, target, observed) = (Rc::downgrade(current), target.clone(), set.clone());
    let observer = set.observe(move |change| {
        let (Some(current), Some(target)) = (weak_current.upgrade(), target.upgrade()) else {
            return;
        };
        let changed = {
            let mut current = current.borrow_mut();
            let Some(part) = current.part.as_mut().filter(|p| p.set == observed) else {
                return;
            };
            match change {
                SetChange::Added { element, .. } => part.mirror.insert(element.clone()),
                SetChange::Removed { element, .. } => part.mirror.remove(element),
            }
        };
        if changed {
            match change {
                SetChange::Added { element, .. } => target.insert(element.clone()),
                SetChange::Removed { element, .. } => target.take(element),
            };
        }
    });
    Part {
        mirror: set.now(),
        set,
        _observer: observer,
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

impl<E: Clone + Eq + Hash + 'static> ReactiveSet<E> {
    /// The union with a fixed collection of `elements`.
    pub fn plus(&self, elements: impl IntoIterator<Item = E>) -> ReactiveSet<E> {
        self.union(&unmodifiable_reactive_set(elements))
    }

    /// This set without a fixed collection of `elements`.
    pub fn minus(&self, elements: impl IntoIterator<Item = E>) -> ReactiveSet<E> {
        self.difference(&unmodifiable_reactive_set(elements))
    }
}

impl<E, S> Add<&S> for &ReactiveSet<E>
where
    E: Clone + Eq + Hash + 'static,
    S: AsReactiveSet<Element = E>,
{
    type Output = ReactiveSet<E>;

    fn add(self, other: &S) -> ReactiveSet<E> {
        self.union(other)
    }
}

impl<E, S> Add<&S> for &MutableReactiveSet<E>
where
    E: Clone + Eq + Hash + 'static,
    S: AsReactiveSet<Element = E>,
{
    type Output = ReactiveSet<E>;

    fn add(self, other: &S) -> ReactiveSet<E> {
        self.union(other)
    }
}

impl<E, S> Sub<&S> for &ReactiveSet<E>
where
    E: Clone + Eq + Hash + 'static,
    S: AsReactiveSet<Element = E>,
{
    type Output = ReactiveSet<E>;

    fn sub(self, other: &S) -> ReactiveSet<E> {
        self.difference(other)
    }
}

impl<E, S> Sub<&S> for &MutableReactiveSet<E>
where
    E: Clone + Eq + Hash + 'static,
    S: AsReactiveSet<Element = E>,
{
    type Output = ReactiveSet<E>;

    fn sub(self, other: &S) -> ReactiveSet<E> {
        self.difference(other)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::ReactiveCollection;
    use crate::set::{reactive_set, unmodifiable_reactive_set};
    use crate::value::reactive_variable;
    use std::cell::Cell;
    use std::fmt::Debug;

    fn set_of<E: Clone + Eq + Hash>(elements: impl IntoIterator<Item = E>) -> AHashSet<E> {
        elements.into_iter().collect()
    }

    /// Replays the changes of `view` onto a copy of its initial contents.
    struct Replay<E> {
        mirror: Rc<RefCell<AHashSet<E>>>,
        events: Rc<Cell<usize>>,
        _observer: Observer,
    }

    impl<E: Clone + Eq + Hash + Debug + 'static> Replay<E> {
        fn new(view: &ReactiveSet<E>) -> Self {
            let mirror = Rc::new(RefCell::new(view.now()));
            let events = Rc::new(Cell::new(0));
            let (m, n) = (Rc::clone(&mirror), Rc::clone(&events));
            let observer = view.observe(move |change| {
                change.apply_to(&mut m.borrow_mut());
                n.set(n.get() + 1);
            });
            Self {
                mirror,
                events,
                _observer: observer,
            }
        }

        fn check(&self, view: &ReactiveSet<E>, expected: AHashSet<E>) {
            assert_eq!(view.now(), expected);
            assert_eq!(*self.mirror.borrow(), expected);
        }
    }

    #[test]
    fn map_follows_source() {
        let set = reactive_set([1, 2, 3]);
        let powers = set.map(|e| e * e);
        let replay = Replay::new(&powers);
        let expected = || set.now().iter().map(|e| e * e).collect::<AHashSet<_>>();
        replay.check(&powers, expected());

        set.add(4);
        replay.check(&powers, expected());
        set.remove(&2);
        replay.check(&powers, expected());
        set.clear();
        replay.check(&powers, set_of([]));
    }

    #[test]
    fn map_tracks_multiplicity() {
        let set = reactive_set([1, 4, 2]);
        let residues = set.map(|e| e % 3);
        let replay = Replay::new(&residues);
        assert_eq!(residues.now(), set_of([1, 2]));

        set.remove(&1);
        assert_eq!(replay.events.get(), 0);
        replay.check(&residues, set_of([1, 2]));
        set.remove(&4);
        replay.check(&residues, set_of([2]));
    }

    #[test]
    fn filter_follows_source() {
        let set = reactive_set([1, 2, 3]);
        let evens = set.filter(|e| e % 2 == 0);
        let replay = Replay::new(&evens);
        replay.check(&evens, set_of([2]));

        set.add(4);
        set.remove(&2);
        set.add(7);
        set.remove(&1);
        replay.check(&evens, set_of([4]));
        assert_eq!(replay.events.get(), 2);
        set.clear();
        replay.check(&evens, set_of([]));
    }

    #[test]
    fn flatten_follows_outer_and_parts() {
        let part1 = reactive_set([1, 2, 3]);
        let part2 = reactive_set([3, 4, 5]);
        let outer = reactive_set([part1.clone(), part2.clone()]);
        let flat = outer.flatten();
        let replay = Replay::new(&flat);
        replay.check(&flat, set_of([1, 2, 3, 4, 5]));

        outer.remove(&part2);
        replay.check(&flat, set_of([1, 2, 3]));
        part1.add(9);
        replay.check(&flat, set_of([1, 2, 3, 9]));
        part2.add(100);
        replay.check(&flat, set_of([1, 2, 3, 9]));
    }

    #[test]
    fn flatten_adds_and_removes_parts() {
        let part1 = reactive_set([1, 2, 3]);
        let part2 = reactive_set([3, 4, 5]);
        let part3 = reactive_set([5, 0]);
        let outer = reactive_set([part1.clone(), part2.clone(), part3.clone()]);
        let flat = outer.flatten();
        let replay = Replay::new(&flat);
        let expected = || {
            outer
                .now()
                .iter()
                .flat_map(|part| part.now())
                .collect::<AHashSet<_>>()
        };

        let part4 = reactive_set([6, 2, 7]);
        outer.add(part4.clone());
        replay.check(&flat, expected());
        part4.add(8);
        replay.check(&flat, expected());
        part4.remove(&6);
        replay.check(&flat, expected());
        outer.remove(&part4);
        replay.check(&flat, expected());
        outer.remove(&part2);
        replay.check(&flat, expected());
        part1.remove(&1);
        replay.check(&flat, expected());
        part2.add(9);
        replay.check(&flat, expected());
        part3.remove(&5);
        replay.check(&flat, expected());
    }

    #[test]
    fn flat_map_captures_part_per_element() {
        let threshold = reactive_set([2, 3]);
        let ranges = threshold.flat_map(|n| unmodifiable_reactive_set(0..*n));
        assert_eq!(ranges.now(), set_of([0, 1, 2]));
        threshold.remove(&3);
        assert_eq!(ranges.now(), set_of([0, 1]));
        threshold.add(1);
        threshold.remove(&2);
        assert_eq!(ranges.now(), set_of([0]));
    }

    #[test]
    fn union_keeps_elements_present_on_either_side() {
        let set1 = reactive_set([1, 2, 3]);
        let set2 = reactive_set([3, 4, 5]);
        let union = &set1 + &set2;
        let replay = Replay::new(&union);
        replay.check(&union, set_of([1, 2, 3, 4, 5]));

        set2.remove(&3);
        replay.check(&union, set_of([1, 2, 3, 4, 5]));
        set1.remove(&3);
        replay.check(&union, set_of([1, 2, 4, 5]));
        set1.add(0);
        set2.add(1);
        replay.check(&union, set_of([0, 1, 2, 4, 5]));
    }

    #[test]
    fn difference_tracks_both_sides() {
        let set1 = reactive_set([1, 2, 3]);
        let set2 = reactive_set([2, 3, 4]);
        let difference = &set1 - &set2;
        let replay = Replay::new(&difference);
        let expected = || {
            let (a, b) = (set1.now(), set2.now());
            a.difference(&b).cloned().collect::<AHashSet<_>>()
        };
        replay.check(&difference, expected());

        set1.add(0);
        set1.add(4);
        set1.remove(&1);
        set1.remove(&2);
        replay.check(&difference, expected());
        assert_eq!(set1.now(), set_of([0, 3, 4]));

        set2.add(0);
        replay.check(&difference, expected());
        set2.add(5);
        replay.check(&difference, expected());
        set2.remove(&3);
        replay.check(&difference, set_of([3]));
        set2.remove(&5);
        replay.check(&difference, expected());
    }

    #[test]
    fn intersection_tracks_both_sides() {
        let set1 = reactive_set([1, 2, 3]);
        let set2 = reactive_set([3, 4, 5]);
        let both = set1.intersect(&set2);
        let replay = Replay::new(&both);
        replay.check(&both, set_of([3]));

        set1.add(0);
        set2.add(1);
        replay.check(&both, set_of([1, 3]));
        set2.remove(&3);
        replay.check(&both, set_of([1]));
        set1.remove(&3);
        replay.check(&both, set_of([1]));
    }

    #[test]
    fn plus_and_minus_fixed_elements() {
        let set = reactive_set([1, 2, 3]);
        let more = set.plus([3, 4]);
        let fewer = set.minus(vec![1, 5]);
        assert_eq!(more.now(), set_of([1, 2, 3, 4]));
        assert_eq!(fewer.now(), set_of([2, 3]));

        set.add(5);
        set.remove(&3);
        assert_eq!(more.now(), set_of([1, 2, 3, 4, 5]));
        assert_eq!(fewer.now(), set_of([2]));
        set.remove(&4);
        assert_eq!(more.now(), set_of([1, 2, 3, 4, 5]));
    }

    #[test]
    fn redundant_source_mutations_reach_no_view() {
        let set1 = reactive_set([1, 2]);
        let set2 = reactive_set([2, 3]);
        let union = set1.union(&set2);
        let mapped = union.map(|e| e * 10);
        let replay = Replay::new(&mapped);

        set1.add(1);
        set2.remove(&7);
        set1.add(3);
        assert_eq!(replay.events.get(), 0);
    }

    #[test]
    fn values_follow_elements_and_their_changes() {
        let v1 = reactive_variable(1);
        let v2 = reactive_variable(2);
        let v3 = reactive_variable(3);
        let source = reactive_set([v1.clone(), v2.clone(), v3.clone()]);
        let values: ReactiveSet<i32> = source.values();
        let replay = Replay::new(&values);
        let expected = || source.now().iter().map(|v| v.now()).collect::<AHashSet<_>>();
        replay.check(&values, set_of([1, 2, 3]));

        v1.set(4);
        replay.check(&values, expected());
        source.remove(&v2);
        replay.check(&values, expected());
        v2.set(5);
        replay.check(&values, expected());
        source.add(v2.clone());
        replay.check(&values, expected());
        v2.set(7);
        replay.check(&values, expected());

        let v4 = reactive_variable(10);
        source.add(v4.clone());
        v4.set(11);
        replay.check(&values, set_of([4, 3, 7, 11]));
        source.remove(&v4);
        v4.set(12);
        replay.check(&values, expected());
    }

    #[test]
    fn values_handle_shared_values() {
        let a = reactive_variable(1);
        let b = reactive_variable(1);
        let source = reactive_set([a.clone(), b.clone()]);
        let values: ReactiveSet<i32> = source.values();
        assert_eq!(values.now(), set_of([1]));
        a.set(2);
        assert_eq!(values.now(), set_of([1, 2]));
        b.set(2);
        assert_eq!(values.now(), set_of([2]));
    }

    #[test]
    fn flatten_to_set_follows_current_set() {
        let v = reactive_variable(reactive_set([1, 2, 3]));
        let flat = v.flatten_to_set();
        let replay = Replay::new(&flat);
        replay.check(&flat, set_of([1, 2, 3]));

        v.now().add(4);
        v.now().remove(&1);
        replay.check(&flat, set_of([2, 3, 4]));

        let previous = v.now();
        v.set(reactive_set([4, 5, 6]));
        replay.check(&flat, set_of([4, 5, 6]));
        assert_eq!(replay.events.get(), 2 + 4);

        previous.add(100);
        v.now().add(7);
        v.now().remove(&4);
        replay.check(&flat, set_of([5, 6, 7]));
    }

    #[test]
    fn disposed_view_stops_updating() {
        let set1 = reactive_set([1]);
        let set2 = reactive_set([2]);
        let union = set1.union(&set2);
        union.dispose();
        union.dispose();
        assert!(union.is_disposed());
        set1.add(5);
        assert_eq!(union.now(), set_of([1, 2]));
    }

    #[test]
    fn dropped_view_is_released() {
        let set = reactive_set([1, 2]);
        let weak = set.map(|e| e + 1).downgrade();
        assert!(weak.upgrade().is_none());
        set.add(3);
    }

    #[test]
    fn chained_views_settle_before_mutation_returns() {
        let set = reactive_set(0..10);
        let evens = set.filter(|e| e % 2 == 0);
        let halves = evens.map(|e| e / 2);
        let total = halves.sum();
        assert_eq!(total.now(), 10);

        set.add(10);
        assert_eq!(halves.now(), set_of(0..6));
        assert_eq!(total.now(), 15);
    }

    #[test]
    fn handler_mutations_settle_every_view() {
        let left = reactive_set([1, 2, 3]);
        let right = reactive_set([3, 4]);
        let union = &left + &right;
        let difference = &left - &right;
        let evens = left.filter(|e| e % 2 == 0);
        let tens = union.map(|e| e / 10);
        let total = union.sum();
        let (rep_union, rep_difference) = (Replay::new(&union), Replay::new(&difference));

        // Every element added to `left` pulls its +100 twin into `left` and
        // a copy into `right`; every removal drops the twin again.
        let inside = Rc::new(RefCell::new(Vec::new()));
        let (l, r, u, t, seen) = (
            left.clone(),
            right.clone(),
            union.clone(),
            total.clone(),
            Rc::clone(&inside),
        );
        let _chain = left.observe(move |change| match change {
            SetChange::Added { element, .. } if *element < 100 => {
                l.add(element + 100);
                r.add(*element);
                let expected: i32 = l.now().union(&r.now()).sum();
                seen.borrow_mut().push((u.now().len(), t.now(), expected));
            }
            SetChange::Removed { element, .. } if *element < 100 => {
                l.remove(&(element + 100));
            }
            _ => {}
        });

        let check = || {
            let (l, r) = (left.now(), right.now());
            let u: AHashSet<i32> = l.union(&r).copied().collect();
            rep_union.check(&union, u.clone());
            rep_difference.check(&difference, l.difference(&r).copied().collect());
            assert_eq!(
                evens.now(),
                l.iter().copied().filter(|e| e % 2 == 0).collect::<AHashSet<_>>()
            );
            assert_eq!(tens.now(), u.iter().map(|e| e / 10).collect::<AHashSet<_>>());
            assert_eq!(total.now(), u.iter().sum::<i32>());
        };

        left.add(5);
        check();
        assert_eq!(left.now(), set_of([1, 2, 3, 5, 105]));
        assert_eq!(right.now(), set_of([3, 4, 5]));
        left.add(6);
        check();
        left.remove(&5);
        check();
        assert!(!left.contains_now(&105));
        right.remove(&3);
        check();
        left.clear();
        check();
        assert!(left.now().is_empty());

        // Inside the handler, the nested mutations had already settled.
        for (size, sum, expected) in inside.borrow().iter() {
            assert!(*size > 0);
            assert_eq!(sum, expected);
        }
        assert_eq!(inside.borrow().len(), 2);
    }
}
