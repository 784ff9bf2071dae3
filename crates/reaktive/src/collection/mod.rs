#![forbid(unsafe_code)]

//! Behavior shared by reactive sets and lists.
//!
//! [`ReactiveCollection`] reduces the typed change events of a concrete
//! collection to a plain "element added / element removed" stream. The
//! aggregate bindings built on top of it ([`all`](ReactiveCollection::all),
//! [`count`](ReactiveCollection::count), [`sum`](ReactiveCollection::sum),
//! ...) therefore work on any collection kind.

mod existence;
mod numeric;

use std::hash::Hash;
use std::ops::{Add, Sub};

use crate::list::unmodifiable_reactive_list;
use crate::observer::Observer;
use crate::value::{Binding, ReactiveValue};

/// A collection whose element additions and removals can be observed.
pub trait ReactiveCollection<E: Clone + 'static>: Clone + 'static {
    /// A snapshot of the current elements.
    fn elements(&self) -> Vec<E>;

    /// The current number of elements.
    fn size(&self) -> usize;

    /// Whether the collection is currently empty.
    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Observe single-element changes.
    ///
    /// A replacement is reported as a removal followed by an addition; a
    /// clear as one removal per element.
    fn observe_collection(
        &self,
        added: impl Fn(&E) + 'static,
        removed: impl Fn(&E) + 'static,
    ) -> Observer;

    /// `true` while every element's `predicate` value is `true`.
    ///
    /// The predicate yields a reactive value per element; each is observed
    /// for as long as its element stays in the collection.
    fn all<P>(&self, predicate: impl Fn(&E) -> P + 'static) -> Binding<bool>
    where
        E: Eq + Hash,
        P: ReactiveValue<bool>,
    {
        existence::all(self, predicate)
    }

    /// The number of elements satisfying `predicate`.
    fn count(&self, predicate: impl Fn(&E) -> bool + 'static) -> Binding<usize> {
        existence::count(self, predicate)
    }

    /// `true` while any element satisfies `predicate`.
    fn any(&self, predicate: impl Fn(&E) -> bool + 'static) -> Binding<bool> {
        self.count(predicate).map(|n| *n > 0)
    }

    /// `true` while `element` is in the collection.
    fn contains(&self, element: E) -> Binding<bool>
    where
        E: PartialEq,
    {
        self.any(move |e| *e == element)
    }

    /// `true` while every element of `elements` is in this collection.
    fn contains_all<C>(&self, elements: &C) -> Binding<bool>
    where
        E: Eq + Hash,
        C: ReactiveCollection<E>,
    {
        let this = self.clone();
        elements.all(move |e| this.contains(e.clone()))
    }

    /// `true` while every element of `elements` is in this collection.
    ///
    /// `elements` is a fixed collection; only this one is observed.
    fn contains_all_of(&self, elements: impl IntoIterator<Item = E>) -> Binding<bool>
    where
        E: Eq + Hash,
    {
        self.contains_all(&unmodifiable_reactive_list(elements))
    }

    /// The sum of all elements, updated in O(1) per change.
    fn sum(&self) -> Binding<E>
    where
        E: PartialEq + Default + Add<Output = E> + Sub<Output = E>,
    {
        self.fold_with_inverse(
            E::default(),
            |acc, e| acc.clone() + e.clone(),
            |acc, e| acc.clone() - e.clone(),
        )
    }

    /// A fold kept up to date in O(1) per change.
    ///
    /// `inverse` must undo `op`: `inverse(op(acc, e), e) == acc`.
    fn fold_with_inverse<T>(
        &self,
        initial: T,
        op: impl Fn(&T, &E) -> T + 'static,
        inverse: impl Fn(&T, &E) -> T + 'static,
    ) -> Binding<T>
    where
        T: Clone + PartialEq + 'static,
    {
        numeric::fold_with_inverse(self, initial, op, inverse)
    }

    /// A fold that rescans the whole collection on every change; prefer
    /// [`fold_with_inverse`](Self::fold_with_inverse) when `op` has an
    /// inverse.
    ///
    /// Without an inverse a removal cannot be undone in place, so this is
    /// the one aggregate that is not incremental.
    fn fold<T>(&self, initial: T, op: impl Fn(T, &E) -> T + 'static) -> Binding<T>
    where
        T: Clone + PartialEq + 'static,
    {
        numeric::fold(self, initial, op)
    }
}
