#![forbid(unsafe_code)]

//! Single-value reactive cells.
//!
//! - [`Variable`]: a mutable value; setting an equal value is a no-op.
//! - [`Binding`]: a value derived from dependencies, recomputed whenever one
//!   of them invalidates, and disposable.
//! - [`Dependencies`]: a uniform "observe for invalidation" view over any
//!   mix of reactive entities, used by [`binding_on`].
//!
//! Every value type implements [`ReactiveValue`], which also carries the
//! value combinators ([`map`](ReactiveValue::map),
//! [`zip_with`](ReactiveValue::zip_with)).

pub mod binding;
mod cell;
pub mod dependencies;
pub mod variable;

pub use binding::{Binding, BindingContext, binding, binding_on, constant_binding, reactive_value};
pub use dependencies::{Dependencies, Dependency};
pub use variable::{Variable, VariableSetter, reactive_variable};

pub(crate) use cell::ValueCell;

use std::rc::Rc;

use crate::observer::Observer;
use crate::set::{AsReactiveSet, ReactiveSet};

/// A value that can be read now and observed for changes.
pub trait ReactiveValue<T: Clone + PartialEq + 'static>: Clone + 'static {
    /// The current value.
    fn now(&self) -> T;

    /// Borrow the current value without cloning it.
    fn with_now<R>(&self, f: impl FnOnce(&T) -> R) -> R;

    /// Run `handler(old, new)` after every change of the value.
    fn observe(&self, handler: impl Fn(&T, &T) + 'static) -> Observer;

    /// View this value as a [`Binding`]. Disposing the result releases
    /// nothing unless `self` already is a binding.
    fn as_binding(&self) -> Binding<T>;

    /// A binding holding `f` applied to this value.
    fn map<U>(&self, f: impl Fn(&T) -> U + 'static) -> Binding<U>
    where
        U: Clone + PartialEq + 'static,
    {
        let source = self.clone();
        let initial = self.with_now(&f);
        binding(initial, move |ctx| {
            let target = ctx.clone();
            ctx.add_observer(source.observe(move |_, new| {
                target.set(f(new));
            }));
            ctx.anchor(source);
        })
    }

    /// A binding combining this value with `other` through `f`.
    fn zip_with<U, R>(
        &self,
        other: &impl ReactiveValue<U>,
        f: impl Fn(&T, &U) -> R + 'static,
    ) -> Binding<R>
    where
        U: Clone + PartialEq + 'static,
        R: Clone + PartialEq + 'static,
    {
        let (left, right) = (self.clone(), other.clone());
        let compute = Rc::new(move || left.with_now(|l| right.with_now(|r| f(l, r))));
        let initial = compute();
        let (left, right) = (self.clone(), other.clone());
        binding(initial, move |ctx| {
            let (target, recompute) = (ctx.clone(), Rc::clone(&compute));
            ctx.add_observer(left.observe(move |_, _| {
                target.set(recompute());
            }));
            let target = ctx.clone();
            ctx.add_observer(right.observe(move |_, _| {
                target.set(compute());
            }));
        })
    }

    /// A set tracking the contents of whichever set this value holds.
    fn flatten_to_set(&self) -> ReactiveSet<T::Element>
    where
        T: AsReactiveSet,
    {
        crate::set::flatten_value::<T, Self>(self)
    }
}
